pub mod codes;
pub mod config;
pub mod error;
pub mod types;

pub use codes::{CodeResolution, StatusCodeRegistry};
pub use config::Config;
pub use error::{DispatchError, Result};
pub use types::*;
