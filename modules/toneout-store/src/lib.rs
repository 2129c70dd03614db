//! Postgres persistence for the dispatch core.
//!
//! One store over one pool. Every multi-writer mutation is either a
//! compare-and-swap on the aggregate's `version` or a conditional update on
//! the contended columns, so correctness never depends on in-process locks
//! and holds across service instances. Unit mutations and their status-log
//! rows commit in the same transaction.

pub mod alerts;
pub mod calls;
mod rows;
pub mod store;
pub mod units;

pub use store::PgDispatchStore;
pub use units::ClaimOutcome;
