//! The dispatch engines: everything between the REST surface and the stores.
//!
//! `CallLifecycle` owns call state, `UnitStatusMachine` owns unit state,
//! `AssignmentEngine` binds the two under races, `EscalationEngine` turns
//! committed state changes into notifications, and `NotificationHub` delivers
//! them (durable ledger first, live broadcast second). `PanicWatch` is the
//! periodic sweep that re-raises unanswered panic alerts.
//!
//! Engines hold their dependencies behind the traits in [`traits`], so every
//! path here is exercised against [`testing::MemoryStore`] without Postgres.

pub mod assignment;
pub mod core;
pub mod escalation;
pub mod events;
pub mod hub;
pub mod lifecycle;
pub mod status;
pub mod sweep;
pub mod testing;
pub mod traits;

pub use assignment::{AssignmentEngine, AssignmentOutcome};
pub use core::DispatchCore;
pub use escalation::EscalationEngine;
pub use events::DispatchEvent;
pub use hub::NotificationHub;
pub use lifecycle::{CallLifecycle, NewCall};
pub use status::UnitStatusMachine;
pub use sweep::PanicWatch;
pub use testing::MemoryStore;
pub use traits::{DispatchStore, NotificationLedger};

/// Reload-and-retry bound for version-checked updates.
pub(crate) const MAX_CAS_ATTEMPTS: u32 = 3;
