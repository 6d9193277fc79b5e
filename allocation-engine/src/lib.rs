//! # Platform Allocation Engine
//!
//! The `PURCHASE_CREATED` → `TRAINER_ALLOCATED` reaction: matches a
//! purchase to an eligible trainer and generates its initial session
//! schedule.
//!
//! [`handler::PurchaseCreatedHandler`] implements
//! [`platform_worker_runtime::EventHandler`] and is driven by
//! `platform-worker-runtime`'s consumer loop, which already guarantees
//! idempotent delivery via the shared ledger; this crate's own recovery
//! check in [`handler`] covers the narrower window where a prior attempt's
//! side effect committed but its ledger write did not.
//!
//! Trainer master data is read through [`trainer_directory::TrainerDirectory`],
//! a trait this crate depends on but does not implement — a real deployment
//! backs it with a call to the trainer service.

pub mod handler;
pub mod selection;
pub mod sessions;
pub mod trainer_directory;

pub use handler::PurchaseCreatedHandler;
pub use selection::{select_trainer, SelectionOutcome, SelectionRequest};
pub use sessions::{generate_sessions, DeliveryMode, PlannedSession};
pub use trainer_directory::{
    ApprovalStatus, GeoPoint, Gender, TrainerDirectory, TrainerDirectoryError, TrainerProfile, Zone,
};
