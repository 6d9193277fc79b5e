//! # Platform Testkit
//!
//! In-memory fixture test doubles for every dyn-compatible collaborator
//! trait the platform's crates depend on: `platform-core`'s `EventBus`,
//! `IdempotencyLedger`, `DeadLetterSink`, and `AllocationRepository`;
//! `platform-allocation-engine`'s `TrainerDirectory`; and
//! `platform-shared-kv`'s `RateLimiter` and `SubscriptionRegistry`.
//!
//! Each fixture is grounded on the hand-rolled test double a real consumer
//! of the trait already needed — `worker-runtime/src/consumer.rs`'s
//! `FakeBus`/`InMemoryLedger`/`RecordingSink`, `allocation-engine/src/
//! selection.rs`'s `FixtureDirectory` — generalized so other crates' tests
//! and integration tests spanning several crates don't each redefine one.

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod allocation_repository;
pub mod dead_letter;
pub mod event_bus;
pub mod idempotency;
pub mod rate_limiter;
pub mod subscription_registry;
pub mod trainer_directory;

pub use allocation_repository::InMemoryAllocationRepository;
pub use dead_letter::InMemoryDeadLetterSink;
pub use event_bus::InMemoryEventBus;
pub use idempotency::InMemoryIdempotencyLedger;
pub use rate_limiter::InMemoryRateLimiter;
pub use subscription_registry::InMemorySubscriptionRegistry;
pub use trainer_directory::FixtureTrainerDirectory;
