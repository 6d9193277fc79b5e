//! # Platform Core
//!
//! Shared contracts for the event-processing and real-time delivery
//! backbone: the event model, the [`event_bus::EventBus`] abstraction over
//! the partitioned log, the [`idempotency::IdempotencyLedger`] contract that
//! the worker runtime enforces against, the [`dead_letter::DeadLetterRecord`]
//! shape written on attempt exhaustion, and the
//! [`allocation::AllocationRepository`] contract the allocation engine
//! persists its rows through.
//!
//! Nothing in this crate talks to a network or a database. Concrete
//! transports live in `platform-eventbus-kafka` and `platform-store-postgres`;
//! this crate only fixes the types and traits they agree on.

pub mod allocation;
pub mod dead_letter;
pub mod event;
pub mod event_bus;
pub mod idempotency;

pub use allocation::{
    Allocation, AllocationRepository, AllocationStatus, Journey, JourneyStatus, NewAllocation,
    NewSession, RepositoryError, Session, SessionStatus, SessionType,
};
pub use chrono::{DateTime, Utc};
pub use dead_letter::{DeadLetterRecord, DeadLetterSink, DeadLetterSinkError};
pub use event::{DomainEvent, EnrichedEvent, Envelope, EventError};
pub use event_bus::{Ack, Delivery, DeliveryError, EventBus, EventBusError, EventStream};
pub use idempotency::{IdempotencyLedger, LedgerError, LedgerKey};
