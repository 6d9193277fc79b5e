//! The realtime fanout plane (C4): recipient derivation, the visibility
//! filter, the in-process local socket registry, and the Pub/Sub dispatch
//! loop that ties them together.

pub mod dispatcher;
pub mod local_registry;
pub mod visibility;

pub use dispatcher::{
    run as run_dispatcher, BUSINESS_EVENTS_CHANNEL, JOURNEY_ENDED_CHANNEL, JOURNEY_UPDATES_CHANNEL,
};
pub use local_registry::LocalSocketRegistry;
pub use visibility::{recipients, should_receive, Role};
