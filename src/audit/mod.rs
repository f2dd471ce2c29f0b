//! Audit Module
//! Mission: Compose one audit event per protected query and ship it to the message bus

pub mod bus;
pub mod event;
pub mod publisher;

pub use bus::{BusRecord, Delivery, InMemoryBus, MessageBus, RestProxyBus};
pub use event::{compose, AuditEvent, QueryKey, QueryOutcome, QueryStatus, QueryType};
pub use publisher::{AuditPublisher, PublishStatsSnapshot};
