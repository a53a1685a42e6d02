//! Domain events for ontovc.
//!
//! Publishing is fire-and-forget: [`EventPublisher::publish`] enqueues onto a
//! bounded channel and returns at once. A background task delivers each event
//! to an [`EventSink`], retrying with exponential backoff. Events that cannot
//! be delivered end up in a dead-letter list instead of failing the caller.

pub mod error;
pub mod event;
pub mod publisher;
pub mod sink;

pub use error::{EventError, EventResult};
pub use event::{DomainEvent, Event};
pub use publisher::{DeadLetter, EventPublisher, PublisherConfig, RetryPolicy};
pub use sink::{EventSink, LogSink, RecordingSink};
