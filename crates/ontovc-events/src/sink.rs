use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use crate::error::{EventError, EventResult};
use crate::event::Event;

/// Where published events go.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &Event) -> EventResult<()>;
}

/// Sink that writes each event to the tracing log.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    async fn publish(&self, event: &Event) -> EventResult<()> {
        info!(event_type = %event.event_type, payload = %event.payload, "event");
        Ok(())
    }
}

/// Sink that keeps every delivered event in memory.
///
/// It can be told to fail a number of deliveries first, which exercises the
/// publisher's retry and dead-letter paths.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
    failures_left: Mutex<usize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` deliveries.
    pub fn fail_next(&self, n: usize) {
        *self.failures_left.lock().unwrap_or_else(|e| e.into_inner()) = n;
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn publish(&self, event: &Event) -> EventResult<()> {
        {
            let mut failures = self.failures_left.lock().unwrap_or_else(|e| e.into_inner());
            if *failures > 0 {
                *failures -= 1;
                return Err(EventError::Sink("injected failure".into()));
            }
        }
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
        Ok(())
    }
}
