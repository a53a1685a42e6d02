use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::event::{DomainEvent, Event};
use crate::sink::EventSink;

/// Backoff between delivery attempts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total delivery attempts per event, including the first.
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_backoff: Duration,
    #[serde(with = "millis")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the initial backoff.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    /// Capacity of the publish queue.
    pub capacity: usize,
    pub retry: RetryPolicy,
    /// Dead letters kept; the oldest is dropped when full.
    pub dead_letter_capacity: usize,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            capacity: 1024,
            retry: RetryPolicy::default(),
            dead_letter_capacity: 1024,
        }
    }
}

/// An event that could not be delivered.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadLetter {
    pub event: Event,
    pub reason: String,
    pub attempts: u32,
}

/// Bounded ring of dead letters.
#[derive(Debug)]
struct DeadLetterRing {
    letters: VecDeque<DeadLetter>,
    capacity: usize,
    dropped: u64,
}

impl DeadLetterRing {
    fn new(capacity: usize) -> Self {
        Self {
            letters: VecDeque::new(),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    fn push(&mut self, letter: DeadLetter) {
        if self.letters.len() == self.capacity {
            if let Some(oldest) = self.letters.pop_front() {
                self.dropped += 1;
                warn!(
                    event_type = %oldest.event.event_type,
                    dropped = self.dropped,
                    "dead-letter list full; dropped oldest"
                );
            }
        }
        self.letters.push_back(letter);
    }
}

type DeadLetters = Arc<Mutex<DeadLetterRing>>;

fn push_dead_letter(list: &DeadLetters, letter: DeadLetter) {
    list.lock().unwrap_or_else(|e| e.into_inner()).push(letter);
}

/// Fire-and-forget publisher backed by a bounded queue and a delivery task.
pub struct EventPublisher {
    sender: Mutex<Option<Sender<Event>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    dead_letters: DeadLetters,
}

impl EventPublisher {
    /// Spawn the delivery task. Must be called within a tokio runtime.
    pub fn start(sink: Arc<dyn EventSink>, config: PublisherConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Event>(config.capacity.max(1));
        let dead_letters: DeadLetters =
            Arc::new(Mutex::new(DeadLetterRing::new(config.dead_letter_capacity)));
        let retry = config.retry;
        let worker_dead_letters = dead_letters.clone();

        let worker = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                deliver(sink.as_ref(), &retry, &worker_dead_letters, event).await;
            }
            debug!("event publisher drained");
        });

        Self {
            sender: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            dead_letters,
        }
    }

    /// Enqueue a domain event. Never fails the caller: events that cannot be
    /// queued are dead-lettered with a warning.
    pub fn publish(&self, event: DomainEvent) {
        let event_type = event.event_type();
        match event.into_event() {
            Ok(event) => self.publish_event(event),
            Err(e) => warn!(event_type, error = %e, "failed to encode event"),
        }
    }

    /// Enqueue an already built event.
    pub fn publish_event(&self, event: Event) {
        let sender = self.sender.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(sender) = sender else {
            warn!(event_type = %event.event_type, "publisher closed; event dead-lettered");
            push_dead_letter(
                &self.dead_letters,
                DeadLetter {
                    event,
                    reason: "publisher closed".into(),
                    attempts: 0,
                },
            );
            return;
        };

        if let Err(e) = sender.try_send(event) {
            let (event, reason) = match e {
                TrySendError::Full(event) => (event, "queue full"),
                TrySendError::Closed(event) => (event, "queue closed"),
            };
            warn!(event_type = %event.event_type, reason, "event dead-lettered");
            push_dead_letter(
                &self.dead_letters,
                DeadLetter {
                    event,
                    reason: reason.into(),
                    attempts: 0,
                },
            );
        }
    }

    /// Events that were given up on, oldest first.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        let ring = self.dead_letters.lock().unwrap_or_else(|e| e.into_inner());
        ring.letters.iter().cloned().collect()
    }

    /// Take every kept dead letter, oldest first, leaving the list empty.
    pub fn drain_dead_letters(&self) -> Vec<DeadLetter> {
        let mut ring = self.dead_letters.lock().unwrap_or_else(|e| e.into_inner());
        ring.letters.drain(..).collect()
    }

    /// Dead letters discarded because the list was full.
    pub fn dropped_dead_letters(&self) -> u64 {
        self.dead_letters.lock().unwrap_or_else(|e| e.into_inner()).dropped
    }

    /// Stop accepting events and wait until every queued event has been
    /// delivered or dead-lettered. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.sender.lock().unwrap_or_else(|e| e.into_inner()).take();
        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "event delivery task failed");
            }
        }
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("dead_letters", &self.dead_letters().len())
            .finish()
    }
}

async fn deliver(sink: &dyn EventSink, retry: &RetryPolicy, dead_letters: &DeadLetters, event: Event) {
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match sink.publish(&event).await {
            Ok(()) => {
                debug!(event_type = %event.event_type, attempt, "delivered event");
                return;
            }
            Err(e) if attempt < max_attempts => {
                let delay = retry.backoff(attempt);
                debug!(
                    event_type = %event.event_type,
                    attempt,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "event delivery failed; retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(
                    event_type = %event.event_type,
                    attempts = attempt,
                    error = %e,
                    "event delivery gave up; dead-lettered"
                );
                push_dead_letter(
                    dead_letters,
                    DeadLetter {
                        event,
                        reason: e.to_string(),
                        attempts: attempt,
                    },
                );
                return;
            }
        }
    }
}
