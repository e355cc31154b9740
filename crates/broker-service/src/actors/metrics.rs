//! Actor metrics and mailbox monitoring.
//!
//! Mailbox depth is classified per actor type:
//!
//! | Actor Type | Normal | Elevated | Critical |
//! |------------|--------|----------|----------|
//! | Broker     | <= 100 | 101-500  | > 500    |
//! | Connection | <= 50  | 51-200   | > 200    |
//!
//! A mailbox entering the critical band logs one warning; leaving it logs
//! once more. Counters are mirrored into the `broker_` Prometheus metrics.

use crate::observability::metrics;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often `wait_drained` checks the connection count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Depth bounds for one actor type's mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxThresholds {
    /// Depths above this are elevated.
    pub elevated: usize,
    /// Depths above this are critical.
    pub critical: usize,
}

impl MailboxThresholds {
    fn classify(self, depth: usize) -> MailboxLevel {
        if depth > self.critical {
            MailboxLevel::Critical
        } else if depth > self.elevated {
            MailboxLevel::Elevated
        } else {
            MailboxLevel::Normal
        }
    }
}

/// Actor type for metrics labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorType {
    /// BrokerActor (singleton).
    Broker,
    /// ConnectionActor (one per WebSocket).
    Connection,
}

impl ActorType {
    /// Returns the actor type as a string for metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ActorType::Broker => "broker",
            ActorType::Connection => "connection",
        }
    }

    #[must_use]
    pub const fn thresholds(&self) -> MailboxThresholds {
        match self {
            ActorType::Broker => MailboxThresholds {
                elevated: 100,
                critical: 500,
            },
            ActorType::Connection => MailboxThresholds {
                elevated: 50,
                critical: 200,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MailboxLevel {
    Normal,
    Elevated,
    Critical,
}

/// Tracks one actor's mailbox depth and throughput.
///
/// Shared between the actor (dequeues) and its handles (enqueues and drops).
#[derive(Debug)]
pub struct MailboxMonitor {
    actor_type: ActorType,
    /// Broker id or participant id.
    actor_id: String,
    depth: AtomicUsize,
    /// Highest depth seen over the actor's lifetime.
    peak_depth: AtomicUsize,
    in_critical: AtomicBool,
    messages_processed: AtomicU64,
    /// Events refused because the mailbox was full.
    messages_dropped: AtomicU64,
}

impl MailboxMonitor {
    #[must_use]
    pub fn new(actor_type: ActorType, actor_id: impl Into<String>) -> Self {
        Self {
            actor_type,
            actor_id: actor_id.into(),
            depth: AtomicUsize::new(0),
            peak_depth: AtomicUsize::new(0),
            in_critical: AtomicBool::new(false),
            messages_processed: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }
    }

    /// Record a message being added to the mailbox.
    pub fn record_enqueue(&self) {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        self.peak_depth.fetch_max(depth, Ordering::Relaxed);

        let thresholds = self.actor_type.thresholds();
        match thresholds.classify(depth) {
            MailboxLevel::Critical => {
                if !self.in_critical.swap(true, Ordering::Relaxed) {
                    warn!(
                        target: "broker.actor.mailbox",
                        actor_type = self.actor_type.as_str(),
                        actor_id = %self.actor_id,
                        depth,
                        threshold = thresholds.critical,
                        "Mailbox depth critical"
                    );
                }
            }
            MailboxLevel::Elevated if depth == thresholds.elevated + 1 => {
                debug!(
                    target: "broker.actor.mailbox",
                    actor_type = self.actor_type.as_str(),
                    actor_id = %self.actor_id,
                    depth,
                    "Mailbox depth elevated"
                );
            }
            MailboxLevel::Elevated | MailboxLevel::Normal => {}
        }
    }

    /// Record a message being taken off the mailbox.
    pub fn record_dequeue(&self) {
        let previous = self
            .depth
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |d| Some(d.saturating_sub(1)))
            .unwrap_or(0);
        let depth = previous.saturating_sub(1);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);

        if self.actor_type == ActorType::Broker {
            metrics::set_actor_mailbox_depth(self.actor_type.as_str(), depth);
        }

        if self.actor_type.thresholds().classify(depth) == MailboxLevel::Normal
            && self.in_critical.swap(false, Ordering::Relaxed)
        {
            info!(
                target: "broker.actor.mailbox",
                actor_type = self.actor_type.as_str(),
                actor_id = %self.actor_id,
                depth,
                "Mailbox depth recovered"
            );
        }
    }

    /// Record an event refused because the mailbox was full.
    pub fn record_drop(&self) {
        let dropped = self.messages_dropped.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_message_dropped(self.actor_type.as_str());
        warn!(
            target: "broker.actor.mailbox",
            actor_type = self.actor_type.as_str(),
            actor_id = %self.actor_id,
            dropped,
            "Message dropped due to backpressure"
        );
    }

    #[must_use]
    pub fn current_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn peak_depth(&self) -> usize {
        self.peak_depth.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Whether the mailbox is currently in the critical band.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.in_critical.load(Ordering::Relaxed)
    }
}

/// Aggregated metrics for the actor system.
#[derive(Debug, Default)]
pub struct ActorMetrics {
    /// Connection actors currently running.
    pub active_connections: AtomicUsize,
    /// Total actor panics (indicates bugs).
    pub actor_panics: AtomicU64,
    /// Total messages processed by the broker actor.
    pub total_messages_processed: AtomicU64,
}

impl ActorMetrics {
    /// Create a new shared metrics instance.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn connection_created(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturating: a close racing a failed registration must not wrap.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |c| Some(c.saturating_sub(1)));
    }

    /// Record an actor panic.
    pub fn record_panic(&self, actor_type: ActorType) {
        let total_panics = self.actor_panics.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::record_actor_panic(actor_type.as_str());
        tracing::error!(
            target: "broker.actor.panic",
            actor_type = actor_type.as_str(),
            total_panics,
            "Actor panic detected - indicates bug, investigation required"
        );
    }

    pub fn record_message_processed(&self) {
        self.total_messages_processed
            .fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn messages_processed(&self) -> u64 {
        self.total_messages_processed.load(Ordering::Relaxed)
    }

    /// Wait until no connection actor is running, or `grace` elapses.
    ///
    /// Returns `true` if every connection closed in time.
    pub async fn wait_drained(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, async {
            while self.connection_count() > 0 {
                tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }
}
