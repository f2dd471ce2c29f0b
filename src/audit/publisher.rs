//! Audit Publisher
//! Mission: Hand audit events to the bus without ever holding up the request
//!
//! Delivery is best-effort. The outcome is observed only by the completion
//! logging below; failures are counted and never retried or surfaced.

use crate::audit::bus::{BusRecord, MessageBus};
use crate::audit::event::AuditEvent;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Delivery counters, read by health checks and monitoring
#[derive(Debug, Default)]
pub struct PublishStats {
    published: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishStatsSnapshot {
    pub published: u64,
    pub failed: u64,
}

impl PublishStats {
    pub fn snapshot(&self) -> PublishStatsSnapshot {
        PublishStatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn record_success(&self) {
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fire-and-forget publisher of audit events
#[derive(Clone)]
pub struct AuditPublisher {
    bus: Arc<dyn MessageBus>,
    topic: Arc<str>,
    stats: Arc<PublishStats>,
}

impl AuditPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: &str) -> Self {
        Self {
            bus,
            topic: Arc::from(topic),
            stats: Arc::new(PublishStats::default()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn stats(&self) -> PublishStatsSnapshot {
        self.stats.snapshot()
    }

    /// Start delivering `event` and return immediately.
    ///
    /// The returned handle resolves once the outcome has been logged; callers
    /// are free to drop it. `None` means no runtime was available to send on.
    pub fn publish(&self, event: AuditEvent) -> Option<JoinHandle<()>> {
        let key = event.partition_key().to_string();

        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.record_failure();
                error!(key = %key, error = %e, "Failed to serialize audit event");
                return None;
            }
        };

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                self.stats.record_failure();
                error!(key = %key, "No async runtime available to publish audit event");
                return None;
            }
        };

        let record = BusRecord {
            topic: self.topic.to_string(),
            key,
            payload,
        };
        let bus = self.bus.clone();
        let stats = self.stats.clone();

        Some(handle.spawn(async move {
            let topic = record.topic.clone();
            let key = record.key.clone();

            match bus.send(record).await {
                Ok(delivery) => {
                    stats.record_success();
                    info!(
                        topic = %topic,
                        key = %key,
                        partition = ?delivery.partition,
                        offset = ?delivery.offset,
                        "Audit event published"
                    );
                }
                Err(e) => {
                    stats.record_failure();
                    warn!(topic = %topic, key = %key, error = %e, "Failed to publish audit event");
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::bus::{Delivery, InMemoryBus};
    use crate::audit::event::{QueryStatus, QueryType};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::{Duration, Instant};

    struct FailingBus;

    #[async_trait]
    impl MessageBus for FailingBus {
        async fn send(&self, _record: BusRecord) -> Result<Delivery> {
            Err(anyhow!("broker unavailable"))
        }
    }

    /// A send that never completes, like an unreachable broker without timeouts
    struct StalledBus;

    #[async_trait]
    impl MessageBus for StalledBus {
        async fn send(&self, _record: BusRecord) -> Result<Delivery> {
            std::future::pending::<()>().await;
            unreachable!()
        }
    }

    fn sample_event() -> AuditEvent {
        AuditEvent {
            query_type: QueryType::ByKeyB,
            key_a: None,
            key_b: Some("CRED123".to_string()),
            principal: Some("alice".to_string()),
            source_ip: "127.0.0.1".to_string(),
            timestamp: Utc::now().naive_utc(),
            result_count: 1,
            status: QueryStatus::Success,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_publish_delivers_keyed_record() {
        let bus = Arc::new(InMemoryBus::new());
        let publisher = AuditPublisher::new(bus.clone(), "credit-lookup-audit");

        publisher.publish(sample_event()).unwrap().await.unwrap();

        let records = bus.records("credit-lookup-audit");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "CRED123");
        assert_eq!(records[0].payload["status"], "SUCCESS");
        assert_eq!(publisher.stats(), PublishStatsSnapshot { published: 1, failed: 0 });
    }

    #[tokio::test]
    async fn test_publish_failure_is_contained() {
        let publisher = AuditPublisher::new(Arc::new(FailingBus), "audit");

        let handle = publisher.publish(sample_event()).unwrap();
        // The completion task itself must not fail
        handle.await.unwrap();

        assert_eq!(publisher.stats(), PublishStatsSnapshot { published: 0, failed: 1 });
    }

    #[tokio::test]
    async fn test_publish_returns_while_bus_is_stalled() {
        let publisher = AuditPublisher::new(Arc::new(StalledBus), "audit");

        let start = Instant::now();
        let handle = publisher.publish(sample_event()).unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());
        assert_eq!(publisher.stats(), PublishStatsSnapshot { published: 0, failed: 0 });
        handle.abort();
    }

    #[test]
    fn test_publish_without_runtime_is_counted_not_raised() {
        let publisher = AuditPublisher::new(Arc::new(InMemoryBus::new()), "audit");

        assert!(publisher.publish(sample_event()).is_none());
        assert_eq!(publisher.stats().failed, 1);
    }
}
