//! Message Bus Adapters
//! Mission: Deliver keyed JSON records to a topic, over HTTP or in-process

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::VecDeque;
use std::time::Duration;

/// One message handed to the bus
#[derive(Debug, Clone)]
pub struct BusRecord {
    pub topic: String,
    pub key: String,
    pub payload: serde_json::Value,
}

/// Acknowledgement returned by the bus, when it reports one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

/// A message bus client. Shared by every request, so it must be safe for concurrent use.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn send(&self, record: BusRecord) -> Result<Delivery>;
}

// ============================================================================
// Kafka REST proxy (v2 JSON embedded format)
// ============================================================================

const REST_PROXY_CONTENT_TYPE: &str = "application/vnd.kafka.json.v2+json";

/// Bus client speaking the Kafka REST proxy protocol
#[derive(Clone)]
pub struct RestProxyBus {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProduceResponse {
    #[serde(default)]
    offsets: Vec<ProduceOffset>,
}

#[derive(Debug, Deserialize)]
struct ProduceOffset {
    partition: Option<i32>,
    offset: Option<i64>,
    error: Option<String>,
}

impl RestProxyBus {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build message bus HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        format!("{}/topics/{}", self.base_url, topic)
    }
}

#[async_trait]
impl MessageBus for RestProxyBus {
    async fn send(&self, record: BusRecord) -> Result<Delivery> {
        let body = json!({
            "records": [
                { "key": record.key, "value": record.payload }
            ]
        });

        let resp = self
            .client
            .post(self.topic_url(&record.topic))
            .header(reqwest::header::CONTENT_TYPE, REST_PROXY_CONTENT_TYPE)
            .body(body.to_string())
            .send()
            .await
            .context("message bus request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("message bus returned {}: {}", status, text));
        }

        let produced: ProduceResponse = resp
            .json()
            .await
            .context("invalid message bus response")?;

        let first = produced
            .offsets
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("message bus acknowledged no records"))?;

        if let Some(error) = first.error {
            return Err(anyhow!("message bus rejected record: {}", error));
        }

        Ok(Delivery {
            partition: first.partition,
            offset: first.offset,
        })
    }
}

// ============================================================================
// In-process bus
// ============================================================================

const DEFAULT_IN_MEMORY_CAPACITY: usize = 10_000;

struct InMemoryLog {
    records: VecDeque<(i64, BusRecord)>,
    next_offset: i64,
}

/// Bounded in-process log. Oldest records are dropped once full.
pub struct InMemoryBus {
    capacity: usize,
    log: Mutex<InMemoryLog>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_IN_MEMORY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            log: Mutex::new(InMemoryLog {
                records: VecDeque::new(),
                next_offset: 0,
            }),
        }
    }

    /// Snapshot of retained records for `topic`, oldest first
    pub fn records(&self, topic: &str) -> Vec<BusRecord> {
        self.log
            .lock()
            .records
            .iter()
            .filter(|(_, r)| r.topic == topic)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn send(&self, record: BusRecord) -> Result<Delivery> {
        let mut log = self.log.lock();
        let offset = log.next_offset;
        log.next_offset += 1;

        if log.records.len() >= self.capacity {
            log.records.pop_front();
        }
        log.records.push_back((offset, record));

        Ok(Delivery {
            partition: Some(0),
            offset: Some(offset),
        })
    }
}
