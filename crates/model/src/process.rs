use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_WORKER_THREAD: u32 = 20;
pub const DEFAULT_BATCH_SIZE: u32 = 1000;
pub const DEFAULT_SHARD_SIZE: u64 = 10_000_000;
pub const DEFAULT_STREAM_CHANNEL: &str = "MEMORY";
pub const BLOCK_QUEUE_SIZE_KEY: &str = "block-queue-size";
pub const DEFAULT_BLOCK_QUEUE_SIZE: usize = 2000;

/// A pluggable algorithm selected by type name, e.g. `QPS` or `MEMORY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmConfiguration {
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub props: BTreeMap<String, String>,
}

impl AlgorithmConfiguration {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            props: BTreeMap::new(),
        }
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadConfiguration {
    pub worker_thread: Option<u32>,
    pub batch_size: Option<u32>,
    pub shard_size: Option<u64>,
    pub rate_limiter: Option<AlgorithmConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConfiguration {
    pub worker_thread: Option<u32>,
    pub batch_size: Option<u32>,
    pub rate_limiter: Option<AlgorithmConfiguration>,
}

/// Tuning knobs shared by every job of one type.
///
/// Everything is optional on disk; [`ProcessConfiguration::fill_defaults`]
/// turns a partial document into a complete one. Rate limiters have no
/// default: an unset limiter means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessConfiguration {
    #[serde(default)]
    pub read: ReadConfiguration,
    #[serde(default)]
    pub write: WriteConfiguration,
    pub stream_channel: Option<AlgorithmConfiguration>,
}

impl ProcessConfiguration {
    pub fn fill_defaults(mut self) -> Self {
        self.read.worker_thread.get_or_insert(DEFAULT_WORKER_THREAD);
        self.read.batch_size.get_or_insert(DEFAULT_BATCH_SIZE);
        self.read.shard_size.get_or_insert(DEFAULT_SHARD_SIZE);
        self.write.worker_thread.get_or_insert(DEFAULT_WORKER_THREAD);
        self.write.batch_size.get_or_insert(DEFAULT_BATCH_SIZE);

        let channel = self
            .stream_channel
            .get_or_insert_with(|| AlgorithmConfiguration::new(DEFAULT_STREAM_CHANNEL));
        channel
            .props
            .entry(BLOCK_QUEUE_SIZE_KEY.to_string())
            .or_insert_with(|| DEFAULT_BLOCK_QUEUE_SIZE.to_string());

        self
    }

    pub fn read_batch_size(&self) -> u32 {
        self.read.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn write_batch_size(&self) -> u32 {
        self.write.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    pub fn block_queue_size(&self) -> usize {
        self.stream_channel
            .as_ref()
            .and_then(|c| c.props.get(BLOCK_QUEUE_SIZE_KEY))
            .and_then(|v| v.parse().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_BLOCK_QUEUE_SIZE)
    }
}
