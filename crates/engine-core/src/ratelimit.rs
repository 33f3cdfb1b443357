use crate::error::RateLimitError;
use async_trait::async_trait;
use model::{process::AlgorithmConfiguration, record::DataRecordType};
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::time::{Instant, sleep};
use tracing::trace;

pub const QPS_ALGORITHM: &str = "QPS";
pub const TPS_ALGORITHM: &str = "TPS";

const QPS_KEY: &str = "qps";
const TPS_KEY: &str = "tps";
const DEFAULT_QPS: u64 = 50;
const DEFAULT_TPS: u64 = 2000;

/// What a batch of permits is about to do against a data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl From<DataRecordType> for StatementKind {
    fn from(record_type: DataRecordType) -> Self {
        match record_type {
            DataRecordType::Insert => StatementKind::Insert,
            DataRecordType::Update => StatementKind::Update,
            DataRecordType::Delete => StatementKind::Delete,
        }
    }
}

/// Throttles reads or writes of one job.
#[async_trait]
pub trait JobRateLimitAlgorithm: Send + Sync {
    fn type_name(&self) -> &str;

    /// Waits until `permits` statements of `kind` may proceed.
    async fn intercept(&self, kind: StatementKind, permits: u64);
}

pub type SharedRateLimiter = Arc<dyn JobRateLimitAlgorithm>;

/// Builds the limiter named by `config`, e.g. `{"type": "QPS", "props": {"qps": "50"}}`.
pub fn build_rate_limiter(
    config: &AlgorithmConfiguration,
) -> Result<SharedRateLimiter, RateLimitError> {
    match config.type_name.to_ascii_uppercase().as_str() {
        QPS_ALGORITHM => {
            let qps = rate_prop(config, QPS_KEY, DEFAULT_QPS)?;
            Ok(Arc::new(QpsRateLimiter::new(qps)))
        }
        TPS_ALGORITHM => {
            let tps = rate_prop(config, TPS_KEY, DEFAULT_TPS)?;
            Ok(Arc::new(TpsRateLimiter::new(tps)))
        }
        other => Err(RateLimitError::UnknownAlgorithm(other.to_string())),
    }
}

fn rate_prop(
    config: &AlgorithmConfiguration,
    key: &str,
    default: u64,
) -> Result<u64, RateLimitError> {
    let Some(raw) = config.props.get(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<u64>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(RateLimitError::InvalidProperty {
            key: key.to_string(),
            value: raw.clone(),
        }),
    }
}

/// Token bucket refilled at `rate` tokens per second, holding at most one
/// second worth of tokens. Acquiring more than is available borrows from
/// the future; the caller sleeps off the debt outside the lock.
struct TokenBucket {
    rate: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    fn new(rate: u64) -> Self {
        let rate = rate as f64;
        Self {
            rate,
            state: Mutex::new(BucketState {
                tokens: rate,
                refilled_at: Instant::now(),
            }),
        }
    }

    fn reserve(&self, permits: u64) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.rate);
        state.refilled_at = now;
        state.tokens -= permits as f64;

        if state.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-state.tokens / self.rate)
        }
    }

    async fn acquire(&self, permits: u64) {
        let wait = self.reserve(permits);
        if !wait.is_zero() {
            trace!(?wait, permits, "Rate limited");
            sleep(wait).await;
        }
    }
}

/// Limits queries per second; only `SELECT` is throttled.
pub struct QpsRateLimiter {
    bucket: TokenBucket,
}

impl QpsRateLimiter {
    pub fn new(qps: u64) -> Self {
        Self {
            bucket: TokenBucket::new(qps.max(1)),
        }
    }
}

#[async_trait]
impl JobRateLimitAlgorithm for QpsRateLimiter {
    fn type_name(&self) -> &str {
        QPS_ALGORITHM
    }

    async fn intercept(&self, kind: StatementKind, permits: u64) {
        if kind == StatementKind::Select {
            self.bucket.acquire(permits).await;
        }
    }
}

/// Limits write transactions per second; `SELECT` passes through.
pub struct TpsRateLimiter {
    bucket: TokenBucket,
}

impl TpsRateLimiter {
    pub fn new(tps: u64) -> Self {
        Self {
            bucket: TokenBucket::new(tps.max(1)),
        }
    }
}

#[async_trait]
impl JobRateLimitAlgorithm for TpsRateLimiter {
    fn type_name(&self) -> &str {
        TPS_ALGORITHM
    }

    async fn intercept(&self, kind: StatementKind, permits: u64) {
        if kind != StatementKind::Select {
            self.bucket.acquire(permits).await;
        }
    }
}
