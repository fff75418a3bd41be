//! Redis-backed job store.
//!
//! ## Key layout
//!
//! - `{ns}:queue`: FIFO list of pending job payloads (RPUSH / BLPOP)
//! - `{ns}:job:{id}`: job payload, written with the retention TTL
//! - `{ns}:job:{id}:status`: JSON-encoded [`JobStatus`]
//! - `{ns}:job:{id}:results`: hash of object key to JSON [`SummaryRecord`]
//! - `{ns}:job:{id}:benchmark`: total processing seconds
//!
//! Every job-scoped key expires with the job payload key: writes copy its
//! remaining TTL, so a job's data disappears together.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{RedisError, Script};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::{JobStore, DEFAULT_JOB_TTL};
use crate::error::StoreError;
use crate::job_processor::{Job, JobStatus, ResultSet, SummaryRecord};

pub const DEFAULT_NAMESPACE: &str = "summarizer";

/// KEYS[1] results hash, KEYS[2] job key.
/// ARGV[1] object key, ARGV[2] record JSON, ARGV[3] "1" if placeholder, ARGV[4] default TTL ms.
const MERGE_RESULT_SCRIPT: &str = r#"
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if existing then
  local ok, decoded = pcall(cjson.decode, existing)
  local existing_is_placeholder = ok and decoded['error'] ~= nil and decoded['error'] ~= cjson.null
  if not existing_is_placeholder or ARGV[3] == '1' then
    return 0
  end
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
local ttl = redis.call('PTTL', KEYS[2])
if ttl <= 0 then ttl = tonumber(ARGV[4]) end
redis.call('PEXPIRE', KEYS[1], ttl)
return 1
"#;

/// KEYS[1] status key, KEYS[2] job key. ARGV[1] status JSON, ARGV[2] default TTL ms.
const SET_STATUS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current then
  local ok, decoded = pcall(cjson.decode, current)
  if ok then
    local state = decoded['state']
    if state == 'completed' or state == 'failed' or state == 'stopped' then
      return 0
    end
  end
end
local ttl = redis.call('PTTL', KEYS[2])
if ttl <= 0 then ttl = tonumber(ARGV[2]) end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
return 1
"#;

/// KEYS[1] target key, KEYS[2] job key. ARGV[1] value, ARGV[2] default TTL ms.
const SET_WITH_JOB_TTL_SCRIPT: &str = r#"
local ttl = redis.call('PTTL', KEYS[2])
if ttl <= 0 then ttl = tonumber(ARGV[2]) end
redis.call('SET', KEYS[1], ARGV[1], 'PX', ttl)
return 1
"#;

pub struct RedisJobStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    namespace: String,
    retention: Duration,
    merge_script: Script,
    status_script: Script,
    ttl_script: Script,
}

impl RedisJobStore {
    /// Create a store for `redis_url` (e.g. `redis://localhost:6379`).
    /// Connections are opened lazily.
    pub fn new(
        redis_url: impl AsRef<str>,
        namespace: Option<String>,
        retention: Option<Duration>,
    ) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            namespace: namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            retention: retention.unwrap_or(DEFAULT_JOB_TTL),
            merge_script: Script::new(MERGE_RESULT_SCRIPT),
            status_script: Script::new(SET_STATUS_SCRIPT),
            ttl_script: Script::new(SET_WITH_JOB_TTL_SCRIPT),
        })
    }

    pub fn queue_key(&self) -> String {
        format!("{}:queue", self.namespace)
    }

    pub fn job_key(&self, job_id: &str) -> String {
        format!("{}:job:{}", self.namespace, job_id)
    }

    pub fn status_key(&self, job_id: &str) -> String {
        format!("{}:status", self.job_key(job_id))
    }

    pub fn results_key(&self, job_id: &str) -> String {
        format!("{}:results", self.job_key(job_id))
    }

    pub fn benchmark_key(&self, job_id: &str) -> String {
        format!("{}:benchmark", self.job_key(job_id))
    }

    fn retention_ms(&self) -> u64 {
        self.retention.as_millis() as u64
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        self.connection
            .get_or_try_init(|| async {
                self.client
                    .get_multiplexed_async_connection()
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))
            })
            .await
            .cloned()
    }
}

fn command_error(err: RedisError) -> StoreError {
    if err.is_connection_dropped() || err.is_connection_refusal() || err.is_io_error() {
        StoreError::Connection(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

fn decode_results(entries: HashMap<String, String>) -> Result<ResultSet, StoreError> {
    entries
        .into_values()
        .map(|raw| serde_json::from_str::<SummaryRecord>(&raw).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl JobStore for RedisJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn enqueue(&self, job: &Job) -> Result<(), StoreError> {
        let payload = serde_json::to_string(job)?;
        let status = serde_json::to_string(&JobStatus::Queued)?;
        let retention_ms = self.retention_ms();
        let mut conn = self.connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.job_key(&job.id))
            .arg(&payload)
            .arg("PX")
            .arg(retention_ms)
            .ignore()
            .cmd("SET")
            .arg(self.status_key(&job.id))
            .arg(&status)
            .arg("PX")
            .arg(retention_ms)
            .ignore()
            .cmd("RPUSH")
            .arg(self.queue_key())
            .arg(&payload)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        debug!("Enqueued job {}", job.id);
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, StoreError> {
        // BLPOP blocks the whole connection, so it gets its own
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(self.queue_key())
            .arg(timeout.as_secs().max(1))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        match popped {
            Some((_, payload)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(self.job_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn get_result(&self, job_id: &str) -> Result<ResultSet, StoreError> {
        let mut conn = self.connection().await?;
        let entries: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(self.results_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        decode_results(entries)
    }

    #[instrument(skip(self, record), fields(key = %record.key), err)]
    async fn merge_result(&self, job_id: &str, record: &SummaryRecord) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(record)?;
        let mut conn = self.connection().await?;

        let stored: i64 = self
            .merge_script
            .key(self.results_key(job_id))
            .key(self.job_key(job_id))
            .arg(&record.key)
            .arg(&payload)
            .arg(if record.is_placeholder() { "1" } else { "0" })
            .arg(self.retention_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(stored == 1)
    }

    async fn set_status(&self, job_id: &str, status: &JobStatus) -> Result<bool, StoreError> {
        let payload = serde_json::to_string(status)?;
        let mut conn = self.connection().await?;

        let updated: i64 = self
            .status_script
            .key(self.status_key(job_id))
            .key(self.job_key(job_id))
            .arg(&payload)
            .arg(self.retention_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(updated == 1)
    }

    async fn get_status(&self, job_id: &str) -> Result<Option<JobStatus>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = redis::cmd("GET")
            .arg(self.status_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(StoreError::from))
            .transpose()
    }

    async fn set_benchmark(&self, job_id: &str, duration: Duration) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let _: i64 = self
            .ttl_script
            .key(self.benchmark_key(job_id))
            .key(self.job_key(job_id))
            .arg(duration.as_secs_f64())
            .arg(self.retention_ms())
            .invoke_async(&mut conn)
            .await
            .map_err(command_error)?;
        Ok(())
    }

    async fn get_benchmark(&self, job_id: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.connection().await?;
        let seconds: Option<f64> = redis::cmd("GET")
            .arg(self.benchmark_key(job_id))
            .query_async(&mut conn)
            .await
            .map_err(command_error)?;

        Ok(seconds
            .filter(|s| s.is_finite() && *s >= 0.0)
            .map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary_parser::parse_text;

    fn store() -> RedisJobStore {
        RedisJobStore::new("redis://127.0.0.1:6379", Some("test".to_string()), None).unwrap()
    }

    #[test]
    fn test_key_layout() {
        let store = store();
        assert_eq!(store.queue_key(), "test:queue");
        assert_eq!(store.job_key("j1"), "test:job:j1");
        assert_eq!(store.status_key("j1"), "test:job:j1:status");
        assert_eq!(store.results_key("j1"), "test:job:j1:results");
        assert_eq!(store.benchmark_key("j1"), "test:job:j1:benchmark");
        assert_eq!(store.retention_ms(), 3_600_000);
    }

    #[test]
    fn test_invalid_url_is_connection_error() {
        let result = RedisJobStore::new("not a url", None, None);
        assert!(matches!(result, Err(StoreError::Connection(_))));
    }

    #[test]
    fn test_status_script_matches_terminal_wire_names() {
        let terminal = [
            JobStatus::Completed,
            JobStatus::Failed {
                reason: "x".to_string(),
            },
            JobStatus::Stopped,
        ];
        for status in terminal {
            let value = serde_json::to_value(&status).unwrap();
            let state = value["state"].as_str().unwrap();
            assert!(SET_STATUS_SCRIPT.contains(&format!("'{}'", state)));
        }
    }

    #[test]
    fn test_decode_results() {
        let record = parse_text("a.txt", "Case Subject: rent");
        let entries = HashMap::from([(
            "a.txt".to_string(),
            serde_json::to_string(&record).unwrap(),
        )]);
        let results = decode_results(entries).unwrap();
        assert_eq!(results.get("a.txt"), Some(&record));

        let corrupt = HashMap::from([("b.txt".to_string(), "{".to_string())]);
        assert!(matches!(decode_results(corrupt), Err(StoreError::Serialization(_))));
    }
}
