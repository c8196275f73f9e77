//! A scriptable mock remote for testing.

use super::{RemoteError, RemoteRecord, RemoteResult, RemoteService};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use subtrack_types::{Collection, OwnerId, RecordId};

/// In-memory remote service for tests.
///
/// Outcomes are scripted: each call pops the next scripted failure, or
/// succeeds when none is queued. Every call is appended to a log so tests
/// can assert dispatch order and count.
#[derive(Default)]
pub struct MockRemote {
    calls: Mutex<Vec<String>>,
    scripted: Mutex<VecDeque<RemoteError>>,
    next_id: AtomicU64,
    fetch_results: Mutex<Vec<RemoteRecord>>,
    preferences_echo: Mutex<Option<RemoteRecord>>,
    delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    /// Creates a mock that succeeds on every call.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues a failure for the next remote call.
    pub fn script_failure(&self, error: RemoteError) {
        self.scripted.lock().unwrap().push_back(error);
    }

    /// Queues `n` transient failures.
    pub fn script_transient_failures(&self, n: usize) {
        for _ in 0..n {
            self.script_failure(RemoteError::Transient("connection reset".to_string()));
        }
    }

    /// Sets the records returned by `fetch_all`.
    pub fn set_fetch_results(&self, records: Vec<RemoteRecord>) {
        *self.fetch_results.lock().unwrap() = records;
    }

    /// Makes `update_preferences` echo the given record instead of
    /// confirming without a body.
    pub fn set_preferences_echo(&self, record: RemoteRecord) {
        *self.preferences_echo.lock().unwrap() = Some(record);
    }

    /// Delays every call, to widen race windows in tests.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// The calls made so far, in order.
    pub fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn begin(&self, call: String) -> RemoteResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(call);
        match self.scripted.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn assign_id(&self) -> RecordId {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        RecordId::new(format!("srv-{n}"))
    }
}

#[async_trait]
impl RemoteService for MockRemote {
    async fn create_entity(
        &self,
        collection: Collection,
        correlation_id: &RecordId,
        payload: &serde_json::Value,
    ) -> RemoteResult<RemoteRecord> {
        self.begin(format!("create {collection} {correlation_id}")).await?;
        let owner = payload
            .get("ownerId")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        Ok(RemoteRecord {
            id: self.assign_id(),
            owner_id: owner,
            payload: payload.clone(),
        })
    }

    async fn update_entity(
        &self,
        collection: Collection,
        id: &RecordId,
        _payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>> {
        self.begin(format!("update {collection} {id}")).await?;
        Ok(None)
    }

    async fn delete_entity(&self, collection: Collection, id: &RecordId) -> RemoteResult<()> {
        self.begin(format!("delete {collection} {id}")).await
    }

    async fn mark_read(&self, id: &RecordId) -> RemoteResult<()> {
        self.begin(format!("mark_read {id}")).await
    }

    async fn update_preferences(
        &self,
        owner: &OwnerId,
        _payload: &serde_json::Value,
    ) -> RemoteResult<Option<RemoteRecord>> {
        self.begin(format!("update_preferences {owner}")).await?;
        Ok(self.preferences_echo.lock().unwrap().clone())
    }

    async fn fetch_all(
        &self,
        collection: Collection,
        owner: &OwnerId,
    ) -> RemoteResult<Vec<RemoteRecord>> {
        self.begin(format!("fetch_all {collection} {owner}")).await?;
        Ok(self.fetch_results.lock().unwrap().clone())
    }
}
