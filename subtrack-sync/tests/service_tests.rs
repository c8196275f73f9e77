use std::sync::Arc;
use std::time::Duration;
use subtrack_store::{CacheStore, LeaseStore, QueueStore};
use subtrack_sync::remote::mock::MockRemote;
use subtrack_sync::{
    DrainOutcome, NetworkMonitor, RemoteRecord, SyncConfig, SyncError, SyncLifecycle, SyncService,
};
use subtrack_types::{CacheRecord, Collection, OwnerId, RecordId, SyncMarker};

struct Harness {
    service: SyncService,
    cache: Arc<CacheStore>,
    queue: Arc<QueueStore>,
    remote: Arc<MockRemote>,
    monitor: NetworkMonitor,
}

fn harness(monitor: NetworkMonitor) -> Harness {
    let cache = Arc::new(CacheStore::open_in_memory().unwrap());
    let queue = Arc::new(QueueStore::open_in_memory().unwrap());
    let lease = Arc::new(LeaseStore::open_in_memory().unwrap());
    let remote = MockRemote::new();
    let service = SyncService::new(
        cache.clone(),
        queue.clone(),
        lease,
        remote.clone(),
        monitor.clone(),
        SyncConfig::default(),
    );
    Harness {
        service,
        cache,
        queue,
        remote,
        monitor,
    }
}

#[tokio::test]
async fn trigger_sync_rejects_when_offline() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    h.service
        .enqueue_update(
            Collection::Subscriptions,
            owner,
            RecordId::new("sub-1"),
            serde_json::json!({ "name": "Spotify" }),
        )
        .unwrap();

    let result = h.service.trigger_sync().await;

    assert!(matches!(result, Err(SyncError::Offline)));
    assert_eq!(h.remote.call_count(), 0);
    let (pending, _) = h.queue.counts().unwrap();
    assert_eq!(pending, 1);
}

#[tokio::test]
async fn created_record_is_visible_immediately_and_confirmed_on_sync() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let payload = serde_json::json!({ "name": "Netflix", "price": 15.99 });

    let temp_id = h
        .service
        .enqueue_create(Collection::Subscriptions, owner, payload.clone())
        .unwrap();
    assert!(temp_id.is_temporary());

    let optimistic: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Subscriptions, &temp_id)
        .unwrap()
        .unwrap();
    assert_eq!(optimistic.sync_marker, SyncMarker::PendingSync);
    assert_eq!(optimistic.payload, payload);

    h.monitor.set_online(true);
    let outcome = h.service.trigger_sync().await.unwrap();
    assert_eq!(outcome, DrainOutcome::Completed { synced: 1, failed: 0 });

    let gone: Option<CacheRecord<serde_json::Value>> =
        h.cache.get(Collection::Subscriptions, &temp_id).unwrap();
    assert!(gone.is_none());
    let confirmed: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Subscriptions, &RecordId::new("srv-1"))
        .unwrap()
        .unwrap();
    assert_eq!(confirmed.sync_marker, SyncMarker::Synced);
    assert!(h.queue.is_empty().unwrap());
}

#[tokio::test]
async fn reconnect_drains_automatically() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let id = RecordId::new("sub-1");
    h.service
        .enqueue_update(
            Collection::Subscriptions,
            owner,
            id.clone(),
            serde_json::json!({ "name": "Spotify" }),
        )
        .unwrap();

    let _watcher = h.service.spawn_auto_drain();
    let mut events = h.service.subscribe_lifecycle();
    h.monitor.set_online(true);

    assert_eq!(events.recv().await.unwrap(), SyncLifecycle::Started);
    assert_eq!(
        events.recv().await.unwrap(),
        SyncLifecycle::Completed { synced: 1 }
    );

    let record: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Subscriptions, &id)
        .unwrap()
        .unwrap();
    assert_eq!(record.sync_marker, SyncMarker::Synced);
    assert!(h.queue.is_empty().unwrap());
}

#[tokio::test]
async fn exhausted_create_can_be_cleared_keeping_optimistic_state() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let payload = serde_json::json!({ "name": "Disney+" });
    let temp_id = h
        .service
        .enqueue_create(Collection::Subscriptions, owner, payload)
        .unwrap();
    h.remote.script_transient_failures(3);

    h.monitor.set_online(true);
    for _ in 0..3 {
        h.service.trigger_sync().await.unwrap();
    }

    let status = h.service.sync_status().unwrap();
    assert_eq!(status.pending_items, 0);
    assert_eq!(status.failed_items, 1);

    let cleared = h.service.clear_failed_items().unwrap();
    assert_eq!(cleared, 1);
    assert!(h.queue.is_empty().unwrap());

    // No rollback: the optimistic record stays, still marked pending.
    let record: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Subscriptions, &temp_id)
        .unwrap()
        .unwrap();
    assert_eq!(record.sync_marker, SyncMarker::PendingSync);
}

#[tokio::test]
async fn concurrent_manual_and_auto_drain_sync_each_item_once() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    h.service
        .enqueue_update(
            Collection::Subscriptions,
            owner,
            RecordId::new("sub-1"),
            serde_json::json!({ "name": "Spotify" }),
        )
        .unwrap();
    h.remote.set_delay(Duration::from_millis(50));

    let _watcher = h.service.spawn_auto_drain();
    let mut events = h.service.subscribe_lifecycle();
    h.monitor.set_online(true);
    let _ = h.service.trigger_sync().await;

    // Wait until some pass has confirmed the item.
    loop {
        if let SyncLifecycle::Completed { .. } = events.recv().await.unwrap() {
            if h.queue.is_empty().unwrap() {
                break;
            }
        }
    }
    assert_eq!(h.remote.call_count(), 1);
}

#[tokio::test]
async fn mark_read_flips_cached_flag_immediately() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let id = RecordId::new("notif-1");
    h.cache
        .put(
            Collection::Notifications,
            &CacheRecord::synced(
                id.clone(),
                owner,
                serde_json::json!({ "title": "renewal due", "read": false }),
            ),
        )
        .unwrap();

    h.service.enqueue_mark_read(owner, id.clone()).unwrap();

    let record: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Notifications, &id)
        .unwrap()
        .unwrap();
    assert_eq!(record.payload["read"], serde_json::json!(true));
    assert_eq!(record.sync_marker, SyncMarker::PendingSync);

    h.monitor.set_online(true);
    h.service.trigger_sync().await.unwrap();

    let record: CacheRecord<serde_json::Value> = h
        .cache
        .get(Collection::Notifications, &id)
        .unwrap()
        .unwrap();
    assert_eq!(record.sync_marker, SyncMarker::Synced);
    assert_eq!(h.remote.call_log(), vec!["mark_read notif-1"]);
}

#[tokio::test]
async fn delete_removes_cached_record_immediately() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let id = RecordId::new("sub-1");
    h.cache
        .put(
            Collection::Subscriptions,
            &CacheRecord::synced(id.clone(), owner, serde_json::json!({ "name": "Hulu" })),
        )
        .unwrap();

    h.service
        .enqueue_delete(Collection::Subscriptions, owner, id.clone())
        .unwrap();

    let gone: Option<CacheRecord<serde_json::Value>> =
        h.cache.get(Collection::Subscriptions, &id).unwrap();
    assert!(gone.is_none());

    h.monitor.set_online(true);
    h.service.trigger_sync().await.unwrap();
    assert!(h.queue.is_empty().unwrap());
    assert_eq!(h.remote.call_log(), vec!["delete subscriptions sub-1"]);
}

#[tokio::test]
async fn preferences_overwrite_in_place() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();

    h.service
        .enqueue_update_preferences(owner, serde_json::json!({ "currency": "USD" }))
        .unwrap();
    h.service
        .enqueue_update_preferences(owner, serde_json::json!({ "currency": "EUR" }))
        .unwrap();

    let records: Vec<CacheRecord<serde_json::Value>> = h
        .cache
        .list_by_owner(Collection::Preferences, &owner)
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].payload["currency"], serde_json::json!("EUR"));

    // Both replacements still flow to the remote, in order.
    let (pending, _) = h.queue.counts().unwrap();
    assert_eq!(pending, 2);
}

#[tokio::test]
async fn refresh_replaces_cached_collection_with_remote_state() {
    let h = harness(NetworkMonitor::online());
    let owner = OwnerId::new();
    h.cache
        .put(
            Collection::Subscriptions,
            &CacheRecord::synced(
                RecordId::new("stale-1"),
                owner,
                serde_json::json!({ "name": "Cancelled" }),
            ),
        )
        .unwrap();
    h.remote.set_fetch_results(vec![
        RemoteRecord {
            id: RecordId::new("srv-10"),
            owner_id: owner,
            payload: serde_json::json!({ "name": "Netflix" }),
        },
        RemoteRecord {
            id: RecordId::new("srv-11"),
            owner_id: owner,
            payload: serde_json::json!({ "name": "Spotify" }),
        },
    ]);

    let fetched = h
        .service
        .refresh(Collection::Subscriptions, &owner)
        .await
        .unwrap();
    assert_eq!(fetched, 2);

    let records: Vec<CacheRecord<serde_json::Value>> = h
        .cache
        .list_by_owner(Collection::Subscriptions, &owner)
        .unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.sync_marker == SyncMarker::Synced));
    assert!(records.iter().all(|r| r.id.as_str() != "stale-1"));
}

#[tokio::test]
async fn refresh_rejects_when_offline() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let result = h.service.refresh(Collection::Subscriptions, &owner).await;
    assert!(matches!(result, Err(SyncError::Offline)));
}

#[tokio::test]
async fn sync_status_reflects_queue_and_monitor() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    h.service
        .enqueue_update(
            Collection::Subscriptions,
            owner,
            RecordId::new("a"),
            serde_json::json!({}),
        )
        .unwrap();
    h.service
        .enqueue_update(
            Collection::Subscriptions,
            owner,
            RecordId::new("b"),
            serde_json::json!({}),
        )
        .unwrap();

    let status = h.service.sync_status().unwrap();
    assert!(!status.is_online);
    assert!(!status.sync_in_progress);
    assert_eq!(status.pending_items, 2);
    assert_eq!(status.failed_items, 0);
    assert!(status.last_sync_time.is_none());

    h.monitor.set_online(true);
    h.service.trigger_sync().await.unwrap();

    let status = h.service.sync_status().unwrap();
    assert_eq!(status.pending_items, 0);
    assert!(status.last_sync_time.is_some());
}

#[tokio::test]
async fn clear_cache_is_scoped_to_one_owner() {
    let h = harness(NetworkMonitor::offline());
    let owner = OwnerId::new();
    let other = OwnerId::new();
    h.cache
        .put(
            Collection::Subscriptions,
            &CacheRecord::synced(RecordId::new("a"), owner, serde_json::json!({})),
        )
        .unwrap();
    h.cache
        .put(
            Collection::Notifications,
            &CacheRecord::synced(RecordId::new("b"), owner, serde_json::json!({})),
        )
        .unwrap();
    h.cache
        .put(
            Collection::Subscriptions,
            &CacheRecord::synced(RecordId::new("c"), other, serde_json::json!({})),
        )
        .unwrap();

    h.service.clear_cache(&owner).unwrap();

    let info = h.service.cache_info().unwrap();
    let total: usize = info.iter().map(|c| c.count).sum();
    assert_eq!(total, 1);
    let survivors: Vec<CacheRecord<serde_json::Value>> = h
        .cache
        .list_by_owner(Collection::Subscriptions, &other)
        .unwrap();
    assert_eq!(survivors.len(), 1);
}
