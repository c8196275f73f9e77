use chrono::Utc;
use serde_json::json;
use std::str::FromStr;
use subtrack_types::{
    Collection, MutationAction, OwnerId, QueueItem, QueueItemId, QueueStatus, RecordId,
};

#[test]
fn action_names_are_stable() {
    let actions = [
        MutationAction::CreateEntity,
        MutationAction::UpdateEntity,
        MutationAction::DeleteEntity,
        MutationAction::MarkRead,
        MutationAction::UpdatePreferences,
    ];
    for a in actions {
        assert_eq!(MutationAction::from_str(a.as_str()).unwrap(), a);
    }
}

#[test]
fn unknown_action_is_rejected() {
    assert!(MutationAction::from_str("upsert_entity").is_err());
}

#[test]
fn status_strings() {
    assert_eq!(QueueStatus::Pending.as_str(), "pending");
    assert_eq!(QueueStatus::Syncing.as_str(), "syncing");
    assert_eq!(QueueStatus::Failed.as_str(), "failed");
}

#[test]
fn queue_item_serde_roundtrip() {
    let item = QueueItem {
        id: QueueItemId::new(7),
        action: MutationAction::UpdateEntity,
        collection: Collection::Subscriptions,
        owner_id: OwnerId::new(),
        payload: json!({"amount": 17000}),
        target_id: Some(RecordId::new("srv-9")),
        status: QueueStatus::Pending,
        retry_count: 1,
        last_error: Some("connection reset".to_string()),
        enqueued_at: Utc::now(),
    };
    let text = serde_json::to_string(&item).unwrap();
    let back: QueueItem = serde_json::from_str(&text).unwrap();
    assert_eq!(back, item);
}
