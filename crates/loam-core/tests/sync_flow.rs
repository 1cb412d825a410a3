//! End-to-end flows over the public API: queue, engine, listener, resolver.

use std::sync::Arc;
use std::time::Duration;

use loam_core::db::{ConflictLog, Database, LibSqlConflictLog, LibSqlQueueRepository, QueueRepository};
use loam_core::models::{Conversation, EntityKind, KnowledgeItem, RemoteEntity};
use loam_core::remote::{InMemoryRemoteStore, RemoteStore};
use loam_core::sync::{
    ChangeListener, ConflictDetector, ConflictResolver, LocalChangeTracker, NetworkMonitor,
    OperationPayload, ResolutionStrategy, SyncEngine,
};

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn offline_captures_replay_in_order_on_reconnect() {
    let db = Database::open_in_memory().await.unwrap();
    let queue = Arc::new(LibSqlQueueRepository::new(db.connection().clone()));
    let store = Arc::new(InMemoryRemoteStore::new());
    let tracker = Arc::new(LocalChangeTracker::new());
    let monitor = NetworkMonitor::new(false);

    let engine = SyncEngine::new(
        queue.clone(),
        store.clone(),
        tracker,
        monitor.subscribe(),
    );
    engine.start();

    // Capture while disconnected: a note, a conversation, then an edit
    let mut item = KnowledgeItem::new("user-1", "Reading list", "Body", vec!["books".to_string()]);
    engine
        .submit(OperationPayload::CreateKnowledgeItem(item.clone()))
        .await
        .unwrap();

    let conversation = Conversation::new("user-1", "Trip planning");
    engine
        .submit(OperationPayload::CreateConversation(conversation.clone()))
        .await
        .unwrap();

    item.content = "Body, extended".to_string();
    item.updated_at += 1;
    engine
        .submit(OperationPayload::UpdateKnowledgeItem(item.clone()))
        .await
        .unwrap();

    assert_eq!(queue.pending_count().await.unwrap(), 3);
    assert!(store.is_empty().await);

    monitor.set_online(true);

    // The reconnect listener drains in the background
    let mut drained = false;
    for _ in 0..200 {
        if queue.pending_count().await.unwrap() == 0 {
            drained = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(drained);

    assert_eq!(store.len().await, 2);
    let fetched = store
        .fetch(EntityKind::KnowledgeItem, &item.id.to_string())
        .await
        .unwrap()
        .unwrap();
    let RemoteEntity::KnowledgeItem(fetched) = fetched else {
        panic!("entity changed kind");
    };
    assert_eq!(fetched.content, "Body, extended");
    assert!(store
        .fetch(EntityKind::Conversation, &conversation.id.to_string())
        .await
        .unwrap()
        .is_some());

    engine.shutdown();
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_edit_is_detected_and_merged() {
    let db = Database::open_in_memory().await.unwrap();
    let store = Arc::new(InMemoryRemoteStore::new());
    let detector = Arc::new(ConflictDetector::new());
    let tracker = Arc::new(LocalChangeTracker::with_windows(0, 300_000));
    let log = Arc::new(LibSqlConflictLog::new(db.connection().clone()));

    let mut listener = ChangeListener::new(detector.clone(), tracker.clone(), "user-1");
    listener.start(store.as_ref()).await.unwrap();

    // The record both sides start from
    let base = KnowledgeItem::new("user-1", "Title", "Body", vec!["shared".to_string()]);
    let item_id = base.id.to_string();
    store.seed(RemoteEntity::KnowledgeItem(base.clone())).await;

    // Local edit adds a tag; remote edit (another device) adds a different one
    let mut local = base.clone();
    local.tags.push("from-local".to_string());
    local.updated_at += 10_000;
    tracker.track(
        EntityKind::KnowledgeItem,
        &item_id,
        Some(RemoteEntity::KnowledgeItem(local.clone())),
    );

    let mut remote_edit = base;
    remote_edit.tags.push("from-remote".to_string());
    remote_edit.updated_at += 5_000;
    store
        .update(&RemoteEntity::KnowledgeItem(remote_edit))
        .await
        .unwrap();

    // The listener raises exactly one tag conflict
    let detector_for_wait = detector.clone();
    assert!(wait_until(move || detector_for_wait.pending().len() == 1).await);
    let conflict = detector.take(&item_id).unwrap();

    // Merge and write back
    let resolver = ConflictResolver::new(store.clone(), log.clone());
    let resolution = resolver
        .apply(&conflict, ResolutionStrategy::Merge)
        .await
        .unwrap();
    assert!(resolution.resolved.is_some());

    let merged = store
        .fetch(EntityKind::KnowledgeItem, &item_id)
        .await
        .unwrap()
        .unwrap();
    let RemoteEntity::KnowledgeItem(merged) = merged else {
        panic!("entity changed kind");
    };
    let tags: std::collections::HashSet<_> = merged.tags.iter().map(String::as_str).collect();
    assert_eq!(tags, ["shared", "from-local", "from-remote"].into());
    assert_eq!(merged.updated_at, local.updated_at);

    // The resolution is durably logged and the pending set is clear
    let records = log.list_recent(10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].strategy, "merge");
    assert!(detector.pending().is_empty());

    listener.stop();
}
