use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_stream::StreamExt;

use dog_jobs::{
    DispatchOutcome, ExecutorSettings, JobEngine, JobOptions, JobSignal, JobStore, KeepJobs,
    MemoryStore, StorePrefix,
};

#[tokio::test]
async fn deployments_sharing_a_store_do_not_see_each_other() {
    let blue = MemoryStore::with_prefix(StorePrefix::resolve(false, Some("blue")));
    let green = blue.sharing(StorePrefix::resolve(false, Some("green")));
    assert_eq!(blue.prefix().key("doc"), "dog_jobs_blue:doc");

    let blue_engine = JobEngine::builder(Arc::new(blue.clone()))
        .build(|_| Ok(()))
        .unwrap();
    let green_engine = JobEngine::builder(Arc::new(green.clone()))
        .build(|h| {
            h.register("doc.merge", "Merge", |_: Value, _| async { Ok(()) })?;
            Ok(())
        })
        .unwrap();

    let handle = blue_engine
        .queue()
        .add("doc.merge", &json!({}), JobOptions::new())
        .await
        .unwrap();

    assert_eq!(green_engine.executor().tick("doc").await.unwrap(), None);
    assert!(green.get("doc", &handle.id).await.unwrap().is_none());
    assert_eq!(blue.counts("doc").waiting, 1);
    assert_eq!(green.counts("doc").waiting, 0);
}

#[tokio::test]
async fn reclaim_only_touches_its_own_prefix() {
    let blue = MemoryStore::with_prefix(StorePrefix::custom("blue"));
    let green = blue.sharing(StorePrefix::custom("green"));
    let engine = JobEngine::builder(Arc::new(blue.clone()))
        .build(|_| Ok(()))
        .unwrap();

    let handle = engine
        .queue()
        .add("copilot.embed", &json!({}), JobOptions::new())
        .await
        .unwrap();
    let leased = blue
        .lease("copilot", Duration::from_secs(30))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(leased.id(), &handle.id);

    blue.force_lease_expiry("copilot", &handle.id).unwrap();
    assert_eq!(green.reclaim_expired().await.unwrap(), 0);
    assert_eq!(blue.reclaim_expired().await.unwrap(), 1);
    assert_eq!(blue.counts("copilot").waiting, 1);
}

#[tokio::test]
async fn overlapping_maintenance_runs_are_deduplicated() {
    let store = MemoryStore::new();
    let engine = JobEngine::builder(Arc::new(store.clone()))
        .settings(ExecutorSettings::default())
        .build(|h| {
            h.register("nightly.cleanExpiredDocs", "CleanExpiredDocs", |_: Value, _| async {
                Ok(())
            })?;
            Ok(())
        })
        .unwrap();

    let options = JobOptions::new().with_job_id("nightly-2026-10-19");
    let first = engine
        .queue()
        .add("nightly.cleanExpiredDocs", &json!({}), options.clone())
        .await
        .unwrap();
    engine.executor().tick("nightly").await.unwrap();

    // completed maintenance jobs stay around, so a second trigger is a no-op
    let second = engine
        .queue()
        .add("nightly.cleanExpiredDocs", &json!({}), options)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(engine.executor().tick("nightly").await.unwrap(), None);
    assert_eq!(store.counts("nightly").completed, 1);
}

#[tokio::test]
async fn deduplication_ends_with_the_retention_window() {
    let store = MemoryStore::new();
    let engine = JobEngine::builder(Arc::new(store.clone()))
        .build(|h| {
            h.register("doc.clean", "Clean", |_: Value, _| async { Ok(()) })?;
            Ok(())
        })
        .unwrap();

    let options = JobOptions::new()
        .with_job_id("clean")
        .with_remove_on_complete(KeepJobs::Bounded { age: Some(1), count: None });
    let first = engine
        .queue()
        .add("doc.clean", &json!({}), options.clone())
        .await
        .unwrap();
    assert_eq!(
        engine.executor().tick("doc").await.unwrap(),
        Some(DispatchOutcome::Completed(JobSignal::Done))
    );

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let second = engine
        .queue()
        .add("doc.clean", &json!({}), options)
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(
        engine.executor().tick("doc").await.unwrap(),
        Some(DispatchOutcome::Completed(JobSignal::Done))
    );
    assert_eq!(store.counts("doc").completed, 1);
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let store = MemoryStore::new();
    let mut events = store.event_stream();
    let engine = JobEngine::builder(Arc::new(store.clone()))
        .build(|h| {
            h.register("notification.send", "Send", |_: Value, _| async { Ok(()) })?;
            Ok(())
        })
        .unwrap();

    engine
        .queue()
        .add("notification.send", &json!({}), JobOptions::new())
        .await
        .unwrap();
    engine.executor().tick("notification").await.unwrap();

    let mut names = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.queue(), "notification");
        names.push(event.event_name());
    }
    assert_eq!(names, vec!["added", "leased", "completed"]);
}
