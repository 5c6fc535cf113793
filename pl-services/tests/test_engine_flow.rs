//! End-to-end engine scenarios: offline completion retry, blocking
//! reconciliation, realtime patch + invalidation, lifecycle wiring.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pl_api::BlockSchedule;
use pl_realtime::{ChangeAction, ChangeEvent};
use pl_services::{AppEvent, ProcessTrigger};

use common::{
    build_registry, morning_state, pin_morning, settings_row, wait_until, CountingBlocker,
    MockEndpoints,
};

// ---- Offline completion retry (the core scenario) ----

#[tokio::test]
async fn offline_completion_retries_after_connectivity_restore() {
    let api = Arc::new(MockEndpoints::new());
    *api.settings.lock().unwrap() = Some(settings_row(false, BlockSchedule::Both));
    *api.state.lock().unwrap() = Some(morning_state(false));
    let blocker = Arc::new(CountingBlocker::default());

    let registry = build_registry(api.clone(), blocker).await;
    registry.start_all().await.unwrap();

    let mut rx = registry.bus.subscribe();

    // Go offline, then ask for a completion.
    api.set_online(false);
    registry.lifecycle.set_online(false);
    registry.queue_completion("p1").await;

    // The remote call rejected (or was skipped); the operation is parked.
    assert_eq!(registry.completion_queue.pending_count().await, 1);

    // Connectivity returns; the reconciliation task drains the queue.
    api.set_online(true);
    registry.lifecycle.set_online(true);

    let drained = wait_until(
        || {
            api.completed
                .lock()
                .unwrap()
                .contains(&("u1".to_string(), "p1".to_string()))
        },
        2_000,
    )
    .await;
    assert!(drained, "completion was not sent after connectivity restore");
    assert_eq!(registry.completion_queue.pending_count().await, 0);

    // The domain event carried the user and prayer ids.
    let mut saw_completed = false;
    while let Ok(event) = rx.try_recv() {
        if let AppEvent::PrayerCompleted { user_id, prayer_id } = event {
            if user_id == "u1" && prayer_id == "p1" {
                saw_completed = true;
            }
        }
    }
    assert!(saw_completed);

    registry.stop_all().await.unwrap();
}

#[tokio::test]
async fn duplicate_completions_collapse_to_one_pending_entry() {
    let api = Arc::new(MockEndpoints::new());
    let blocker = Arc::new(CountingBlocker::default());
    let registry = build_registry(api.clone(), blocker).await;

    api.set_online(false);
    registry.lifecycle.set_online(false);

    registry.queue_completion("p1").await;
    registry.queue_completion("p1").await;
    registry.queue_completion("p1").await;

    assert_eq!(registry.completion_queue.pending_count().await, 1);
}

// ---- Blocking reconciliation ----

#[tokio::test]
async fn incomplete_window_blocks_exactly_once() {
    let api = Arc::new(MockEndpoints::new());
    *api.settings.lock().unwrap() = Some(settings_row(true, BlockSchedule::Both));
    *api.state.lock().unwrap() = Some(morning_state(false));
    let blocker = Arc::new(CountingBlocker::default());

    let registry = build_registry(api.clone(), blocker.clone()).await;
    registry.start_all().await.unwrap();
    pin_morning(&registry.clock);

    registry.enforcement.check_and_enforce().await;
    assert_eq!(blocker.block_calls.load(Ordering::SeqCst), 1);
    assert!(blocker.blocked.load(Ordering::SeqCst));

    registry.stop_all().await.unwrap();
}

#[tokio::test]
async fn completed_window_issues_no_block_and_heals_over_block() {
    let api = Arc::new(MockEndpoints::new());
    *api.settings.lock().unwrap() = Some(settings_row(true, BlockSchedule::Both));
    *api.state.lock().unwrap() = Some(morning_state(false));
    let blocker = Arc::new(CountingBlocker::default());

    let registry = build_registry(api.clone(), blocker.clone()).await;
    registry.start_all().await.unwrap();
    pin_morning(&registry.clock);

    // First pass blocks (incomplete).
    registry.enforcement.check_and_enforce().await;
    assert_eq!(blocker.block_calls.load(Ordering::SeqCst), 1);

    // The prayer completes; the next pass must unblock and never re-block.
    *api.state.lock().unwrap() = Some(morning_state(true));
    registry.enforcement.check_and_enforce().await;

    assert_eq!(blocker.block_calls.load(Ordering::SeqCst), 1);
    assert_eq!(blocker.unblock_calls.load(Ordering::SeqCst), 1);
    assert!(!blocker.blocked.load(Ordering::SeqCst));

    registry.stop_all().await.unwrap();
}

#[tokio::test]
async fn startup_installs_native_schedule_with_monitors() {
    let api = Arc::new(MockEndpoints::new());
    *api.settings.lock().unwrap() = Some(settings_row(true, BlockSchedule::Both));
    *api.state.lock().unwrap() = Some(morning_state(false));
    let blocker = Arc::new(CountingBlocker::default());

    let registry = build_registry(api, blocker.clone()).await;
    registry.start_all().await.unwrap();

    let monitors = blocker.monitors.lock().unwrap().clone();
    assert!(monitors.contains(&"praylock-morning".to_string()));
    assert!(monitors.contains(&"praylock-evening".to_string()));

    registry.stop_all().await.unwrap();
}

// ---- Realtime patch + invalidation through the running engine ----

#[tokio::test]
async fn realtime_completion_patches_cache_and_emits_invalidation() {
    let api = Arc::new(MockEndpoints::new());
    *api.settings.lock().unwrap() = Some(settings_row(false, BlockSchedule::Both));
    let blocker = Arc::new(CountingBlocker::default());

    let registry = build_registry(api, blocker).await;
    registry.start_all().await.unwrap();

    registry.cache.set_prayer_state(morning_state(false)).await;
    let mut rx = registry.bus.subscribe();

    // A completion lands on the change feed.
    registry.realtime.process_change(
        "prayers",
        "UPDATE",
        &serde_json::json!({
            "new": {"id": "p1", "userId": "u1", "prayerTimeOfDay": "morning", "completedAt": 42},
            "old": {"id": "p1", "completedAt": null}
        }),
    );

    let cache_patched = wait_until_async(&registry).await;
    assert!(cache_patched, "cache patch did not land");

    let mut saw_invalidated = false;
    while let Ok(event) = rx.try_recv() {
        if matches!(event, AppEvent::CacheInvalidated { ref table } if table == "prayers") {
            saw_invalidated = true;
        }
    }
    assert!(saw_invalidated);

    registry.stop_all().await.unwrap();
}

async fn wait_until_async(registry: &pl_services::ServiceRegistry) -> bool {
    let deadline = std::time::Instant::now() + std::time::Duration::from_millis(2_000);
    while std::time::Instant::now() < deadline {
        if let Some(state) = registry.cache.prayer_state().await {
            if state
                .prayers
                .morning
                .as_ref()
                .map(|p| p.is_completed())
                .unwrap_or(false)
            {
                return true;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    false
}

// ---- Direct change-event handling (no transport) ----

#[tokio::test]
async fn sync_manager_handles_delete_through_engine() {
    let api = Arc::new(MockEndpoints::new());
    let blocker = Arc::new(CountingBlocker::default());
    let registry = build_registry(api, blocker).await;

    registry.cache.set_prayer_state(morning_state(false)).await;
    registry
        .sync
        .handle_change(&ChangeEvent {
            action: ChangeAction::Delete,
            table: "prayers".into(),
            new: None,
            old: Some(serde_json::json!({"id": "p1"})),
        })
        .await;

    let state = registry.cache.prayer_state().await.unwrap();
    assert!(state.prayers.morning.is_none());
}

// ---- Manual trigger path ----

#[tokio::test]
async fn manual_trigger_processes_despite_recent_auto_pass() {
    let api = Arc::new(MockEndpoints::new());
    let blocker = Arc::new(CountingBlocker::default());
    let registry = build_registry(api.clone(), blocker).await;

    api.set_online(false);
    registry.lifecycle.set_online(false);
    registry.queue_completion("p1").await;
    api.set_online(true);

    // Manual triggers bypass the auto-trigger cooldown.
    let summary = registry
        .completion_queue
        .process(ProcessTrigger::Manual)
        .await;
    assert_eq!(summary.succeeded, 1);
    assert_eq!(registry.completion_queue.pending_count().await, 0);
}

// ---- Service health through the registry ----

#[tokio::test]
async fn registry_reports_health_for_all_services() {
    let api = Arc::new(MockEndpoints::new());
    let blocker = Arc::new(CountingBlocker::default());
    let registry = build_registry(api, blocker).await;

    registry.start_all().await.unwrap();
    assert_eq!(registry.service_count(), 6);
    for (name, state, healthy) in registry.health_check() {
        assert!(healthy, "service {name} is not healthy (state: {state})");
    }

    registry.stop_all().await.unwrap();
    for (_, _, healthy) in registry.health_check() {
        assert!(!healthy);
    }
}
