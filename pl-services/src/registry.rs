//! Composition root for the engine.
//!
//! Every component is constructed here, explicitly, with its dependencies
//! injected; there are no import-time singletons. The registry also owns the two
//! background tasks that tie the pieces together: the bus reconciliation
//! loop (translating lifecycle/connectivity events into queue passes and
//! enforcement checks) and the queue scheduler tick.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use pl_api::PrayerEndpoints;
use pl_core::clock::{CanonicalClock, ClockTicker};
use pl_core::config::{AppConfig, ConfigHandle};
use pl_core::constants::keys;
use pl_core::error::{PlError, PlResult};
use pl_core::report::ErrorReporter;
use pl_realtime::{ChangeDispatcher, RealtimeManager};
use pl_store::DurableStore;

use crate::blocker::AppBlocker;
use crate::cache::StateCache;
use crate::enforcement::EnforcementManager;
use crate::event_bus::{AppEvent, EventBus};
use crate::lifecycle::LifecycleService;
use crate::queue::{ProcessTrigger, RetryQueue};
use crate::queues::{
    CompletionExecutor, CompletionPayload, CompletionQueue, EngagementExecutor,
    EngagementPayload, EngagementQueue, GenerationExecutor, GenerationPayload, GenerationQueue,
};
use crate::service::{Service, ServiceState};
use crate::sync::SyncManager;

/// Central registry owning every engine component.
pub struct ServiceRegistry {
    pub config: ConfigHandle,
    pub clock: Arc<CanonicalClock>,
    pub ticker: ClockTicker,
    pub store: Arc<DurableStore>,
    pub api: Arc<dyn PrayerEndpoints>,
    pub bus: EventBus,
    pub cache: Arc<StateCache>,
    pub realtime: Arc<RealtimeManager>,
    pub sync: Arc<SyncManager>,
    pub completion_queue: Arc<CompletionQueue>,
    pub generation_queue: Arc<GenerationQueue>,
    pub engagement_queue: Arc<EngagementQueue>,
    pub enforcement: Arc<EnforcementManager>,
    pub lifecycle: Arc<LifecycleService>,
    /// Services in start order, for health checks and ordered stop.
    services: Vec<(String, Arc<dyn Service>)>,
    /// Background tasks owned by the registry.
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ServiceRegistry {
    /// Construct and wire every component.
    ///
    /// The remote boundary, blocker, and store are injected so tests and
    /// alternate builds can substitute them.
    pub async fn build(
        config: ConfigHandle,
        store: Arc<DurableStore>,
        api: Arc<dyn PrayerEndpoints>,
        blocker: Arc<dyn AppBlocker>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let snapshot: AppConfig = config.read().await.clone();

        let default_tz = if snapshot.account.timezone.is_empty() {
            None
        } else {
            Some(snapshot.account.timezone.clone())
        };
        let clock = Arc::new(CanonicalClock::new(default_tz));
        let ticker = ClockTicker::new(60);
        let bus = EventBus::new(256);
        let cache = Arc::new(StateCache::new(store.clone()));

        let realtime = Arc::new(RealtimeManager::new(
            snapshot.realtime.clone(),
            ChangeDispatcher::new(256),
            reporter.clone(),
        ));

        let sync = Arc::new(SyncManager::new(
            cache.clone(),
            bus.clone(),
            realtime.clone(),
            reporter.clone(),
        ));

        let completion_queue = Arc::new(RetryQueue::new(
            CompletionExecutor::new(api.clone()),
            store.clone(),
            bus.clone(),
            clock.clone(),
            snapshot.queues.completion.clone(),
        ));
        let generation_queue = Arc::new(RetryQueue::new(
            GenerationExecutor::new(api.clone()),
            store.clone(),
            bus.clone(),
            clock.clone(),
            snapshot.queues.generation.clone(),
        ));
        let engagement_queue = Arc::new(RetryQueue::new(
            EngagementExecutor::new(api.clone()),
            store.clone(),
            bus.clone(),
            clock.clone(),
            snapshot.queues.engagement.clone(),
        ));

        let enforcement = Arc::new(EnforcementManager::new(
            blocker,
            api.clone(),
            cache.clone(),
            clock.clone(),
            bus.clone(),
            snapshot.enforcement.clone(),
            snapshot.account.user_id.clone(),
        ));

        let lifecycle = Arc::new(LifecycleService::new(
            config.clone(),
            bus.clone(),
            ticker.clone(),
        ));

        let services: Vec<(String, Arc<dyn Service>)> = vec![
            ("completion-queue".into(), completion_queue.clone() as Arc<dyn Service>),
            ("generation-queue".into(), generation_queue.clone() as Arc<dyn Service>),
            ("engagement-queue".into(), engagement_queue.clone() as Arc<dyn Service>),
            ("sync".into(), sync.clone() as Arc<dyn Service>),
            ("enforcement".into(), enforcement.clone() as Arc<dyn Service>),
            ("lifecycle".into(), lifecycle.clone() as Arc<dyn Service>),
        ];

        Self {
            config,
            clock,
            ticker,
            store,
            api,
            bus,
            cache,
            realtime,
            sync,
            completion_queue,
            generation_queue,
            engagement_queue,
            enforcement,
            lifecycle,
            services,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Start every service in order and spawn the wiring tasks.
    pub async fn start_all(&self) -> PlResult<()> {
        info!("starting {} services", self.services.len());

        for (name, service) in &self.services {
            if let Err(e) = service.start() {
                error!("failed to start service {name}: {e}");
                return Err(PlError::ServiceStart(format!("{name}: {e}")));
            }
        }

        // One-time storage migration, then warm the cache.
        self.store.migrate(keys::MIGRATED).await;
        self.cache.load().await;

        // Lifecycle startup: config validation + clock resync.
        self.lifecycle.startup(self.api.as_ref(), &self.clock).await?;

        // Enforcement reconciles settings and installs the native schedule.
        self.enforcement.init().await;

        // Realtime subscription for the signed-in user.
        let (user_id, token) = {
            let config = self.config.read().await;
            (config.account.user_id.clone(), config.server.auth_token.clone())
        };
        if !user_id.is_empty() {
            if let Err(e) = self.realtime.setup(&user_id, &token).await {
                error!("realtime setup failed: {e}");
            }
        }
        self.sync.start_consuming();

        self.spawn_reconciliation_task();
        self.spawn_period_watch_task();
        self.spawn_scheduler_task().await;

        info!("all services started");
        Ok(())
    }

    /// Stop every service in reverse order and abort the wiring tasks.
    pub async fn stop_all(&self) -> PlResult<()> {
        info!("stopping services");

        for handle in self.tasks.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
        self.realtime.cleanup().await;

        for (name, service) in self.services.iter().rev() {
            if let Err(e) = service.stop() {
                error!("error stopping service {name}: {e}");
                // Keep stopping the rest.
            }
        }

        info!("all services stopped");
        Ok(())
    }

    /// Translate bus events into component triggers.
    fn spawn_reconciliation_task(&self) {
        let mut rx = self.bus.subscribe();
        let completion = self.completion_queue.clone();
        let generation = self.generation_queue.clone();
        let engagement = self.engagement_queue.clone();
        let enforcement = self.enforcement.clone();
        let sync = self.sync.clone();

        let handle = tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                match event {
                    AppEvent::ConnectivityChanged { online: true } => {
                        completion.process(ProcessTrigger::Connectivity).await;
                        generation.process(ProcessTrigger::Connectivity).await;
                        engagement.process(ProcessTrigger::Connectivity).await;
                        sync.verify_connection().await;
                    }
                    AppEvent::AppForegrounded => {
                        completion.process(ProcessTrigger::Foreground).await;
                        generation.process(ProcessTrigger::Foreground).await;
                        engagement.process(ProcessTrigger::Foreground).await;
                        sync.verify_connection().await;
                        enforcement.check_and_enforce().await;
                    }
                    AppEvent::PeriodChanged { .. } => {
                        enforcement.check_and_enforce().await;
                    }
                    _ => {}
                }
            }
        });
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Watch the clock ticker and announce period rollovers.
    ///
    /// Holds a tick subscription for the lifetime of the task; aborting
    /// the task drops the subscription, which tears the timer down once
    /// no listeners remain.
    fn spawn_period_watch_task(&self) {
        let mut sub = self.ticker.subscribe();
        let clock = self.clock.clone();
        let bus = self.bus.clone();

        let handle = tokio::spawn(async move {
            let mut last = clock.current_period(None);
            while sub.recv().await.is_ok() {
                let period = clock.current_period(None);
                if period != last {
                    last = period;
                    bus.emit(AppEvent::PeriodChanged { period });
                }
            }
        });
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    /// Periodic tick driving retries whose backoff has elapsed.
    async fn spawn_scheduler_task(&self) {
        let tick_secs = self.config.read().await.queues.tick_secs.max(1);
        let completion = self.completion_queue.clone();
        let generation = self.generation_queue.clone();
        let engagement = self.engagement_queue.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
            interval.tick().await;
            loop {
                interval.tick().await;
                completion.process(ProcessTrigger::Tick).await;
                generation.process(ProcessTrigger::Tick).await;
                engagement.process(ProcessTrigger::Tick).await;
            }
        });
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    // ─── UI-facing entry points (fire-and-forget) ───────────────────────

    /// Queue a prayer completion and kick a pass if we are online.
    pub async fn queue_completion(&self, prayer_id: &str) -> String {
        let user_id = self.config.read().await.account.user_id.clone();
        let id = self
            .completion_queue
            .enqueue(&user_id, CompletionPayload { prayer_id: prayer_id.into() })
            .await;
        if self.lifecycle.is_online() {
            self.completion_queue.process(ProcessTrigger::PostEnqueue).await;
        }
        id
    }

    /// Queue a prayer generation request.
    pub async fn queue_generation(&self, request_key: &str, request: serde_json::Value) -> String {
        let user_id = self.config.read().await.account.user_id.clone();
        let id = self
            .generation_queue
            .enqueue(
                &user_id,
                GenerationPayload {
                    request_key: request_key.into(),
                    request,
                },
            )
            .await;
        if self.lifecycle.is_online() {
            self.generation_queue.process(ProcessTrigger::PostEnqueue).await;
        }
        id
    }

    /// Queue an engagement mark.
    pub async fn queue_engagement(&self, prayer_id: &str) -> String {
        let user_id = self.config.read().await.account.user_id.clone();
        let id = self
            .engagement_queue
            .enqueue(&user_id, EngagementPayload { prayer_id: prayer_id.into() })
            .await;
        if self.lifecycle.is_online() {
            self.engagement_queue.process(ProcessTrigger::PostEnqueue).await;
        }
        id
    }

    /// Health status of every registered service.
    pub fn health_check(&self) -> Vec<(String, ServiceState, bool)> {
        self.services
            .iter()
            .map(|(name, svc)| (name.clone(), svc.state(), svc.is_healthy()))
            .collect()
    }

    /// Number of registered services.
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}
