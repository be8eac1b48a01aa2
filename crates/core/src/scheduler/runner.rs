//! Scheduler implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ConfigHandle;
use crate::dispatcher::Dispatcher;
use crate::history::HistoryStore;
use crate::metrics::{POLL_DURATION, PROVIDER_ERRORS_TOTAL};
use crate::provider::{Provider, ProviderContext, ProviderKind};

use super::types::{SchedulerStatus, TickSummary};

type ProviderList = Arc<Mutex<Vec<Box<dyn Provider>>>>;

/// Drives providers and the dispatcher on a fixed tick.
pub struct Scheduler {
    config: ConfigHandle,
    history: Arc<dyn HistoryStore>,
    dispatcher: Arc<Dispatcher>,
    providers: ProviderList,
    provider_count: usize,

    // Runtime state
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    shutdown_tx: broadcast::Sender<()>,
    task: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Providers are polled feeds first, then API providers, otherwise in
    /// the order given.
    pub fn new(
        config: ConfigHandle,
        history: Arc<dyn HistoryStore>,
        dispatcher: Arc<Dispatcher>,
        mut providers: Vec<Box<dyn Provider>>,
    ) -> Self {
        providers.sort_by_key(|p| match p.kind() {
            ProviderKind::Feed => 0,
            ProviderKind::Api => 1,
        });
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            history,
            dispatcher,
            provider_count: providers.len(),
            providers: Arc::new(Mutex::new(providers)),
            running: Arc::new(AtomicBool::new(false)),
            ticks: Arc::new(AtomicU64::new(0)),
            shutdown_tx,
            task: std::sync::Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.is_running(),
            providers: self.provider_count,
            ticks: self.ticks.load(Ordering::Relaxed),
            unrecorded: self.dispatcher.unrecorded().len(),
        }
    }

    /// Run one polling round now.
    pub async fn update_providers(&self) -> TickSummary {
        Self::tick(&self.config, &self.history, &self.dispatcher, &self.providers).await
    }

    /// Spawn the background loop.
    pub fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Scheduler already running");
            return;
        }

        let config = self.config.clone();
        let history = Arc::clone(&self.history);
        let dispatcher = Arc::clone(&self.dispatcher);
        let providers = Arc::clone(&self.providers);
        let running = Arc::clone(&self.running);
        let ticks = Arc::clone(&self.ticks);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Update loop started");
            loop {
                let interval = Duration::from_millis(config.snapshot().scheduler.tick_interval_ms);
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Update loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(interval) => {
                        if !running.load(Ordering::Relaxed) {
                            break;
                        }
                        let summary = Self::tick(&config, &history, &dispatcher, &providers).await;
                        ticks.fetch_add(1, Ordering::Relaxed);
                        if summary.candidates > 0 || summary.failed > 0 {
                            debug!(
                                polled = summary.polled,
                                failed = summary.failed,
                                candidates = summary.candidates,
                                dispatched = summary.dispatched,
                                "Tick finished"
                            );
                        }
                    }
                }
            }
            info!("Update loop stopped");
        });

        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(providers = self.provider_count, "Scheduler started");
    }

    /// Stop the loop. A tick in progress is allowed to finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Scheduler not running");
            return;
        }

        info!("Stopping scheduler");
        let _ = self.shutdown_tx.send(());

        let handle = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Update loop task failed: {}", e);
            }
        }
        info!("Scheduler stopped");
    }

    async fn tick(
        config: &ConfigHandle,
        history: &Arc<dyn HistoryStore>,
        dispatcher: &Dispatcher,
        providers: &ProviderList,
    ) -> TickSummary {
        let mut summary = TickSummary {
            recovered: dispatcher.retry_unrecorded(),
            ..Default::default()
        };

        let snapshot = config.snapshot();
        let ctx = ProviderContext::new(&snapshot, &**history);

        let mut providers = providers.lock().await;
        for provider in providers.iter_mut() {
            if !provider.is_enabled() {
                continue;
            }
            summary.polled += 1;

            let started = Instant::now();
            let result = provider.fetch_candidates(ctx).await;
            POLL_DURATION
                .with_label_values(&[provider.name()])
                .observe(started.elapsed().as_secs_f64());

            let torrents = match result {
                Ok(torrents) => torrents,
                Err(e) => {
                    summary.failed += 1;
                    PROVIDER_ERRORS_TOTAL
                        .with_label_values(&[provider.name(), e.kind()])
                        .inc();
                    warn!(provider = %provider.name(), "Provider poll failed: {}", e);
                    continue;
                }
            };

            summary.candidates += torrents.len();
            for torrent in &torrents {
                if dispatcher.add(torrent, provider.name()).await {
                    summary.dispatched += 1;
                }
            }
        }
        summary
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if self.running.load(Ordering::Relaxed) {
            let _ = self.shutdown_tx.send(());
        }
    }
}
