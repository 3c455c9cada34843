//! Reconciler keeping live notifiers in step with the webhook registry.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────┐ requests ┌──────────────────────────┐  spawn/cancel  ┌───────────┐
//! │ WebhookManager │ ───────▶ │ reconcile task           │ ─────────────▶ │ notifiers │
//! │ (handle)       │          │  owns url -> notifier    │ ◀───────────── │           │
//! └────────────────┘          └──────────────────────────┘  ban reports   └───────────┘
//!         │                        │        │    ▲ tick                        ▲
//!         ▼                        ▼        │    │                             │
//!  ┌─────────────┐          ┌────────────┐  │  interval              ┌─────────────────┐
//!  │ registry    │ ◀─────── │ snapshot   │  └──────────────────────▶ │ EventBus egress │
//!  │ (storage)   │          │ diff       │     add/remove channel    └─────────────────┘
//!  └─────────────┘          └────────────┘
//! ```
//!
//! The registry is authoritative. Every tick (and on demand) the task loads a
//! snapshot, spawns a notifier for each new URL, stops the notifier of each
//! URL that disappeared, and pushes changed token fields to running
//! notifiers. Only the reconcile task touches the notifier set.
//!
//! Every notifier runs under a child of the manager's cancellation token, so
//! [`WebhookManager::stop`] cascades into all of them.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use spvwallet_core::{SharedClock, Webhook};
use tokio::{
    sync::{mpsc, oneshot, watch, Mutex, RwLock},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    bus::{egress_channel, EventBus},
    client::WebhookClient,
    config::NotificationsConfig,
    error::{NotifyError, Result},
    notifier::{NotifierCounters, NotifierReport, NotifierSettings, NotifierStats, WebhookNotifier},
    storage::WebhookRepository,
    validation::{validate_subscription, validate_url},
};

/// Subscription as reported by [`WebhookManager::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookStatus {
    /// Subscriber URL.
    pub url: String,
    /// Whether the subscription is banned right now.
    pub banned: bool,
}

/// Live notifier set as seen by the reconcile task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerStatus {
    /// Number of running notifiers.
    pub notifiers: usize,
    /// Delivery counters per subscriber URL.
    pub subscribers: HashMap<String, NotifierStats>,
}

enum Request {
    Poke,
    Sync(oneshot::Sender<Result<()>>),
    Subscribed(Webhook),
}

type CounterMap = Arc<RwLock<HashMap<String, Arc<NotifierCounters>>>>;

/// Handle to the reconcile task.
pub struct WebhookManager {
    repository: Arc<dyn WebhookRepository>,
    clock: SharedClock,
    requests: mpsc::UnboundedSender<Request>,
    counters: CounterMap,
    cancellation_token: CancellationToken,
    reconciler: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl std::fmt::Debug for WebhookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookManager")
            .field("stopped", &self.cancellation_token.is_cancelled())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish_non_exhaustive()
    }
}

impl WebhookManager {
    /// Validates `config` and spawns the reconcile task.
    ///
    /// The first reconcile runs immediately. Cancelling `parent` has the
    /// same effect as [`WebhookManager::stop`] minus the wait.
    ///
    /// # Errors
    ///
    /// `NotifyError::Configuration` for an invalid config, or a client
    /// construction failure.
    pub fn start(
        repository: Arc<dyn WebhookRepository>,
        bus: EventBus,
        config: &NotificationsConfig,
        clock: SharedClock,
        parent: &CancellationToken,
    ) -> Result<Self> {
        config.validate()?;

        let client = Arc::new(WebhookClient::new(config.client_config())?);
        let cancellation_token = parent.child_token();
        let (requests, request_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();
        let counters: CounterMap = Arc::default();

        let reconciler = Reconciler {
            repository: repository.clone(),
            bus,
            client,
            settings: NotifierSettings {
                max_batch_size: config.max_batch_size,
                retry_policy: config.retry_policy(),
                ban_duration: config.ban_duration,
            },
            egress_capacity: config.egress_capacity,
            clock: clock.clone(),
            cancellation_token: cancellation_token.clone(),
            notifiers: HashMap::new(),
            counters: counters.clone(),
            report_tx,
        };

        info!(
            reconcile_interval_ms = config.reconcile_interval.as_millis() as u64,
            egress_capacity = config.egress_capacity,
            max_batch_size = config.max_batch_size,
            max_retries = config.max_retries,
            "starting webhook manager"
        );

        let handle =
            tokio::spawn(reconciler.run(config.reconcile_interval, request_rx, report_rx));

        Ok(Self {
            repository,
            clock,
            requests,
            counters,
            cancellation_token,
            reconciler: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Adds or refreshes a subscription and schedules a reconcile.
    ///
    /// A second call with the same URL keeps one row, replaces the token
    /// fields and clears any ban.
    ///
    /// # Errors
    ///
    /// Validation errors for bad input, `NotifyError::Storage` if the
    /// registry write fails.
    pub async fn subscribe(
        &self,
        url: &str,
        token_header: &str,
        token_value: &str,
    ) -> Result<()> {
        let webhook = validate_subscription(url, token_header, token_value)?;

        let row = self.repository.create(webhook).await.map_err(|e| {
            error!(url = %url, error = %e, "failed to store webhook subscription");
            NotifyError::from(e)
        })?;

        info!(url = %row.url, "webhook subscribed");
        self.signal(Request::Subscribed(row));
        Ok(())
    }

    /// Removes a subscription and schedules a reconcile.
    ///
    /// # Errors
    ///
    /// Validation errors for a bad URL, `NotifyError::SubscriptionNotFound`
    /// if no row existed, `NotifyError::Storage` if the delete fails.
    pub async fn unsubscribe(&self, url: &str) -> Result<()> {
        validate_url(url)?;

        let removed = self.repository.remove(url.to_string()).await.map_err(|e| {
            error!(url = %url, error = %e, "failed to remove webhook subscription");
            NotifyError::from(e)
        })?;

        if !removed {
            return Err(NotifyError::not_found(url));
        }

        info!(url = %url, "webhook unsubscribed");
        self.signal(Request::Poke);
        Ok(())
    }

    /// Lists registry contents with their current ban flag.
    ///
    /// # Errors
    ///
    /// `NotifyError::Storage` if the registry cannot be read.
    pub async fn list(&self) -> Result<Vec<WebhookStatus>> {
        let rows = self.repository.get().await.map_err(|e| {
            error!(error = %e, "failed to list webhook subscriptions");
            NotifyError::from(e)
        })?;

        let now = self.clock.now_utc();
        Ok(rows
            .into_iter()
            .map(|row| WebhookStatus { banned: row.is_banned(now), url: row.url })
            .collect())
    }

    /// Runs one reconcile pass and waits for it to finish.
    ///
    /// # Errors
    ///
    /// `NotifyError::Storage` if the snapshot cannot be loaded,
    /// `NotifyError::ShutdownRequested` once the manager has stopped.
    pub async fn reconcile(&self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests.send(Request::Sync(reply)).map_err(|_| NotifyError::ShutdownRequested)?;
        response.await.map_err(|_| NotifyError::ShutdownRequested)?
    }

    /// Current notifier set with delivery counters.
    pub async fn status(&self) -> ManagerStatus {
        let counters = self.counters.read().await;
        ManagerStatus {
            notifiers: counters.len(),
            subscribers: counters
                .iter()
                .map(|(url, counters)| (url.clone(), counters.snapshot()))
                .collect(),
        }
    }

    /// Returns true once the manager has been stopped or its parent scope
    /// cancelled.
    pub fn is_stopped(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Cancels the reconcile task and every notifier, waiting up to the
    /// shutdown timeout for them to exit.
    ///
    /// # Errors
    ///
    /// `NotifyError::ShutdownTimeout` if tasks are still running at the
    /// deadline.
    pub async fn stop(&self) -> Result<()> {
        info!("stopping webhook manager");
        self.cancellation_token.cancel();

        let Some(handle) = self.reconciler.lock().await.take() else {
            return Ok(());
        };

        match tokio::time::timeout(self.shutdown_timeout, handle).await {
            Ok(Ok(())) => {
                info!("webhook manager stopped");
                Ok(())
            },
            Ok(Err(join_error)) => {
                error!(error = %join_error, "reconcile task panicked");
                Ok(())
            },
            Err(_elapsed) => {
                error!(
                    timeout_seconds = self.shutdown_timeout.as_secs(),
                    "webhook manager shutdown timed out"
                );
                Err(NotifyError::ShutdownTimeout { timeout_seconds: self.shutdown_timeout.as_secs() })
            },
        }
    }

    fn signal(&self, request: Request) {
        if self.requests.send(request).is_err() {
            debug!("reconcile task gone, signal dropped");
        }
    }
}

impl Drop for WebhookManager {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            warn!("webhook manager dropped without stop, cancelling notifiers");
            self.cancellation_token.cancel();
        }
    }
}

struct NotifierHandle {
    cancellation_token: CancellationToken,
    handle: JoinHandle<()>,
    definition: watch::Sender<Webhook>,
}

struct Reconciler {
    repository: Arc<dyn WebhookRepository>,
    bus: EventBus,
    client: Arc<WebhookClient>,
    settings: NotifierSettings,
    egress_capacity: usize,
    clock: SharedClock,
    cancellation_token: CancellationToken,
    notifiers: HashMap<String, NotifierHandle>,
    counters: CounterMap,
    report_tx: mpsc::UnboundedSender<NotifierReport>,
}

impl Reconciler {
    async fn run(
        mut self,
        interval: Duration,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut reports: mpsc::UnboundedReceiver<NotifierReport>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.reconcile_logged().await;

        loop {
            tokio::select! {
                biased;
                () = self.cancellation_token.cancelled() => break,
                Some(report) = reports.recv() => self.persist(report).await,
                request = requests.recv() => match request {
                    Some(Request::Poke) => self.reconcile_logged().await,
                    Some(Request::Sync(reply)) => {
                        let _ = reply.send(self.reconcile().await);
                    },
                    Some(Request::Subscribed(row)) => {
                        self.refresh(row);
                        self.reconcile_logged().await;
                    },
                    None => break,
                },
                _ = ticker.tick() => self.reconcile_logged().await,
            }
        }

        self.stop_all().await;
    }

    async fn reconcile_logged(&mut self) {
        if let Err(e) = self.reconcile().await {
            warn!(error = %e, "webhook reconcile failed, keeping current notifiers");
        }
    }

    async fn reconcile(&mut self) -> Result<()> {
        let rows = self.repository.get().await?;
        let wanted: HashSet<String> = rows.iter().map(|row| row.url.clone()).collect();

        let stale: Vec<String> =
            self.notifiers.keys().filter(|url| !wanted.contains(*url)).cloned().collect();
        for url in stale {
            self.stop_notifier(&url).await;
        }

        for row in rows {
            match self.notifiers.get(&row.url) {
                Some(running) => {
                    running.definition.send_if_modified(|current| {
                        if current.same_definition(&row) {
                            return false;
                        }
                        *current = row;
                        true
                    });
                },
                None => self.spawn_notifier(row).await,
            }
        }

        Ok(())
    }

    /// Pushes a freshly stored row to a running notifier unconditionally.
    fn refresh(&self, row: Webhook) {
        if let Some(running) = self.notifiers.get(&row.url) {
            running.definition.send_replace(row);
        }
    }

    async fn spawn_notifier(&mut self, row: Webhook) {
        let url = row.url.clone();
        let (sender, receiver) = egress_channel(self.egress_capacity);
        let (definition, definition_rx) = watch::channel(row);
        let cancellation_token = self.cancellation_token.child_token();
        let counters = Arc::new(NotifierCounters::default());

        let notifier = WebhookNotifier::new(
            definition_rx,
            receiver,
            self.client.clone(),
            self.settings.clone(),
            counters.clone(),
            self.clock.clone(),
            cancellation_token.clone(),
            self.report_tx.clone(),
        );
        let handle = tokio::spawn(notifier.run());

        self.bus.add_notifier(url.clone(), sender).await;
        self.counters.write().await.insert(url.clone(), counters);
        self.notifiers.insert(url.clone(), NotifierHandle { cancellation_token, handle, definition });

        debug!(url = %url, live = self.notifiers.len(), "notifier spawned");
    }

    async fn stop_notifier(&mut self, url: &str) {
        let Some(notifier) = self.notifiers.remove(url) else {
            return;
        };

        notifier.cancellation_token.cancel();
        if let Err(e) = notifier.handle.await {
            error!(url = %url, error = %e, "notifier task panicked");
        }

        self.bus.remove_notifier(url).await;
        self.counters.write().await.remove(url);
        debug!(url = %url, live = self.notifiers.len(), "notifier stopped");
    }

    async fn stop_all(&mut self) {
        let urls: Vec<String> = self.notifiers.keys().cloned().collect();
        info!(notifiers = urls.len(), "stopping all notifiers");

        for url in urls {
            self.stop_notifier(&url).await;
        }
    }

    async fn persist(&self, report: NotifierReport) {
        let result = match &report {
            NotifierReport::Banned { url, until } => {
                self.repository.ban(url.clone(), *until).await
            },
            NotifierReport::Recovered { url } => self.repository.clear_ban(url.clone()).await,
        };

        if let Err(e) = result {
            warn!(report = ?report, error = %e, "failed to persist ban state");
        }
    }
}
