//! In-process broadcast hub between event producers and notifiers.
//!
//! # Architecture
//!
//! ```text
//!   producers                          dispatcher task
//! ┌───────────┐  notify   ┌─────────┐  try_send   ┌──────────────────────┐
//! │ wallet    │ ────────▶ │ ingress │ ──────────▶ │ egress "http://a"    │ ──▶ notifier A
//! │ engine    │  (await)  │ (bound) │             ├──────────────────────┤
//! └───────────┘           └─────────┘ ──────────▶ │ egress "http://b"    │ ──▶ notifier B
//!                                                 └──────────────────────┘
//! ```
//!
//! Producers only ever wait on the bounded ingress queue. The dispatcher
//! copies each event to every registered egress channel with a non-blocking
//! send; a full egress channel drops the event for that subscriber alone.
//! Events are shared behind `Arc`, so fan-out never clones payloads.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use spvwallet_core::{Event, RawEvent};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        Mutex, RwLock,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::{NotifyError, Result};

/// Sending half of a subscriber's egress channel.
pub type EgressSender = mpsc::Sender<Arc<RawEvent>>;

/// Receiving half of a subscriber's egress channel.
pub type EgressReceiver = mpsc::Receiver<Arc<RawEvent>>;

/// Creates an egress channel with room for `capacity` events.
pub fn egress_channel(capacity: usize) -> (EgressSender, EgressReceiver) {
    mpsc::channel(capacity.max(1))
}

struct Subscriber {
    sender: EgressSender,
    forwarded: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time counters of the bus.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BusStats {
    /// Events taken off the ingress queue by the dispatcher.
    pub dispatched: u64,
    /// Events rejected by `try_notify` because ingress was full.
    pub ingress_dropped: u64,
    /// Per-subscriber counters keyed by subscription URL.
    pub subscribers: HashMap<String, SubscriberStats>,
}

/// Counters for one registered egress channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    /// Events placed on the egress channel.
    pub forwarded: u64,
    /// Events dropped because the egress channel was full.
    pub dropped: u64,
}

struct BusInner {
    ingress: mpsc::Sender<Arc<RawEvent>>,
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
    dispatched: Arc<AtomicU64>,
    ingress_dropped: AtomicU64,
    cancellation_token: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

/// Broadcast hub. Cheap to clone; clones share the same bus.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("closed", &self.is_closed())
            .field("dispatched", &self.inner.dispatched.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventBus {
    /// Starts a bus with its own cancellation scope.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(ingress_capacity: usize) -> Self {
        Self::with_cancellation(ingress_capacity, &CancellationToken::new())
    }

    /// Starts a bus whose dispatcher stops when `parent` is cancelled.
    pub fn with_cancellation(ingress_capacity: usize, parent: &CancellationToken) -> Self {
        let (ingress, receiver) = mpsc::channel(ingress_capacity.max(1));
        let subscribers = Arc::new(RwLock::new(HashMap::new()));
        let dispatched = Arc::new(AtomicU64::new(0));
        let cancellation_token = parent.child_token();

        let handle = tokio::spawn(dispatch(
            receiver,
            subscribers.clone(),
            dispatched.clone(),
            cancellation_token.clone(),
        ));

        Self {
            inner: Arc::new(BusInner {
                ingress,
                subscribers,
                dispatched,
                ingress_dropped: AtomicU64::new(0),
                cancellation_token,
                dispatcher: Mutex::new(Some(handle)),
            }),
        }
    }

    /// Enqueues an envelope, waiting while the ingress queue is full.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::BusClosed` once the bus has been shut down.
    pub async fn notify(&self, event: RawEvent) -> Result<()> {
        if self.is_closed() {
            return Err(NotifyError::BusClosed);
        }

        tokio::select! {
            biased;
            () = self.inner.cancellation_token.cancelled() => Err(NotifyError::BusClosed),
            sent = self.inner.ingress.send(Arc::new(event)) => {
                sent.map_err(|_| NotifyError::BusClosed)
            }
        }
    }

    /// Wraps a typed event and enqueues it.
    ///
    /// # Errors
    ///
    /// `NotifyError::Envelope` if the event cannot be encoded, otherwise as
    /// [`EventBus::notify`].
    pub async fn notify_event<E: Event>(&self, event: &E) -> Result<()> {
        self.notify(RawEvent::wrap(event)?).await
    }

    /// Enqueues an envelope without waiting.
    ///
    /// # Errors
    ///
    /// `NotifyError::BusFull` when the ingress queue is full (the event is
    /// dropped and counted), `NotifyError::BusClosed` after shutdown.
    pub fn try_notify(&self, event: RawEvent) -> Result<()> {
        if self.is_closed() {
            return Err(NotifyError::BusClosed);
        }

        match self.inner.ingress.try_send(Arc::new(event)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.inner.ingress_dropped.fetch_add(1, Ordering::Relaxed);
                Err(NotifyError::BusFull)
            },
            Err(TrySendError::Closed(_)) => Err(NotifyError::BusClosed),
        }
    }

    /// Registers `sender` under `key`, replacing any previous channel.
    pub async fn add_notifier(&self, key: impl Into<String>, sender: EgressSender) {
        let key = key.into();
        debug!(subscriber = %key, "registering egress channel");

        self.inner.subscribers.write().await.insert(
            key,
            Subscriber { sender, forwarded: AtomicU64::new(0), dropped: AtomicU64::new(0) },
        );
    }

    /// Unregisters the channel under `key`.
    ///
    /// Returns true if a channel was registered.
    pub async fn remove_notifier(&self, key: &str) -> bool {
        let removed = self.inner.subscribers.write().await.remove(key).is_some();
        if removed {
            debug!(subscriber = %key, "unregistered egress channel");
        }
        removed
    }

    /// Number of registered egress channels.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().await.len()
    }

    /// Snapshot of the bus counters.
    pub async fn stats(&self) -> BusStats {
        let subscribers = self
            .inner
            .subscribers
            .read()
            .await
            .iter()
            .map(|(key, subscriber)| {
                (key.clone(), SubscriberStats {
                    forwarded: subscriber.forwarded.load(Ordering::Relaxed),
                    dropped: subscriber.dropped.load(Ordering::Relaxed),
                })
            })
            .collect();

        BusStats {
            dispatched: self.inner.dispatched.load(Ordering::Relaxed),
            ingress_dropped: self.inner.ingress_dropped.load(Ordering::Relaxed),
            subscribers,
        }
    }

    /// Returns true once the bus stopped accepting events.
    pub fn is_closed(&self) -> bool {
        self.inner.cancellation_token.is_cancelled()
    }

    /// Stops the dispatcher and waits for it to exit.
    ///
    /// Events still queued on ingress are discarded.
    pub async fn shutdown(&self) {
        self.inner.cancellation_token.cancel();

        if let Some(handle) = self.inner.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "event bus dispatcher ended abnormally");
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<Arc<RawEvent>>,
    subscribers: Arc<RwLock<HashMap<String, Subscriber>>>,
    dispatched: Arc<AtomicU64>,
    cancellation_token: CancellationToken,
) {
    debug!("event bus dispatcher started");

    loop {
        let event = tokio::select! {
            biased;
            () = cancellation_token.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        dispatched.fetch_add(1, Ordering::Relaxed);

        for (key, subscriber) in subscribers.read().await.iter() {
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => {
                    subscriber.forwarded.fetch_add(1, Ordering::Relaxed);
                },
                Err(TrySendError::Full(_)) => {
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                    trace!(subscriber = %key, event_type = %event.event_type, "egress channel full, event dropped");
                },
                Err(TrySendError::Closed(_)) => {
                    trace!(subscriber = %key, "egress channel closed, skipping");
                },
            }
        }
    }

    receiver.close();
    info!(dispatched = dispatched.load(Ordering::Relaxed), "event bus dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use spvwallet_core::StringEvent;

    use super::*;

    fn event(value: &str) -> RawEvent {
        RawEvent::wrap(&StringEvent { value: value.to_string() }).unwrap()
    }

    async fn drain(receiver: &mut EgressReceiver, expected: usize) -> Vec<String> {
        let mut values = Vec::with_capacity(expected);
        while values.len() < expected {
            let next = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
                .await
                .expect("timed out waiting for event")
                .expect("channel closed");
            values.push(next.unwrap::<StringEvent>().unwrap().value);
        }
        values
    }

    #[tokio::test]
    async fn fans_out_to_every_subscriber_in_order() {
        let bus = EventBus::new(100);
        let (a_tx, mut a_rx) = egress_channel(20);
        let (b_tx, mut b_rx) = egress_channel(20);
        bus.add_notifier("http://a", a_tx).await;
        bus.add_notifier("http://b", b_tx).await;

        for i in 0..20 {
            bus.notify(event(&format!("msg-{i}"))).await.unwrap();
        }

        let expected: Vec<_> = (0..20).map(|i| format!("msg-{i}")).collect();
        assert_eq!(drain(&mut a_rx, 20).await, expected);
        assert_eq!(drain(&mut b_rx, 20).await, expected);
    }

    #[tokio::test]
    async fn full_subscriber_does_not_block_others() {
        let bus = EventBus::new(100);
        let (slow_tx, mut slow_rx) = egress_channel(10);
        let (fast_tx, mut fast_rx) = egress_channel(100);
        bus.add_notifier("http://slow", slow_tx).await;
        bus.add_notifier("http://fast", fast_tx).await;

        for i in 0..50 {
            bus.notify(event(&format!("msg-{i}"))).await.unwrap();
        }

        let expected: Vec<_> = (0..50).map(|i| format!("msg-{i}")).collect();
        assert_eq!(drain(&mut fast_rx, 50).await, expected);

        let slow: Vec<_> = std::iter::from_fn(|| slow_rx.try_recv().ok())
            .map(|e| e.unwrap::<StringEvent>().unwrap().value)
            .collect();
        assert_eq!(slow, expected[..10].to_vec());

        let stats = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stats = bus.stats().await;
                let slow = stats.subscribers["http://slow"];
                if slow.forwarded + slow.dropped == 50 {
                    break stats;
                }
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(stats.dispatched, 50);
        assert_eq!(stats.subscribers["http://slow"], SubscriberStats { forwarded: 10, dropped: 40 });
        assert_eq!(stats.subscribers["http://fast"], SubscriberStats { forwarded: 50, dropped: 0 });
    }

    #[tokio::test]
    async fn removed_subscriber_receives_nothing_further() {
        let bus = EventBus::new(10);
        let (tx, mut rx) = egress_channel(10);
        let (probe_tx, mut probe_rx) = egress_channel(10);
        bus.add_notifier("http://a", tx).await;
        bus.add_notifier("http://probe", probe_tx).await;

        bus.notify(event("before")).await.unwrap();
        assert_eq!(drain(&mut rx, 1).await, vec!["before"]);

        assert!(bus.remove_notifier("http://a").await);
        assert!(!bus.remove_notifier("http://a").await);

        bus.notify(event("after")).await.unwrap();
        assert_eq!(drain(&mut probe_rx, 2).await, vec!["before", "after"]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn add_notifier_overwrites_existing_key() {
        let bus = EventBus::new(10);
        let (old_tx, mut old_rx) = egress_channel(10);
        let (new_tx, mut new_rx) = egress_channel(10);
        bus.add_notifier("http://a", old_tx).await;
        bus.add_notifier("http://a", new_tx).await;
        assert_eq!(bus.subscriber_count().await, 1);

        bus.notify(event("x")).await.unwrap();

        assert_eq!(drain(&mut new_rx, 1).await, vec!["x"]);
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn notify_after_shutdown_fails_with_bus_closed() {
        let bus = EventBus::new(10);
        bus.shutdown().await;

        assert!(bus.is_closed());
        assert!(matches!(bus.notify(event("late")).await, Err(NotifyError::BusClosed)));
        assert!(matches!(bus.try_notify(event("late")), Err(NotifyError::BusClosed)));
    }

    #[tokio::test]
    async fn parent_cancellation_closes_bus() {
        let parent = CancellationToken::new();
        let bus = EventBus::with_cancellation(10, &parent);

        parent.cancel();

        assert!(matches!(bus.notify(event("late")).await, Err(NotifyError::BusClosed)));
    }

    #[tokio::test]
    async fn notify_event_wraps_typed_events() {
        let bus = EventBus::new(10);
        let (tx, mut rx) = egress_channel(10);
        bus.add_notifier("http://a", tx).await;

        bus.notify_event(&StringEvent { value: "typed".into() }).await.unwrap();

        assert_eq!(drain(&mut rx, 1).await, vec!["typed"]);
    }
}
