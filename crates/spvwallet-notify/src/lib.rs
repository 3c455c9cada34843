//! Event fan-out and webhook delivery for the wallet server.
//!
//! Producers publish typed domain events to an [`EventBus`]. The bus copies
//! every event to one bounded egress channel per subscriber without ever
//! blocking on a subscriber. Each channel is drained by a notifier that
//! batches events, POSTs them as a JSON array, retries failed batches and
//! bans the subscriber after repeated failure. A [`WebhookManager`] keeps the
//! notifier set in step with the persistent webhook registry.
//!
//! # Architecture
//!
//! ```text
//!  notify()   ┌──────────┐  try_send  ┌────────────┐  POST [..]  ┌────────────┐
//! ──────────▶ │ EventBus │ ─────────▶ │ notifier   │ ──────────▶ │ subscriber │
//!             └──────────┘            └────────────┘             └────────────┘
//!                  ▲                        ▲
//!                  │ add/remove channel     │ spawn/cancel, definition
//!             ┌────────────────┐  snapshot  ┌──────────┐
//!             │ WebhookManager │ ─────────▶ │ registry │
//!             └────────────────┘            └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use spvwallet_core::{RealClock, StringEvent};
//! use spvwallet_notify::{
//!     storage::memory::InMemoryWebhookRepository, EventBus, NotificationsConfig, NotifyError,
//!     WebhookManager,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> std::result::Result<(), NotifyError> {
//! let root = CancellationToken::new();
//! let config = NotificationsConfig { enabled: true, ..NotificationsConfig::default() };
//! let bus = EventBus::with_cancellation(config.ingress_capacity, &root);
//! let manager = WebhookManager::start(
//!     Arc::new(InMemoryWebhookRepository::new()),
//!     bus.clone(),
//!     &config,
//!     RealClock::shared(),
//!     &root,
//! )?;
//!
//! manager.subscribe("https://example.com/hooks", "X-Auth", "secret").await?;
//! bus.notify_event(&StringEvent { value: "hello".into() }).await?;
//!
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod ban;
pub mod bus;
pub mod client;
pub mod config;
pub mod error;
pub mod manager;
pub mod notifier;
pub mod retry;
pub mod storage;
pub mod validation;

pub use bus::{BusStats, EventBus};
pub use config::NotificationsConfig;
pub use error::{NotifyError, Result};
pub use manager::{ManagerStatus, WebhookManager, WebhookStatus};
pub use storage::{PostgresWebhookRepository, WebhookRepository};

/// Default capacity of the bus ingress queue.
pub const DEFAULT_INGRESS_CAPACITY: usize = 100;

/// Default capacity of each subscriber's egress channel.
pub const DEFAULT_EGRESS_CAPACITY: usize = 100;

/// Default maximum number of events in one POST.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 100;

/// Longest accepted ban. Keeps `banned_until` within what the registry
/// column can store.
pub const MAX_BAN_DURATION: std::time::Duration = std::time::Duration::from_secs(365 * 24 * 60 * 60);
