//! Interfaces to external collaborators: geocoding, routing and
//! notification delivery.
//!
//! Implementations live in the server crate. Failures here never fail the
//! ride or alert operation that triggered them; notifications in particular
//! go through a [`NotificationQueue`] drained by a background worker.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{directory::PushSubscription, location::Coord};

#[derive(Debug, Error)]
pub enum CollaboratorError {
  #[error("{0} is not configured")]
  NotConfigured(&'static str),

  #[error("{service} request failed: {source}")]
  Request {
    service: &'static str,
    #[source]
    source:  Box<dyn std::error::Error + Send + Sync>,
  },

  #[error("no route between the given points")]
  NoRoute,
}

impl CollaboratorError {
  pub fn request(
    service: &'static str,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self::Request { service, source: source.into() }
  }
}

// ─── Geocoding / routing ─────────────────────────────────────────────────────

/// Free text to a coordinate. Any failure is reported as `None`.
pub trait Geocoder: Send + Sync {
  fn geocode<'a>(&'a self, query: &'a str) -> BoxFuture<'a, Option<Coord>>;
}

/// A driving route between two points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Route {
  pub line:     Vec<Coord>,
  /// Seconds.
  pub duration: f64,
  pub eta_min:  u64,
}

impl Route {
  pub fn new(line: Vec<Coord>, duration: f64) -> Self {
    let eta_min = (duration / 60.0).ceil().max(0.0) as u64;
    Self { line, duration, eta_min }
  }
}

pub trait RouteProvider: Send + Sync {
  fn route(&self, from: Coord, to: Coord) -> BoxFuture<'_, Result<Route, CollaboratorError>>;
}

// ─── Notifications ───────────────────────────────────────────────────────────

/// One fire-and-forget delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
  /// Operations chat.
  Telegram { text: String },
  /// SMS to the configured dispatcher phone.
  Dispatcher { text: String },
  /// SMS to an arbitrary number, e.g. an emergency contact.
  Sms { to: String, text: String },
  /// Web push to every registered browser.
  Push {
    subscriptions: Vec<PushSubscription>,
    payload:       serde_json::Value,
  },
}

impl Outbound {
  pub fn kind(&self) -> &'static str {
    match self {
      Self::Telegram { .. } => "telegram",
      Self::Dispatcher { .. } => "dispatcher",
      Self::Sms { .. } => "sms",
      Self::Push { .. } => "push",
    }
  }
}

pub trait Notifier: Send + Sync {
  fn notify(&self, message: Outbound) -> BoxFuture<'_, Result<(), CollaboratorError>>;
}

/// Sending half of the outbound notification queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
  tx: mpsc::UnboundedSender<Outbound>,
}

impl NotificationQueue {
  /// A queue whose receiving half is handed back to the caller.
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<Outbound>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  /// A queue drained by a background task delivering through `notifier`.
  pub fn spawn(notifier: Arc<dyn Notifier>) -> (Self, JoinHandle<()>) {
    let (queue, mut rx) = Self::channel();
    let worker = tokio::spawn(async move {
      while let Some(message) = rx.recv().await {
        let kind = message.kind();
        if let Err(e) = notifier.notify(message).await {
          warn!(kind, error = %e, "notification delivery failed");
        }
      }
    });
    (queue, worker)
  }

  pub fn enqueue(&self, message: Outbound) {
    if self.tx.send(message).is_err() {
      debug!("notification worker has stopped; message dropped");
    }
  }
}

// ─── Offline ─────────────────────────────────────────────────────────────────

/// Collaborator that knows nothing and delivers nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Geocoder for Offline {
  fn geocode<'a>(&'a self, _query: &'a str) -> BoxFuture<'a, Option<Coord>> {
    async { None }.boxed()
  }
}

impl RouteProvider for Offline {
  fn route(&self, _from: Coord, _to: Coord) -> BoxFuture<'_, Result<Route, CollaboratorError>> {
    async { Err(CollaboratorError::NotConfigured("routing")) }.boxed()
  }
}

impl Notifier for Offline {
  fn notify(&self, message: Outbound) -> BoxFuture<'_, Result<(), CollaboratorError>> {
    debug!(kind = message.kind(), "no notifier configured; dropping");
    async { Ok(()) }.boxed()
  }
}
