//! `GET /ws`: the real-time channel.
//!
//! Frames in both directions are JSON `{"event": <name>, "data": …}`. There
//! is no error channel; frames that fail to parse or to apply are logged at
//! debug level and dropped.

use axum::{
  extract::{
    State, WebSocketUpgrade,
    ws::{Message, WebSocket},
  },
  response::Response,
};
use futures_util::StreamExt as _;
use remis_core::{
  Coordinator,
  alert::AlertKind,
  channel::{Channel, ConnectionId},
  coordinator::AlertReport,
  directory::Role,
  snapshot::SnapshotStore,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{AppState, rides::LocationBody};

pub async fn upgrade<S: SnapshotStore + 'static>(
  ws: WebSocketUpgrade,
  State(state): State<AppState<S>>,
) -> Response {
  ws.on_upgrade(move |socket| serve(socket, state.hub))
}

async fn serve<S: SnapshotStore + 'static>(mut socket: WebSocket, hub: Coordinator<S>) {
  let (conn, mut outbox) = hub.channels().connect().await;
  debug!(%conn, "socket connected");

  loop {
    tokio::select! {
      incoming = socket.next() => match incoming {
        Some(Ok(Message::Text(text))) => handle_frame(&hub, conn, text.as_str()).await,
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
        Some(Ok(_)) => {}
      },
      Some(event) = outbox.recv() => {
        let text = match serde_json::to_string(&*event) {
          Ok(text) => text,
          Err(e) => {
            debug!(%conn, error = %e, "could not encode event");
            continue;
          }
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
          break;
        }
      }
    }
  }

  let identity = hub.channels().disconnect(conn).await;
  debug!(%conn, ?identity, "socket disconnected");
}

// ─── Inbound frames ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
enum Inbound {
  Join(JoinFrame),
  JoinRide(RideRef),
  LeaveRide(RideRef),
  Location(LocationBody),
  ChatMessage(ChatFrame),
  SuspiciousActivity(SuspiciousFrame),
  DriverAlert(DriverAlertFrame),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinFrame {
  role:      Role,
  driver_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RideRef {
  ride_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatFrame {
  ride_id: Uuid,
  message: String,
  from:    Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SuspiciousFrame {
  ride_id:     Option<Uuid>,
  #[serde(rename = "type")]
  kind:        AlertKind,
  #[serde(default)]
  description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DriverAlertFrame {
  ride_id:     Option<Uuid>,
  description: Option<String>,
}

/// Apply one text frame from `conn`.
pub async fn handle_frame<S: SnapshotStore + 'static>(
  hub: &Coordinator<S>,
  conn: ConnectionId,
  text: &str,
) {
  let frame: Inbound = match serde_json::from_str(text) {
    Ok(frame) => frame,
    Err(e) => {
      debug!(%conn, error = %e, "dropping malformed frame");
      return;
    }
  };
  let channels = hub.channels();
  let driver_id = match channels.identity(conn).await {
    Some(identity) if identity.role == Role::Driver => Some(identity.driver_id),
    _ => None,
  };

  match frame {
    Inbound::Join(JoinFrame { role, driver_id }) => {
      match driver_id.filter(|d| !d.is_empty()) {
        Some(id) => {
          channels.identify(conn, role, &id).await;
        }
        None => debug!(%conn, %role, "join without driverId ignored"),
      }
    }
    Inbound::JoinRide(RideRef { ride_id }) => {
      channels.join(conn, Channel::Ride(ride_id)).await;
    }
    Inbound::LeaveRide(RideRef { ride_id }) => {
      channels.leave(conn, &Channel::Ride(ride_id)).await;
    }
    Inbound::Location(body) => {
      let Some(driver_id) = driver_id else {
        debug!(%conn, "location from a non-driver connection dropped");
        return;
      };
      if let Err(e) = hub
        .report_location(Some(conn), &driver_id, body.into_location())
        .await
      {
        debug!(%conn, error = %e, "location dropped");
      }
    }
    Inbound::ChatMessage(ChatFrame { ride_id, message, from }) => {
      hub.relay_chat(ride_id, message, from).await;
    }
    Inbound::SuspiciousActivity(frame) => {
      let report = AlertReport {
        ride_id:     frame.ride_id,
        kind:        frame.kind,
        description: frame.description,
        reporter:    driver_id,
      };
      if let Err(e) = hub.raise_alert(report).await {
        debug!(%conn, error = %e, "alert dropped");
      }
    }
    Inbound::DriverAlert(frame) => {
      let Some(driver_id) = driver_id else {
        debug!(%conn, "driver_alert from a non-driver connection dropped");
        return;
      };
      if let Err(e) = hub
        .raise_driver_alert(&driver_id, frame.ride_id, frame.description)
        .await
      {
        debug!(%conn, error = %e, "driver alert dropped");
      }
    }
  }
}
