//! Room-based publish/subscribe over live client connections.
//!
//! Each connection owns an unbounded outbox. Publishing pushes the event into
//! the outbox of every current member of a channel while the registry lock is
//! held, so events published to one channel by one caller reach each
//! subscriber in publish order. Nothing is promised across channels.

use std::{
  collections::{HashMap, HashSet},
  fmt,
  sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
  },
};

use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::{directory::Role, event::Event};

/// A named broadcast topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
  /// Every online driver connection; receives offers.
  Drivers,
  /// One driver's connections plus anyone tracking that driver.
  Driver(String),
  /// The rider tracking a ride and any interested drivers.
  Ride(Uuid),
  /// System-wide safety alerts; every connection is a member.
  Alerts,
}

impl fmt::Display for Channel {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Drivers => f.write_str("drivers"),
      Self::Driver(id) => write!(f, "driver:{id}"),
      Self::Ride(id) => write!(f, "ride:{id}"),
      Self::Alerts => f.write_str("alerts"),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "conn-{}", self.0) }
}

/// Receiving half of a connection's outbox.
pub type Outbox = mpsc::UnboundedReceiver<Arc<Event>>;

/// Who a connection says it is, set by the `join` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub role:      Role,
  pub driver_id: String,
}

struct Member {
  tx:       mpsc::UnboundedSender<Arc<Event>>,
  channels: HashSet<Channel>,
  identity: Option<Identity>,
}

#[derive(Default)]
struct Rooms {
  members:  HashMap<ConnectionId, Member>,
  channels: HashMap<Channel, HashSet<ConnectionId>>,
  /// driver id -> number of live driver connections.
  online:   HashMap<String, usize>,
}

impl Rooms {
  fn join(&mut self, conn: ConnectionId, channel: Channel) -> bool {
    let Some(member) = self.members.get_mut(&conn) else {
      return false;
    };
    member.channels.insert(channel.clone());
    self.channels.entry(channel).or_default().insert(conn);
    true
  }

  fn leave(&mut self, conn: ConnectionId, channel: &Channel) {
    if let Some(member) = self.members.get_mut(&conn) {
      member.channels.remove(channel);
    }
    if let Some(set) = self.channels.get_mut(channel) {
      set.remove(&conn);
      if set.is_empty() {
        self.channels.remove(channel);
      }
    }
  }

  fn publish(&self, channel: &Channel, event: Event, except: Option<ConnectionId>) -> usize {
    let Some(set) = self.channels.get(channel) else {
      return 0;
    };
    let event = Arc::new(event);
    set
      .iter()
      .filter(|conn| Some(**conn) != except)
      .filter_map(|conn| self.members.get(conn))
      .filter(|member| member.tx.send(Arc::clone(&event)).is_ok())
      .count()
  }

  /// Undo the presence side effects of a driver identity.
  fn release(&mut self, conn: ConnectionId, identity: &Identity) {
    if identity.role != Role::Driver {
      return;
    }
    if let Some(count) = self.online.get_mut(&identity.driver_id) {
      *count -= 1;
      if *count == 0 {
        self.online.remove(&identity.driver_id);
      }
    }
    let channel = Channel::Driver(identity.driver_id.clone());
    self.publish(&channel, Event::DriverStatus { online: false }, Some(conn));
  }
}

// ─── Registry ────────────────────────────────────────────────────────────────

/// Membership and fan-out for every live connection.
#[derive(Default)]
pub struct ChannelRegistry {
  next_id: AtomicU64,
  rooms:   Mutex<Rooms>,
}

impl ChannelRegistry {
  pub fn new() -> Self { Self::default() }

  /// Register a new connection. It starts out in [`Channel::Alerts`].
  pub async fn connect(&self) -> (ConnectionId, Outbox) {
    let conn = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
    let (tx, rx) = mpsc::unbounded_channel();
    let mut rooms = self.rooms.lock().await;
    rooms.members.insert(conn, Member {
      tx,
      channels: HashSet::new(),
      identity: None,
    });
    rooms.join(conn, Channel::Alerts);
    (conn, rx)
  }

  /// Drop a connection from every channel. A driver connection going away
  /// announces `driver_status {online: false}` on its personal channel.
  pub async fn disconnect(&self, conn: ConnectionId) -> Option<Identity> {
    let mut rooms = self.rooms.lock().await;
    let member = rooms.members.remove(&conn)?;
    for channel in &member.channels {
      if let Some(set) = rooms.channels.get_mut(channel) {
        set.remove(&conn);
        if set.is_empty() {
          rooms.channels.remove(channel);
        }
      }
    }
    if let Some(identity) = &member.identity {
      rooms.release(conn, identity);
    }
    member.identity
  }

  /// Add `conn` to `channel`. Returns `false` for unknown connections.
  pub async fn join(&self, conn: ConnectionId, channel: Channel) -> bool {
    self.rooms.lock().await.join(conn, channel)
  }

  pub async fn leave(&self, conn: ConnectionId, channel: &Channel) {
    self.rooms.lock().await.leave(conn, channel);
  }

  /// Tag `conn` with a role and driver id and join the driver's channel.
  ///
  /// A driver-role connection also joins [`Channel::Drivers`], counts towards
  /// presence, and announces `driver_status {online: true}` on its channel.
  pub async fn identify(&self, conn: ConnectionId, role: Role, driver_id: &str) -> bool {
    let mut rooms = self.rooms.lock().await;
    let Some(member) = rooms.members.get_mut(&conn) else {
      return false;
    };
    let identity = Identity { role, driver_id: driver_id.to_owned() };
    if let Some(previous) = member.identity.replace(identity) {
      let previous_channel = Channel::Driver(previous.driver_id.clone());
      rooms.leave(conn, &previous_channel);
      if previous.role == Role::Driver {
        rooms.leave(conn, &Channel::Drivers);
      }
      rooms.release(conn, &previous);
    }

    let channel = Channel::Driver(driver_id.to_owned());
    rooms.join(conn, channel.clone());
    if role == Role::Driver {
      *rooms.online.entry(driver_id.to_owned()).or_default() += 1;
      rooms.join(conn, Channel::Drivers);
      rooms.publish(&channel, Event::DriverStatus { online: true }, None);
    }
    true
  }

  pub async fn identity(&self, conn: ConnectionId) -> Option<Identity> {
    self
      .rooms
      .lock()
      .await
      .members
      .get(&conn)
      .and_then(|m| m.identity.clone())
  }

  /// Deliver `event` to every member of `channel`; returns the number of
  /// outboxes reached.
  pub async fn publish(&self, channel: &Channel, event: Event) -> usize {
    self.rooms.lock().await.publish(channel, event, None)
  }

  /// Like [`publish`](Self::publish) but skips `except`.
  pub async fn publish_except(
    &self,
    channel: &Channel,
    event: Event,
    except: ConnectionId,
  ) -> usize {
    self.rooms.lock().await.publish(channel, event, Some(except))
  }

  /// Driver ids with at least one live driver connection, sorted.
  pub async fn online_drivers(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.rooms.lock().await.online.keys().cloned().collect();
    ids.sort();
    ids
  }

  pub async fn member_count(&self, channel: &Channel) -> usize {
    self
      .rooms
      .lock()
      .await
      .channels
      .get(channel)
      .map_or(0, HashSet::len)
  }
}
