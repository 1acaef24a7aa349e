//! Connection registry and room fan-out
//!
//! Each live socket owns a bounded queue; the hub only ever `try_send`s into
//! it, so a slow or dead client never stalls the sender. No two map guards
//! are held at the same time.

use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use super::events::ServerEvent;
use crate::error::{Error, Result};
use crate::presence::{ConnectionId, PresenceTracker};

struct Connection {
    sender: mpsc::Sender<ServerEvent>,
    rooms: HashSet<String>,
}

pub struct Hub {
    presence: Arc<PresenceTracker>,
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
    capacity: usize,
}

impl Hub {
    pub fn new(presence: Arc<PresenceTracker>, capacity: usize) -> Self {
        Self {
            presence,
            connections: DashMap::new(),
            rooms: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Register a new connection and hand back its outbound queue.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<ServerEvent>) {
        let handle = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.capacity);
        self.connections.insert(
            handle,
            Connection {
                sender,
                rooms: HashSet::new(),
            },
        );
        debug!("connection {} registered", handle);
        (handle, receiver)
    }

    /// Bind `handle` to `user_id` and announce the user if they just came online.
    pub fn identify(&self, handle: ConnectionId, user_id: &str) -> Result<()> {
        if !self.connections.contains_key(&handle) {
            return Err(Error::NotFound(format!("Connection {} not registered", handle)));
        }
        if self.presence.connect(user_id, handle)? {
            info!("{} is online", user_id);
            self.to_all(ServerEvent::PresenceOnline {
                user_id: user_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn join_room(&self, handle: ConnectionId, room: &str) -> Result<()> {
        match self.connections.get_mut(&handle) {
            Some(mut connection) => {
                connection.rooms.insert(room.to_string());
            }
            None => {
                return Err(Error::NotFound(format!("Connection {} not registered", handle)))
            }
        }
        self.rooms.entry(room.to_string()).or_default().insert(handle);
        Ok(())
    }

    pub fn leave_room(&self, handle: ConnectionId, room: &str) {
        if let Some(mut connection) = self.connections.get_mut(&handle) {
            connection.rooms.remove(room);
        }
        self.rooms.remove_if_mut(room, |_, members| {
            members.remove(&handle);
            members.is_empty()
        });
    }

    pub fn room_members(&self, room: &str) -> HashSet<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| members.value().clone())
            .unwrap_or_default()
    }

    /// Deliver to every member of `room` not listed in `except`. Returns the number of queued copies.
    pub fn to_room_except(
        &self,
        room: &str,
        event: &ServerEvent,
        except: &HashSet<ConnectionId>,
    ) -> usize {
        self.room_members(room)
            .into_iter()
            .filter(|handle| !except.contains(handle))
            .filter(|handle| self.send_to(*handle, event.clone()))
            .count()
    }

    pub fn to_room(&self, room: &str, event: &ServerEvent) -> usize {
        self.to_room_except(room, event, &HashSet::new())
    }

    /// Deliver on the user's personal channel, i.e. to each of their live connections.
    pub fn to_user(&self, user_id: &str, event: &ServerEvent) -> usize {
        self.presence
            .handles_for(user_id)
            .into_iter()
            .filter(|handle| self.send_to(*handle, event.clone()))
            .count()
    }

    pub fn to_all(&self, event: ServerEvent) -> usize {
        let handles: Vec<ConnectionId> = self.connections.iter().map(|c| *c.key()).collect();
        handles
            .into_iter()
            .filter(|handle| self.send_to(*handle, event.clone()))
            .count()
    }

    /// Queue `event` for one connection. A full or closed queue drops it.
    pub fn send_to(&self, handle: ConnectionId, event: ServerEvent) -> bool {
        let sender = match self.connections.get(&handle) {
            Some(connection) => connection.sender.clone(),
            None => return false,
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                debug!("queue full for {}, dropping {}", handle, event.name());
                false
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!("connection {} closed, dropping {}", handle, event.name());
                false
            }
        }
    }

    /// Forget `handle`: leave its rooms, detach presence and announce the
    /// user offline if this was their last connection.
    pub fn unregister(&self, handle: ConnectionId) {
        if let Some((_, connection)) = self.connections.remove(&handle) {
            for room in &connection.rooms {
                self.rooms.remove_if_mut(room, |_, members| {
                    members.remove(&handle);
                    members.is_empty()
                });
            }
        }
        if let Some(user_id) = self.presence.disconnect(handle) {
            info!("{} is offline", user_id);
            self.to_all(ServerEvent::PresenceOffline { user_id });
        }
        debug!("connection {} unregistered", handle);
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
