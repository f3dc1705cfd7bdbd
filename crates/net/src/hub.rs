//! Connection hub
//!
//! The hub owns the room registry. Every membership change and every
//! routed envelope goes through a single event loop, so events are applied
//! one at a time in submission order and no registry lock is needed.
//!
//! Fan-out never waits on a peer: a mailbox that rejects a payload gets its
//! peer evicted from the room on the spot. There is no other liveness
//! check; a peer nobody sends to is only reclaimed on its own disconnect.

use std::collections::HashMap;

use chrono::Utc;
use signalhub_core::{PeerId, RoomId, UserInfo};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::peer::{Payload, Peer, PeerKey};
use crate::protocol::Envelope;
use crate::room::{Room, Target};

/// Events processed by the hub loop
#[derive(Debug)]
pub enum HubEvent {
    Join(Peer),
    Leave(PeerKey),
    Route(Envelope),
    Members {
        room_id: RoomId,
        reply: oneshot::Sender<Vec<UserInfo>>,
    },
    Rooms {
        reply: oneshot::Sender<Vec<RoomId>>,
    },
}

/// Cloneable entry point into the hub loop
#[derive(Debug, Clone)]
pub struct HubHandle {
    events: mpsc::Sender<HubEvent>,
}

impl HubHandle {
    async fn submit(&self, event: HubEvent) -> Result<()> {
        self.events.send(event).await.map_err(|_| Error::HubClosed)
    }

    /// Register a peer whose mailbox is already allocated
    pub async fn join(&self, peer: Peer) -> Result<()> {
        self.submit(HubEvent::Join(peer)).await
    }

    /// Unregister a connection; repeated or stale calls are no-ops
    pub async fn leave(&self, key: PeerKey) -> Result<()> {
        self.submit(HubEvent::Leave(key)).await
    }

    /// Forward a stamped signaling envelope
    pub async fn route(&self, envelope: Envelope) -> Result<()> {
        self.submit(HubEvent::Route(envelope)).await
    }

    /// Current members of a room, in join order
    pub async fn members(&self, room_id: RoomId) -> Result<Vec<UserInfo>> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Members { room_id, reply }).await?;
        rx.await.map_err(|_| Error::HubClosed)
    }

    /// Ids of all rooms currently in the registry
    pub async fn rooms(&self) -> Result<Vec<RoomId>> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubEvent::Rooms { reply }).await?;
        rx.await.map_err(|_| Error::HubClosed)
    }
}

/// Room registry, mutated only by the hub loop
#[derive(Debug, Default)]
pub struct Hub {
    rooms: HashMap<RoomId, Room>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start the hub loop on the current runtime
    ///
    /// The loop runs until every handle is dropped.
    pub fn spawn(event_buffer: usize) -> HubHandle {
        let (events, rx) = mpsc::channel(event_buffer);
        tokio::spawn(Self::new().run(rx));
        HubHandle { events }
    }

    async fn run(mut self, mut events: mpsc::Receiver<HubEvent>) {
        debug!("Hub loop started");
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        debug!(rooms = self.rooms.len(), "Hub loop stopped");
    }

    /// Apply one event
    pub fn handle(&mut self, event: HubEvent) {
        match event {
            HubEvent::Join(peer) => self.join(peer),
            HubEvent::Leave(key) => self.leave(&key),
            HubEvent::Route(envelope) => self.route(envelope),
            HubEvent::Members { room_id, reply } => {
                let _ = reply.send(self.members(&room_id));
            }
            HubEvent::Rooms { reply } => {
                let _ = reply.send(self.room_ids());
            }
        }
        self.check_invariants();
    }

    /// Add a peer to its room, creating the room on first join.
    ///
    /// Other members get a `user-joined`; the new peer gets the full
    /// member list. If the list cannot be queued the new peer's mailbox
    /// is closed, but it stays a member until its Leave arrives.
    pub fn join(&mut self, peer: Peer) {
        let room_id = peer.room_id().clone();
        let peer_id = peer.id().clone();
        let session = peer.session();
        let notice = Envelope::user_joined(peer_id.clone(), peer.username().to_string());

        let room = self.rooms.entry(room_id.clone()).or_insert_with(|| {
            debug!(room_id = %room_id, "Room created");
            Room::new(room_id.clone())
        });

        if let Some(replaced) = room.insert(peer) {
            warn!(
                room_id = %room_id,
                peer_id = %peer_id,
                old_session = %replaced.session(),
                "Peer id reused, closing previous connection"
            );
        }

        info!(
            room_id = %room_id,
            peer_id = %peer_id,
            session = %session,
            members = room.len(),
            "Peer joined"
        );

        match notice.to_payload() {
            Ok(payload) => self.deliver(&room_id, payload, Target::AllExcept(Some(&peer_id))),
            Err(e) => warn!(error = %e, "Failed to encode user-joined"),
        }

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let list = match Envelope::user_list(&room.members()).to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode user-list");
                return;
            }
        };
        if let Some(peer) = room.get_mut(&peer_id) {
            if !peer.mailbox().try_deliver(list) {
                warn!(room_id = %room_id, peer_id = %peer_id, "User list undeliverable, closing mailbox");
                peer.mailbox_mut().close();
            }
        }
    }

    /// Remove a connection from its room.
    ///
    /// Drops the room once empty, otherwise tells the remaining members.
    pub fn leave(&mut self, key: &PeerKey) {
        let Some(room) = self.rooms.get_mut(&key.room_id) else {
            debug!(room_id = %key.room_id, peer_id = %key.peer_id, "Leave for unknown room ignored");
            return;
        };

        let Some(peer) = room.remove_session(key) else {
            debug!(room_id = %key.room_id, peer_id = %key.peer_id, "Leave for absent peer ignored");
            return;
        };

        info!(
            room_id = %key.room_id,
            peer_id = %key.peer_id,
            session = %key.session,
            connected_secs = (Utc::now() - peer.joined_at()).num_seconds(),
            members = room.len(),
            "Peer left"
        );
        // Releases the mailbox; the outbound pump flushes and closes
        drop(peer);

        if room.is_empty() {
            self.rooms.remove(&key.room_id);
            debug!(room_id = %key.room_id, "Room removed");
            return;
        }

        match Envelope::user_left(key.peer_id.clone()).to_payload() {
            Ok(payload) => self.deliver(&key.room_id, payload, Target::AllExcept(None)),
            Err(e) => warn!(error = %e, "Failed to encode user-left"),
        }
    }

    /// Forward a signaling envelope stamped with its sender's room and id.
    ///
    /// With a target it goes to that peer only, otherwise to every member
    /// but the sender. Unknown rooms and targets are dropped silently.
    pub fn route(&mut self, envelope: Envelope) {
        if !envelope.kind.is_signal() {
            debug!(kind = ?envelope.kind, "Refusing to route non-signal envelope");
            return;
        }
        let (Some(room_id), Some(sender)) = (envelope.room_id.clone(), envelope.user_id.clone())
        else {
            debug!("Dropping unstamped envelope");
            return;
        };
        if !self.rooms.contains_key(&room_id) {
            debug!(room_id = %room_id, sender = %sender, "Dropping envelope for unknown room");
            return;
        }

        let payload = match envelope.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode envelope");
                return;
            }
        };

        match &envelope.target_user_id {
            Some(target) if *target == sender => {
                debug!(room_id = %room_id, sender = %sender, "Dropping envelope addressed to its sender");
            }
            Some(target) => self.deliver(&room_id, payload, Target::Only(target)),
            None => self.deliver(&room_id, payload, Target::AllExcept(Some(&sender))),
        }
    }

    /// Fan out to a room, evicting unreachable targets
    fn deliver(&mut self, room_id: &RoomId, payload: Payload, target: Target<'_>) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return;
        };

        for peer_id in room.fan_out(&payload, target) {
            warn!(room_id = %room_id, peer_id = %peer_id, "Mailbox saturated, evicted peer");
        }

        if room.is_empty() {
            self.rooms.remove(room_id);
            debug!(room_id = %room_id, "Room removed");
        }
    }

    /// Members of a room in join order; empty if the room does not exist
    pub fn members(&self, room_id: &RoomId) -> Vec<UserInfo> {
        self.rooms
            .get(room_id)
            .map(Room::members)
            .unwrap_or_default()
    }

    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    pub fn contains_room(&self, room_id: &RoomId) -> bool {
        self.rooms.contains_key(room_id)
    }

    pub fn contains_peer(&self, room_id: &RoomId, peer_id: &PeerId) -> bool {
        self.rooms
            .get(room_id)
            .is_some_and(|room| room.get(peer_id).is_some())
    }

    fn check_invariants(&self) {
        for (room_id, room) in &self.rooms {
            debug_assert!(!room.is_empty(), "Room {} is in the registry but empty", room_id);
            debug_assert_eq!(room.id(), room_id, "Room {} is filed under {}", room.id(), room_id);
            debug_assert!(
                room.peers().all(|peer| peer.room_id() == room_id),
                "Room {} holds a peer from another room",
                room_id
            );
        }
    }
}
