//! Room membership
//!
//! A room is owned by the hub loop, which is its only writer and reader;
//! exclusive `&mut` access through the loop stands in for a per-room lock.

use std::collections::HashMap;

use signalhub_core::{PeerId, RoomId, UserInfo};

use crate::peer::{Payload, Peer, PeerKey};

/// Who a fan-out is addressed to
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// Every member, minus the given one if any
    AllExcept(Option<&'a PeerId>),
    /// A single member
    Only(&'a PeerId),
}

#[derive(Debug)]
struct Member {
    /// Position in join order
    seq: u64,
    peer: Peer,
}

/// A named group of peers
#[derive(Debug)]
pub struct Room {
    id: RoomId,
    peers: HashMap<PeerId, Member>,
    next_seq: u64,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            peers: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// Add a peer, returning whatever entry had the same peer id
    pub fn insert(&mut self, peer: Peer) -> Option<Peer> {
        debug_assert_eq!(peer.room_id(), &self.id);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.peers
            .insert(peer.id().clone(), Member { seq, peer })
            .map(|member| member.peer)
    }

    pub fn remove(&mut self, peer_id: &PeerId) -> Option<Peer> {
        self.peers.remove(peer_id).map(|member| member.peer)
    }

    /// Remove a peer only if the entry still belongs to that connection
    pub fn remove_session(&mut self, key: &PeerKey) -> Option<Peer> {
        match self.peers.get(&key.peer_id) {
            Some(member) if member.peer.session() == key.session => self.remove(&key.peer_id),
            _ => None,
        }
    }

    pub fn get(&self, peer_id: &PeerId) -> Option<&Peer> {
        self.peers.get(peer_id).map(|member| &member.peer)
    }

    pub fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut Peer> {
        self.peers.get_mut(peer_id).map(|member| &mut member.peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().map(|member| &member.peer)
    }

    /// Member list in join order
    pub fn members(&self) -> Vec<UserInfo> {
        let mut members: Vec<&Member> = self.peers.values().collect();
        members.sort_by_key(|member| member.seq);
        members.into_iter().map(|member| member.peer.user_info()).collect()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Offer `payload` to each target without waiting.
    ///
    /// Targets whose mailbox rejects it are removed from the room; dropping
    /// them closes their mailbox. Returns the ids of evicted peers.
    pub fn fan_out(&mut self, payload: &Payload, target: Target<'_>) -> Vec<PeerId> {
        let unreachable: Vec<PeerId> = match target {
            Target::Only(id) => self
                .get(id)
                .filter(|peer| !peer.mailbox().try_deliver(payload.clone()))
                .map(|peer| peer.id().clone())
                .into_iter()
                .collect(),
            Target::AllExcept(except) => self
                .peers()
                .filter(|peer| Some(peer.id()) != except)
                .filter(|peer| !peer.mailbox().try_deliver(payload.clone()))
                .map(|peer| peer.id().clone())
                .collect(),
        };

        for id in &unreachable {
            self.remove(id);
        }
        unreachable
    }
}
