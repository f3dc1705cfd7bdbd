//! Connected peer record and its outbound mailbox

use std::sync::Arc;

use chrono::{DateTime, Utc};
use signalhub_core::{Identity, PeerId, RoomId, UserInfo};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

/// Serialized envelope queued for the outbound pump
pub type Payload = Arc<str>;

/// Receiving end of a mailbox, owned by the outbound pump
pub type MailboxReceiver = mpsc::Receiver<Payload>;

/// Bounded outbound queue of one peer
///
/// Closing drops the sender, which ends the outbound pump once the
/// already queued payloads are flushed.
#[derive(Debug)]
pub struct Mailbox {
    tx: Option<mpsc::Sender<Payload>>,
}

impl Mailbox {
    /// Create a mailbox holding at most `capacity` payloads
    pub fn new(capacity: usize) -> (Self, MailboxReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Queue without waiting. `false` means the peer is unreachable:
    /// the queue is full, the pump is gone, or the mailbox was closed.
    pub fn try_deliver(&self, payload: Payload) -> bool {
        match &self.tx {
            Some(tx) => match tx.try_send(payload) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
            },
            None => false,
        }
    }

    pub fn close(&mut self) {
        self.tx = None;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.as_ref().map_or(true, |tx| tx.is_closed())
    }
}

/// Identifies one connection of a peer, surviving peer id reuse
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerKey {
    pub room_id: RoomId,
    pub peer_id: PeerId,
    pub session: Uuid,
}

/// A connected, identified participant
#[derive(Debug)]
pub struct Peer {
    identity: Identity,
    session: Uuid,
    joined_at: DateTime<Utc>,
    mailbox: Mailbox,
}

impl Peer {
    /// Create a peer with a fresh session and an empty mailbox
    pub fn new(identity: Identity, mailbox_capacity: usize) -> (Self, MailboxReceiver) {
        let (mailbox, rx) = Mailbox::new(mailbox_capacity);
        let peer = Self {
            identity,
            session: Uuid::new_v4(),
            joined_at: Utc::now(),
            mailbox,
        };
        (peer, rx)
    }

    pub fn id(&self) -> &PeerId {
        &self.identity.peer_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.identity.room_id
    }

    pub fn username(&self) -> &str {
        &self.identity.username
    }

    pub fn session(&self) -> Uuid {
        self.session
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    pub fn key(&self) -> PeerKey {
        PeerKey {
            room_id: self.identity.room_id.clone(),
            peer_id: self.identity.peer_id.clone(),
            session: self.session,
        }
    }

    pub fn user_info(&self) -> UserInfo {
        self.identity.user_info()
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn mailbox_mut(&mut self) -> &mut Mailbox {
        &mut self.mailbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new("a", "r1", "Alice").unwrap()
    }

    #[test]
    fn test_mailbox_full_rejects() {
        let (mailbox, mut rx) = Mailbox::new(1);
        assert!(mailbox.try_deliver(Arc::from("one")));
        assert!(!mailbox.try_deliver(Arc::from("two")));

        assert_eq!(&*rx.try_recv().unwrap(), "one");
        assert!(mailbox.try_deliver(Arc::from("three")));
    }

    #[test]
    fn test_mailbox_close_ends_receiver() {
        let (mut mailbox, mut rx) = Mailbox::new(4);
        assert!(mailbox.try_deliver(Arc::from("queued")));
        mailbox.close();

        assert!(mailbox.is_closed());
        assert!(!mailbox.try_deliver(Arc::from("late")));
        assert_eq!(&*rx.try_recv().unwrap(), "queued");
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_dropped_receiver_is_unreachable() {
        let (mailbox, rx) = Mailbox::new(4);
        drop(rx);
        assert!(mailbox.is_closed());
        assert!(!mailbox.try_deliver(Arc::from("x")));
    }

    #[test]
    fn test_sessions_are_unique() {
        let (p1, _rx1) = Peer::new(identity(), 4);
        let (p2, _rx2) = Peer::new(identity(), 4);
        assert_eq!(p1.id(), p2.id());
        assert_ne!(p1.key(), p2.key());
    }
}
