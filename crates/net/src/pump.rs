//! Per-connection message pumps
//!
//! Each peer runs two tasks: the inbound pump decodes frames and feeds the
//! hub, the outbound pump drains the peer's mailbox onto the transport.
//! The outbound pump is the only writer of a connection.

use signalhub_core::Identity;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hub::HubHandle;
use crate::peer::{MailboxReceiver, Peer, PeerKey};
use crate::protocol::Envelope;
use crate::transport::{FrameSink, FrameSource};

/// Join the hub and run both pumps until the connection ends
///
/// Returns once the inbound side has finished and the outbound side has
/// flushed and closed. Fails only if the hub is gone before the join.
pub async fn serve<S, K>(
    hub: HubHandle,
    identity: Identity,
    source: S,
    sink: K,
    mailbox_capacity: usize,
) -> Result<()>
where
    S: FrameSource,
    K: FrameSink,
{
    let (peer, mailbox) = Peer::new(identity.clone(), mailbox_capacity);
    let key = peer.key();

    hub.join(peer).await?;

    let outbound = tokio::spawn(run_outbound(sink, mailbox, key.clone()));
    run_inbound(source, &identity, key.clone(), &hub).await;

    if let Err(e) = outbound.await {
        warn!(peer_id = %key.peer_id, error = %e, "Outbound pump panicked");
    }
    Ok(())
}

/// Read frames until the transport ends, then leave exactly once
pub async fn run_inbound<S: FrameSource>(
    mut source: S,
    identity: &Identity,
    key: PeerKey,
    hub: &HubHandle,
) {
    loop {
        let frame = match source.next_frame().await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!(peer_id = %key.peer_id, "Connection closed");
                break;
            }
            Err(e) => {
                debug!(peer_id = %key.peer_id, error = %e, "Read error");
                break;
            }
        };

        let mut envelope = match Envelope::from_bytes(&frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(peer_id = %key.peer_id, error = %e, "Skipping malformed frame");
                continue;
            }
        };

        if !envelope.kind.is_signal() {
            debug!(peer_id = %key.peer_id, kind = ?envelope.kind, "Ignoring hub-only message type");
            continue;
        }

        envelope.stamp(identity);
        if hub.route(envelope).await.is_err() {
            warn!(peer_id = %key.peer_id, "Hub gone, dropping connection");
            break;
        }
    }

    drop(source);
    if hub.leave(key).await.is_err() {
        debug!("Hub gone before leave");
    }
}

/// Write mailbox payloads until the mailbox closes, then close the transport
pub async fn run_outbound<K: FrameSink>(mut sink: K, mut mailbox: MailboxReceiver, key: PeerKey) {
    while let Some(payload) = mailbox.recv().await {
        if let Err(e) = sink.send_frame(payload).await {
            debug!(peer_id = %key.peer_id, error = %e, "Write failed");
            // Dropping the receiver makes the next fan-out evict this peer
            return;
        }
    }

    if let Err(e) = sink.close().await {
        debug!(peer_id = %key.peer_id, error = %e, "Close failed");
    }
}
