//! Per-connection session state machine.
//!
//! Each accepted connection runs one of these on its own thread:
//! `Uninitialized` until a valid INITIALIZE attaches it to a surface,
//! `Attached` while updates flow, closed on TERMINATE, disconnect or any
//! protocol violation. A violation never takes down anything beyond its own
//! connection.

use std::io;
use std::sync::Arc;

use inkfb_core::domain::surface::SurfaceSpec;
use inkfb_core::protocol::codec::{
    decode_client_message, encode_server_message, MAX_MESSAGE_SIZE,
};
use inkfb_core::protocol::messages::{ClientMessage, ServerMessage};
use tracing::{debug, info, warn};

use crate::application::controller::RepaintRegion;
use crate::application::registry::{Attachment, AttachmentSink, SurfaceRegistry};
use crate::infrastructure::transport::SeqPacketStream;

/// AttachmentSink over the session's own stream; the registry uses it to
/// fan input out from other threads while this thread blocks in recv.
struct StreamSink(Arc<SeqPacketStream>);

impl AttachmentSink for StreamSink {
    fn deliver(&self, packet: &[u8]) -> io::Result<()> {
        self.0.send_packet(packet)
    }
}

enum SessionState {
    Uninitialized,
    Attached { key: u32, attachment: Attachment },
}

pub struct ClientSession {
    stream: Arc<SeqPacketStream>,
    registry: Arc<SurfaceRegistry>,
}

impl ClientSession {
    pub fn new(stream: SeqPacketStream, registry: Arc<SurfaceRegistry>) -> Self {
        Self {
            stream: Arc::new(stream),
            registry,
        }
    }

    /// Drives the connection until it closes, then detaches if attached.
    pub fn run(self) {
        let mut state = SessionState::Uninitialized;
        let mut buf = [0u8; MAX_MESSAGE_SIZE];

        loop {
            let n = match self.stream.recv_packet(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => n,
            };
            let message = match decode_client_message(&buf[..n]) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "malformed client packet, closing connection");
                    break;
                }
            };
            let (next, close) = self.step(state, message);
            state = next;
            if close {
                break;
            }
        }

        if let SessionState::Attached { key, attachment } = state {
            debug!(key, attachment = attachment.id, "session closed");
            self.registry.detach(key, attachment.id);
        }
    }

    /// One protocol step. A `true` close flag ends the connection; the
    /// state is handed back either way, so the detach at the end of
    /// [`run`](Self::run) sees the attachment no matter how the session
    /// closed.
    fn step(&self, state: SessionState, message: ClientMessage) -> (SessionState, bool) {
        match (state, message) {
            (SessionState::Uninitialized, ClientMessage::Initialize { key, format }) => {
                self.attach(key, SurfaceSpec::with_default_resolution(format))
            }
            (
                SessionState::Uninitialized,
                ClientMessage::InitializeCustom {
                    key,
                    format,
                    width,
                    height,
                },
            ) => self.attach(
                key,
                SurfaceSpec {
                    format,
                    width: u32::from(width),
                    height: u32::from(height),
                },
            ),
            // A TERMINATE before INITIALIZE is a quiet close, not a violation.
            (SessionState::Uninitialized, ClientMessage::Terminate) => {
                (SessionState::Uninitialized, true)
            }
            (SessionState::Uninitialized, other) => {
                warn!(?other, "message before INITIALIZE, closing connection");
                (SessionState::Uninitialized, true)
            }
            (SessionState::Attached { key, attachment }, ClientMessage::UpdateAll) => {
                if let Err(err) = self.registry.update(key, RepaintRegion::Full) {
                    warn!(key, %err, "update failed");
                }
                (SessionState::Attached { key, attachment }, false)
            }
            (
                SessionState::Attached { key, attachment },
                ClientMessage::UpdatePartial { x, y, w, h },
            ) => {
                if let Err(err) = self.registry.update(key, RepaintRegion::Rect { x, y, w, h }) {
                    warn!(key, %err, "update failed");
                }
                (SessionState::Attached { key, attachment }, false)
            }
            (state @ SessionState::Attached { .. }, ClientMessage::Terminate) => (state, true),
            (state @ SessionState::Attached { .. }, other) => {
                warn!(?other, "re-initialize on an attached connection, closing");
                (state, true)
            }
        }
    }

    fn attach(&self, key: u32, spec: SurfaceSpec) -> (SessionState, bool) {
        let sink = Arc::new(StreamSink(Arc::clone(&self.stream)));
        let attachment = match self.registry.initialize(key, spec, sink) {
            Ok(attachment) => attachment,
            Err(err) => {
                warn!(key, %err, "attach rejected, closing connection");
                return (SessionState::Uninitialized, true);
            }
        };
        let reply = ServerMessage::InitOk {
            shm_id: attachment.memory.shm_id(),
            shm_size: attachment.memory.len() as u64,
        };
        let packet = encode_server_message(&reply);
        if self.stream.send_packet(&packet).is_err() {
            self.registry.detach(key, attachment.id);
            return (SessionState::Uninitialized, true);
        }
        info!(key, attachment = attachment.id, "client attached");
        (SessionState::Attached { key, attachment }, false)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::transport::SeqPacketListener;
    use inkfb_core::protocol::codec::encode_client_message;
    use inkfb_core::protocol::messages::PixelFormat;
    use std::path::PathBuf;
    use std::thread::JoinHandle;

    fn temp_socket_path(name: &str) -> PathBuf {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::mem::forget(dir);
        path
    }

    fn session_pair(
        name: &str,
        registry: &Arc<SurfaceRegistry>,
    ) -> (SeqPacketStream, JoinHandle<()>) {
        let path = temp_socket_path(name);
        let listener = SeqPacketListener::bind(&path, 1).unwrap();
        let client = SeqPacketStream::connect(&path).unwrap();
        let server_side = listener.accept().unwrap();
        let session = ClientSession::new(server_side, Arc::clone(registry));
        let handle = std::thread::spawn(move || session.run());
        (client, handle)
    }

    fn initialize_small(client: &SeqPacketStream, key: u32) {
        let packet = encode_client_message(&ClientMessage::InitializeCustom {
            key,
            format: PixelFormat::Rgb565,
            width: 16,
            height: 8,
        });
        client.send_packet(&packet).unwrap();
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        let n = client.recv_packet(&mut buf).unwrap();
        assert!(matches!(
            inkfb_core::protocol::codec::decode_server_message(&buf[..n]).unwrap(),
            ServerMessage::InitOk { .. }
        ));
    }

    #[test]
    fn test_terminate_after_attach_detaches_the_surface() {
        let registry = Arc::new(SurfaceRegistry::new());
        let (client, handle) = session_pair("term.sock", &registry);
        initialize_small(&client, 7);
        assert!(registry.is_associated(7));

        let packet = encode_client_message(&ClientMessage::Terminate);
        client.send_packet(&packet).unwrap();
        handle.join().unwrap();
        assert!(!registry.is_associated(7));
    }

    #[test]
    fn test_disconnect_without_terminate_detaches_the_surface() {
        let registry = Arc::new(SurfaceRegistry::new());
        let (client, handle) = session_pair("drop.sock", &registry);
        initialize_small(&client, 8);
        assert!(registry.is_associated(8));

        drop(client);
        handle.join().unwrap();
        assert!(!registry.is_associated(8));
    }

    #[test]
    fn test_terminate_before_initialize_closes_quietly() {
        let registry = Arc::new(SurfaceRegistry::new());
        let (client, handle) = session_pair("preterm.sock", &registry);

        let packet = encode_client_message(&ClientMessage::Terminate);
        client.send_packet(&packet).unwrap();
        handle.join().unwrap();
        // The session hung up without attaching anything.
        let mut buf = [0u8; MAX_MESSAGE_SIZE];
        assert_eq!(client.recv_packet(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_violation_while_attached_still_detaches() {
        let registry = Arc::new(SurfaceRegistry::new());
        let (client, handle) = session_pair("violation.sock", &registry);
        initialize_small(&client, 9);

        // A second INITIALIZE on an attached connection is a violation.
        let packet = encode_client_message(&ClientMessage::Initialize {
            key: 9,
            format: PixelFormat::Rgb565,
        });
        client.send_packet(&packet).unwrap();
        handle.join().unwrap();
        assert!(!registry.is_associated(9));
    }
}
