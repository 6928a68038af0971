//! The surface registry.
//!
//! One registry instance owns every region, every attachment and every
//! controller binding, all guarded by a single mutex. Sessions and the
//! input fan-out go through it; nothing in the server holds surface state
//! anywhere else.
//!
//! Lifecycle rules enforced here:
//! - the first INITIALIZE for a key allocates the region; later ones with an
//!   equal geometry join it, unequal ones are rejected;
//! - the last detach tears the region down, and teardown waits on the paint
//!   fence so the painting collaborator never touches unmapped memory;
//! - a torn-down key is never resurrected with the old identity, the next
//!   INITIALIZE allocates a fresh shared-memory object.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, Weak};

use inkfb_core::domain::surface::{SurfaceKey, SurfaceSpec};
use inkfb_core::protocol::codec::encode_server_message;
use inkfb_core::protocol::messages::{ServerMessage, UserInput};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::controller::{
    DisplayController, PaintDispatcher, PaintFence, RepaintRegion,
};
use crate::infrastructure::shm::{ShmError, ShmRegion};

/// Errors surfaced to sessions and controller hosts.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("surface {key} already exists with {existing:?}, refusing {requested:?}")]
    SpecMismatch {
        key: SurfaceKey,
        existing: SurfaceSpec,
        requested: SurfaceSpec,
    },

    #[error("no surface registered under key {0}")]
    UnknownSurface(SurfaceKey),

    #[error("a live controller is already bound to key {0}")]
    ControllerAlreadyBound(SurfaceKey),

    #[error(transparent)]
    Shm(#[from] ShmError),
}

/// Where the registry pushes server-to-client packets for one attachment.
///
/// Sessions implement this over their seqpacket stream; tests implement it
/// over a `Vec`.
pub trait AttachmentSink: Send + Sync {
    fn deliver(&self, packet: &[u8]) -> io::Result<()>;
}

/// Handle returned from a successful attach.
#[derive(Debug)]
pub struct Attachment {
    pub id: u64,
    pub memory: Arc<ShmRegion>,
}

struct SurfaceEntry {
    memory: Arc<ShmRegion>,
    fence: Arc<PaintFence>,
    attachments: Vec<(u64, Arc<dyn AttachmentSink>)>,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<SurfaceKey, SurfaceEntry>,
    controllers: HashMap<SurfaceKey, Weak<dyn DisplayController>>,
    next_attachment_id: u64,
}

/// The single owned registry. Cloneable handles share one state.
pub struct SurfaceRegistry {
    state: Mutex<RegistryState>,
    dispatcher: PaintDispatcher,
}

impl SurfaceRegistry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            dispatcher: PaintDispatcher::new(),
        }
    }

    /// Attaches a client to `key`, allocating the region on first attach.
    ///
    /// A second attach with a different geometry is a protocol violation and
    /// is rejected without disturbing the existing region.
    pub fn initialize(
        &self,
        key: SurfaceKey,
        requested: SurfaceSpec,
        sink: Arc<dyn AttachmentSink>,
    ) -> Result<Attachment, RegistryError> {
        let mut state = self.state.lock().expect("registry lock poisoned");
        let id = state.next_attachment_id;
        state.next_attachment_id += 1;

        if let Some(entry) = state.entries.get_mut(&key) {
            let existing = entry.memory.spec();
            if existing != requested {
                return Err(RegistryError::SpecMismatch {
                    key,
                    existing,
                    requested,
                });
            }
            entry.attachments.push((id, sink));
            debug!(key, attachment = id, peers = entry.attachments.len(), "joined surface");
            return Ok(Attachment {
                id,
                memory: Arc::clone(&entry.memory),
            });
        }

        let memory = Arc::new(ShmRegion::create(requested)?);
        info!(key, shm_id = memory.shm_id(), "created surface");
        if let Some(controller) = live_controller(&state.controllers, key) {
            controller.associate_surface(Some(Arc::clone(&memory)));
        }
        state.entries.insert(
            key,
            SurfaceEntry {
                memory: Arc::clone(&memory),
                fence: Arc::new(PaintFence::new()),
                attachments: vec![(id, sink)],
            },
        );
        Ok(Attachment { id, memory })
    }

    /// Queues a repaint for `key`. Non-blocking for the caller.
    pub fn update(&self, key: SurfaceKey, region: RepaintRegion) -> Result<(), RegistryError> {
        let state = self.state.lock().expect("registry lock poisoned");
        let entry = state
            .entries
            .get(&key)
            .ok_or(RegistryError::UnknownSurface(key))?;
        let Some(controller) = live_controller(&state.controllers, key) else {
            // No painter bound yet; the update is simply dropped, the
            // controller repaints everything when it binds.
            return Ok(());
        };
        entry.fence.begin();
        self.dispatcher.enqueue(
            Arc::downgrade(&controller),
            region,
            Arc::clone(&entry.fence),
        );
        Ok(())
    }

    /// Removes one attachment. When it is the last, the region is torn down:
    /// the fence is drained, the controller is disassociated, and the memory
    /// identity is gone for good.
    pub fn detach(&self, key: SurfaceKey, attachment_id: u64) {
        let (entry, controller) = {
            let mut state = self.state.lock().expect("registry lock poisoned");
            let Some(mut entry) = state.entries.remove(&key) else {
                return;
            };
            entry.attachments.retain(|(id, _)| *id != attachment_id);
            if !entry.attachments.is_empty() {
                debug!(key, attachment = attachment_id, "detached, surface lives on");
                state.entries.insert(key, entry);
                return;
            }
            let controller = live_controller(&state.controllers, key);
            (entry, controller)
        };

        // The lock is released: in-flight paints may still be running and
        // must finish against a valid mapping.
        entry.fence.wait_idle();
        if let Some(controller) = controller {
            // A re-attach may have raced the fence drain and now owns the
            // association; only a still-absent key is disassociated.
            let state = self.state.lock().expect("registry lock poisoned");
            if !state.entries.contains_key(&key) {
                controller.associate_surface(None);
            }
        }
        info!(key, shm_id = entry.memory.shm_id(), "surface torn down");
        drop(entry.memory);
    }

    /// Binds the painting collaborator for `key`.
    ///
    /// A second registration while the first is alive is a host bug: it is
    /// logged and rejected. A stale binding (dropped collaborator) is
    /// replaced silently.
    pub fn register_controller(
        &self,
        key: SurfaceKey,
        controller: &Arc<dyn DisplayController>,
    ) -> Result<(), RegistryError> {
        let mut state = self.state.lock().expect("registry lock poisoned");
        if live_controller(&state.controllers, key).is_some() {
            warn!(key, "rejected duplicate controller registration");
            return Err(RegistryError::ControllerAlreadyBound(key));
        }
        state.controllers.insert(key, Arc::downgrade(controller));
        if let Some(entry) = state.entries.get(&key) {
            controller.associate_surface(Some(Arc::clone(&entry.memory)));
        }
        debug!(key, "controller registered");
        Ok(())
    }

    /// Replaces the binding for `key` with an updated collaborator
    /// reference, associating the current region if one exists. Used when a
    /// host rebuilds its painting object for a key it already owns.
    pub fn reparent_controller(&self, key: SurfaceKey, controller: &Arc<dyn DisplayController>) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.controllers.insert(key, Arc::downgrade(controller));
        if let Some(entry) = state.entries.get(&key) {
            controller.associate_surface(Some(Arc::clone(&entry.memory)));
        }
        debug!(key, "controller reparented");
    }

    /// Drops the binding for `key`.
    pub fn unregister_controller(&self, key: SurfaceKey) {
        let mut state = self.state.lock().expect("registry lock poisoned");
        state.controllers.remove(&key);
        debug!(key, "controller unregistered");
    }

    /// Whether a region currently exists under `key`.
    pub fn is_associated(&self, key: SurfaceKey) -> bool {
        let state = self.state.lock().expect("registry lock poisoned");
        state.entries.contains_key(&key)
    }

    /// Encodes one input event and delivers it to every attachment of `key`.
    ///
    /// A failing sink is logged and skipped; its session thread observes the
    /// broken connection on its own and detaches.
    pub fn forward_user_input(
        &self,
        key: SurfaceKey,
        input: UserInput,
    ) -> Result<(), RegistryError> {
        let packet = encode_server_message(&ServerMessage::UserInput(input));
        let state = self.state.lock().expect("registry lock poisoned");
        let Some(entry) = state.entries.get(&key) else {
            return Err(RegistryError::UnknownSurface(key));
        };
        for (id, sink) in &entry.attachments {
            if let Err(err) = sink.deliver(&packet) {
                warn!(key, attachment = id, %err, "input delivery failed");
            }
        }
        Ok(())
    }
}

impl Default for SurfaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn live_controller(
    controllers: &HashMap<SurfaceKey, Weak<dyn DisplayController>>,
    key: SurfaceKey,
) -> Option<Arc<dyn DisplayController>> {
    controllers.get(&key).and_then(Weak::upgrade)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
