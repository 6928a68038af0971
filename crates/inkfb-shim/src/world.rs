//! Per-process shim state.
//!
//! Exactly one [`World`] is live per process. It is built lazily on the
//! first intercepted call, leaked for the process lifetime, and rebuilt
//! after fork: the child gets a fresh connection and a fresh queue
//! generation linked to the parent's inherited table, never a shared one.
//!
//! An intercepted call made *by* shim internals (connecting, resolving
//! identities) must never recurse into the shim; the thread-local reentry
//! guard routes those straight to the real libc.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use inkfb_client::ClientConnection;
use inkfb_core::protocol::messages::ServerMessage;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::config::ShimConfig;
use crate::fb::{FramebufferShim, UpdateSink};
use crate::input::InputShim;
use crate::interpose::RealLibc;
use crate::queues::QueueGeneration;

pub struct World {
    pub config: ShimConfig,
    pub real: RealLibc,
    pub connection: Mutex<Option<ClientConnection>>,
    pub fb: Option<FramebufferShim>,
    pub input: Option<InputShim>,
    pub queues: QueueGeneration,
    pub pid: libc::pid_t,
    surface_width: i32,
    surface_height: i32,
    polling: AtomicBool,
}

static CURRENT: Mutex<Option<&'static World>> = Mutex::new(None);
static FORK_REINIT: AtomicBool = AtomicBool::new(false);
static HOOKS: Once = Once::new();
static TRACING: Once = Once::new();

thread_local! {
    static IN_SHIM: Cell<bool> = const { Cell::new(false) };
}

/// Marks this thread as inside shim logic for its lifetime.
pub struct ReentryGuard;

impl Drop for ReentryGuard {
    fn drop(&mut self) {
        IN_SHIM.with(|flag| flag.set(false));
    }
}

/// `None` when the current thread is already inside the shim; the caller
/// must then pass straight through to the real libc.
pub fn enter() -> Option<ReentryGuard> {
    IN_SHIM.with(|flag| {
        if flag.get() {
            None
        } else {
            flag.set(true);
            Some(ReentryGuard)
        }
    })
}

/// The current process's world, building or rebuilding it as needed.
pub fn world() -> &'static World {
    let mut guard = CURRENT.lock().unwrap_or_else(|poison| poison.into_inner());
    let pid = unsafe { libc::getpid() };
    let reinit = FORK_REINIT.swap(false, Ordering::SeqCst);
    if let Some(current) = *guard {
        if current.pid == pid && !reinit {
            return current;
        }
    }

    // Fresh process (or first call): the previous world's queue table, if
    // any, becomes the parent link for inherited descriptors.
    let parent = guard.as_ref().map(|w| &w.queues);
    let world: &'static World = Box::leak(Box::new(World::build(parent, pid)));
    *guard = Some(world);
    drop(guard);

    if world.input.is_some() {
        spawn_polling_thread(world);
    }
    HOOKS.call_once(|| unsafe {
        libc::pthread_atfork(None, None, Some(after_fork_in_child));
        libc::atexit(teardown);
    });
    world
}

extern "C" fn after_fork_in_child() {
    // Only an atomic store here: the child may hold no locks yet. The next
    // intercepted call rebuilds the world.
    FORK_REINIT.store(true, Ordering::SeqCst);
}

extern "C" fn teardown() {
    let Ok(guard) = CURRENT.lock() else { return };
    let Some(world) = *guard else { return };
    if world.pid != unsafe { libc::getpid() } {
        // An inherited atexit in a child that never rebuilt; not ours.
        return;
    }
    world.polling.store(false, Ordering::SeqCst);
    // Dropping the connection sends TERMINATE and detaches the surface.
    if let Ok(mut connection) = world.connection.lock() {
        connection.take();
    }
}

impl World {
    // Runs with the caller's reentry guard held: libc calls made in here
    // route through the pass-through path, never back into the shim.
    fn build(parent: Option<&'static QueueGeneration>, pid: libc::pid_t) -> Self {
        TRACING.call_once(|| {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_writer(std::io::stderr)
                .try_init();
        });

        let config = ShimConfig::from_env();
        let real = *crate::interpose::real_libc();

        let mut connection = None;
        let mut fb = None;
        let (mut surface_width, mut surface_height) = (0, 0);
        if config.shim_fb || config.shim_input {
            // A shimmed application cannot run without its surface, so the
            // fail-fast establish is the right call here.
            let mut established =
                ClientConnection::establish(config.key, config.format, None, false);
            let spec = established.spec();
            surface_width = spec.width as i32;
            surface_height = spec.height as i32;
            if config.shim_fb {
                let mapping = established.framebuffer();
                let base = mapping.as_ptr() as usize;
                let len = mapping.len();
                fb = Some(FramebufferShim::new(established.shm_fd(), base, len, spec));
            }
            connection = Some(established);
        }

        let input = config
            .shim_input
            .then(|| InputShim::new(config.family.profile(), config.resolve_identities(&real)));

        info!(
            key = config.key,
            pid,
            fb = config.shim_fb,
            input = config.shim_input,
            model = config.shim_model,
            "shim world ready"
        );
        Self {
            config,
            real,
            connection: Mutex::new(connection),
            fb,
            input,
            queues: QueueGeneration::new(parent),
            pid,
            surface_width,
            surface_height,
            polling: AtomicBool::new(true),
        }
    }

    pub fn surface_size(&self) -> (i32, i32) {
        (self.surface_width, self.surface_height)
    }
}

impl UpdateSink for World {
    fn complete_update(&self) {
        if let Ok(guard) = self.connection.lock() {
            if let Some(connection) = guard.as_ref() {
                let _ = connection.send_complete_update();
            }
        }
    }

    fn partial_update(&self, x: i32, y: i32, w: i32, h: i32) {
        if let Ok(guard) = self.connection.lock() {
            if let Some(connection) = guard.as_ref() {
                let _ = connection.send_partial_update(x, y, w, h);
            }
        }
    }
}

/// Drains the server connection and feeds the input layer.
///
/// The connection is non-blocking; an empty poll sleeps briefly instead of
/// spinning, and the lock is released between polls so update triggers from
/// application threads interleave freely.
fn spawn_polling_thread(world: &'static World) {
    let builder = std::thread::Builder::new().name("inkfb-shim-poll".to_string());
    let spawned = builder.spawn(move || {
        debug!("input polling thread running");
        while world.polling.load(Ordering::SeqCst) {
            let message = {
                match world.connection.lock() {
                    Ok(guard) => guard.as_ref().and_then(|c| c.poll_server_packet()),
                    Err(_) => None,
                }
            };
            match message {
                Some(ServerMessage::UserInput(input)) => {
                    if let Some(input_shim) = &world.input {
                        let (width, height) = world.surface_size();
                        input_shim.dispatch(input, width, height, &world.queues);
                    }
                }
                Some(_) => {}
                None => std::thread::sleep(Duration::from_millis(2)),
            }
        }
    });
    if spawned.is_err() {
        world.polling.store(false, Ordering::SeqCst);
    }
}
