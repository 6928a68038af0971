//! Emulated device queues and their fork-safe generations.
//!
//! Every opened emulated device is a pipe: the application reads
//! `input_event` records from the read end, the polling thread writes to the
//! write end. The read end doubles as the file descriptor the application
//! sees, so `read(2)`, `poll(2)` and `select(2)` work unmodified.
//!
//! Generations handle fork. Pipes and their descriptors are inherited by a
//! forked child, so events written in the child must still reach devices the
//! parent opened before the fork. Each process owns exactly one generation;
//! a child's generation links to the parent's now-frozen table, and fan-out
//! walks the whole ancestry chain. Closing only ever removes from the own
//! generation, an inherited duplicate descriptor may outlive it harmlessly.

use std::collections::HashMap;
use std::io;
use std::os::fd::RawFd;
use std::sync::Mutex;

use inkfb_core::domain::family::DeviceClass;
use tracing::{debug, warn};

use crate::events::InputEvent;

#[derive(Debug, Clone, Copy)]
struct EmulatedQueue {
    class: DeviceClass,
    read_fd: RawFd,
    write_fd: RawFd,
}

/// One process's table of open emulated devices, linked to its ancestors'.
pub struct QueueGeneration {
    queues: Mutex<HashMap<RawFd, EmulatedQueue>>,
    parent: Option<&'static QueueGeneration>,
}

impl QueueGeneration {
    pub fn new(parent: Option<&'static QueueGeneration>) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            parent,
        }
    }

    /// Opens a fresh queue for `class` and returns the fd the application
    /// will read events from. `O_NONBLOCK` from the intercepted open call
    /// carries over to the pipe.
    pub fn open_queue(&self, class: DeviceClass, flags: libc::c_int) -> io::Result<RawFd> {
        let mut fds = [0 as RawFd; 2];
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), flags & libc::O_NONBLOCK) };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        let queue = EmulatedQueue {
            class,
            read_fd: fds[0],
            write_fd: fds[1],
        };
        debug!(?class, fd = queue.read_fd, "opened emulated device");
        self.queues
            .lock()
            .expect("queue table poisoned")
            .insert(queue.read_fd, queue);
        Ok(queue.read_fd)
    }

    /// Closes a queue owned by this generation. `false` when the fd is not
    /// ours, including fds that belong to an ancestor generation.
    pub fn close_queue(&self, fd: RawFd) -> bool {
        let Some(queue) = self
            .queues
            .lock()
            .expect("queue table poisoned")
            .remove(&fd)
        else {
            return false;
        };
        unsafe {
            libc::close(queue.read_fd);
            libc::close(queue.write_fd);
        }
        true
    }

    /// The device class behind `fd`, searching the whole ancestry chain.
    pub fn class_of(&self, fd: RawFd) -> Option<DeviceClass> {
        let mut current = Some(self);
        while let Some(generation) = current {
            if let Some(queue) = generation
                .queues
                .lock()
                .expect("queue table poisoned")
                .get(&fd)
            {
                return Some(queue.class);
            }
            current = generation.parent;
        }
        None
    }

    /// Writes a sequence of events to every queue of `class` in this
    /// generation and every ancestor generation.
    pub fn push_to_class(&self, class: DeviceClass, events: &[InputEvent]) {
        let mut current = Some(self);
        while let Some(generation) = current {
            let targets: Vec<RawFd> = {
                let queues = generation.queues.lock().expect("queue table poisoned");
                queues
                    .values()
                    .filter(|q| q.class == class)
                    .map(|q| q.write_fd)
                    .collect()
            };
            for write_fd in targets {
                for event in events {
                    let bytes = event.as_bytes();
                    let rc = unsafe {
                        libc::write(write_fd, bytes.as_ptr() as *const libc::c_void, bytes.len())
                    };
                    if rc < 0 {
                        warn!(fd = write_fd, "event write failed");
                        break;
                    }
                }
            }
            current = generation.parent;
        }
    }
}

impl Default for QueueGeneration {
    fn default() -> Self {
        Self::new(None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
