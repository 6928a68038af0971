//! The boundary to the external display-painting collaborator.
//!
//! A *controller* is whatever actually puts a region's pixels on glass. It
//! lives outside this repository; the server only holds a weak registration
//! per surface key and talks to it through [`DisplayController`].
//!
//! Repaint requests are dispatched on a dedicated painter thread so a
//! connection thread never blocks on paint. A [`PaintFence`] counts paints
//! that are queued or running against a region; region teardown blocks on
//! the fence before the memory is unmapped, so a controller can never
//! observe freed memory.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;

use tracing::{debug, trace};

use crate::infrastructure::shm::ShmRegion;

/// The rectangle a repaint request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepaintRegion {
    /// Repaint the whole surface.
    Full,
    /// Repaint one rectangle.
    Rect { x: i32, y: i32, w: i32, h: i32 },
}

/// Implemented by the display-painting collaborator.
///
/// Both calls are invoked from server-owned threads and must not call back
/// into the registry; implementations typically queue work onto their own
/// event loop.
pub trait DisplayController: Send + Sync {
    /// Pairs (or, with `None`, unpairs) the controller with a region's
    /// memory. Invoked on match-up and on region teardown.
    fn associate_surface(&self, memory: Option<Arc<ShmRegion>>);

    /// Asks for a repaint of the associated memory.
    fn request_repaint(&self, region: RepaintRegion);
}

/// Counts in-flight paints against one region.
#[derive(Debug, Default)]
pub struct PaintFence {
    active: Mutex<usize>,
    idle: Condvar,
}

impl PaintFence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks one paint as queued or running.
    pub fn begin(&self) {
        let mut active = self.active.lock().expect("paint fence poisoned");
        *active += 1;
    }

    /// Marks one paint as finished and wakes teardown waiters.
    pub fn end(&self) {
        let mut active = self.active.lock().expect("paint fence poisoned");
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.idle.notify_all();
        }
    }

    /// Blocks until no paint is queued or running.
    pub fn wait_idle(&self) {
        let mut active = self.active.lock().expect("paint fence poisoned");
        while *active > 0 {
            active = self.idle.wait(active).expect("paint fence poisoned");
        }
    }
}

struct PaintJob {
    controller: Weak<dyn DisplayController>,
    region: RepaintRegion,
    fence: Arc<PaintFence>,
}

/// The painter thread and its queue.
///
/// Every repaint is queued here; the fence for the job's region was already
/// incremented by the enqueuer, and is decremented once the controller call
/// returns (or immediately, when the controller is gone).
pub struct PaintDispatcher {
    queue: mpsc::Sender<PaintJob>,
    worker: Option<JoinHandle<()>>,
}

impl PaintDispatcher {
    pub fn new() -> Self {
        let (queue, rx) = mpsc::channel::<PaintJob>();
        let worker = std::thread::Builder::new()
            .name("inkfb-painter".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    if let Some(controller) = job.controller.upgrade() {
                        trace!(region = ?job.region, "dispatching repaint");
                        controller.request_repaint(job.region);
                    }
                    job.fence.end();
                }
                debug!("painter thread exiting");
            })
            .expect("failed to spawn painter thread");
        Self {
            queue,
            worker: Some(worker),
        }
    }

    /// Queues a repaint. The caller must have called `fence.begin()` first;
    /// the fence is released when the paint completes.
    pub fn enqueue(
        &self,
        controller: Weak<dyn DisplayController>,
        region: RepaintRegion,
        fence: Arc<PaintFence>,
    ) {
        let job = PaintJob {
            controller,
            region,
            fence,
        };
        if let Err(mpsc::SendError(job)) = self.queue.send(job) {
            // Painter already shut down; nothing will paint, release the fence.
            job.fence.end();
        }
    }
}

impl Default for PaintDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for PaintDispatcher {
    fn drop(&mut self) {
        // Closing the queue lets the worker drain pending jobs and exit.
        let (closed, _) = mpsc::channel();
        self.queue = closed;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingController {
        repaints: Mutex<Vec<RepaintRegion>>,
    }

    impl RecordingController {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                repaints: Mutex::new(Vec::new()),
            })
        }
    }

    impl DisplayController for RecordingController {
        fn associate_surface(&self, _memory: Option<Arc<ShmRegion>>) {}

        fn request_repaint(&self, region: RepaintRegion) {
            self.repaints.lock().unwrap().push(region);
        }
    }

    #[test]
    fn test_enqueued_repaint_reaches_controller() {
        let dispatcher = PaintDispatcher::new();
        let controller = RecordingController::new();
        let fence = Arc::new(PaintFence::new());

        fence.begin();
        let weak: Weak<dyn DisplayController> =
            Arc::downgrade(&controller) as Weak<dyn DisplayController>;
        dispatcher.enqueue(weak, RepaintRegion::Rect { x: 10, y: 20, w: 100, h: 50 }, Arc::clone(&fence));
        fence.wait_idle();

        let seen = controller.repaints.lock().unwrap();
        assert_eq!(seen.as_slice(), &[RepaintRegion::Rect { x: 10, y: 20, w: 100, h: 50 }]);
    }

    #[test]
    fn test_fence_is_released_when_controller_is_gone() {
        let dispatcher = PaintDispatcher::new();
        let fence = Arc::new(PaintFence::new());
        let weak = {
            let controller = RecordingController::new();
            Arc::downgrade(&controller) as Weak<dyn DisplayController>
        };

        fence.begin();
        dispatcher.enqueue(weak, RepaintRegion::Full, Arc::clone(&fence));
        // Must not hang: the dead controller is skipped but the fence ends.
        fence.wait_idle();
    }

    #[test]
    fn test_wait_idle_blocks_until_slow_paint_finishes() {
        let dispatcher = PaintDispatcher::new();
        let painted = Arc::new(AtomicUsize::new(0));

        struct SlowController(Arc<AtomicUsize>);
        impl DisplayController for SlowController {
            fn associate_surface(&self, _m: Option<Arc<ShmRegion>>) {}
            fn request_repaint(&self, _r: RepaintRegion) {
                std::thread::sleep(Duration::from_millis(50));
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let controller: Arc<dyn DisplayController> =
            Arc::new(SlowController(Arc::clone(&painted)));
        let fence = Arc::new(PaintFence::new());
        fence.begin();
        dispatcher.enqueue(Arc::downgrade(&controller), RepaintRegion::Full, Arc::clone(&fence));

        fence.wait_idle();
        assert_eq!(painted.load(Ordering::SeqCst), 1, "paint must complete before idle");
    }
}
