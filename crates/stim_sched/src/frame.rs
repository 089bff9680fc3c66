//! The frame loop.
//!
//! Drives a [`Scheduler`] at display rate: one [`Scheduler::run_once`] per
//! frame, followed by a render of the current visual state, then pacing
//! until the next frame. A [`StopHandle`] requests a cooperative stop,
//! observed at the top of the next frame; an in-progress frame is never
//! interrupted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::scheduler::Scheduler;
use crate::task::Signal;

/// Configuration for the frame loop.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Target frames per second.
    pub frame_rate: f64,
    /// Maximum number of frames to run (0 = until the scheduler drains).
    pub max_frames: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_rate: 60.0,
            max_frames: 0,
        }
    }
}

/// Cooperative stop flag for a running [`FrameLoop`].
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request a stop at the top of the next frame.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The per-frame driver for a [`Scheduler`].
#[derive(Debug)]
pub struct FrameLoop {
    config: FrameConfig,
    frame_id: u64,
    stop: Arc<AtomicBool>,
}

impl FrameLoop {
    #[must_use]
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            frame_id: 0,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the number of frames executed so far.
    #[must_use]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// A handle that can stop the loop from another owner.
    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.stop))
    }

    /// Run the loop until the scheduler drains, the stop flag is raised, or
    /// `max_frames` is reached.
    ///
    /// `render` is invoked after each frame's scheduler work, but not after
    /// the frame in which the scheduler reports [`Signal::Terminate`].
    /// Returns the last signal observed from the scheduler.
    pub fn run(&mut self, scheduler: &mut Scheduler, mut render: impl FnMut()) -> Signal {
        let frame_duration = Duration::from_secs_f64(1.0 / self.config.frame_rate);

        info!(
            frame_rate = self.config.frame_rate,
            max_frames = self.config.max_frames,
            "starting frame loop"
        );

        let mut last = Signal::Continue;
        loop {
            // Stop is observed before a frame's work begins, never mid-frame.
            if self.stop.load(Ordering::SeqCst) {
                info!(frames = self.frame_id, "frame loop stopped");
                return last;
            }

            let start = Instant::now();
            self.frame_id += 1;

            last = scheduler.run_once();
            if last == Signal::Terminate {
                info!(frames = self.frame_id, "scheduler drained");
                return last;
            }

            render();
            debug!(frame_id = self.frame_id, signal = ?last, "frame complete");

            if self.config.max_frames > 0 && self.frame_id >= self.config.max_frames {
                info!(frames = self.frame_id, "frame budget reached");
                return last;
            }

            let elapsed = start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            } else {
                warn!(
                    frame_id = self.frame_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    budget_ms = frame_duration.as_millis() as u64,
                    "frame exceeded time budget"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use crate::task::{Task, TaskArgs};

    use super::*;

    fn fast_config(max_frames: u64) -> FrameConfig {
        FrameConfig {
            frame_rate: 10_000.0,
            max_frames,
        }
    }

    #[test]
    fn test_drains_and_reports_terminate() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(Task::step(|_| Signal::Continue), TaskArgs::none());

        let renders = Arc::new(AtomicUsize::new(0));
        let renders_in_cb = Arc::clone(&renders);
        let mut frame_loop = FrameLoop::new(fast_config(0));
        let signal = frame_loop.run(&mut scheduler, move || {
            renders_in_cb.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(signal, Signal::Terminate);
        // The terminating frame does not render.
        assert_eq!(renders.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_repeat_runs_one_frame_at_a_time() {
        let frames_wanted = 4usize;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_task = Arc::clone(&calls);

        let mut scheduler = Scheduler::new();
        scheduler.enqueue(
            Task::step(move |_| {
                if calls_in_task.fetch_add(1, Ordering::SeqCst) + 1 < frames_wanted {
                    Signal::Repeat
                } else {
                    Signal::Continue
                }
            }),
            TaskArgs::none(),
        );

        let renders = Arc::new(AtomicUsize::new(0));
        let renders_in_cb = Arc::clone(&renders);
        let mut frame_loop = FrameLoop::new(fast_config(0));
        frame_loop.run(&mut scheduler, move || {
            renders_in_cb.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(calls.load(Ordering::SeqCst), frames_wanted);
        // One render per repeating frame; the final (terminating) frame does
        // not render.
        assert_eq!(renders.load(Ordering::SeqCst), frames_wanted - 1);
        assert_eq!(frame_loop.frame_id(), frames_wanted as u64);
    }

    #[test]
    fn test_max_frames_bounds_the_loop() {
        let mut scheduler = Scheduler::new();
        scheduler.enqueue(Task::step(|_| Signal::Repeat), TaskArgs::none());

        let mut frame_loop = FrameLoop::new(fast_config(5));
        let signal = frame_loop.run(&mut scheduler, || {});
        assert_eq!(signal, Signal::Repeat);
        assert_eq!(frame_loop.frame_id(), 5);
    }

    #[test]
    fn test_stop_handle_observed_before_next_frame() {
        let mut scheduler = Scheduler::new();
        let mut frame_loop = FrameLoop::new(fast_config(0));
        let handle = frame_loop.stop_handle();

        // Stop raised from within a task: the current frame finishes, the
        // next one never starts.
        let handle_in_task = handle.clone();
        scheduler.enqueue(
            Task::step(move |_| {
                handle_in_task.stop();
                Signal::Repeat
            }),
            TaskArgs::none(),
        );

        let signal = frame_loop.run(&mut scheduler, || {});
        assert_eq!(signal, Signal::Repeat);
        assert_eq!(frame_loop.frame_id(), 1);
        assert!(handle.is_stopped());
    }
}
