// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for decode loops
//!
//! Capture devices are read with blocking calls, so each running engine owns
//! one thread. This module gives every platform the same start/stop/join
//! handling and paces decode attempts to the configured frame rate.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Action returned by the loop body to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Controller for a decode loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let decode_loop = DecodeLoop::start_with_init(
///     "v4l2:/dev/video0",
///     Duration::from_millis(100),
///     || open_stream(path),
///     |stream| {
///         decode_next_frame(stream);
///         LoopAction::Continue
///     },
/// );
///
/// // Later, from the async side
/// tokio::task::spawn_blocking(move || decode_loop.stop()).await?;
/// ```
pub struct DecodeLoop {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl DecodeLoop {
    /// Start a loop with one-time initialization
    ///
    /// `init_fn` runs on the loop thread and acquires whatever the loop reads
    /// from (device stream, decoded image). If it fails the thread exits and
    /// `step_fn` never runs. `step_fn` runs at most once per `interval`.
    pub fn start_with_init<S, I, F>(name: &str, interval: Duration, init_fn: I, mut step_fn: F) -> Self
    where
        S: 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, interval_ms = interval.as_millis() as u64, "Starting decode loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Decode loop thread started, initializing...");

            let mut state = match init_fn() {
                Ok(s) => s,
                Err(e) => {
                    warn!(name = %name_clone, error = %e, "Initialization failed");
                    return;
                }
            };

            let mut last_step: Option<Instant> = None;

            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                if let Some(last) = last_step {
                    let elapsed = last.elapsed();
                    if elapsed < interval {
                        thread::sleep((interval - elapsed).min(Duration::from_millis(50)));
                        continue;
                    }
                }
                last_step = Some(Instant::now());

                match step_fn(&mut state) {
                    LoopAction::Continue => {}
                    LoopAction::Stop => {
                        debug!(name = %name_clone, "Loop requested stop");
                        break;
                    }
                }
            }

            info!(name = %name_clone, "Decode loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting decode loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Blocks; call from `spawn_blocking` when on the async runtime.
    pub fn stop(&mut self) -> Result<(), String> {
        self.request_stop();
        self.join()
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) -> Result<(), String> {
        let Some(handle) = self.thread_handle.take() else {
            return Ok(());
        };
        debug!(name = %self.name, "Waiting for decode loop thread to finish");
        handle.join().map_err(|e| {
            warn!(name = %self.name, "Decode loop thread panicked: {:?}", e);
            format!("decode loop {} panicked", self.name)
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for DecodeLoop {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "DecodeLoop dropped, stopping loop");
            let _ = self.stop();
        }
    }
}

impl std::fmt::Debug for DecodeLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeLoop")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_loop_stops_itself() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut decode_loop = DecodeLoop::start_with_init(
            "test-loop",
            Duration::ZERO,
            || Ok(()),
            move |_| {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                if count >= 10 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            },
        );

        decode_loop.join().unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut decode_loop = DecodeLoop::start_with_init(
            "test-loop",
            Duration::from_millis(5),
            || Ok(()),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            },
        );

        thread::sleep(Duration::from_millis(50));
        decode_loop.stop().unwrap();
        assert!(counter.load(Ordering::SeqCst) > 0);
        assert!(!decode_loop.is_running());
    }

    #[test]
    fn test_init_state_reaches_step() {
        let result = Arc::new(AtomicU32::new(0));
        let result_clone = Arc::clone(&result);

        let mut decode_loop = DecodeLoop::start_with_init(
            "test-init-loop",
            Duration::ZERO,
            || Ok(42u32),
            move |state| {
                result_clone.store(*state, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        decode_loop.join().unwrap();
        assert_eq!(result.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_init_failure_skips_step() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let mut decode_loop = DecodeLoop::start_with_init(
            "test-fail-init",
            Duration::ZERO,
            || Err::<(), _>("device busy".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        decode_loop.join().unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_interval_paces_steps() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut decode_loop = DecodeLoop::start_with_init(
            "test-paced",
            Duration::from_millis(40),
            || Ok(()),
            move |_| {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            },
        );

        thread::sleep(Duration::from_millis(100));
        decode_loop.stop().unwrap();
        // ~100ms at one step per 40ms
        assert!(counter.load(Ordering::SeqCst) <= 4);
    }
}
