/*
 *   Copyright (c) 2024-2025 R3BL LLC
 *   All rights reserved.
 *
 *   Licensed under the Apache License, Version 2.0 (the "License");
 *   you may not use this file except in compliance with the License.
 *   You may obtain a copy of the License at
 *
 *   http://www.apache.org/licenses/LICENSE-2.0
 *
 *   Unless required by applicable law or agreed to in writing, software
 *   distributed under the License is distributed on an "AS IS" BASIS,
 *   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *   See the License for the specific language governing permissions and
 *   limitations under the License.
 */

//! Single-threaded cooperative dispatcher driving one remote-control
//! invocation (spec.md §5): races the in-flight command against death
//! signals, giving a signalled command up to [`SHUTDOWN_DRAIN`] to send its
//! async-cancel message and read the host's acknowledgement before the
//! process unwinds.

mod signals;
mod stdin_reader;
mod timer_queue;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{DeathSignal, RcError};

pub use signals::Signals;
pub use stdin_reader::{spawn as spawn_stdin_reader, StdinReceiver};
pub use timer_queue::TimerQueue;

/// How long a signalled command gets to send its cancel message and drain
/// the host's response before the process exits regardless (spec.md §5).
pub const SHUTDOWN_DRAIN: Duration = Duration::from_secs(2);

/// Owns the process-level signal registrations for one dispatcher run.
pub struct EventLoop {
    signals: Signals,
}

impl EventLoop {
    pub fn new() -> Result<EventLoop, RcError> {
        Ok(EventLoop {
            signals: Signals::new()?,
        })
    }

    /// Runs `body` to completion, or until a death signal (`INT`/`TERM`/
    /// `HUP`) arrives first. On a signal, `on_cancel` is awaited for up to
    /// [`SHUTDOWN_DRAIN`] (typically: send the command's async-cancel
    /// message and wait for the host to acknowledge it) and
    /// [`RcError::Cancelled`] is returned regardless of whether
    /// `on_cancel` finished in time.
    pub async fn run_with_cancellation<Body, Cancel, T>(
        &mut self,
        body: Body,
        on_cancel: Cancel,
    ) -> Result<T, RcError>
    where
        Body: Future<Output = Result<T, RcError>>,
        Cancel: Future<Output = ()>,
    {
        tokio::select! {
            result = body => result,
            signal = self.signals.recv_death_signal() => {
                let signal = signal.unwrap_or(DeathSignal::Term);
                if tokio::time::timeout(SHUTDOWN_DRAIN, on_cancel).await.is_err() {
                    warn!(signal = signal.name(), "shutdown drain timed out before cancel completed");
                }
                Err(RcError::Cancelled(signal))
            }
        }
    }

    /// Waits for the next `SIGWINCH`; callers re-query terminal size and
    /// recompute cell/pixel ratios in response (spec.md §4.D).
    pub async fn wait_for_resize(&mut self) {
        self.signals.recv_resize().await;
    }

    /// Waits for the next `SIGTSTP`.
    pub async fn wait_for_suspend(&mut self) {
        self.signals.recv_suspend().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn body_completing_first_wins_without_touching_cancel() {
        let mut event_loop = EventLoop::new().unwrap();
        let cancel_ran = Arc::new(AtomicBool::new(false));
        let cancel_ran_clone = cancel_ran.clone();

        let result = event_loop
            .run_with_cancellation(
                async { Ok::<_, RcError>(42) },
                async move {
                    cancel_ran_clone.store(true, Ordering::SeqCst);
                },
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert!(!cancel_ran.load(Ordering::SeqCst));
    }
}
