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

//! Unix signal registration for the dispatcher: `INT`/`TERM`/`HUP` are
//! death signals that unwind the command in flight (spec.md §5); `WINCH`
//! re-queries terminal size; `TSTP` is observed so the terminal can be put
//! back into cooked mode before the process actually stops.

use tokio::signal::unix::{signal, Signal, SignalKind};

use crate::error::{DeathSignal, RcError};

/// Every signal the dispatcher reacts to, registered once at startup.
pub struct Signals {
    int: Signal,
    term: Signal,
    hup: Signal,
    winch: Signal,
    tstp: Signal,
}

impl Signals {
    pub fn new() -> Result<Signals, RcError> {
        Ok(Signals {
            int: signal(SignalKind::interrupt()).map_err(RcError::from)?,
            term: signal(SignalKind::terminate()).map_err(RcError::from)?,
            hup: signal(SignalKind::hangup()).map_err(RcError::from)?,
            winch: signal(SignalKind::window_change()).map_err(RcError::from)?,
            tstp: signal(SignalKind::from_raw(libc_tstp())).map_err(RcError::from)?,
        })
    }

    /// Waits for the next of `INT`/`TERM`/`HUP`, returning which one fired.
    /// Never returns `None` in practice; the underlying streams only end if
    /// the process's signal disposition is torn down from under us.
    pub async fn recv_death_signal(&mut self) -> Option<DeathSignal> {
        tokio::select! {
            _ = self.int.recv() => Some(DeathSignal::Int),
            _ = self.term.recv() => Some(DeathSignal::Term),
            _ = self.hup.recv() => Some(DeathSignal::Hup),
        }
    }

    /// Waits for the next `SIGWINCH`, signalling the terminal was resized.
    pub async fn recv_resize(&mut self) {
        let _ = self.winch.recv().await;
    }

    /// Waits for the next `SIGTSTP` (`Ctrl-Z`).
    pub async fn recv_suspend(&mut self) {
        let _ = self.tstp.recv().await;
    }
}

/// `SIGTSTP`'s raw value, `20` on Linux and BSD/macOS alike; `SignalKind`
/// has no named constructor for it.
fn libc_tstp() -> std::os::raw::c_int {
    20
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registers_every_signal_without_erroring() {
        assert!(Signals::new().is_ok());
    }
}
