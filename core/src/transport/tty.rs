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

//! Talks to the controlling terminal directly: writes the DCS-wrapped
//! command to `/dev/tty` and reads the response back off the same fd, with
//! the terminal's local echo and canonical mode disabled for the duration
//! (spec.md §4.F).

use std::os::fd::AsFd;
use std::path::Path;
use std::time::Duration;

use rustix::termios::{self, LocalModes, OptionalActions, Termios};
use tokio::fs::File;

use crate::error::RcError;
use crate::rc_framing::Response;

/// Default path used when the caller doesn't hand in an explicit tty path
/// (tests substitute a pipe).
pub const DEFAULT_TTY_PATH: &str = "/dev/tty";

/// An open controlling-terminal transport. Construction puts the terminal
/// into a raw-ish mode (no echo, no canonical line buffering) so the
/// response's escape sequences arrive unmangled; [`Drop`] is intentionally
/// not relied upon to restore it — callers restore terminal state via
/// [`crate::terminal_state::TerminalStateController`] at the same point
/// they'd restore anything else.
pub struct TtyTransport {
    file: File,
    restore: Option<Termios>,
}

impl TtyTransport {
    /// Opens `path` (typically [`DEFAULT_TTY_PATH`]) read-write and puts it
    /// into the raw-ish mode the protocol needs.
    pub async fn open(path: &Path) -> Result<TtyTransport, RcError> {
        let file = tokio::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .await
            .map_err(RcError::from)?;

        let restore = match termios::tcgetattr(file.as_fd()) {
            Ok(mut attrs) => {
                let original = attrs.clone();
                attrs.local_modes.remove(LocalModes::ECHO | LocalModes::ICANON);
                termios::tcsetattr(file.as_fd(), OptionalActions::Drain, &attrs)
                    .map_err(|e| RcError::Transport(std::io::Error::from(e)))?;
                Some(original)
            }
            // Not actually a tty (e.g. redirected in tests); proceed without
            // touching terminal modes.
            Err(_) => None,
        };

        Ok(TtyTransport { file, restore })
    }

    /// Restores the terminal modes captured at [`Self::open`], if any were
    /// captured.
    pub fn restore_modes(&self) -> Result<(), RcError> {
        if let Some(original) = &self.restore {
            termios::tcsetattr(self.file.as_fd(), OptionalActions::Drain, original)
                .map_err(|e| RcError::Transport(std::io::Error::from(e)))?;
        }
        Ok(())
    }

    /// Writes the DCS-wrapped command body, splitting it into chunks and
    /// ack-gating the first pair when `stream` is set (spec.md §4.E/§4.F);
    /// see [`super::write_chunked_command`].
    pub async fn send_command(
        &mut self,
        serialized_body: &[u8],
        stream: bool,
        timeout: Duration,
    ) -> Result<(), RcError> {
        super::write_chunked_command(&mut self.file, serialized_body, stream, timeout).await
    }

    /// Reads the response, honoring the repeating deadline described in
    /// [`crate::transport::read_response_with_timeout`].
    pub async fn read_response(&mut self, timeout: Duration) -> Result<Response, RcError> {
        super::read_response_with_timeout(&mut self.file, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn opening_a_non_tty_path_still_succeeds_without_raw_mode() {
        let dir = std::env::temp_dir().join(format!("rc_core_tty_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("not_a_tty");
        std::fs::write(&path, b"").unwrap();

        let transport = TtyTransport::open(&path).await.unwrap();
        assert!(transport.restore.is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
