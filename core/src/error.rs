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

//! Error taxonomy shared across every component.
//!
//! The library surfaces [`RcError`] everywhere; the `rc-cli` binary wraps it
//! in [`miette::Report`] at its top level for fancy diagnostic rendering.
//! Exit-code mapping lives in [`RcError::exit_code`], not in the CLI, so
//! library consumers other than the bundled binary get the same mapping.

use std::fmt;

/// The error taxonomy a remote-control invocation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum RcError {
    /// Bad CLI invocation or malformed input supplied by the caller.
    #[error("usage error: {0}")]
    Usage(String),

    /// Socket refused, tty closed, or a short write survived retry.
    #[error("transport error: {0}")]
    Transport(#[source] std::io::Error),

    /// No response arrived before the configured deadline. The client has
    /// already sent an async-cancel message by the time this is returned.
    #[error("timed out waiting for a response")]
    Timeout,

    /// Malformed DCS body, JSON parse failure, or an unexpected streaming
    /// response shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The host replied with `ok:false`.
    #[error("{message}")]
    Host {
        message: String,
        traceback: Option<String>,
    },

    /// Rsync overall-hash mismatch. The output MUST be treated as invalid.
    #[error("data corruption detected: {0}")]
    Corruption(String),

    /// Missing/invalid public key, version mismatch, or crypto failure.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// The dispatcher was signalled (`INT`/`TERM`/`HUP`); the signal is
    /// re-raised on the process after terminal state has been restored, so a
    /// parent shell observes the same `$?`/`WIFSIGNALED` semantics it would
    /// for any other process killed by that signal.
    #[error("cancelled by signal {0}")]
    Cancelled(DeathSignal),
}

impl RcError {
    /// Maps an error to the process exit code spec.md §6 requires: 0 is
    /// reserved for success and is never produced here. [`RcError::Cancelled`]
    /// never actually reaches this: the binary re-raises the signal instead
    /// of exiting with a plain status (see [`DeathSignal::reraise_on_self`]).
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// `true` for the subset of errors the client must react to by sending
    /// an async-cancel message before surfacing the failure.
    #[must_use]
    pub fn requires_cancel_message(&self) -> bool {
        matches!(self, RcError::Timeout)
    }
}

impl From<std::io::Error> for RcError {
    fn from(err: std::io::Error) -> Self {
        RcError::Transport(err)
    }
}

impl From<serde_json::Error> for RcError {
    fn from(err: serde_json::Error) -> Self {
        RcError::Protocol(err.to_string())
    }
}

/// Carries the signal name through [`RcError::Cancelled`] without an
/// allocation; populated by [`crate::event_loop`]'s signal handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathSignal {
    Int,
    Term,
    Hup,
}

impl DeathSignal {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            DeathSignal::Int => "SIGINT",
            DeathSignal::Term => "SIGTERM",
            DeathSignal::Hup => "SIGHUP",
        }
    }

    /// The raw signal number, for `libc::signal`/`libc::raise`.
    #[must_use]
    pub fn raw(self) -> libc::c_int {
        match self {
            DeathSignal::Int => libc::SIGINT,
            DeathSignal::Term => libc::SIGTERM,
            DeathSignal::Hup => libc::SIGHUP,
        }
    }

    /// Resets the signal's disposition to default, then re-raises it on the
    /// current process. On success this does not return: the default
    /// disposition for `INT`/`TERM`/`HUP` is to terminate the process, so the
    /// parent shell sees the process die by signal rather than exit with a
    /// plain status code.
    pub fn reraise_on_self(self) {
        // Safety: SIG_DFL is a valid disposition for signal(2); raise(2) on
        // the current process is always safe to call.
        unsafe {
            libc::signal(self.raw(), libc::SIG_DFL);
            libc::raise(self.raw());
        }
    }
}

impl fmt::Display for DeathSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_error_variant_exits_nonzero() {
        let errors = [
            RcError::Usage("bad flag".into()),
            RcError::Timeout,
            RcError::Protocol("bad json".into()),
            RcError::Host {
                message: "no such window".into(),
                traceback: None,
            },
            RcError::Corruption("hash mismatch".into()),
            RcError::Encryption("bad pubkey".into()),
            RcError::Cancelled(DeathSignal::Int),
        ];
        for err in errors {
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn only_timeout_requires_a_cancel_message() {
        assert!(RcError::Timeout.requires_cancel_message());
        assert!(!RcError::Usage("x".into()).requires_cancel_message());
    }

    #[test]
    fn death_signal_name_round_trips_through_display() {
        assert_eq!(DeathSignal::Int.to_string(), "SIGINT");
        assert_eq!(DeathSignal::Term.name(), "SIGTERM");
    }
}
