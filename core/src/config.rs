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

//! Per-invocation configuration, threaded explicitly through the transports
//! and framing layer. Never a process-wide global (spec.md §9).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::RcError;

/// Longer passwords are rejected outright; preserved for behavioral parity
/// with the system this spec was distilled from even though the limit
/// itself is arbitrary (spec.md §9 open question).
pub const MAX_PASSWORD_LEN: usize = 1024;

/// Default per-command timeout when no password is in play.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Minimum timeout once a password/encryption is configured; encrypted
/// round-trips are allowed to take longer.
pub const MIN_ENCRYPTED_TIMEOUT: Duration = Duration::from_secs(120);

/// Where to resolve `KITTY_RC_PASSWORD`-equivalent configuration from, in
/// priority order: `--password` > `--password-file` > `--password-env`.
#[derive(Debug, Clone)]
pub enum PasswordSource {
    Literal(String),
    File(PathBuf),
    EnvVar(String),
}

/// Policy controlling whether a configured password is actually used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UsePasswordPolicy {
    #[default]
    IfAvailable,
    Always,
    Never,
}

impl std::str::FromStr for UsePasswordPolicy {
    type Err = RcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "if-available" => Ok(UsePasswordPolicy::IfAvailable),
            "always" => Ok(UsePasswordPolicy::Always),
            "never" => Ok(UsePasswordPolicy::Never),
            other => Err(RcError::Usage(format!(
                "invalid --use-password value {other:?}, expected one of if-available, always, never"
            ))),
        }
    }
}

/// Resolves a `--password-file` path against the config directory when it's
/// relative, per spec.md §9 ("resolved against the config dir if relative").
/// An already-absolute path, or a relative one with no config dir available,
/// is returned unchanged.
#[must_use]
pub fn resolve_password_file_path(path: &Path, config_dir: Option<&Path>) -> PathBuf {
    match config_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

/// Resolved destination for a remote-control command: `--to` wins over
/// `KITTY_LISTEN_ON`, which wins over the controlling tty.
#[derive(Debug, Clone)]
pub enum Address {
    Tty,
    Unix(PathBuf),
    Tcp(String),
    Fd(i32),
}

impl Address {
    /// Parses the `--to`/`KITTY_LISTEN_ON` address syntax: `unix:PATH`,
    /// `tcp:HOST:PORT`, or `fd:N`.
    pub fn parse(raw: &str) -> Result<Address, RcError> {
        if let Some(path) = raw.strip_prefix("unix:") {
            return Ok(Address::Unix(PathBuf::from(path)));
        }
        if let Some(hostport) = raw.strip_prefix("tcp:") {
            return Ok(Address::Tcp(hostport.to_string()));
        }
        if let Some(fd) = raw.strip_prefix("fd:") {
            let fd: i32 = fd
                .parse()
                .map_err(|_| RcError::Usage(format!("invalid fd address {raw:?}")))?;
            return Ok(Address::Fd(fd));
        }
        Err(RcError::Usage(format!(
            "unrecognized address {raw:?}, expected unix:PATH, tcp:HOST:PORT, or fd:N"
        )))
    }

    /// Resolves `--to`, then `KITTY_LISTEN_ON`, then falls back to the
    /// controlling tty, per spec.md §6 "Address resolution precedence".
    pub fn resolve(
        cli_to: Option<&str>,
        env_listen_on: Option<&str>,
    ) -> Result<Address, RcError> {
        if let Some(raw) = cli_to {
            return Address::parse(raw);
        }
        if let Some(raw) = env_listen_on {
            return Address::parse(raw);
        }
        Ok(Address::Tty)
    }
}

/// Explicit, per-invocation configuration record. Threaded through the
/// transports and framing layer rather than read from globals anywhere.
#[derive(Debug, Clone)]
pub struct RcConfig {
    pub address: Address,
    pub password: Option<String>,
    pub use_password: UsePasswordPolicy,
    pub timeout: Duration,
}

impl RcConfig {
    /// Resolves the effective password given the configured policy and a
    /// source lookup chain, rejecting passwords over [`MAX_PASSWORD_LEN`].
    pub fn resolve_password(
        policy: UsePasswordPolicy,
        sources: &[PasswordSource],
        read_env: impl Fn(&str) -> Option<String>,
        read_file: impl Fn(&PathBuf) -> std::io::Result<String>,
    ) -> Result<Option<String>, RcError> {
        if policy == UsePasswordPolicy::Never {
            return Ok(None);
        }

        for source in sources {
            let candidate = match source {
                PasswordSource::Literal(s) => Some(s.clone()),
                PasswordSource::File(path) => match read_file(path) {
                    Ok(contents) => Some(contents.trim_end_matches('\n').to_string()),
                    Err(_) => None,
                },
                PasswordSource::EnvVar(name) => read_env(name),
            };
            if let Some(password) = candidate {
                if password.len() > MAX_PASSWORD_LEN {
                    return Err(RcError::Usage(format!(
                        "password exceeds the {MAX_PASSWORD_LEN}-byte limit"
                    )));
                }
                return Ok(Some(password));
            }
        }

        if policy == UsePasswordPolicy::Always {
            return Err(RcError::Usage(
                "--use-password=always but no password source produced one".into(),
            ));
        }
        Ok(None)
    }

    /// The effective per-command timeout: elevated to at least
    /// [`MIN_ENCRYPTED_TIMEOUT`] once a password is configured (spec.md §4.E).
    #[must_use]
    pub fn effective_timeout(&self) -> Duration {
        if self.password.is_some() {
            self.timeout.max(MIN_ENCRYPTED_TIMEOUT)
        } else {
            self.timeout
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_flag_wins_over_env_and_tty() {
        let addr = Address::resolve(Some("unix:/tmp/a.sock"), Some("tcp:localhost:9000")).unwrap();
        assert!(matches!(addr, Address::Unix(p) if p == PathBuf::from("/tmp/a.sock")));
    }

    #[test]
    fn env_wins_over_tty_fallback() {
        let addr = Address::resolve(None, Some("tcp:localhost:9000")).unwrap();
        assert!(matches!(addr, Address::Tcp(s) if s == "localhost:9000"));
    }

    #[test]
    fn falls_back_to_tty_when_nothing_configured() {
        let addr = Address::resolve(None, None).unwrap();
        assert!(matches!(addr, Address::Tty));
    }

    #[test]
    fn rejects_unrecognized_address_schemes() {
        assert!(Address::parse("http://example.com").is_err());
    }

    #[test]
    fn never_policy_ignores_every_source() {
        let result = RcConfig::resolve_password(
            UsePasswordPolicy::Never,
            &[PasswordSource::Literal("secret".into())],
            |_| None,
            |_| Ok(String::new()),
        )
        .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn literal_source_wins_over_env() {
        let result = RcConfig::resolve_password(
            UsePasswordPolicy::IfAvailable,
            &[
                PasswordSource::Literal("from-cli".into()),
                PasswordSource::EnvVar("KITTY_RC_PASSWORD".into()),
            ],
            |_| Some("from-env".into()),
            |_| Ok(String::new()),
        )
        .unwrap();
        assert_eq!(result.as_deref(), Some("from-cli"));
    }

    #[test]
    fn oversized_password_is_rejected() {
        let too_long = "x".repeat(MAX_PASSWORD_LEN + 1);
        let result = RcConfig::resolve_password(
            UsePasswordPolicy::IfAvailable,
            &[PasswordSource::Literal(too_long)],
            |_| None,
            |_| Ok(String::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn always_policy_errors_when_nothing_resolves() {
        let result = RcConfig::resolve_password(
            UsePasswordPolicy::Always,
            &[],
            |_| None,
            |_| Ok(String::new()),
        );
        assert!(result.is_err());
    }

    #[test]
    fn password_elevates_timeout_floor() {
        let config = RcConfig {
            address: Address::Tty,
            password: Some("secret".into()),
            use_password: UsePasswordPolicy::IfAvailable,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(config.effective_timeout(), MIN_ENCRYPTED_TIMEOUT);
    }

    #[test]
    fn relative_password_file_path_resolves_against_config_dir() {
        let resolved = resolve_password_file_path(
            Path::new("secrets/rc.pass"),
            Some(Path::new("/home/user/.config")),
        );
        assert_eq!(resolved, PathBuf::from("/home/user/.config/secrets/rc.pass"));
    }

    #[test]
    fn absolute_password_file_path_is_left_alone() {
        let resolved = resolve_password_file_path(
            Path::new("/etc/rc.pass"),
            Some(Path::new("/home/user/.config")),
        );
        assert_eq!(resolved, PathBuf::from("/etc/rc.pass"));
    }

    #[test]
    fn relative_password_file_path_without_a_config_dir_is_left_alone() {
        let resolved = resolve_password_file_path(Path::new("rc.pass"), None);
        assert_eq!(resolved, PathBuf::from("rc.pass"));
    }

    #[test]
    fn without_password_timeout_is_unchanged() {
        let config = RcConfig {
            address: Address::Tty,
            password: None,
            use_password: UsePasswordPolicy::IfAvailable,
            timeout: Duration::from_secs(5),
        };
        assert_eq!(config.effective_timeout(), Duration::from_secs(5));
    }
}
