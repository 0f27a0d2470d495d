/*
 *   Copyright (c) 2023-2025 R3BL LLC
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

//! Parses the `rc` invocation and drives one remote-control round trip.

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use rc_core::{
    config::MAX_PASSWORD_LEN,
    event_loop::EventLoop,
    rc_framing::{RcCommand, Response, ResponseData},
    shlex,
    transport::{tty::DEFAULT_TTY_PATH, SocketTransport, TtyTransport},
    Address, PasswordSource, RcConfig, RcError, UsePasswordPolicy,
};
use serde_json::Value;
use tokio::io::{stdin, AsyncBufReadExt, BufReader};
use tracing::debug;

/// Protocol version this binary reports in every outgoing command.
const PROTOCOL_VERSION: (u16, u16, u16) = (0, 1, 0);

/// Environment variable checked for a password when `--password-env` isn't
/// given explicitly.
const DEFAULT_PASSWORD_ENV_VAR: &str = "KITTY_RC_PASSWORD";

/// Environment variable carrying the destination address when `--to`
/// isn't given, per spec.md §6 "Address resolution precedence".
const LISTEN_ON_ENV_VAR: &str = "KITTY_LISTEN_ON";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    arg_required_else_help = true // Command is required, if none passed, show help.
)]
pub struct Cli {
    /// Remote-control command name, e.g. `ls`, `set-colors`, `get-text`.
    pub cmd_name: String,

    /// JSON object to send as the command payload.
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Destination: `unix:PATH`, `tcp:HOST:PORT`, or `fd:N`. Defaults to
    /// `KITTY_LISTEN_ON`, then the controlling tty.
    #[arg(long = "to")]
    pub to: Option<String>,

    /// Password supplied directly on the command line.
    #[arg(long = "password")]
    pub password: Option<String>,

    /// Path to a file whose first line is the password.
    #[arg(long = "password-file")]
    pub password_file: Option<PathBuf>,

    /// Name of the environment variable holding the password.
    #[arg(long = "password-env")]
    pub password_env: Option<String>,

    /// `if-available` (default), `always`, or `never`.
    #[arg(long = "use-password", default_value = "if-available")]
    pub use_password: String,

    /// Don't wait for (or print) a response.
    #[arg(long = "no-response")]
    pub no_response: bool,

    /// Treat the command as a streaming command: intermediate
    /// `stream-ack` responses don't end the wait.
    #[arg(long = "stream")]
    pub stream: bool,

    /// Print the response as JSON instead of its display form.
    #[arg(long = "json", short = 'j', help = "Print output as JSON")]
    pub json: bool,

    /// Read newline-separated words from stdin and attach them to the
    /// payload under `"words"` before sending.
    #[arg(long = "stdin", short = 's', help = "Read from stdin")]
    pub read_from_stdin: bool,
}

pub async fn run_app() -> Result<(), RcError> {
    let cli_parsed = Cli::parse();
    debug!(?cli_parsed, "parsed rc invocation");

    let use_password = UsePasswordPolicy::from_str(&cli_parsed.use_password)?;
    let mut password_sources = Vec::new();
    if let Some(literal) = &cli_parsed.password {
        password_sources.push(PasswordSource::Literal(literal.clone()));
    }
    if let Some(path) = &cli_parsed.password_file {
        let resolved = rc_core::config::resolve_password_file_path(path, dirs::config_dir().as_deref());
        password_sources.push(PasswordSource::File(resolved));
    }
    password_sources.push(PasswordSource::EnvVar(
        cli_parsed
            .password_env
            .clone()
            .unwrap_or_else(|| DEFAULT_PASSWORD_ENV_VAR.to_string()),
    ));

    let password = RcConfig::resolve_password(
        use_password,
        &password_sources,
        |name| env::var(name).ok(),
        std::fs::read_to_string,
    )?;

    let address = Address::resolve(
        cli_parsed.to.as_deref(),
        env::var(LISTEN_ON_ENV_VAR).ok().as_deref(),
    )?;
    let config = RcConfig {
        address,
        password,
        use_password,
        timeout: rc_core::config::DEFAULT_TIMEOUT,
    };

    let mut payload: Value = serde_json::from_str(&cli_parsed.payload)
        .map_err(|e| RcError::Usage(format!("--payload is not valid JSON: {e}")))?;

    if cli_parsed.read_from_stdin {
        let words = words_from_stdin(BufReader::new(stdin())).await?;
        match payload.as_object_mut() {
            Some(map) => {
                map.insert("words".to_string(), Value::from(words));
            }
            None => {
                return Err(RcError::Usage(
                    "--payload must be a JSON object when combined with --stdin".to_string(),
                ))
            }
        }
    }

    if let Some(password) = &config.password {
        if password.len() > MAX_PASSWORD_LEN {
            return Err(RcError::Usage(format!(
                "password exceeds the {MAX_PASSWORD_LEN}-byte limit"
            )));
        }
    }

    let mut command = RcCommand::new(cli_parsed.cmd_name.clone(), PROTOCOL_VERSION, payload);
    command.flags.no_response = cli_parsed.no_response;
    command.flags.stream = cli_parsed.stream;

    let mut event_loop = EventLoop::new()?;
    let timeout = config.effective_timeout();

    let response = event_loop
        .run_with_cancellation(
            send_and_await_response(&config, &command, timeout),
            send_cancel_best_effort(&config, &command),
        )
        .await?;

    if cli_parsed.no_response {
        return Ok(());
    }

    print_response(response, cli_parsed.json)
}

async fn send_and_await_response(
    config: &RcConfig,
    command: &RcCommand,
    timeout: Duration,
) -> Result<Response, RcError> {
    let body = command.try_serialize()?;
    match &config.address {
        Address::Tty => {
            let mut transport = TtyTransport::open(std::path::Path::new(DEFAULT_TTY_PATH)).await?;
            transport
                .send_command(&body, command.flags.stream, timeout)
                .await?;
            if command.flags.no_response {
                return Ok(empty_ok_response());
            }
            transport.read_response(timeout).await
        }
        other => {
            let mut transport = SocketTransport::connect(other).await?;
            transport
                .send_command(&body, command.flags.stream, timeout)
                .await?;
            if command.flags.no_response {
                return Ok(empty_ok_response());
            }
            transport.read_response(timeout).await
        }
    }
}

fn empty_ok_response() -> Response {
    Response {
        ok: true,
        data: ResponseData::None,
        error: None,
        traceback: None,
    }
}

/// Sent when the dispatcher is unwinding on a death signal: a best-effort
/// async-cancel message, per spec.md §4.E and §5.
async fn send_cancel_best_effort(config: &RcConfig, command: &RcCommand) {
    let cancel = command.as_cancel_message();
    let Ok(body) = cancel.try_serialize() else {
        return;
    };
    match &config.address {
        Address::Tty => {
            if let Ok(mut transport) =
                TtyTransport::open(std::path::Path::new(DEFAULT_TTY_PATH)).await
            {
                let _ = transport
                    .send_command(&body, false, Duration::from_secs(1))
                    .await;
            }
        }
        other => {
            if let Ok(mut transport) = SocketTransport::connect(other).await {
                let _ = transport
                    .send_command(&body, false, Duration::from_secs(1))
                    .await;
            }
        }
    }
}

fn print_response(response: Response, as_json: bool) -> Result<(), RcError> {
    if as_json {
        let rendered = serde_json::json!({
            "ok": response.ok,
            "data": response.data.display(),
            "error": response.error,
        });
        println!("{rendered}");
        return if response.ok {
            Ok(())
        } else {
            Err(RcError::Host {
                message: response.error.unwrap_or_default(),
                traceback: response.traceback,
            })
        };
    }

    if response.ok {
        println!("{}", response.data.display());
        Ok(())
    } else {
        Err(RcError::Host {
            message: response.error.unwrap_or_default(),
            traceback: response.traceback,
        })
    }
}

/// Splits every non-empty stdin line with [`shlex::split`] and flattens the
/// result into one word list.
async fn words_from_stdin<R: tokio::io::AsyncRead + Unpin>(
    buf_reader: BufReader<R>,
) -> Result<Vec<String>, RcError> {
    let mut lines = buf_reader.lines();
    let mut words = Vec::new();
    while let Some(line) = lines.next_line().await.map_err(RcError::from)? {
        if line.trim().is_empty() {
            continue;
        }
        words.extend(shlex::split(&line).map_err(|e| RcError::Usage(e.to_string()))?);
    }
    Ok(words)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    use super::*;

    #[tokio::test]
    async fn words_from_stdin_splits_and_flattens_lines() {
        let input = "foo bar\nbaz 'qux quux'\n";
        let reader = BufReader::new(std::io::Cursor::new(input.as_bytes()));
        let words = words_from_stdin(reader).await.unwrap();
        assert_eq!(words, vec!["foo", "bar", "baz", "qux quux"]);
    }

    #[test_case("foo\n\n\nbar\n", vec!["foo", "bar"]; "blank lines are skipped")]
    #[test_case("\n\n", Vec::<&str>::new(); "an all-blank input yields no words")]
    #[tokio::test]
    async fn words_from_stdin_handles_blank_lines(input: &str, expected: Vec<&str>) {
        let reader = BufReader::new(std::io::Cursor::new(input.as_bytes()));
        let words = words_from_stdin(reader).await.unwrap();
        assert_eq!(words, expected);
    }
}
