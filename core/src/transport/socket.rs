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

//! Socket transports for an explicit `--to`/`KITTY_LISTEN_ON` address:
//! `unix:PATH`, `tcp:HOST:PORT`, and `fd:N` (an already-open, inherited fd),
//! per spec.md §4.G. Every variant writes the whole command before reading
//! anything back — no half-duplex interleaving.

use std::os::fd::FromRawFd;
use std::time::Duration;

use tokio::net::{TcpStream, UnixStream};

use crate::config::Address;
use crate::error::RcError;
use crate::rc_framing::Response;

/// An open connection to one of the three socket-style destinations.
pub enum SocketTransport {
    Unix(UnixStream),
    Tcp(TcpStream),
    /// An inherited fd, wrapped as a Unix stream socket. `fd:N` is only
    /// meaningful on platforms that pass kitty a pre-connected socket this
    /// way.
    Fd(UnixStream),
}

impl SocketTransport {
    /// Connects to `address`, which must not be [`Address::Tty`] (the tty
    /// destination is handled by [`super::TtyTransport`] instead).
    pub async fn connect(address: &Address) -> Result<SocketTransport, RcError> {
        match address {
            Address::Tty => Err(RcError::Usage(
                "SocketTransport::connect called with Address::Tty".to_string(),
            )),
            Address::Unix(path) => {
                let stream = UnixStream::connect(path).await.map_err(RcError::from)?;
                Ok(SocketTransport::Unix(stream))
            }
            Address::Tcp(host_port) => {
                let stream = TcpStream::connect(host_port).await.map_err(RcError::from)?;
                Ok(SocketTransport::Tcp(stream))
            }
            Address::Fd(fd) => {
                // Safety: the fd is inherited from the parent process (kitty
                // itself, when it spawns `rc` with a pre-connected socket)
                // and is not otherwise owned by this process.
                let std_stream = unsafe { std::os::unix::net::UnixStream::from_raw_fd(*fd) };
                std_stream.set_nonblocking(true).map_err(RcError::from)?;
                let stream = UnixStream::from_std(std_stream).map_err(RcError::from)?;
                Ok(SocketTransport::Fd(stream))
            }
        }
    }

    /// Writes the DCS-wrapped command body, splitting it into chunks and
    /// ack-gating the first pair when `stream` is set; see
    /// [`super::write_chunked_command`].
    pub async fn send_command(
        &mut self,
        serialized_body: &[u8],
        stream: bool,
        timeout: Duration,
    ) -> Result<(), RcError> {
        match self {
            SocketTransport::Unix(s) | SocketTransport::Fd(s) => {
                super::write_chunked_command(s, serialized_body, stream, timeout).await
            }
            SocketTransport::Tcp(s) => {
                super::write_chunked_command(s, serialized_body, stream, timeout).await
            }
        }
    }

    /// Reads the response, honoring the same repeating-deadline rules as
    /// the tty transport.
    pub async fn read_response(&mut self, timeout: Duration) -> Result<Response, RcError> {
        match self {
            SocketTransport::Unix(s) | SocketTransport::Fd(s) => {
                super::read_response_with_timeout(s, timeout).await
            }
            SocketTransport::Tcp(s) => super::read_response_with_timeout(s, timeout).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    #[tokio::test]
    async fn round_trips_a_command_over_a_unix_socket() {
        let dir = std::env::temp_dir().join(format!("rc_core_sock_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rc.sock");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn({
            let path = path.clone();
            async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 256];
                use tokio::io::AsyncReadExt;
                let n = stream.read(&mut buf).await.unwrap();
                assert!(buf[..n].starts_with(crate::rc_framing::DCS_PREFIX.as_bytes()));
                stream
                    .write_all(&wrap_dcs(br#"@kitty-cmd{"ok":true,"data":"pong"}"#))
                    .await
                    .unwrap();
                let _ = path;
            }
        });

        let address = Address::Unix(path.clone());
        let mut transport = SocketTransport::connect(&address).await.unwrap();
        transport
            .send_command(br#"{"cmd":"ping"}"#, false, Duration::from_secs(2))
            .await
            .unwrap();
        let response = transport
            .read_response(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            response.data,
            crate::rc_framing::ResponseData::String("pong".to_string())
        );

        server.await.unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn connecting_with_a_tty_address_is_a_usage_error() {
        let result = SocketTransport::connect(&Address::Tty).await;
        assert!(matches!(result, Err(RcError::Usage(_))));
    }

    #[tokio::test]
    async fn a_body_over_the_chunk_limit_is_split_and_ack_gated() {
        let dir = std::env::temp_dir().join(format!("rc_core_sock_chunk_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("rc.sock");
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path).unwrap();

        let big_body = vec![b'x'; crate::rc_framing::MAX_CHUNK_BODY + 100];
        let expected_body = big_body.clone();

        let server = tokio::spawn({
            let path = path.clone();
            async move {
                use tokio::io::AsyncReadExt;
                let (mut stream, _) = listener.accept().await.unwrap();

                let mut parser = crate::ansi::Parser::new();
                let mut received = Vec::new();
                let mut chunk_count = 0;
                let mut buf = vec![0u8; 8192];
                loop {
                    let n = stream.read(&mut buf).await.unwrap();
                    parser
                        .feed(&buf[..n], |event| {
                            if let crate::ansi::ParserEvent::Dcs(body) = event {
                                if let Some(json) = crate::rc_framing::extract_kitty_cmd(&body) {
                                    received.extend_from_slice(json);
                                    chunk_count += 1;
                                }
                            }
                            Ok(())
                        })
                        .unwrap();
                    if chunk_count == 1 {
                        stream
                            .write_all(&wrap_dcs(br#"@kitty-cmd{"ok":true,"data":"stream-ack"}"#))
                            .await
                            .unwrap();
                    }
                    if received == expected_body {
                        break;
                    }
                }
                stream
                    .write_all(&wrap_dcs(br#"@kitty-cmd{"ok":true,"data":"done"}"#))
                    .await
                    .unwrap();
                assert_eq!(chunk_count, 2);
                let _ = path;
            }
        });

        let address = Address::Unix(path.clone());
        let mut transport = SocketTransport::connect(&address).await.unwrap();
        transport
            .send_command(&big_body, true, Duration::from_secs(2))
            .await
            .unwrap();
        let response = transport
            .read_response(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(
            response.data,
            crate::rc_framing::ResponseData::String("done".to_string())
        );

        server.await.unwrap();
        std::fs::remove_dir_all(&dir).ok();
    }
}
