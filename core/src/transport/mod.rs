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

//! The two wire transports a remote-control command can travel over
//! (spec.md §4.F, §4.G): the controlling tty (the common case, talking to
//! the terminal emulator the CLI itself runs inside) and a `unix:`/`tcp:`/
//! `fd:` socket address handed in explicitly via `--to`/`KITTY_LISTEN_ON`.
//!
//! Both transports share the read side: bytes arrive, are pushed through
//! [`crate::ansi::Parser`], and the first complete `@kitty-cmd` DCS body is
//! handed to [`crate::rc_framing::Response::try_parse`]. A `stream-ack`
//! response extends the deadline instead of completing the read, per
//! spec.md §4.E.

pub mod socket;
pub mod tty;

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::ansi::{Parser, ParserEvent};
use crate::error::RcError;
use crate::rc_framing::{extract_kitty_cmd, wrap_dcs, ChunkOutcome, ChunkSource, Chunker, Response};

pub use socket::SocketTransport;
pub use tty::TtyTransport;

/// Reads exactly one complete `@kitty-cmd` response DCS body from `reader`,
/// ack or not, or times out. Shared by [`read_response_with_timeout`] (which
/// loops past stream-acks) and [`read_stream_ack`] (which doesn't).
async fn read_one_response<R>(reader: &mut R, timeout: Duration) -> Result<Response, RcError>
where
    R: AsyncRead + Unpin,
{
    let mut parser = Parser::new();
    let mut buf = [0u8; 4096];
    let mut deadline = Instant::now() + timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(RcError::Timeout);
        }

        let read_result = tokio::time::timeout(remaining, reader.read(&mut buf)).await;
        let n = match read_result {
            Ok(Ok(0)) => {
                return Err(RcError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "transport closed before a response arrived",
                )))
            }
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(RcError::Transport(e)),
            Err(_) => return Err(RcError::Timeout),
        };

        let mut found: Option<Response> = None;
        parser
            .feed(&buf[..n], |event| {
                if found.is_some() {
                    return Ok(());
                }
                if let ParserEvent::Dcs(body) = event {
                    if let Some(json) = extract_kitty_cmd(&body) {
                        if let Ok(response) = Response::try_parse(json) {
                            found = Some(response);
                        }
                    }
                }
                Ok(())
            })
            .map_err(|e| RcError::Protocol(e.to_string()))?;

        if let Some(response) = found {
            return Ok(response);
        }
        deadline = Instant::now() + timeout;
    }
}

/// Reads from `reader` until a complete `@kitty-cmd` response DCS body
/// arrives, or `timeout` elapses. Each byte read resets the deadline
/// (spec.md §4.F/G "repeating deadline timer"); a `stream-ack` response
/// resets it again and keeps reading rather than returning.
pub(crate) async fn read_response_with_timeout<R>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Response, RcError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let response = read_one_response(reader, timeout).await?;
        if response.is_stream_ack() {
            continue;
        }
        return Ok(response);
    }
}

/// Reads exactly one response and requires it to be a `stream-ack`; used
/// between chunk 1 and chunk 2 of a streaming command (spec.md §4.E/§4.G).
async fn read_stream_ack<R>(reader: &mut R, timeout: Duration) -> Result<(), RcError>
where
    R: AsyncRead + Unpin,
{
    let response = read_one_response(reader, timeout).await?;
    if response.is_stream_ack() {
        Ok(())
    } else {
        Err(RcError::Protocol(
            "expected a stream-ack response between command chunks".to_string(),
        ))
    }
}

/// A [`ChunkSource`] that yields a single in-memory body once, then EOF.
struct SingleBodySource(Option<Vec<u8>>);

impl ChunkSource for SingleBodySource {
    fn next_block(&mut self) -> Result<ChunkOutcome, RcError> {
        match self.0.take() {
            Some(bytes) => Ok(ChunkOutcome::Bytes(bytes)),
            None => Ok(ChunkOutcome::Eof),
        }
    }
}

/// Writes `serialized_body` as one or more DCS-wrapped chunks (spec.md
/// §4.E): bodies over [`crate::rc_framing::MAX_CHUNK_BODY`] bytes are split
/// by the [`Chunker`], and when `stream` is true and there's more than one
/// chunk, the first chunk's write is followed by reading a `stream-ack`
/// before the second chunk is sent (spec.md §4.G steps on the ack-gated
/// handshake). No ack is awaited between any later pair of chunks.
pub(crate) async fn write_chunked_command<S>(
    stream_io: &mut S,
    serialized_body: &[u8],
    stream: bool,
    timeout: Duration,
) -> Result<(), RcError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut chunker = Chunker::new(vec![Box::new(SingleBodySource(Some(
        serialized_body.to_vec(),
    )))]);

    let Some(mut current) = chunker.next_chunk(true)? else {
        return Ok(());
    };
    let mut is_first_chunk = true;

    loop {
        let next = chunker.next_chunk(true)?.unwrap_or_default();
        let is_last = next.is_empty();

        let wrapped = wrap_dcs(&current);
        stream_io.write_all(&wrapped).await.map_err(RcError::from)?;

        if is_first_chunk && stream && !is_last {
            read_stream_ack(stream_io, timeout).await?;
        }
        is_first_chunk = false;

        if is_last {
            return Ok(());
        }
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_single_complete_response() {
        let body = crate::rc_framing::wrap_dcs(br#"@kitty-cmd{"ok":true,"data":"hi"}"#);
        let mut reader = tokio::io::BufReader::new(std::io::Cursor::new(body));
        let response = read_response_with_timeout(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(response.ok);
    }

    #[tokio::test]
    async fn stream_ack_does_not_complete_the_read() {
        let mut bytes = crate::rc_framing::wrap_dcs(br#"@kitty-cmd{"ok":true,"data":"stream-ack"}"#);
        bytes.extend(crate::rc_framing::wrap_dcs(
            br#"@kitty-cmd{"ok":true,"data":"done"}"#,
        ));
        let mut reader = tokio::io::BufReader::new(std::io::Cursor::new(bytes));
        let response = read_response_with_timeout(&mut reader, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            response.data,
            crate::rc_framing::ResponseData::String("done".to_string())
        );
    }

    #[tokio::test]
    async fn an_empty_stream_times_out_as_transport_eof() {
        let mut reader = tokio::io::BufReader::new(std::io::Cursor::new(Vec::<u8>::new()));
        let result = read_response_with_timeout(&mut reader, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(RcError::Transport(_))));
    }

    #[tokio::test]
    async fn a_body_under_the_chunk_limit_is_sent_as_a_single_write() {
        let (mut client, mut server) = tokio::io::duplex(8192);
        let body = b"{\"cmd\":\"ping\"}".to_vec();

        let send = write_chunked_command(&mut client, &body, true, Duration::from_secs(1));
        let receive = async {
            let mut buf = vec![0u8; 8192];
            use tokio::io::AsyncReadExt;
            let n = server.read(&mut buf).await.unwrap();
            buf.truncate(n);
            buf
        };
        let (send_result, received) = tokio::join!(send, receive);
        send_result.unwrap();

        assert_eq!(received, crate::rc_framing::wrap_dcs(&body));
    }

    #[tokio::test]
    async fn non_streaming_multi_chunk_sends_never_wait_for_an_ack() {
        let (mut client, mut server) = tokio::io::duplex(65536);
        let body = vec![b'a'; crate::rc_framing::MAX_CHUNK_BODY + 10];

        let send = write_chunked_command(&mut client, &body, false, Duration::from_millis(200));
        let receive = async {
            use tokio::io::AsyncReadExt;
            let mut parser = Parser::new();
            let mut received = Vec::new();
            let mut buf = vec![0u8; 65536];
            while received.len() < body.len() {
                let n = server.read(&mut buf).await.unwrap();
                parser
                    .feed(&buf[..n], |event| {
                        if let ParserEvent::Dcs(dcs_body) = event {
                            if let Some(json) = extract_kitty_cmd(&dcs_body) {
                                received.extend_from_slice(json);
                            }
                        }
                        Ok(())
                    })
                    .unwrap();
            }
            received
        };
        let (send_result, received) = tokio::join!(send, receive);
        send_result.unwrap();
        assert_eq!(received, body);
    }
}
