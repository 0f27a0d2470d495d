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

//! Remote-control command framing: DCS wrapping, 2048-byte chunking, and
//! stream-ack/final response correlation (spec.md §4.E).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RcError;

pub const DCS_PREFIX: &str = "\x1bP@kitty-cmd";
pub const DCS_SUFFIX: &str = "\x1b\\";
pub const MAX_CHUNK_BODY: usize = 2048;

/// `(major, minor, patch)`, serialized as a 3-element JSON array.
pub type Version = (u16, u16, u16);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandFlags {
    pub no_response: bool,
    pub stream: bool,
    pub cancel_async: bool,
    pub single_sent_already: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RcCommand {
    pub cmd_name: String,
    pub version: Version,
    pub payload: Value,
    pub flags: CommandFlags,
}

impl RcCommand {
    #[must_use]
    pub fn new(cmd_name: impl Into<String>, version: Version, payload: Value) -> Self {
        RcCommand {
            cmd_name: cmd_name.into(),
            version,
            payload,
            flags: CommandFlags::default(),
        }
    }

    /// Builds the async-cancel message for a previously issued streaming
    /// command: same `cmd_name`, `payload=null`, `cancel_async=true`,
    /// `no_response=true`, `single_sent_already` reset (spec.md §4.E).
    #[must_use]
    pub fn as_cancel_message(&self) -> RcCommand {
        RcCommand {
            cmd_name: self.cmd_name.clone(),
            version: self.version,
            payload: Value::Null,
            flags: CommandFlags {
                no_response: true,
                stream: false,
                cancel_async: true,
                single_sent_already: false,
            },
        }
    }

    /// Serializes to the wire JSON shape `{cmd, version, payload, ...flags}`.
    pub fn try_serialize(&self) -> Result<Vec<u8>, RcError> {
        fn is_false(b: &bool) -> bool {
            !*b
        }

        #[derive(Serialize)]
        struct Wire<'a> {
            cmd: &'a str,
            version: [u16; 3],
            payload: &'a Value,
            #[serde(skip_serializing_if = "is_false")]
            no_response: bool,
            #[serde(skip_serializing_if = "is_false")]
            stream: bool,
            #[serde(skip_serializing_if = "is_false")]
            cancel_async: bool,
        }
        let wire = Wire {
            cmd: &self.cmd_name,
            version: [self.version.0, self.version.1, self.version.2],
            payload: &self.payload,
            no_response: self.flags.no_response,
            stream: self.flags.stream,
            cancel_async: self.flags.cancel_async,
        };
        serde_json::to_vec(&wire).map_err(RcError::from)
    }
}

/// Wraps a serialized command body in the DCS prefix/suffix.
#[must_use]
pub fn wrap_dcs(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(DCS_PREFIX.len() + body.len() + DCS_SUFFIX.len());
    out.extend_from_slice(DCS_PREFIX.as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(DCS_SUFFIX.as_bytes());
    out
}

/// Recognizes a complete DCS body delivered by [`crate::ansi::ParserEvent::Dcs`]
/// as a `@kitty-cmd` response and returns the JSON remainder, per spec.md
/// invariant 2 ("DCS extraction").
#[must_use]
pub fn extract_kitty_cmd(dcs_body: &[u8]) -> Option<&[u8]> {
    dcs_body.strip_prefix(b"@kitty-cmd")
}

/// Response data is heterogeneous; booleans render as `"True"`/`"False"` for
/// user display (spec.md §9 "Dynamic response data").
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    String(String),
    Bool(bool),
    Number(f64),
    None,
}

impl ResponseData {
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            ResponseData::String(s) => s.clone(),
            ResponseData::Bool(true) => "True".to_string(),
            ResponseData::Bool(false) => "False".to_string(),
            ResponseData::Number(n) => {
                if n.fract() == 0.0 {
                    format!("{n:.0}")
                } else {
                    n.to_string()
                }
            }
            ResponseData::None => String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct WireResponse {
    ok: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub ok: bool,
    pub data: ResponseData,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

impl Response {
    /// A marker recognized inside the JSON as the intermediate streaming
    /// acknowledgement (spec.md §4.E).
    const STREAM_ACK_MARKER: &'static str = "stream-ack";

    pub fn try_parse(json_body: &[u8]) -> Result<Response, RcError> {
        let wire: WireResponse = serde_json::from_slice(json_body)?;
        let data = match wire.data {
            Value::String(s) => ResponseData::String(s),
            Value::Bool(b) => ResponseData::Bool(b),
            Value::Number(n) => ResponseData::Number(n.as_f64().unwrap_or_default()),
            Value::Null => ResponseData::None,
            other => ResponseData::String(other.to_string()),
        };
        Ok(Response {
            ok: wire.ok,
            data,
            error: wire.error,
            traceback: wire.traceback,
        })
    }

    /// Detects the streaming-ack shape: `{ok:true, data:"stream-ack"}`.
    #[must_use]
    pub fn is_stream_ack(&self) -> bool {
        self.ok
            && matches!(&self.data, ResponseData::String(s) if s == Self::STREAM_ACK_MARKER)
    }

    pub fn into_result(self) -> Result<ResponseData, RcError> {
        if self.ok {
            Ok(self.data)
        } else {
            Err(RcError::Host {
                message: self.error.unwrap_or_default(),
                traceback: self.traceback,
            })
        }
    }
}

/// One source of chunk bytes in a multi-payload command (literal text, file
/// bytes, stdin key events, ...). Implementors drain in order; two sentinel
/// outcomes from [`next_block`](ChunkSource::next_block) are meaningful to the
/// chunker: `WaitingOnStdin` (suspend, read keys) and `EndReadingFromStdin`.
pub trait ChunkSource {
    fn next_block(&mut self) -> Result<ChunkOutcome, RcError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Bytes(Vec<u8>),
    Eof,
    WaitingOnStdin,
    EndReadingFromStdin,
}

/// Drains a chain of [`ChunkSource`]s, splitting any block over
/// [`MAX_CHUNK_BODY`] bytes into ordered chunks, per spec.md §4.E.
pub struct Chunker {
    sources: Vec<Box<dyn ChunkSource>>,
    current: usize,
    pending: std::collections::VecDeque<Vec<u8>>,
}

impl Chunker {
    #[must_use]
    pub fn new(sources: Vec<Box<dyn ChunkSource>>) -> Self {
        Chunker {
            sources,
            current: 0,
            pending: std::collections::VecDeque::new(),
        }
    }

    /// Returns the next chunk. An empty `Ok(Some(vec![]))` signals
    /// end-of-stream across every source.
    pub fn next_chunk(&mut self, limit_size: bool) -> Result<Option<Vec<u8>>, RcError> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(Some(chunk));
        }

        loop {
            let Some(source) = self.sources.get_mut(self.current) else {
                return Ok(Some(Vec::new()));
            };
            match source.next_block()? {
                ChunkOutcome::Bytes(block) => {
                    return Ok(Some(self.queue_block(block, limit_size)));
                }
                ChunkOutcome::Eof => {
                    self.current += 1;
                }
                ChunkOutcome::WaitingOnStdin | ChunkOutcome::EndReadingFromStdin => {
                    return Ok(None);
                }
            }
        }
    }

    fn queue_block(&mut self, block: Vec<u8>, limit_size: bool) -> Vec<u8> {
        if !limit_size || block.len() <= MAX_CHUNK_BODY {
            return block;
        }
        let mut rest = &block[..];
        let head = rest[..MAX_CHUNK_BODY].to_vec();
        rest = &rest[MAX_CHUNK_BODY..];
        while !rest.is_empty() {
            let take = rest.len().min(MAX_CHUNK_BODY);
            self.pending.push_back(rest[..take].to_vec());
            rest = &rest[take..];
        }
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LiteralSource(Option<Vec<u8>>);
    impl ChunkSource for LiteralSource {
        fn next_block(&mut self) -> Result<ChunkOutcome, RcError> {
            match self.0.take() {
                Some(bytes) => Ok(ChunkOutcome::Bytes(bytes)),
                None => Ok(ChunkOutcome::Eof),
            }
        }
    }

    #[test]
    fn serializes_known_fields() {
        let cmd = RcCommand::new("ls", (0, 26, 0), serde_json::json!({"a": 1}));
        let bytes = cmd.try_serialize().unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["cmd"], "ls");
        assert_eq!(value["version"], serde_json::json!([0, 26, 0]));
    }

    #[test]
    fn wrap_dcs_adds_prefix_and_suffix() {
        let wrapped = wrap_dcs(b"{}");
        assert!(wrapped.starts_with(DCS_PREFIX.as_bytes()));
        assert!(wrapped.ends_with(DCS_SUFFIX.as_bytes()));
    }

    #[test]
    fn extracts_kitty_cmd_prefix() {
        assert_eq!(extract_kitty_cmd(b"@kitty-cmd{}"), Some(&b"{}"[..]));
        assert_eq!(extract_kitty_cmd(b"not-kitty"), None);
    }

    #[test]
    fn cancel_message_clears_payload_and_sets_flags() {
        let mut cmd = RcCommand::new("run", (0, 26, 0), serde_json::json!({"x": 1}));
        cmd.flags.stream = true;
        cmd.flags.single_sent_already = true;
        let cancel = cmd.as_cancel_message();
        assert_eq!(cancel.payload, Value::Null);
        assert!(cancel.flags.cancel_async);
        assert!(cancel.flags.no_response);
        assert!(!cancel.flags.single_sent_already);
    }

    #[test]
    fn response_booleans_render_as_capitalized_strings() {
        assert_eq!(ResponseData::Bool(true).display(), "True");
        assert_eq!(ResponseData::Bool(false).display(), "False");
    }

    #[test]
    fn host_error_response_yields_err() {
        let body = br#"{"ok":false,"error":"no such window","traceback":"..."}"#;
        let response = Response::try_parse(body).unwrap();
        let result = response.into_result();
        assert!(matches!(result, Err(RcError::Host { .. })));
    }

    #[test]
    fn stream_ack_is_recognized() {
        let body = br#"{"ok":true,"data":"stream-ack"}"#;
        let response = Response::try_parse(body).unwrap();
        assert!(response.is_stream_ack());
    }

    #[test]
    fn chunker_splits_blocks_over_2048_bytes_preserving_order() {
        let block = vec![7u8; MAX_CHUNK_BODY * 2 + 10];
        let mut chunker = Chunker::new(vec![Box::new(LiteralSource(Some(block.clone())))]);

        let mut reassembled = Vec::new();
        loop {
            let chunk = chunker.next_chunk(true).unwrap().unwrap();
            if chunk.is_empty() {
                break;
            }
            assert!(chunk.len() <= MAX_CHUNK_BODY);
            reassembled.extend(chunk);
        }
        assert_eq!(reassembled, block);
    }

    #[test]
    fn chunking_idempotence_matches_unsplit_block() {
        // Invariant 3: concatenating size-limited chunks equals the single
        // unsplit block.
        let block = vec![3u8; MAX_CHUNK_BODY + 5];
        let mut limited = Chunker::new(vec![Box::new(LiteralSource(Some(block.clone())))]);
        let mut unsplit = Chunker::new(vec![Box::new(LiteralSource(Some(block.clone())))]);

        let mut concatenated = Vec::new();
        loop {
            let chunk = limited.next_chunk(true).unwrap().unwrap();
            if chunk.is_empty() {
                break;
            }
            concatenated.extend(chunk);
        }
        let single = unsplit.next_chunk(false).unwrap().unwrap();
        assert_eq!(concatenated, single);
    }
}
