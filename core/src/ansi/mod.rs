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

//! Escape-code parser: byte stream in, structured events out.
//!
//! ```text
//! Host response bytes
//!    |
//!    v
//! ┌──────────────────────────────┐
//! │ parser.rs - Parser state     │  <- YOU ARE HERE
//! │  • feed() drives the DFA     │
//! │  • dispatches ParserEvent    │
//! └──────────────────────────────┘
//!    |
//!    v
//! crate::rc_framing (DCS @kitty-cmd extraction)
//! ```
//!
//! The parser never blocks and never allocates per byte; control-string
//! bodies accumulate into a reused buffer. Malformed CSI/OSC sequences are
//! dropped silently, matching the teacher's principle that a malformed
//! terminal sequence is not an application error.

mod utf8;

pub use utf8::Utf8Decoder;

/// Events the parser delivers to its caller. One event corresponds to one
/// complete, well-formed unit recognized in the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserEvent {
    Rune(char),
    Csi(Vec<u8>),
    Osc(Vec<u8>),
    Dcs(Vec<u8>),
    Apc(Vec<u8>),
    Pm(Vec<u8>),
    Sos(Vec<u8>),
    EndBracketedPaste,
}

/// Errors a callback may raise to abort parsing. Malformed escape sequences
/// themselves are never represented here; they are discarded in place.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("parser callback error: {0}")]
pub struct CallbackError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    Esc,
    Csi,
    /// Waiting for the String Terminator of a DCS/APC/PM/SOS string.
    St(ControlStringKind),
    /// Waiting for the ST of an OSC string, which may also end in BEL.
    StOrBel,
    /// Saw ESC while inside an ST-terminated string; next byte decides
    /// whether this is the terminator (`\`) or not.
    EscSt(ControlStringKind),
    /// Saw 0xc2 while inside an ST-terminated string; next byte decides
    /// whether this is the C1-encoded terminator (0x9c).
    C1St(ControlStringKind),
    BracketedPaste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlStringKind {
    Dcs,
    Osc,
    Apc,
    Pm,
    Sos,
}

/// CSI bytes that introduce bracketed paste (`CSI 200~` / `CSI 201~`), kept
/// as a byte-terminator so a partial match can be re-emitted as runes if it
/// turns out not to be the real terminator.
const BRACKETED_PASTE_BEGIN: &[u8] = b"200~";
const BRACKETED_PASTE_END: &[u8] = b"201~";

/// Streaming parser over a byte source. Construct once per connection and
/// feed it bytes as they arrive; it preserves state across calls to [`Self::feed`].
pub struct Parser {
    state: State,
    csi_buf: Vec<u8>,
    string_buf: Vec<u8>,
    /// Buffers a tentative bracketed-paste terminator match so the bytes can
    /// be replayed as runes if the terminator turns out not to match.
    paste_terminator_buf: Vec<u8>,
    paste_matching: Option<&'static [u8]>,
    utf8: Utf8Decoder,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    #[must_use]
    pub fn new() -> Self {
        Parser {
            state: State::Normal,
            csi_buf: Vec::new(),
            string_buf: Vec::new(),
            paste_terminator_buf: Vec::new(),
            paste_matching: None,
            utf8: Utf8Decoder::new(),
        }
    }

    /// Feeds `bytes` through the parser, invoking `on_event` for each
    /// complete event. `on_event` may return [`CallbackError`] to abort.
    pub fn feed(
        &mut self,
        bytes: &[u8],
        mut on_event: impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        for &byte in bytes {
            self.feed_one(byte, &mut on_event)?;
        }
        Ok(())
    }

    fn feed_one(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        match self.state {
            State::Normal => self.feed_normal(byte, on_event),
            State::Esc => self.feed_esc(byte, on_event),
            State::Csi => self.feed_csi(byte, on_event),
            State::St(kind) => self.feed_string(byte, kind, on_event),
            State::StOrBel => self.feed_osc_body(byte, on_event),
            State::EscSt(kind) => self.feed_esc_st(byte, kind, on_event),
            State::C1St(kind) => self.feed_c1_st(byte, kind, on_event),
            State::BracketedPaste => self.feed_bracketed_paste(byte, on_event),
        }
    }

    fn feed_normal(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        if byte == 0x1b {
            self.state = State::Esc;
            return Ok(());
        }
        self.decode_rune(byte, on_event)
    }

    fn decode_rune(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        self.utf8.push(byte);
        let chars: Vec<char> = self.utf8.take_pending().collect();
        for ch in chars {
            on_event(ParserEvent::Rune(ch))?;
        }
        Ok(())
    }

    fn feed_esc(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        match byte {
            b'[' => {
                self.csi_buf.clear();
                self.state = State::Csi;
            }
            b'P' => self.begin_control_string(ControlStringKind::Dcs),
            b']' => self.begin_control_string(ControlStringKind::Osc),
            b'_' => self.begin_control_string(ControlStringKind::Apc),
            b'^' => self.begin_control_string(ControlStringKind::Pm),
            b'X' => self.begin_control_string(ControlStringKind::Sos),
            _ => {
                // Not a recognized introducer: silently drop back to normal,
                // reprocessing this byte as plain input.
                self.state = State::Normal;
                self.decode_rune(byte, on_event)?;
            }
        }
        Ok(())
    }

    fn begin_control_string(&mut self, kind: ControlStringKind) {
        self.string_buf.clear();
        self.state = if kind == ControlStringKind::Osc {
            State::StOrBel
        } else {
            State::St(kind)
        };
    }

    fn feed_csi(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        match byte {
            0x30..=0x3f | b'-' => {
                self.csi_buf.push(byte);
            }
            0x20..=0x2f => {
                // Intermediate byte; a parameter byte after this would void
                // the sequence, but that is enforced implicitly: once we see
                // a final byte we don't re-validate ordering, matching the
                // "unknown bytes void the sequence silently" rule.
                self.csi_buf.push(byte);
            }
            0x40..=0x7e => {
                self.csi_buf.push(byte);
                self.dispatch_csi(on_event)?;
            }
            _ => {
                // Voids the sequence silently; drop accumulated bytes.
                self.state = State::Normal;
                self.csi_buf.clear();
            }
        }
        Ok(())
    }

    fn dispatch_csi(
        &mut self,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        self.state = State::Normal;
        if self.csi_buf.as_slice() == BRACKETED_PASTE_BEGIN {
            self.csi_buf.clear();
            self.state = State::BracketedPaste;
            return Ok(());
        }
        let body = std::mem::take(&mut self.csi_buf);
        on_event(ParserEvent::Csi(body))
    }

    fn feed_string(
        &mut self,
        byte: u8,
        kind: ControlStringKind,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        match byte {
            0x1b => self.state = State::EscSt(kind),
            0xc2 => self.state = State::C1St(kind),
            _ => self.string_buf.push(byte),
        }
        let _ = on_event;
        Ok(())
    }

    fn feed_osc_body(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        match byte {
            0x07 => self.finish_control_string(ControlStringKind::Osc, on_event),
            0x1b => {
                self.state = State::EscSt(ControlStringKind::Osc);
                Ok(())
            }
            0xc2 => {
                self.state = State::C1St(ControlStringKind::Osc);
                Ok(())
            }
            _ => {
                self.string_buf.push(byte);
                Ok(())
            }
        }
    }

    fn feed_esc_st(
        &mut self,
        byte: u8,
        kind: ControlStringKind,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        if byte == b'\\' {
            self.finish_control_string(kind, on_event)
        } else {
            // Not a terminator: the ESC belonged to the string body. Put it
            // back (discarded, matching the "silently void" rule for ST-less
            // escapes inside control strings) and resume buffering.
            self.string_buf.push(0x1b);
            self.state = if kind == ControlStringKind::Osc {
                State::StOrBel
            } else {
                State::St(kind)
            };
            self.feed_one(byte, on_event)
        }
    }

    fn feed_c1_st(
        &mut self,
        byte: u8,
        kind: ControlStringKind,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        if byte == 0x9c {
            self.finish_control_string(kind, on_event)
        } else {
            self.string_buf.push(0xc2);
            self.state = if kind == ControlStringKind::Osc {
                State::StOrBel
            } else {
                State::St(kind)
            };
            self.feed_one(byte, on_event)
        }
    }

    fn finish_control_string(
        &mut self,
        kind: ControlStringKind,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        self.state = State::Normal;
        let body = std::mem::take(&mut self.string_buf);
        let event = match kind {
            ControlStringKind::Dcs => ParserEvent::Dcs(body),
            ControlStringKind::Osc => ParserEvent::Osc(body),
            ControlStringKind::Apc => ParserEvent::Apc(body),
            ControlStringKind::Pm => ParserEvent::Pm(body),
            ControlStringKind::Sos => ParserEvent::Sos(body),
        };
        on_event(event)
    }

    fn feed_bracketed_paste(
        &mut self,
        byte: u8,
        on_event: &mut impl FnMut(ParserEvent) -> Result<(), CallbackError>,
    ) -> Result<(), CallbackError> {
        if self.paste_matching.is_none() && byte == 0x1b {
            self.paste_matching = Some(BRACKETED_PASTE_END);
            self.paste_terminator_buf.clear();
            self.paste_terminator_buf.push(byte);
            return Ok(());
        }

        if let Some(_terminator) = self.paste_matching {
            // We're inside `ESC [ 2 0 1 ~`; match byte-by-byte against `[201~`.
            let expect = match self.paste_terminator_buf.len() {
                1 => b'[',
                2 => b'2',
                3 => b'0',
                4 => b'1',
                5 => b'~',
                _ => unreachable!("terminator buffer longer than the terminator itself"),
            };
            if byte == expect {
                self.paste_terminator_buf.push(byte);
                if self.paste_terminator_buf.len() == 6 {
                    self.paste_matching = None;
                    self.paste_terminator_buf.clear();
                    self.state = State::Normal;
                    on_event(ParserEvent::EndBracketedPaste)?;
                }
                return Ok(());
            }
            // Mismatch: replay the buffered bytes as runes, then reprocess
            // this byte from bracketed-paste state.
            self.paste_matching = None;
            let buffered = std::mem::take(&mut self.paste_terminator_buf);
            for b in buffered {
                self.decode_rune(b, on_event)?;
            }
            return self.feed_bracketed_paste(byte, on_event);
        }

        self.decode_rune(byte, on_event)
    }
}
