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

//! Byte-at-a-time UTF-8 decoder using Bjoern Hoehrmann's DFA
//! (<https://bjoern.hoehrmann.de/utf-8/decoder/dfa/>). `ACCEPT` is state 0,
//! `REJECT` is state 12; every other state is "more bytes needed".

const ACCEPT: u32 = 0;
const REJECT: u32 = 12;

#[rustfmt::skip]
const CLASSES: [u8; 256] = [
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1, 9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,
    7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,
    8,8,2,2,2,2,2,2,2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,
    10,3,3,3,3,3,3,3,3,3,3,3,3,4,3,3, 11,6,6,6,5,8,8,8,8,8,8,8,8,8,8,8,
];

#[rustfmt::skip]
const TRANSITIONS: [u32; 108] = [
     0,12,24,36,60,96,84,12,12,12,48,72,
    12,0,12,12,12,12,12,0,12,0,12,12,
    12,24,12,12,12,12,12,24,12,24,12,12,
    12,12,12,12,12,12,12,24,12,12,12,12,
    12,24,12,12,12,12,12,12,12,24,12,12,
    12,12,12,12,12,12,12,12,12,12,12,12,
    12,36,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
    12,12,12,12,12,12,12,48,12,12,12,12,
    12,48,12,12,12,12,12,48,12,48,12,12,
    12,48,12,12,12,12,12,12,12,12,12,12,
];

/// A single instance of the DFA, accumulating state across calls to
/// [`push`](Self::push). One [`Utf8Decoder`] per input stream.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    state: u32,
    codepoint: u32,
    pending: Vec<char>,
}

impl Utf8Decoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one byte, appending any decoded code points to `out`. On
    /// `REJECT` after a prior non-`ACCEPT` state, the offending byte is
    /// re-parsed from `ACCEPT` (spec.md §4.A), so a single byte can produce
    /// both a `U+FFFD` replacement and, if that byte starts a new valid
    /// sequence on its own, a second code point.
    pub fn push(&mut self, byte: u8) {
        let prior_state = self.state;
        self.step(byte);

        if self.state != REJECT {
            self.accept_if_ready();
            return;
        }

        self.state = ACCEPT;
        self.codepoint = 0;
        self.pending.push('\u{fffd}');

        if prior_state == ACCEPT {
            // This byte was invalid even as the start of a sequence; nothing
            // more to reprocess.
            return;
        }

        // The byte didn't belong to the aborted sequence; give it a fresh
        // chance to start one of its own.
        self.step(byte);
        if self.state == REJECT {
            self.state = ACCEPT;
            self.codepoint = 0;
            self.pending.push('\u{fffd}');
            return;
        }
        self.accept_if_ready();
    }

    fn accept_if_ready(&mut self) {
        if self.state == ACCEPT {
            if let Some(ch) = char::from_u32(self.codepoint) {
                self.pending.push(ch);
            }
            self.codepoint = 0;
        }
    }

    fn step(&mut self, byte: u8) {
        let class = CLASSES[byte as usize] as u32;
        if self.state != ACCEPT {
            self.codepoint = (self.codepoint << 6) | (u32::from(byte) & 0x3f);
        } else {
            self.codepoint = (0xff >> class) as u32 & u32::from(byte);
        }
        self.state = TRANSITIONS[(self.state + class) as usize];
    }

    /// Drains and returns any code points decoded so far. [`push`](Self::push)
    /// may enqueue zero, one, or two code points for a single byte.
    pub fn take_pending(&mut self) -> std::vec::Drain<'_, char> {
        self.pending.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<char> {
        let mut decoder = Utf8Decoder::new();
        let mut out = Vec::new();
        for &b in bytes {
            decoder.push(b);
            out.extend(decoder.take_pending());
        }
        out
    }

    #[test]
    fn ascii_decodes_one_to_one() {
        assert_eq!(decode(b"abc"), vec!['a', 'b', 'c']);
    }

    #[test]
    fn two_byte_sequence_decodes_correctly() {
        assert_eq!(decode("é".as_bytes()), vec!['é']);
    }

    #[test]
    fn three_byte_sequence_decodes_correctly() {
        assert_eq!(decode("€".as_bytes()), vec!['€']);
    }

    #[test]
    fn four_byte_sequence_decodes_correctly() {
        assert_eq!(decode("😀".as_bytes()), vec!['😀']);
    }

    #[test]
    fn invalid_continuation_byte_is_replaced() {
        // 0xc2 must be followed by a continuation byte; 'A' is not one.
        assert_eq!(decode(&[0xc2, b'A']), vec!['\u{fffd}', 'A']);
    }

    #[test]
    fn lone_continuation_byte_is_replaced() {
        assert_eq!(decode(&[0x80]), vec!['\u{fffd}']);
    }
}
