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

//! Computes the minimal set of [`Operation`]s needed to turn a target file
//! into the source file, given the target's [`Signature`] (spec.md §4.I,
//! "Delta").

use super::checksum::{OverallChecksum, RollingChecksum};
use super::operation::{push_literal_bytes, push_matched_block, Operation};
use super::signature::Signature;

/// Scans `source` against a pre-built [`Signature`] of the target, moving a
/// `block_size`-wide rolling window one byte at a time over the bytes that
/// don't match, and jumping the window past any block it does match.
pub struct Differ<'sig> {
    signature: &'sig Signature,
    weak_index: rustc_hash::FxHashMap<u32, Vec<usize>>,
}

impl<'sig> Differ<'sig> {
    #[must_use]
    pub fn new(signature: &'sig Signature) -> Differ<'sig> {
        Differ {
            weak_index: signature.weak_index(),
            signature,
        }
    }

    /// Produces the operation list that reconstructs `source` when replayed
    /// against the target bytes the signature was computed from.
    ///
    /// The weak checksum of a non-matching window is never recomputed from
    /// scratch on the next byte: it's rolled forward one byte at a time via
    /// [`RollingChecksum::roll`], restarting from a fresh [`RollingChecksum
    /// ::of_block`] only right after a match (where the window jumps
    /// `block_size` bytes ahead rather than sliding).
    #[must_use]
    pub fn diff(&self, source: &[u8]) -> Vec<Operation> {
        let block_size = self.signature.block_size;
        let mut ops = Vec::new();
        let mut literal_start = 0usize;
        let mut pos = 0usize;
        let mut rolling: Option<RollingChecksum> = None;

        while pos < source.len() {
            let window_end = (pos + block_size).min(source.len());
            let window = &source[pos..window_end];

            if window.len() != block_size {
                rolling = None;
                pos += 1;
                continue;
            }

            let current = rolling.unwrap_or_else(|| RollingChecksum::of_block(window));
            if let Some(index) = self.signature.find_block(&self.weak_index, current, window) {
                if literal_start < pos {
                    push_literal_bytes(&mut ops, &source[literal_start..pos]);
                }
                push_matched_block(&mut ops, index);
                pos += block_size;
                literal_start = pos;
                rolling = None;
                continue;
            }

            rolling = (window_end < source.len())
                .then(|| current.roll(source[pos], source[window_end]));
            pos += 1;
        }

        if literal_start < source.len() {
            push_literal_bytes(&mut ops, &source[literal_start..source.len()]);
        }
        ops.push(Operation::hash_of(OverallChecksum::of_whole(source)));
        ops
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsync::signature::Signature;

    #[test]
    fn identical_files_produce_a_single_block_range_spanning_all_blocks() {
        let target = b"0123456789abcdefghij".to_vec();
        let signature = Signature::compute(&target, 10);
        let differ = Differ::new(&signature);
        let ops = differ.diff(&target);
        assert_eq!(
            ops,
            vec![
                Operation::BlockRange {
                    block_index: 0,
                    count: 2
                },
                Operation::hash_of(OverallChecksum::of_whole(&target)),
            ]
        );
    }

    #[test]
    fn an_insertion_in_the_middle_yields_block_data_block() {
        let target = b"AAAAAAAAAABBBBBBBBBB".to_vec();
        let signature = Signature::compute(&target, 10);
        let differ = Differ::new(&signature);
        let source = b"AAAAAAAAAAXXXXXBBBBBBBBBB".to_vec();
        let ops = differ.diff(&source);
        assert_eq!(
            ops,
            vec![
                Operation::Block { block_index: 0 },
                Operation::Data {
                    bytes: b"XXXXX".to_vec()
                },
                Operation::Block { block_index: 1 },
                Operation::hash_of(OverallChecksum::of_whole(&source)),
            ]
        );
    }

    #[test]
    fn wholly_unrelated_data_yields_a_single_data_operation() {
        let target = b"0123456789".to_vec();
        let signature = Signature::compute(&target, 10);
        let differ = Differ::new(&signature);
        let source = b"zzzzzzzzzz".to_vec();
        let ops = differ.diff(&source);
        assert_eq!(
            ops,
            vec![
                Operation::Data {
                    bytes: b"zzzzzzzzzz".to_vec()
                },
                Operation::hash_of(OverallChecksum::of_whole(&source)),
            ]
        );
    }
}
