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

//! Replays [`Operation`]s against the target's bytes to reconstruct the
//! source file (spec.md §4.I, "Patching").

use crate::error::RcError;

use super::checksum::OverallChecksum;
use super::operation::Operation;

/// Reconstructs a file from `target` bytes plus a list of operations
/// computed by [`super::Differ::diff`].
pub struct Patcher<'target> {
    target: &'target [u8],
    block_size: usize,
}

impl<'target> Patcher<'target> {
    #[must_use]
    pub fn new(target: &'target [u8], block_size: usize) -> Patcher<'target> {
        Patcher {
            target,
            block_size: block_size.max(1),
        }
    }

    /// Reads the `block_size`-sized (or shorter, for the last block) slice
    /// of `target` starting at block `index`.
    fn block(&self, index: u64) -> Result<&'target [u8], RcError> {
        let start = (index as usize)
            .checked_mul(self.block_size)
            .ok_or_else(|| RcError::Corruption("block index overflow".to_string()))?;
        let end = start
            .checked_add(self.block_size)
            .map(|end| end.min(self.target.len()))
            .ok_or_else(|| RcError::Corruption("block index overflow".to_string()))?;
        self.target.get(start..end).ok_or_else(|| {
            RcError::Corruption(format!("operation references block {index} past end of target"))
        })
    }

    /// Applies `ops` in order, returning the reconstructed bytes. The final
    /// operation is expected to be a `Hash`; its value is compared against
    /// the accumulated overall checksum of everything written, and a
    /// mismatch is reported as [`RcError::Corruption`] (spec.md §4.I
    /// "Overall checksum").
    pub fn apply(&self, ops: &[Operation]) -> Result<Vec<u8>, RcError> {
        let mut out = Vec::new();
        for op in ops {
            match op {
                Operation::Block { block_index } => {
                    out.extend_from_slice(self.block(*block_index)?);
                }
                Operation::BlockRange { block_index, count } => {
                    for offset in 0..u64::from(*count) {
                        out.extend_from_slice(self.block(*block_index + offset)?);
                    }
                }
                Operation::Data { bytes } => out.extend_from_slice(bytes),
                Operation::Hash { bytes } => {
                    let expected: [u8; 16] = bytes.as_slice().try_into().map_err(|_| {
                        RcError::Corruption("final hash operation is not 16 bytes".to_string())
                    })?;
                    let expected = OverallChecksum::from_le_bytes(&expected);
                    let actual = OverallChecksum::of_whole(&out);
                    if expected != actual {
                        return Err(RcError::Corruption(
                            "overall checksum mismatch after patching".to_string(),
                        ));
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rsync::signature::Signature;

    #[test]
    fn block_range_reconstructs_contiguous_target_blocks() {
        let target = b"0123456789abcdefghij".to_vec();
        let patcher = Patcher::new(&target, 10);
        let ops = vec![
            Operation::BlockRange {
                block_index: 0,
                count: 2,
            },
            Operation::hash_of(OverallChecksum::of_whole(&target)),
        ];
        assert_eq!(patcher.apply(&ops).unwrap(), target);
    }

    #[test]
    fn data_and_block_operations_concatenate_in_order() {
        let target = b"AAAAAAAAAABBBBBBBBBB".to_vec();
        let patcher = Patcher::new(&target, 10);
        let source = b"AAAAAAAAAAXXXXXBBBBBBBBBB".to_vec();
        let ops = vec![
            Operation::Block { block_index: 0 },
            Operation::Data {
                bytes: b"XXXXX".to_vec(),
            },
            Operation::Block { block_index: 1 },
            Operation::hash_of(OverallChecksum::of_whole(&source)),
        ];
        assert_eq!(patcher.apply(&ops).unwrap(), source);
    }

    #[test]
    fn a_short_final_block_is_copied_in_full() {
        let target = b"0123456789abcde".to_vec();
        let patcher = Patcher::new(&target, 10);
        let ops = vec![
            Operation::Block { block_index: 1 },
            Operation::hash_of(OverallChecksum::of_whole(b"abcde")),
        ];
        assert_eq!(patcher.apply(&ops).unwrap(), b"abcde".to_vec());
    }

    #[test]
    fn copy_past_the_end_of_target_is_corruption() {
        let target = b"0123456789".to_vec();
        let patcher = Patcher::new(&target, 10);
        let ops = vec![Operation::Block { block_index: 5 }];
        assert!(matches!(patcher.apply(&ops), Err(RcError::Corruption(_))));
    }

    #[test]
    fn a_mismatched_final_hash_is_corruption() {
        let target = b"0123456789".to_vec();
        let patcher = Patcher::new(&target, 10);
        let ops = vec![
            Operation::Block { block_index: 0 },
            Operation::hash_of(OverallChecksum(0)),
        ];
        assert!(matches!(patcher.apply(&ops), Err(RcError::Corruption(_))));
    }

    #[test]
    fn round_trips_through_differ_and_patcher() {
        let target = b"The quick brown fox jumps over the lazy dog.".to_vec();
        let source =
            b"The quick brown fox JUMPS over the lazy dog and then sleeps.".to_vec();
        let signature = Signature::compute(&target, 8);
        let differ = crate::rsync::Differ::new(&signature);
        let ops = differ.diff(&source);
        let patcher = Patcher::new(&target, 8);
        assert_eq!(patcher.apply(&ops).unwrap(), source);
    }

    #[test]
    fn round_trips_through_the_binary_wire_encoding() {
        let target = b"The quick brown fox jumps over the lazy dog.".to_vec();
        let source =
            b"The quick brown fox JUMPS over the lazy dog and then sleeps.".to_vec();
        let signature = Signature::compute(&target, 8);
        let differ = crate::rsync::Differ::new(&signature);
        let ops = differ.diff(&source);
        let wire = Operation::encode_stream(&ops);
        let decoded = Operation::decode_stream(&wire).unwrap();
        let patcher = Patcher::new(&target, 8);
        assert_eq!(patcher.apply(&decoded).unwrap(), source);
    }
}
