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

//! Wire types shared by signature, delta and patch: per-block hashes and
//! the tagged-union delta operations (spec.md §4.I). Encodings are
//! byte-for-byte, little-endian, and binding — not merely illustrative.

use crate::error::RcError;

use super::checksum::{OverallChecksum, RollingChecksum, StrongHash};

/// One block's pair of checksums, as carried in a [`super::Signature`].
/// Wire form: 20 bytes, `index` (u64 LE), `weak` (u32 LE), `strong` (u64 LE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHash {
    pub index: u64,
    pub weak: u32,
    pub strong: u64,
}

/// Encoded size of a [`BlockHash`] record.
pub const BLOCK_HASH_SIZE: usize = 20;

impl BlockHash {
    #[must_use]
    pub fn new(index: u64, block: &[u8]) -> BlockHash {
        BlockHash {
            index,
            weak: RollingChecksum::of_block(block).as_u32(),
            strong: StrongHash::of_block(block).0,
        }
    }

    #[must_use]
    pub fn to_bytes(self) -> [u8; BLOCK_HASH_SIZE] {
        let mut out = [0u8; BLOCK_HASH_SIZE];
        out[0..8].copy_from_slice(&self.index.to_le_bytes());
        out[8..12].copy_from_slice(&self.weak.to_le_bytes());
        out[12..20].copy_from_slice(&self.strong.to_le_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BlockHash, RcError> {
        if bytes.len() < BLOCK_HASH_SIZE {
            return Err(RcError::Protocol("truncated block-hash record".to_string()));
        }
        Ok(BlockHash {
            index: u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            weak: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            strong: u64::from_le_bytes(bytes[12..20].try_into().unwrap()),
        })
    }
}

/// Tag bytes for the four [`Operation`] wire cases (spec.md §4.I).
mod tag {
    pub const BLOCK: u8 = 0;
    pub const BLOCK_RANGE: u8 = 1;
    pub const HASH: u8 = 2;
    pub const DATA: u8 = 3;
}

/// A single instruction produced by the differ and consumed by the
/// patcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Copy one block, `block_index`, from the target file. Encoded size 9.
    Block { block_index: u64 },
    /// Copy the inclusive block range `[block_index, block_index + count)`
    /// from the target file. Encoded size 13.
    BlockRange { block_index: u64, count: u32 },
    /// Compare `bytes` (the 16-byte little-endian [`OverallChecksum`])
    /// against the accumulated checksum of the reconstructed output; the
    /// final operation in every delta. Encoded size `3 + bytes.len()`.
    Hash { bytes: Vec<u8> },
    /// Insert `bytes` literally; not found anywhere in the target's block
    /// index. Encoded size `5 + bytes.len()`.
    Data { bytes: Vec<u8> },
}

impl Operation {
    /// Builds the terminal `Hash` operation carrying the whole-source
    /// overall checksum.
    #[must_use]
    pub fn hash_of(checksum: OverallChecksum) -> Operation {
        Operation::Hash {
            bytes: checksum.to_le_bytes().to_vec(),
        }
    }

    /// Serializes this operation to its binary wire form.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Operation::Block { block_index } => {
                let mut out = Vec::with_capacity(9);
                out.push(tag::BLOCK);
                out.extend_from_slice(&block_index.to_le_bytes());
                out
            }
            Operation::BlockRange { block_index, count } => {
                let mut out = Vec::with_capacity(13);
                out.push(tag::BLOCK_RANGE);
                out.extend_from_slice(&block_index.to_le_bytes());
                out.extend_from_slice(&count.to_le_bytes());
                out
            }
            Operation::Hash { bytes } => {
                let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
                let mut out = Vec::with_capacity(3 + bytes.len());
                out.push(tag::HASH);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(bytes);
                out
            }
            Operation::Data { bytes } => {
                let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                let mut out = Vec::with_capacity(5 + bytes.len());
                out.push(tag::DATA);
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(bytes);
                out
            }
        }
    }

    /// Parses one operation from the head of `buf`, returning it along with
    /// the number of bytes consumed. Operations are concatenated with no
    /// outer framing (spec.md §4.I "Streaming serialization API").
    pub fn from_bytes(buf: &[u8]) -> Result<(Operation, usize), RcError> {
        let truncated = || RcError::Protocol("truncated rsync operation".to_string());
        let tag_byte = *buf.first().ok_or_else(truncated)?;
        match tag_byte {
            tag::BLOCK => {
                let field = buf.get(1..9).ok_or_else(truncated)?;
                let block_index = u64::from_le_bytes(field.try_into().unwrap());
                Ok((Operation::Block { block_index }, 9))
            }
            tag::BLOCK_RANGE => {
                let index_field = buf.get(1..9).ok_or_else(truncated)?;
                let count_field = buf.get(9..13).ok_or_else(truncated)?;
                let block_index = u64::from_le_bytes(index_field.try_into().unwrap());
                let count = u32::from_le_bytes(count_field.try_into().unwrap());
                Ok((Operation::BlockRange { block_index, count }, 13))
            }
            tag::HASH => {
                let len_field = buf.get(1..3).ok_or_else(truncated)?;
                let len = usize::from(u16::from_le_bytes(len_field.try_into().unwrap()));
                let data = buf.get(3..3 + len).ok_or_else(truncated)?;
                Ok((
                    Operation::Hash {
                        bytes: data.to_vec(),
                    },
                    3 + len,
                ))
            }
            tag::DATA => {
                let len_field = buf.get(1..5).ok_or_else(truncated)?;
                let len = u32::from_le_bytes(len_field.try_into().unwrap()) as usize;
                let data = buf.get(5..5 + len).ok_or_else(truncated)?;
                Ok((
                    Operation::Data {
                        bytes: data.to_vec(),
                    },
                    5 + len,
                ))
            }
            other => Err(RcError::Protocol(format!("unknown rsync operation tag {other}"))),
        }
    }

    /// Decodes an entire delta stream (no outer framing) into operations.
    pub fn decode_stream(mut buf: &[u8]) -> Result<Vec<Operation>, RcError> {
        let mut ops = Vec::new();
        while !buf.is_empty() {
            let (op, consumed) = Operation::from_bytes(buf)?;
            ops.push(op);
            buf = &buf[consumed..];
        }
        Ok(ops)
    }

    /// Encodes a full operation list into a delta stream.
    #[must_use]
    pub fn encode_stream(ops: &[Operation]) -> Vec<u8> {
        let mut out = Vec::new();
        for op in ops {
            out.extend_from_slice(&op.to_bytes());
        }
        out
    }
}

/// Appends a matched block index to `ops`, coalescing it into the previous
/// `Block`/`BlockRange` when it immediately follows the last index
/// collected (run-length coalescing per spec.md §4.I).
pub(super) fn push_matched_block(ops: &mut Vec<Operation>, index: u64) {
    match ops.last_mut() {
        Some(Operation::Block { block_index }) if *block_index + 1 == index => {
            let block_index = *block_index;
            *ops.last_mut().unwrap() = Operation::BlockRange {
                block_index,
                count: 2,
            };
        }
        Some(Operation::BlockRange { block_index, count }) if *block_index + u64::from(*count) == index => {
            *count += 1;
        }
        _ => ops.push(Operation::Block { block_index: index }),
    }
}

/// Appends literal bytes to `ops`, coalescing into the previous `Data`
/// operation when one is already at the tail.
pub(super) fn push_literal_bytes(ops: &mut Vec<Operation>, bytes: &[u8]) {
    if let Some(Operation::Data { bytes: existing }) = ops.last_mut() {
        existing.extend_from_slice(bytes);
        return;
    }
    ops.push(Operation::Data {
        bytes: bytes.to_vec(),
    });
}
