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

//! Builds and serializes a target file's block-hash index (spec.md §4.I,
//! "Signature").

use std::collections::HashMap;

use rustc_hash::FxHashMap;

use crate::error::RcError;

use super::checksum::RollingChecksum;
use super::operation::{BlockHash, BLOCK_HASH_SIZE};

/// Algorithm name carried in the signature stream's JSON header, naming the
/// weak rolling checksum this implementation uses.
const WEAK_HASH_NAME: &str = "adler32-like";

/// Algorithm name carried in the signature stream's JSON header, naming the
/// strong per-block hash this implementation uses.
const STRONG_HASH_NAME: &str = "xxh3-64";

/// The target file's block index: one [`BlockHash`] per `block_size`-sized
/// chunk (the final block may be shorter). Sent from the side that already
/// has a copy of the file to the side computing a delta against it.
#[derive(Debug, Clone)]
pub struct Signature {
    pub block_size: usize,
    pub file_len: u64,
    pub blocks: Vec<BlockHash>,
}

impl Signature {
    /// Splits `target` into `block_size`-sized chunks and hashes each one.
    #[must_use]
    pub fn compute(target: &[u8], block_size: usize) -> Signature {
        let blocks = target
            .chunks(block_size.max(1))
            .enumerate()
            .map(|(index, chunk)| BlockHash::new(index as u64, chunk))
            .collect();
        Signature {
            block_size: block_size.max(1),
            file_len: target.len() as u64,
            blocks,
        }
    }

    /// Builds a lookup from weak checksum to the indices of blocks sharing
    /// it, for the differ's rolling-window search. Weak-checksum
    /// collisions are resolved by re-checking the strong hash per
    /// candidate.
    #[must_use]
    pub(super) fn weak_index(&self) -> FxHashMap<u32, Vec<usize>> {
        let mut index: FxHashMap<u32, Vec<usize>> = HashMap::default();
        for (position, block) in self.blocks.iter().enumerate() {
            index.entry(block.weak).or_default().push(position);
        }
        index
    }

    /// Looks up the block index matching `window`'s weak checksum and
    /// strong hash, if any such block exists in this signature.
    pub(super) fn find_block(
        &self,
        index: &FxHashMap<u32, Vec<usize>>,
        rolling: RollingChecksum,
        window: &[u8],
    ) -> Option<u64> {
        let candidates = index.get(&rolling.as_u32())?;
        let strong = super::checksum::StrongHash::of_block(window).0;
        candidates
            .iter()
            .find(|&&position| self.blocks[position].strong == strong)
            .map(|&position| self.blocks[position].index)
    }

    /// Serializes this signature to its wire form (spec.md §4.I "Streaming
    /// serialization API"): a 4-byte little-endian length prefix, a UTF-8
    /// JSON header naming the checksum algorithms and block size, then a
    /// concatenation of 20-byte block-hash records.
    #[must_use]
    pub fn to_stream_bytes(&self) -> Vec<u8> {
        let header = serde_json::json!({
            "weak_hash": WEAK_HASH_NAME,
            "strong_hash": STRONG_HASH_NAME,
            "block_size": self.block_size,
        })
        .to_string();
        let header_bytes = header.into_bytes();
        let header_len = u32::try_from(header_bytes.len()).unwrap_or(u32::MAX);

        let mut out = Vec::with_capacity(4 + header_bytes.len() + self.blocks.len() * BLOCK_HASH_SIZE);
        out.extend_from_slice(&header_len.to_le_bytes());
        out.extend_from_slice(&header_bytes);
        for block in &self.blocks {
            out.extend_from_slice(&block.to_bytes());
        }
        out
    }

    /// Inverse of [`Signature::to_stream_bytes`]. `file_len` isn't carried
    /// on the wire; it's recovered as `block_size * (blocks.len() - 1) +
    /// last_block_len`, which this parser can't know, so it's left `0` and
    /// is informational only for signatures reconstructed this way.
    pub fn from_stream_bytes(buf: &[u8]) -> Result<Signature, RcError> {
        let truncated = || RcError::Protocol("truncated rsync signature stream".to_string());
        let len_field = buf.get(0..4).ok_or_else(truncated)?;
        let header_len = u32::from_le_bytes(len_field.try_into().unwrap()) as usize;
        let header_bytes = buf.get(4..4 + header_len).ok_or_else(truncated)?;
        let header: serde_json::Value = serde_json::from_slice(header_bytes)?;
        let block_size = header
            .get("block_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| RcError::Protocol("signature header missing block_size".to_string()))?
            as usize;

        let mut blocks = Vec::new();
        let mut rest = &buf[4 + header_len..];
        while !rest.is_empty() {
            let record = rest
                .get(0..BLOCK_HASH_SIZE)
                .ok_or_else(|| RcError::Protocol("truncated block-hash record".to_string()))?;
            blocks.push(BlockHash::from_bytes(record)?);
            rest = &rest[BLOCK_HASH_SIZE..];
        }

        Ok(Signature {
            block_size: block_size.max(1),
            file_len: 0,
            blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_produces_one_block_hash_per_chunk() {
        let data = vec![b'a'; 25];
        let sig = Signature::compute(&data, 10);
        assert_eq!(sig.blocks.len(), 3);
        assert_eq!(sig.blocks[2].index, 2);
    }

    #[test]
    fn find_block_locates_an_exact_match() {
        let data = b"abcdefghij0123456789".to_vec();
        let sig = Signature::compute(&data, 10);
        let index = sig.weak_index();
        let window = &data[10..20];
        let rolling = RollingChecksum::of_block(window);
        assert_eq!(sig.find_block(&index, rolling, window), Some(1));
    }

    #[test]
    fn find_block_returns_none_for_unmatched_data() {
        let data = b"abcdefghij0123456789".to_vec();
        let sig = Signature::compute(&data, 10);
        let index = sig.weak_index();
        let window = b"zzzzzzzzzz";
        let rolling = RollingChecksum::of_block(window);
        assert_eq!(sig.find_block(&index, rolling, window), None);
    }

    #[test]
    fn signature_stream_round_trips_its_blocks_and_block_size() {
        let data = b"abcdefghij0123456789xyz".to_vec();
        let sig = Signature::compute(&data, 10);
        let bytes = sig.to_stream_bytes();
        let parsed = Signature::from_stream_bytes(&bytes).unwrap();
        assert_eq!(parsed.block_size, sig.block_size);
        assert_eq!(parsed.blocks, sig.blocks);
    }

    #[test]
    fn signature_stream_header_is_length_prefixed_json() {
        let sig = Signature::compute(b"abc", 10);
        let bytes = sig.to_stream_bytes();
        let header_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
        let header: serde_json::Value = serde_json::from_slice(&bytes[4..4 + header_len]).unwrap();
        assert_eq!(header["block_size"], 10);
        assert!(header["weak_hash"].is_string());
        assert!(header["strong_hash"].is_string());
    }
}
