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

//! Weak rolling checksum and strong content hashes used by the rsync delta
//! engine (spec.md §4.I).

use twox_hash::{XxHash3_128, XxHash3_64};

/// `2^16`, the modulus spec.md §4.I's weak checksum formula uses for both
/// halves. Not Adler-32's `65521`: implementers must match the reference
/// formula exactly for the weak hash to be interoperable across the wire.
const MOD: u32 = 1 << 16;

/// Rolling checksum per spec.md §4.I: `α = Σ b_i mod 2^16`,
/// `β = Σ (L−i)·b_i mod 2^16`, cheap to update as a window slides one byte
/// at a time over the input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollingChecksum {
    alpha: u32,
    beta: u32,
    len: u32,
}

impl RollingChecksum {
    /// Computes the checksum of `block` from scratch.
    #[must_use]
    pub fn of_block(block: &[u8]) -> RollingChecksum {
        let len = u32::try_from(block.len()).unwrap_or(u32::MAX);
        let mut alpha = 0u32;
        let mut beta = 0u32;
        for (i, &byte) in block.iter().enumerate() {
            let i = u32::try_from(i).unwrap_or(u32::MAX);
            alpha = alpha.wrapping_add(u32::from(byte));
            beta = beta.wrapping_add((len - i).wrapping_mul(u32::from(byte)));
        }
        RollingChecksum {
            alpha: alpha % MOD,
            beta: beta % MOD,
            len,
        }
    }

    /// Slides the checksum window forward by one byte: `old_byte` leaves at
    /// the trailing edge, `new_byte` enters at the leading edge. The window
    /// length does not change.
    ///
    /// Derived from the block formula: with `α' = α − old + new` and the new
    /// window's bytes re-indexed by one, `β' = β + α − (L+1)·old + new`
    /// (all mod `2^16`).
    #[must_use]
    pub fn roll(&self, old_byte: u8, new_byte: u8) -> RollingChecksum {
        let len = self.len;
        let old = u32::from(old_byte);
        let new = u32::from(new_byte);
        let alpha = self.alpha.wrapping_sub(old).wrapping_add(new) % MOD;
        let beta = self
            .beta
            .wrapping_add(self.alpha)
            .wrapping_sub((len + 1).wrapping_mul(old))
            .wrapping_add(new)
            % MOD;
        RollingChecksum { alpha, beta, len }
    }

    /// Packs the checksum into the 32-bit value exchanged on the wire:
    /// `val = α + 2^16 · β`.
    #[must_use]
    pub fn as_u32(&self) -> u32 {
        self.alpha | (self.beta << 16)
    }
}

/// 64-bit `XXH3` strong hash of a block, used to disambiguate blocks whose
/// weak checksums collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrongHash(pub u64);

impl StrongHash {
    #[must_use]
    pub fn of_block(block: &[u8]) -> StrongHash {
        StrongHash(XxHash3_64::oneshot(block))
    }
}

/// 128-bit `XXH3` checksum of an entire file, used as the whole-file
/// integrity check after reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverallChecksum(pub u128);

impl OverallChecksum {
    #[must_use]
    pub fn of_whole(data: &[u8]) -> OverallChecksum {
        OverallChecksum(XxHash3_128::oneshot(data))
    }

    /// Little-endian 16-byte wire form carried by the final `Hash`
    /// operation (spec.md §4.I).
    #[must_use]
    pub fn to_le_bytes(self) -> [u8; 16] {
        self.0.to_le_bytes()
    }

    /// Inverse of [`OverallChecksum::to_le_bytes`].
    #[must_use]
    pub fn from_le_bytes(bytes: &[u8; 16]) -> OverallChecksum {
        OverallChecksum(u128::from_le_bytes(*bytes))
    }
}
