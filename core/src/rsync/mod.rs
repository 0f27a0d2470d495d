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

//! Rsync-style delta/patch engine backing the file-transfer remote-control
//! command (spec.md §4.I).
//!
//! ```text
//! target bytes --> Signature ---\
//!                                 >--> Delta(source, signature) --> operations
//! source bytes -------------------/
//!
//! target bytes + operations --> Patcher --> reconstructed source bytes
//! ```
//!
//! Not thread-safe per instance: distinct files require distinct
//! [`Signature`]/[`Differ`](delta::Differ)/[`Patcher`](patch::Patcher)s.

pub mod checksum;
pub mod delta;
pub mod operation;
pub mod patch;
pub mod signature;

pub use checksum::{OverallChecksum, RollingChecksum, StrongHash};
pub use delta::Differ;
pub use operation::{BlockHash, Operation};
pub use patch::Patcher;
pub use signature::Signature;

/// Default block size when the caller doesn't know the expected input size.
pub const DEFAULT_BLOCK_SIZE: usize = 6144;

/// Hard ceiling on the auto-sized block size.
pub const MAX_BLOCK_SIZE: usize = 262_144;

/// Chooses a block size for an input of `expected_size` bytes, per
/// spec.md §4.I "Parameters": `round(sqrt(size))` clamped to
/// `[1, MAX_BLOCK_SIZE]`, or [`DEFAULT_BLOCK_SIZE`] when the size is
/// unknown (`0`).
#[must_use]
pub fn choose_block_size(expected_size: u64) -> usize {
    if expected_size == 0 {
        return DEFAULT_BLOCK_SIZE;
    }
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    let sqrt = (expected_size as f64).sqrt().round() as u64;
    sqrt.clamp(1, MAX_BLOCK_SIZE as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_expected_size_uses_the_default() {
        assert_eq!(choose_block_size(0), DEFAULT_BLOCK_SIZE);
    }

    #[test]
    fn block_size_is_the_rounded_square_root() {
        assert_eq!(choose_block_size(1_000_000), 1000);
    }

    #[test]
    fn block_size_is_clamped_to_the_maximum() {
        assert_eq!(choose_block_size(u64::MAX), MAX_BLOCK_SIZE);
    }

    #[test]
    fn block_size_is_at_least_one() {
        assert_eq!(choose_block_size(1), 1);
    }
}
