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

//! # rc_core
//!
//! Client-side core for sending remote-control commands to a running
//! terminal emulator and reading back structured responses, plus the
//! rsync-style delta engine backing the file-transfer remote-control
//! command.
//!
//! ```text
//! caller -> build command -> encryption (H) -> framing (E)
//!        -> transport (F or G) -> host terminal
//!        -> response bytes -> escape parser (A) -> framing (E) -> caller
//! ```
//!
//! Everything here is I/O, framing, and delta computation. Rendering, image
//! composition, and UI layout are out of scope.

#![cfg_attr(not(test), deny(clippy::unwrap_in_result))]

pub mod ansi;
pub mod config;
pub mod encryption;
pub mod error;
pub mod event_loop;
pub mod key_mouse;
pub mod rc_framing;
pub mod rsync;
pub mod shlex;
pub mod terminal_state;
pub mod themes_cache;
pub mod transport;

pub use config::{Address, PasswordSource, RcConfig, UsePasswordPolicy};
pub use error::RcError;

/// Sets `mimalloc` as the process-wide global allocator. Call once from
/// `main`, matching the teacher's `set_mimalloc_in_main!` convention.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
