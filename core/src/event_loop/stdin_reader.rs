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

//! Wraps blocking stdin reads (for `--read-from-stdin`) in a
//! `spawn_blocking` task feeding an `mpsc` channel, the idiomatic
//! replacement for a raw reader thread: the blocking syscall never ties up
//! an async worker thread.

use std::io::Read;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Byte chunks read from stdin, in order; the channel closes (no further
/// `Some`) once stdin hits EOF or a read error occurs.
pub type StdinReceiver = mpsc::Receiver<Vec<u8>>;

/// Spawns the blocking reader task and returns its handle plus the channel
/// it feeds. `capacity` bounds how far the reader can run ahead of the
/// consumer.
#[must_use]
pub fn spawn(capacity: usize) -> (JoinHandle<()>, StdinReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::task::spawn_blocking(move || {
        let mut stdin = std::io::stdin().lock();
        let mut buf = [0u8; 4096];
        loop {
            match stdin.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if tx.blocking_send(buf[..n].to_vec()).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    (handle, rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_does_not_panic_the_reader_task() {
        let (handle, rx) = spawn(1);
        drop(rx);
        // The blocking task should observe the closed channel and exit
        // cleanly rather than panicking, even with stdin open on whatever
        // the test harness provides.
        let _ = tokio::time::timeout(std::time::Duration::from_millis(200), handle).await;
    }
}
