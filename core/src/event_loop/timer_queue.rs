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

//! Deadline-ordered queue backing the dispatcher's timers (retry
//! backoffs, repeating read deadlines): earliest deadline first, ties
//! broken by insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tokio::time::Instant;

struct Entry<T> {
    deadline: Instant,
    seq: u64,
    payload: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}
impl<T> Eq for Entry<T> {}
impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so `BinaryHeap` (a max-heap) pops the earliest deadline
        // first, ties broken by the lower (earlier) insertion sequence.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// A min-heap of `(deadline, payload)` pairs ordered by deadline with
/// stable insertion-order tie-breaking.
pub struct TimerQueue<T> {
    entries: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        TimerQueue {
            entries: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> TimerQueue<T> {
    #[must_use]
    pub fn new() -> TimerQueue<T> {
        TimerQueue::default()
    }

    pub fn schedule(&mut self, deadline: Instant, payload: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            deadline,
            seq,
            payload,
        });
    }

    /// Pops and returns the earliest-deadline entry if its deadline is
    /// `<= now`, without touching anything still in the future.
    pub fn pop_ready(&mut self, now: Instant) -> Option<T> {
        if self.entries.peek()?.deadline > now {
            return None;
        }
        self.entries.pop().map(|entry| entry.payload)
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.peek().map(|entry| entry.deadline)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pops_entries_in_deadline_order() {
        let now = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(now + Duration::from_secs(2), "second");
        queue.schedule(now + Duration::from_secs(1), "first");
        queue.schedule(now + Duration::from_secs(3), "third");

        let far_future = now + Duration::from_secs(10);
        assert_eq!(queue.pop_ready(far_future), Some("first"));
        assert_eq!(queue.pop_ready(far_future), Some("second"));
        assert_eq!(queue.pop_ready(far_future), Some("third"));
        assert_eq!(queue.pop_ready(far_future), None);
    }

    #[tokio::test]
    async fn ties_break_by_insertion_order() {
        let now = Instant::now();
        let deadline = now + Duration::from_secs(1);
        let mut queue = TimerQueue::new();
        queue.schedule(deadline, "a");
        queue.schedule(deadline, "b");
        queue.schedule(deadline, "c");

        assert_eq!(queue.pop_ready(deadline), Some("a"));
        assert_eq!(queue.pop_ready(deadline), Some("b"));
        assert_eq!(queue.pop_ready(deadline), Some("c"));
    }

    #[tokio::test]
    async fn entries_not_yet_due_are_left_in_place() {
        let now = Instant::now();
        let mut queue = TimerQueue::new();
        queue.schedule(now + Duration::from_secs(5), "later");
        assert_eq!(queue.pop_ready(now), None);
        assert_eq!(queue.next_deadline(), Some(now + Duration::from_secs(5)));
    }
}
