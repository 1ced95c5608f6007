//! Insertion-ordered, per-second expiry buckets, per spec §4.2 and the
//! deque-of-buckets rewrite spec §9 calls for (replacing a forward-linked
//! list with a manually tracked "current" iterator).

use std::collections::VecDeque;

use crate::flow_key::FlowKey;

struct Bucket {
    ts: u64,
    keys: Vec<FlowKey>,
}

pub struct TimeWheel {
    buckets: VecDeque<Bucket>,
}

impl TimeWheel {
    pub fn new() -> Self {
        TimeWheel {
            buckets: VecDeque::new(),
        }
    }

    /// Appends `key` to the tail bucket if its timestamp hasn't advanced
    /// past that bucket's, else opens a new tail bucket. The "is_old"
    /// predicate is strict `>`: multiple keys arriving within the same
    /// second as the current tail share its bucket.
    pub fn add(&mut self, key: FlowKey) {
        let needs_new_bucket = match self.buckets.back() {
            None => true,
            Some(tail) => key.arrival_ts > tail.ts,
        };
        if needs_new_bucket {
            self.buckets.push_back(Bucket {
                ts: key.arrival_ts,
                keys: Vec::new(),
            });
        }
        self.buckets.back_mut().unwrap().keys.push(key);
    }

    /// Pops buckets from the head while `now_s - timeout_s > bucket.ts`,
    /// concatenating their keys in order.
    pub fn collect_expired(&mut self, now_s: u64, timeout_s: u64) -> Vec<FlowKey> {
        let mut expired = Vec::new();
        while let Some(front) = self.buckets.front() {
            let is_expired = match now_s.checked_sub(timeout_s) {
                Some(threshold) => threshold > front.ts,
                None => false,
            };
            if !is_expired {
                break;
            }
            let bucket = self.buckets.pop_front().unwrap();
            expired.extend(bucket.keys);
        }
        expired
    }
}

impl Default for TimeWheel {
    fn default() -> Self {
        Self::new()
    }
}
