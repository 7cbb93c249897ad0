//! Tracks unpinned frames and selects an eviction victim.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::common::FrameId;

/// Intrusive doubly-linked list node. `prev`/`next` are frame ids, or `-1`
/// for "no neighbor" (list ends).
struct Node {
    prev: FrameId,
    next: FrameId,
}

struct ReplacerState {
    /// frame id -> its node in the list, for O(1) lookup on pin/unpin.
    nodes: HashMap<FrameId, Node>,
    /// front = most-recently-unpinned, back = least-recently-unpinned.
    front: FrameId,
    back: FrameId,
}

const NONE: FrameId = -1;

impl ReplacerState {
    fn unlink(&mut self, frame: FrameId) {
        let (prev, next) = {
            let node = self.nodes.get(&frame).unwrap();
            (node.prev, node.next)
        };
        if prev != NONE {
            self.nodes.get_mut(&prev).unwrap().next = next;
        } else {
            self.front = next;
        }
        if next != NONE {
            self.nodes.get_mut(&next).unwrap().prev = prev;
        } else {
            self.back = prev;
        }
    }

    fn push_front(&mut self, frame: FrameId) {
        let old_front = self.front;
        self.nodes.insert(frame, Node { prev: NONE, next: old_front });
        if old_front != NONE {
            self.nodes.get_mut(&old_front).unwrap().prev = frame;
        } else {
            self.back = frame;
        }
        self.front = frame;
    }

    fn pop_back(&mut self) -> Option<FrameId> {
        if self.back == NONE {
            return None;
        }
        let frame = self.back;
        self.unlink(frame);
        self.nodes.remove(&frame);
        Some(frame)
    }
}

/// LRU replacer backed by a hash map from frame id to its list node, giving
/// O(1) `pin`/`unpin` instead of a linear scan. `num_frames` is accepted for
/// API parity but not enforced — per spec's documented ambiguity, the source
/// this was distilled from never checked it either.
pub struct LruReplacer {
    state: Mutex<ReplacerState>,
    #[allow(dead_code)]
    num_frames: usize,
}

impl LruReplacer {
    pub fn new(num_frames: usize) -> LruReplacer {
        LruReplacer {
            state: Mutex::new(ReplacerState {
                nodes: HashMap::new(),
                front: NONE,
                back: NONE,
            }),
            num_frames,
        }
    }

    /// Marks `frame` as unpinned and eligible for eviction. No-op if already
    /// tracked.
    pub fn unpin(&self, frame: FrameId) {
        let mut state = self.state.lock().unwrap();
        if state.nodes.contains_key(&frame) {
            return;
        }
        state.push_front(frame);
    }

    /// Marks `frame` as pinned, removing it from eviction eligibility.
    /// No-op if not tracked.
    pub fn pin(&self, frame: FrameId) {
        let mut state = self.state.lock().unwrap();
        if !state.nodes.contains_key(&frame) {
            return;
        }
        state.unlink(frame);
        state.nodes.remove(&frame);
    }

    /// Pops the least-recently-unpinned frame. Returns `false` if nothing is
    /// evictable.
    pub fn evict(&self, out: &mut FrameId) -> bool {
        let mut state = self.state.lock().unwrap();
        match state.pop_back() {
            Some(frame) => {
                *out = frame;
                true
            }
            None => false,
        }
    }

    pub fn size(&self) -> usize {
        self.state.lock().unwrap().nodes.len()
    }
}

impl LruReplacer {
    pub fn contains(&self, frame: FrameId) -> bool {
        self.state.lock().unwrap().nodes.contains_key(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_unpinned() {
        let replacer = LruReplacer::new(8);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);

        let mut victim = -1;
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 1);
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 2);
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 3);

        let mut unused = -1;
        assert!(!replacer.evict(&mut unused));
    }

    #[test]
    fn pin_removes_from_eviction() {
        let replacer = LruReplacer::new(8);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);

        let mut victim = -1;
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 2);
        let mut unused = -1;
        assert!(!replacer.evict(&mut unused));
    }

    #[test]
    fn unpin_is_idempotent() {
        let replacer = LruReplacer::new(8);
        replacer.unpin(1);
        replacer.unpin(1);
        assert_eq!(replacer.size(), 1);
    }

    #[test]
    fn pin_middle_of_list_preserves_order() {
        let replacer = LruReplacer::new(8);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        replacer.pin(2);

        let mut victim = -1;
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 1);
        assert!(replacer.evict(&mut victim));
        assert_eq!(victim, 3);
        let mut unused = -1;
        assert!(!replacer.evict(&mut unused));
    }
}
