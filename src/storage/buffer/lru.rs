use super::replacer::{FrameId, Replacer};
use std::collections::{HashSet, VecDeque};

#[derive(Debug)]
pub struct LruReplacer {
    /// Evictable frames, least recently unpinned at the front.
    queue: VecDeque<FrameId>,
    /// Membership index over the queue.
    members: HashSet<FrameId>,
    /// Cap on tracked frames.
    max_size: usize,
}

impl LruReplacer {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size),
            members: HashSet::with_capacity(max_size),
            max_size,
        }
    }
}

impl Replacer for LruReplacer {
    fn evict(&mut self) -> Option<FrameId> {
        let frame_id = self.queue.pop_front()?;
        self.members.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.members.remove(&frame_id) {
            self.queue.retain(|&candidate| candidate != frame_id);
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        if !self.members.contains(&frame_id) && self.members.len() < self.max_size {
            self.queue.push_back(frame_id);
            self.members.insert(frame_id);
        }
    }

    fn size(&self) -> usize {
        self.members.len()
    }
}
