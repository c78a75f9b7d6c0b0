use std::cmp::Ordering;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::page::FrameId;

/// Replacer tracks frame usage for replacement in case the buffer pool is
/// full. Misuse of the interface (out-of-range or unknown frame ids,
/// removing a non-evictable frame) is a programmer error and panics.
pub trait Replacer: Send + Sync {
    /// Record the event that the given frame id is accessed at the current
    /// timestamp. Create a new entry for the access history if the frame id
    /// has not been seen before; new entries start out non-evictable.
    fn record_access(&self, frame_id: FrameId);

    /// Find the frame to evict by backward k-distance. Only frames that are
    /// marked as evictable are candidates for eviction.
    ///
    /// Successful eviction decrements the size of the replacer and removes
    /// the frame's access history.
    ///
    /// Return the frame id if a frame is evicted successfully, None if no
    /// frame can be evicted.
    fn evict(&self) -> Option<FrameId>;

    /// Toggle whether a frame is evictable or non-evictable. This function
    /// also controls the replacer size: size equals the number of evictable
    /// entries.
    fn set_evictable(&self, frame_id: FrameId, evictable: bool);

    /// Check if a frame is evictable. If the frame is not found, return true.
    fn is_evictable(&self, frame_id: FrameId) -> bool;

    /// Remove an evictable frame from the replacer, along with its access
    /// history, and decrement the replacer size.
    ///
    /// Note that this is different from evicting a frame: it removes the
    /// specified frame no matter what its backward k-distance is.
    fn remove(&self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}

#[derive(Debug, Eq, PartialEq)]
struct KDistance {
    frame_id: FrameId,
    distance: usize,
    oldest_access_at: usize,
}

impl PartialOrd for KDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.distance.cmp(&other.distance).reverse() {
            Ordering::Equal => self.oldest_access_at.cmp(&other.oldest_access_at),
            other => other,
        }
    }
}

struct LRUKNode {
    k: usize,
    frame_id: FrameId,
    is_evictable: bool,
    /// History of the last seen k timestamps of the given frame.
    /// Least recent timestamp stored in front.
    history: VecDeque<usize>,
}

impl LRUKNode {
    fn new(frame_id: FrameId, k: usize) -> Self {
        assert!(k > 0, "replacer k should be larger than zero");
        LRUKNode { history: VecDeque::with_capacity(k), k, frame_id, is_evictable: false }
    }

    fn record_access(&mut self, timestamp: usize) {
        if self.history.len() == self.k {
            self.history.pop_front();
        }
        self.history.push_back(timestamp)
    }

    fn k_distance(&self, now: usize) -> KDistance {
        // a node is created with one access recorded, the history is
        // never empty.
        let oldest = *self.history.front().unwrap_or(&0);
        let distance = if self.history.len() < self.k { usize::MAX } else { now - oldest };
        KDistance { frame_id: self.frame_id, distance, oldest_access_at: oldest }
    }
}

/// LRUKReplacer implements the LRU-k replacement policy.
///
/// The LRU-k algorithm evicts the frame whose backward k-distance is the
/// maximum of all evictable frames. Backward k-distance is computed as the
/// difference in time between the current timestamp and the timestamp of
/// the k-th previous access.
///
/// A frame with fewer than k recorded accesses is given +inf as its
/// backward k-distance and outranks every frame with k accesses; within
/// either group the frame with the smallest oldest recorded timestamp wins,
/// which is classical LRU on the first (respectively k-th most recent)
/// access.
pub struct LRUKReplacer {
    nodes: HashMap<FrameId, LRUKNode>,
    current_timestamp: usize,
    current_size: usize,
    replacer_size: usize,
    k: usize,
}

impl LRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        let nodes = HashMap::new();
        LRUKReplacer { nodes, current_timestamp: 0, current_size: 0, replacer_size: size, k }
    }

    fn record_access(&mut self, frame_id: FrameId) {
        assert!(
            frame_id < self.replacer_size,
            "record_access: frame {} is out of range for {} frames",
            frame_id,
            self.replacer_size
        );
        let k = self.k;
        let node = self.nodes.entry(frame_id).or_insert_with(|| LRUKNode::new(frame_id, k));
        node.record_access(self.current_timestamp);
        self.current_timestamp += 1;
    }

    fn evict(&mut self) -> Option<FrameId> {
        let mut distances = vec![];
        for node in self.nodes.values() {
            if !node.is_evictable {
                continue;
            }
            distances.push(node.k_distance(self.current_timestamp));
        }
        if distances.is_empty() {
            return None;
        }

        distances.sort();

        // we will always have at least one element here, it is
        // okay to use unwrap.
        let victim = distances.first().unwrap().frame_id;
        self.nodes.remove(&victim);
        self.current_size -= 1;

        Some(victim)
    }

    fn set_evictable(&mut self, frame_id: FrameId, evictable: bool) {
        let node = match self.nodes.get_mut(&frame_id) {
            Some(node) => node,
            None => panic!("set_evictable: frame {} has no access history", frame_id),
        };
        if node.is_evictable == evictable {
            return;
        }

        node.is_evictable = evictable;
        if evictable {
            self.current_size += 1;
        } else {
            self.current_size -= 1;
        }
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        match self.nodes.get(&frame_id) {
            Some(node) => node.is_evictable,
            None => true,
        }
    }

    fn remove(&mut self, frame_id: FrameId) {
        let node = match self.nodes.get(&frame_id) {
            Some(node) => node,
            None => panic!("remove: frame {} has no access history", frame_id),
        };
        assert!(node.is_evictable, "remove: frame {} is not evictable", frame_id);
        self.nodes.remove(&frame_id);
        self.current_size -= 1;
    }

    fn size(&self) -> usize {
        self.current_size
    }
}

/// SyncLRUKReplacer implements the thread-safe version of the LRU-k
/// replacement policy, basically all the heavy lifting happens in the
/// LRUKReplacer.
pub struct SyncLRUKReplacer {
    inner: Mutex<LRUKReplacer>,
}

impl SyncLRUKReplacer {
    pub fn new(k: usize, size: usize) -> Self {
        let inner = Mutex::new(LRUKReplacer::new(k, size));
        SyncLRUKReplacer { inner }
    }
}

impl Replacer for SyncLRUKReplacer {
    fn record_access(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.record_access(frame_id)
    }

    fn evict(&self) -> Option<FrameId> {
        let mut guard = self.inner.lock().unwrap();
        guard.evict()
    }

    fn set_evictable(&self, frame_id: FrameId, evictable: bool) {
        let mut guard = self.inner.lock().unwrap();
        guard.set_evictable(frame_id, evictable)
    }

    fn is_evictable(&self, frame_id: FrameId) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.is_evictable(frame_id)
    }

    fn remove(&self, frame_id: FrameId) {
        let mut guard = self.inner.lock().unwrap();
        guard.remove(frame_id)
    }

    fn size(&self) -> usize {
        let guard = self.inner.lock().unwrap();
        guard.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;

    #[test]
    fn test_kdistance_sort() -> Result<()> {
        let mut arr = [
            KDistance { frame_id: 1, distance: 5, oldest_access_at: 10 },
            KDistance { frame_id: 2, distance: 5, oldest_access_at: 5 },
            KDistance { frame_id: 3, distance: 3, oldest_access_at: 7 },
            KDistance { frame_id: 4, distance: 8, oldest_access_at: 3 },
            KDistance { frame_id: 5, distance: usize::MAX, oldest_access_at: 5 },
            KDistance { frame_id: 6, distance: usize::MAX, oldest_access_at: 3 },
        ];

        // Sort the array using the implemented Ord trait
        arr.sort();

        let mut ids = vec![];
        for kd in &arr {
            ids.push(kd.frame_id);
        }
        assert_eq!(vec![6, 5, 4, 2, 1, 3], ids);

        Ok(())
    }

    #[test]
    fn test_lruk_node() -> Result<()> {
        // node with k = 1
        let mut node = LRUKNode::new(1, 1);

        node.record_access(1);
        let dist = node.k_distance(5);
        assert_eq!(dist.distance, 4);
        assert_eq!(dist.oldest_access_at, 1);

        // node with k = 2
        let mut node = LRUKNode::new(1, 2);

        node.record_access(1);
        let dist = node.k_distance(5);
        assert_eq!(dist.distance, usize::MAX);
        assert_eq!(dist.oldest_access_at, 1);

        node.record_access(2);
        let dist = node.k_distance(5);
        assert_eq!(dist.distance, 4);
        assert_eq!(dist.oldest_access_at, 1);

        node.record_access(4);
        let dist = node.k_distance(5);
        assert_eq!(dist.distance, 3);
        assert_eq!(dist.oldest_access_at, 2);

        Ok(())
    }

    #[test]
    fn test_lruk_replacer() -> Result<()> {
        let mut lru_replacer = LRUKReplacer::new(2, 7);

        // Scenario: add six frames to the replacer. We have [1,2,3,4,5].
        // Frame 6 stays non-evictable.
        lru_replacer.record_access(1);
        lru_replacer.record_access(2);
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(6);
        lru_replacer.set_evictable(1, true);
        lru_replacer.set_evictable(2, true);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        lru_replacer.set_evictable(5, true);
        lru_replacer.set_evictable(6, false);
        assert_eq!(5, lru_replacer.size());

        // Scenario: insert access history for frame 1. Now frame 1 has two
        // access histories. All other frames have max backward k-distance.
        // The order of eviction is [2,3,4,5,1].
        lru_replacer.record_access(1);

        // Scenario: evict three frames from the replacer. Frames with max
        // k-distance are popped first based on LRU.
        assert_eq!(Some(2), lru_replacer.evict());
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(Some(4), lru_replacer.evict());
        assert_eq!(2, lru_replacer.size());

        // Scenario: now the replacer has frames [5,1].
        // Insert new frames 3, 4, and update the access history for 5.
        // We should end with [3,1,5,4].
        lru_replacer.record_access(3);
        lru_replacer.record_access(4);
        lru_replacer.record_access(5);
        lru_replacer.record_access(4);
        lru_replacer.set_evictable(3, true);
        lru_replacer.set_evictable(4, true);
        assert_eq!(4, lru_replacer.size());

        // Scenario: continue looking for victims. We expect 3 to be evicted
        // next.
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Set 6 to be evictable. 6 should be evicted next since it has the
        // max backward k-distance.
        lru_replacer.set_evictable(6, true);
        assert_eq!(4, lru_replacer.size());
        assert_eq!(Some(6), lru_replacer.evict());
        assert_eq!(3, lru_replacer.size());

        // Now we have [1,5,4]. Continue looking for victims.
        lru_replacer.set_evictable(1, false);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(5), lru_replacer.evict());
        assert_eq!(1, lru_replacer.size());

        // Update the access history for 1. Now we have [4,1].
        // The next victim is 4.
        lru_replacer.record_access(1);
        lru_replacer.record_access(1);
        lru_replacer.set_evictable(1, true);
        assert_eq!(2, lru_replacer.size());
        assert_eq!(Some(4), lru_replacer.evict());

        assert_eq!(1, lru_replacer.size());
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());

        // Eviction on an empty replacer does not modify the size.
        assert_eq!(None, lru_replacer.evict());
        assert_eq!(0, lru_replacer.size());

        Ok(())
    }

    #[test]
    fn test_classic_lru_on_first_access() -> Result<()> {
        let mut lru_replacer = LRUKReplacer::new(2, 7);

        // All frames accessed once have infinite k-distance, the one with
        // the oldest first access goes first.
        for frame_id in 1..=6 {
            lru_replacer.record_access(frame_id);
            lru_replacer.set_evictable(frame_id, true);
        }
        assert_eq!(Some(1), lru_replacer.evict());

        // A second access makes the k-distance of frame 2 finite, the
        // infinite group keeps precedence.
        lru_replacer.record_access(2);
        assert_eq!(Some(3), lru_replacer.evict());
        Ok(())
    }

    #[test]
    fn test_largest_k_distance_wins() -> Result<()> {
        let mut lru_replacer = LRUKReplacer::new(2, 4);

        lru_replacer.record_access(1);
        lru_replacer.record_access(2);
        lru_replacer.record_access(3);
        lru_replacer.record_access(1);
        lru_replacer.record_access(2);
        for frame_id in 1..=3 {
            lru_replacer.set_evictable(frame_id, true);
        }

        // 3 has fewer than k accesses and goes first; among the frames with
        // k accesses, 1 has the older k-th most recent access.
        assert_eq!(Some(3), lru_replacer.evict());
        assert_eq!(Some(1), lru_replacer.evict());
        assert_eq!(Some(2), lru_replacer.evict());
        Ok(())
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_record_access_out_of_range() {
        let mut lru_replacer = LRUKReplacer::new(2, 7);
        lru_replacer.record_access(7);
    }

    #[test]
    #[should_panic(expected = "no access history")]
    fn test_set_evictable_unknown_frame() {
        let mut lru_replacer = LRUKReplacer::new(2, 7);
        lru_replacer.set_evictable(1, true);
    }

    #[test]
    #[should_panic(expected = "no access history")]
    fn test_remove_unknown_frame() {
        let mut lru_replacer = LRUKReplacer::new(2, 7);
        lru_replacer.remove(1);
    }

    #[test]
    #[should_panic(expected = "not evictable")]
    fn test_remove_non_evictable_frame() {
        let mut lru_replacer = LRUKReplacer::new(2, 7);
        lru_replacer.record_access(1);
        lru_replacer.remove(1);
    }
}
