use std::collections::BinaryHeap;

use crate::corroboration::{CorroborationEngine, EvidencePoint};

#[derive(Debug, Clone, Copy)]
struct KdEntry {
    coords: [i64; 2],
    index: usize,
}

/// Greatest per-axis difference, so that a window of `w` is the square
/// the sweep strategy checks
fn chebyshev(a: &[i64; 2], b: &[i64; 2]) -> i64 {
    (a[0] - b[0]).abs().max((a[1] - b[1]).abs())
}

/// Static two-dimensional tree over (local, distant) coordinates.
///
/// The tree is implicit: each slice's median is its root, split on the axis
/// alternating with depth, with the halves either side as subtrees.
pub struct KdTree {
    entries: Vec<KdEntry>,
}

impl KdTree {
    pub fn new(points: &[EvidencePoint]) -> Self {
        let mut entries: Vec<KdEntry> = points
            .iter()
            .enumerate()
            .map(|(index, p)| KdEntry {
                coords: [p.local, p.distant],
                index,
            })
            .collect();
        Self::build(&mut entries, 0);
        KdTree { entries }
    }

    fn build(entries: &mut [KdEntry], depth: usize) {
        if entries.len() <= 1 {
            return;
        }
        let axis = depth % 2;
        let mid = entries.len() / 2;
        entries.select_nth_unstable_by_key(mid, |e| e.coords[axis]);
        let (left, right) = entries.split_at_mut(mid);
        Self::build(left, depth + 1);
        Self::build(&mut right[1..], depth + 1);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `k` entries closest to `target` as (distance, point index),
    /// nearest first
    pub fn nearest(&self, target: [i64; 2], k: usize) -> Vec<(i64, usize)> {
        let mut heap = BinaryHeap::with_capacity(k + 1);
        if k > 0 {
            self.search(0, self.entries.len(), 0, &target, k, &mut heap);
        }
        heap.into_sorted_vec()
    }

    fn search(
        &self,
        lo: usize,
        hi: usize,
        depth: usize,
        target: &[i64; 2],
        k: usize,
        heap: &mut BinaryHeap<(i64, usize)>,
    ) {
        if lo >= hi {
            return;
        }
        let mid = lo + (hi - lo) / 2;
        let entry = &self.entries[mid];
        let dist = chebyshev(&entry.coords, target);
        if heap.len() < k {
            heap.push((dist, entry.index));
        } else if heap.peek().is_some_and(|worst| dist < worst.0) {
            heap.push((dist, entry.index));
            heap.pop();
        }

        let axis = depth % 2;
        let diff = target[axis] - entry.coords[axis];
        let (near, far) = if diff < 0 {
            ((lo, mid), (mid + 1, hi))
        } else {
            ((mid + 1, hi), (lo, mid))
        };
        self.search(near.0, near.1, depth + 1, target, k, heap);
        let must_visit_far =
            heap.len() < k || heap.peek().is_some_and(|worst| diff.abs() <= worst.0);
        if must_visit_far {
            self.search(far.0, far.1, depth + 1, target, k, heap);
        }
    }
}

/// Nearest-neighbor corroboration: a point is an orphan if its nearest
/// other point lies outside the window.
pub struct KdTreeCorroborator;

impl CorroborationEngine for KdTreeCorroborator {
    fn find_orphans(&self, points: &[EvidencePoint], window: i64) -> Vec<bool> {
        let tree = KdTree::new(points);
        points
            .iter()
            .enumerate()
            .map(|(i, point)| {
                // the two closest always include the point itself, or a
                // duplicate of it
                let nearest = tree.nearest([point.local, point.distant], 2);
                match nearest.iter().find(|(_, index)| *index != i) {
                    Some((dist, _)) => *dist > window,
                    None => true,
                }
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "kdtree"
    }
}
