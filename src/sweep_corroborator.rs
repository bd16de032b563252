use crate::corroboration::{CorroborationEngine, EvidencePoint};

/// (distant, local, point index), sorted by distant coordinate
type Block = Vec<(i64, i64, usize)>;

/// Sweep over the local coordinate in blocks no wider than the window.
///
/// Any two points in one block are within the window locally, so only the
/// distant coordinate needs checking there. A local neighbor outside a
/// point's own block can only sit in the block just before or after it.
pub struct SweepCorroborator;

fn build_blocks(points: &[EvidencePoint], window: i64) -> Vec<Block> {
    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by_key(|i| (points[*i].local, points[*i].distant));

    let mut blocks = Vec::new();
    let mut start = 0;
    while start < order.len() {
        let limit = points[order[start]].local + window;
        let end = start + order[start..].partition_point(|i| points[*i].local <= limit);
        let mut block: Block = order[start..end]
            .iter()
            .map(|i| (points[*i].distant, points[*i].local, *i))
            .collect();
        block.sort_unstable();
        blocks.push(block);
        start = end;
    }
    blocks
}

/// Entries of a block whose distant coordinate is within the window of `distant`
fn distant_range(block: &Block, distant: i64, window: i64) -> &[(i64, i64, usize)] {
    let lo = block.partition_point(|entry| entry.0 < distant - window);
    let hi = block.partition_point(|entry| entry.0 <= distant + window);
    &block[lo..hi]
}

impl CorroborationEngine for SweepCorroborator {
    fn find_orphans(&self, points: &[EvidencePoint], window: i64) -> Vec<bool> {
        let blocks = build_blocks(points, window);
        let mut block_of = vec![0; points.len()];
        for (b, block) in blocks.iter().enumerate() {
            for (_, _, i) in block {
                block_of[*i] = b;
            }
        }

        let mut orphans = vec![true; points.len()];
        for (i, point) in points.iter().enumerate() {
            let b = block_of[i];
            // the point itself is always in range of its own block
            if distant_range(&blocks[b], point.distant, window).len() > 1 {
                orphans[i] = false;
                continue;
            }
            let neighbors = [b.checked_sub(1), Some(b + 1)];
            orphans[i] = !neighbors
                .iter()
                .flatten()
                .filter_map(|n| blocks.get(*n))
                .any(|block| {
                    distant_range(block, point.distant, window)
                        .iter()
                        .any(|(_, local, _)| (local - point.local).abs() <= window)
                });
        }
        orphans
    }

    fn name(&self) -> &'static str {
        "sweep"
    }
}
