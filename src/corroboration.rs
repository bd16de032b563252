use log::debug;
use std::collections::{HashMap, HashSet};

use crate::containers::{AlignmentRecord, ReferenceCatalog};
use crate::kdtree::KdTreeCorroborator;
use crate::mismatch_filter::is_inter_or_distant;
use crate::sweep_corroborator::SweepCorroborator;

/// Ordered pair of reference ids an evidence point connects
pub type ReferencePair = (i32, i32);

/// Breakpoint pair of one piece of distant evidence.
///
/// `local` is the position on the first reference of the pair and `distant`
/// the position on the second, so both ends of one event share a point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvidencePoint {
    pub local: i64,
    pub distant: i64,
    pub name: String,
}

impl EvidencePoint {
    /// Order the two ends by (reference id, position).
    pub fn from_ends(
        end_a: (i32, i64),
        end_b: (i32, i64),
        name: &str,
    ) -> (ReferencePair, EvidencePoint) {
        let (first, second) = if end_a <= end_b {
            (end_a, end_b)
        } else {
            (end_b, end_a)
        };
        let point = EvidencePoint {
            local: first.1,
            distant: second.1,
            name: name.to_string(),
        };
        ((first.0, second.0), point)
    }

    /// Records of a split file connect their alignment to the first placed
    /// SA segment. Discordant records connect to their mate, whatever SA
    /// they carry, so both ends of a pair give the same point. Local pairs
    /// give no point.
    pub fn from_record(
        record: &AlignmentRecord,
        references: &ReferenceCatalog,
        name: &str,
        is_split: bool,
    ) -> Option<(ReferencePair, EvidencePoint)> {
        if is_split {
            return record.supplementary.as_ref().and_then(|segments| {
                segments.iter().find_map(|segment| {
                    references.tid(&segment.rname).map(|seg_tid| {
                        EvidencePoint::from_ends(
                            (record.tid, record.pos),
                            (seg_tid, segment.pos),
                            name,
                        )
                    })
                })
            });
        }
        if is_inter_or_distant(record) {
            return Some(EvidencePoint::from_ends(
                (record.tid, record.pos),
                (record.mtid, record.mpos),
                name,
            ));
        }
        None
    }
}

/// Evidence points grouped by reference pair, one point per read name and pair
#[derive(Debug, Default)]
pub struct SpatialIndex {
    groups: HashMap<ReferencePair, Vec<EvidencePoint>>,
    seen: HashSet<(String, ReferencePair)>,
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this name already has a point for the pair
    pub fn insert(&mut self, pair: ReferencePair, point: EvidencePoint) -> bool {
        if !self.seen.insert((point.name.clone(), pair)) {
            return false;
        }
        self.groups.entry(pair).or_default().push(point);
        true
    }

    pub fn groups(&self) -> impl Iterator<Item = (&ReferencePair, &Vec<EvidencePoint>)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.values().map(|points| points.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Records per (normalized) read name
#[derive(Debug, Default, Clone)]
pub struct NameCountTable {
    counts: HashMap<String, i32>,
}

impl NameCountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split extractors prefix the two halves of a read differently; only
    /// the rest of the name identifies the fragment.
    pub fn normalize_name(name: &str, is_split: bool) -> String {
        if !is_split {
            return name.to_string();
        }
        let mut chars = name.chars();
        match chars.next() {
            Some(_) => format!("A{}", chars.as_str()),
            None => String::new(),
        }
    }

    pub fn increment(&mut self, name: &str) {
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }

    pub fn decrement(&mut self, name: &str) {
        if let Some(count) = self.counts.get_mut(name) {
            *count -= 1;
        }
    }

    pub fn get(&self, name: &str) -> i32 {
        self.counts.get(name).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Finds evidence points with no neighbor inside a square window.
///
/// Two points corroborate each other when both their local and distant
/// coordinates differ by at most `window`.
pub trait CorroborationEngine: Send + Sync {
    /// One flag per input point, true for orphans
    fn find_orphans(&self, points: &[EvidencePoint], window: i64) -> Vec<bool>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CorroborationStrategy {
    Sweep,
    Kdtree,
}

impl CorroborationStrategy {
    pub fn engine(&self) -> Box<dyn CorroborationEngine> {
        match self {
            CorroborationStrategy::Sweep => Box::new(SweepCorroborator),
            CorroborationStrategy::Kdtree => Box::new(KdTreeCorroborator),
        }
    }
}

/// Decrement the count of every name with an orphaned point.
///
/// Points whose name has already fallen below `min_count` will not be
/// written and cannot corroborate anything, so the search repeats until no
/// new orphans appear. Returns the number of orphaned points.
pub fn mark_orphans(
    index: &SpatialIndex,
    counts: &mut NameCountTable,
    engine: &dyn CorroborationEngine,
    window: i64,
    min_count: i32,
) -> usize {
    let mut orphaned: HashSet<(ReferencePair, usize)> = HashSet::new();
    let mut round = 0;
    loop {
        round += 1;
        let mut new_orphans = 0;
        for (pair, points) in index.groups() {
            let active: Vec<usize> = (0..points.len())
                .filter(|i| {
                    !orphaned.contains(&(*pair, *i)) && counts.get(&points[*i].name) >= min_count
                })
                .collect();
            if active.is_empty() {
                continue;
            }
            let active_points: Vec<EvidencePoint> =
                active.iter().map(|i| points[*i].clone()).collect();
            let flags = engine.find_orphans(&active_points, window);
            for (point_index, is_orphan) in active.iter().zip(flags) {
                if is_orphan {
                    orphaned.insert((*pair, *point_index));
                    counts.decrement(&points[*point_index].name);
                    new_orphans += 1;
                }
            }
        }
        debug!(
            "{} corroboration round {}: {} new orphans",
            engine.name(),
            round,
            new_orphans
        );
        if new_orphans == 0 {
            break;
        }
    }
    orphaned.len()
}
