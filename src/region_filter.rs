use bio::data_structures::interval_tree::IntervalTree;
use log::debug;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::containers::{AlignmentRecord, DropReason, GenomicInterval, ReferenceCatalog};
use crate::errors::{FilterError, FilterResult};

/// Reference names excluded from analysis, either literally or by a
/// `~`-prefixed regular expression
#[derive(Debug, Clone, Default)]
pub struct ReferenceExclusion {
    exact: HashSet<String>,
    patterns: Vec<Regex>,
}

impl ReferenceExclusion {
    pub fn new(entries: &[String]) -> FilterResult<Self> {
        let mut exclusion = ReferenceExclusion::default();
        for entry in entries {
            if let Some(pattern) = entry.strip_prefix('~') {
                let regex = Regex::new(pattern).map_err(|source| FilterError::Regex {
                    pattern: pattern.to_string(),
                    source,
                })?;
                exclusion.patterns.push(regex);
            } else if !entry.is_empty() {
                exclusion.exact.insert(entry.clone());
            }
        }
        Ok(exclusion)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.exact.contains(name) || self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// Per-chromosome interval trees of high-depth and excluded regions
#[derive(Default)]
pub struct DepthRegionIndex {
    trees: HashMap<String, IntervalTree<i64, ()>>,
    region_count: usize,
}

impl DepthRegionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_regions<I: IntoIterator<Item = GenomicInterval>>(regions: I) -> Self {
        let mut index = DepthRegionIndex::new();
        for region in regions {
            index.insert(region);
        }
        index
    }

    /// Empty and inverted intervals cannot overlap anything and are skipped.
    pub fn insert(&mut self, region: GenomicInterval) {
        if region.end <= region.start {
            debug!("Skipping empty region {}", region);
            return;
        }
        self.trees
            .entry(region.chrom)
            .or_insert_with(IntervalTree::new)
            .insert(region.start..region.end, ());
        self.region_count += 1;
    }

    /// A chromosome with no tree has no exclusions.
    pub fn overlaps(&self, chrom: &str, start: i64, end: i64) -> bool {
        match self.trees.get(chrom) {
            Some(tree) => tree.find(start..end.max(start + 1)).next().is_some(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.region_count
    }

    pub fn is_empty(&self) -> bool {
        self.region_count == 0
    }
}

/// Drops low-quality, duplicate, excluded-reference and high-depth records.
///
/// Exclusion decisions are made once per reference id, so records in
/// reference order never repeat a name lookup.
pub struct PreFilter<'a> {
    min_mapq: u8,
    depth_regions: &'a DepthRegionIndex,
    references: &'a ReferenceCatalog,
    excluded_tids: Vec<bool>,
    check_references: bool,
}

impl<'a> PreFilter<'a> {
    pub fn new(
        min_mapq: u8,
        exclusion: &ReferenceExclusion,
        depth_regions: &'a DepthRegionIndex,
        references: &'a ReferenceCatalog,
        check_references: bool,
    ) -> Self {
        let excluded_tids = references
            .names()
            .iter()
            .map(|name| exclusion.is_excluded(name))
            .collect::<Vec<bool>>();
        let excluded_count = excluded_tids.iter().filter(|x| **x).count();
        debug!(
            "{} of {} references excluded",
            excluded_count,
            excluded_tids.len()
        );
        PreFilter {
            min_mapq,
            depth_regions,
            references,
            excluded_tids,
            check_references,
        }
    }

    fn tid_excluded(&self, tid: i32) -> bool {
        tid >= 0 && self.excluded_tids.get(tid as usize).copied().unwrap_or(false)
    }

    /// Returns the reason to drop the record, or None to keep it
    pub fn check(&self, record: &AlignmentRecord) -> Option<DropReason> {
        if record.mapq < self.min_mapq {
            return Some(DropReason::LowMapq);
        }
        if record.is_qc_fail() || record.is_duplicate() {
            return Some(DropReason::QcFailOrDuplicate);
        }
        if self.check_references && self.tid_excluded(record.tid) {
            return Some(DropReason::ExcludedReference);
        }
        if let Some(chrom) = self.references.name(record.tid) {
            if self.depth_regions.overlaps(chrom, record.pos, record.end) {
                return Some(DropReason::HighDepth);
            }
        }
        if self.check_references && record.mtid != record.tid && self.tid_excluded(record.mtid) {
            return Some(DropReason::ExcludedMate);
        }
        None
    }
}
