use core::fmt;
use rust_htslib::bam::{self, record::CigarString};
use serde::Serialize;
use std::collections::HashMap;

use crate::bam_sa_parser::get_reference_length;

const FLAG_REVERSE: u16 = 0x10;
const FLAG_QC_FAIL: u16 = 0x200;
const FLAG_DUPLICATE: u16 = 0x400;

/// Half-open genomic interval, comparable to a BED record
#[derive(Debug, PartialEq, Eq, Hash, Clone, PartialOrd, Ord)]
pub struct GenomicInterval {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl GenomicInterval {
    pub fn new(chrom: String, start: i64, end: i64) -> Self {
        GenomicInterval { chrom, start, end }
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}

/// One entry of an `SA` aux tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitAlignmentSegment {
    pub rname: String,
    /// zero-based
    pub pos: i64,
    pub is_fwd_strand: bool,
    pub cigar: CigarString,
    pub mapq: u8,
}

/// Mismatch count (`NM`) as decoded from whatever integer width the aligner used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchTag {
    Absent,
    Value(i64),
    /// Tag present with a non-integer type. Treated as zero.
    UnknownWidth,
}

impl MismatchTag {
    pub fn count(&self) -> i64 {
        match self {
            MismatchTag::Value(count) => *count,
            MismatchTag::Absent | MismatchTag::UnknownWidth => 0,
        }
    }
}

/// The subset of a BAM record the evidence filters look at.
#[derive(Debug, Clone)]
pub struct AlignmentRecord {
    pub name: String,
    pub tid: i32,
    pub pos: i64,
    pub end: i64,
    pub cigar: CigarString,
    pub mapq: u8,
    pub flags: u16,
    pub mtid: i32,
    pub mpos: i64,
    pub mismatches: MismatchTag,
    pub supplementary: Option<Vec<SplitAlignmentSegment>>,
    pub has_alt_hits: bool,
}

impl AlignmentRecord {
    /// Mapped, forward-strand, unpaired record with mapq 60 and no tags
    pub fn new(name: &str, tid: i32, pos: i64, cigar: CigarString) -> Self {
        let end = pos + get_reference_length(&cigar);
        AlignmentRecord {
            name: name.to_string(),
            tid,
            pos,
            end,
            cigar,
            mapq: 60,
            flags: 0,
            mtid: -1,
            mpos: -1,
            mismatches: MismatchTag::Absent,
            supplementary: None,
            has_alt_hits: false,
        }
    }

    pub fn is_reverse(&self) -> bool {
        self.flags & FLAG_REVERSE != 0
    }

    pub fn is_qc_fail(&self) -> bool {
        self.flags & FLAG_QC_FAIL != 0
    }

    pub fn is_duplicate(&self) -> bool {
        self.flags & FLAG_DUPLICATE != 0
    }

    pub fn has_mate_reference(&self) -> bool {
        self.mtid >= 0
    }

    pub fn is_split(&self) -> bool {
        self.supplementary.is_some()
    }
}

/// Reference sequence names from a BAM header, indexed both ways
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    names: Vec<String>,
    ids: HashMap<String, i32>,
}

impl ReferenceCatalog {
    pub fn new(names: Vec<String>) -> Self {
        let ids = names
            .iter()
            .enumerate()
            .map(|(tid, name)| (name.clone(), tid as i32))
            .collect();
        ReferenceCatalog { names, ids }
    }

    pub fn from_header(header: &bam::HeaderView) -> Self {
        let names = header
            .target_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).to_string())
            .collect();
        ReferenceCatalog::new(names)
    }

    pub fn name(&self, tid: i32) -> Option<&str> {
        if tid < 0 {
            return None;
        }
        self.names.get(tid as usize).map(|name| name.as_str())
    }

    pub fn tid(&self, name: &str) -> Option<i32> {
        self.ids.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Why a record was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    LowMapq,
    QcFailOrDuplicate,
    ExcludedReference,
    HighDepth,
    ExcludedMate,
    BadSplitter,
    SketchyMismatch,
    Orphan,
}

/// Per-file record counts reported after filtering
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub total: u64,
    pub low_mapq: u64,
    pub qc_fail_or_duplicate: u64,
    pub excluded_reference: u64,
    pub high_depth: u64,
    pub excluded_mate: u64,
    pub bad_splitter: u64,
    pub sketchy_mismatch: u64,
    pub orphan: u64,
    pub written: u64,
}

impl FilterCounts {
    pub fn add(&mut self, reason: DropReason) {
        match reason {
            DropReason::LowMapq => self.low_mapq += 1,
            DropReason::QcFailOrDuplicate => self.qc_fail_or_duplicate += 1,
            DropReason::ExcludedReference => self.excluded_reference += 1,
            DropReason::HighDepth => self.high_depth += 1,
            DropReason::ExcludedMate => self.excluded_mate += 1,
            DropReason::BadSplitter => self.bad_splitter += 1,
            DropReason::SketchyMismatch => self.sketchy_mismatch += 1,
            DropReason::Orphan => self.orphan += 1,
        }
    }

    /// Records removed by depth, quality, or reference exclusion
    pub fn region_quality_removed(&self) -> u64 {
        self.low_mapq
            + self.qc_fail_or_duplicate
            + self.excluded_reference
            + self.high_depth
            + self.excluded_mate
    }

    pub fn heuristic_removed(&self) -> u64 {
        self.bad_splitter + self.sketchy_mismatch
    }

    pub fn removed(&self) -> u64 {
        self.region_quality_removed() + self.heuristic_removed() + self.orphan
    }

    pub fn survivor_percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.written as f64 / self.total as f64
    }
}

/// Summary of one filtered file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub is_split: bool,
    pub counts: FilterCounts,
    pub seconds: u64,
}
