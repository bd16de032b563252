use rust_htslib::bam::record::Cigar;

use crate::containers::{AlignmentRecord, ReferenceCatalog};
use crate::utils;

/// Thresholds for the mismatch and clipping heuristic
#[derive(Debug, Clone)]
pub struct MismatchThresholds {
    pub max_mismatches: i64,
    pub max_distant_mismatches: i64,
    pub max_indel_events: usize,
    pub max_clip_fraction: f64,
    /// reject distant records carrying alternative hits (XA)
    pub reject_alt_hits: bool,
    /// reject records soft-clipped on both ends with a right clip over 5 bases
    pub reject_flanked_clips: bool,
    /// reject records whose only SA segment is clipped on both ends
    pub reject_clipped_splitters: bool,
}

impl Default for MismatchThresholds {
    fn default() -> Self {
        MismatchThresholds {
            max_mismatches: utils::MAX_MISMATCHES,
            max_distant_mismatches: utils::MAX_DISTANT_MISMATCHES,
            max_indel_events: utils::MAX_INDEL_EVENTS,
            max_clip_fraction: utils::MAX_CLIP_FRACTION,
            reject_alt_hits: false,
            reject_flanked_clips: false,
            reject_clipped_splitters: false,
        }
    }
}

/// Clipped and aligned base counts of a CIGAR
#[derive(Debug, Default, PartialEq, Eq)]
struct ClipCounts {
    soft: u32,
    hard: u32,
    matched: u32,
}

impl ClipCounts {
    fn from_cigar(cigar: &[Cigar]) -> Self {
        let mut counts = ClipCounts::default();
        for op in cigar {
            match op {
                Cigar::SoftClip(len) => counts.soft += len,
                Cigar::HardClip(len) => counts.hard += len,
                Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => counts.matched += len,
                _ => {}
            }
        }
        counts
    }

    fn clipped_fraction(&self) -> f64 {
        let total = self.soft + self.hard + self.matched;
        if total == 0 {
            return 0.0;
        }
        (self.soft + self.hard) as f64 / total as f64
    }
}

/// Subtract the extra edit distance of multi-base indels from NM, so each
/// indel event counts once. Returns the adjusted count and the event count.
pub fn get_adjusted_mismatches(record: &AlignmentRecord) -> (i64, usize) {
    let mut adjusted = record.mismatches.count();
    let mut indel_events = 0;
    for op in record.cigar.iter() {
        if let Cigar::Ins(len) | Cigar::Del(len) = op {
            adjusted -= *len as i64 - 1;
            indel_events += 1;
        }
    }
    (adjusted, indel_events)
}

/// Mate on another chromosome, or on the same one but far away
pub fn is_inter_or_distant(record: &AlignmentRecord) -> bool {
    if !record.has_mate_reference() {
        return false;
    }
    record.tid != record.mtid || (record.pos - record.mpos).abs() > utils::DISTANT_MATE_DIST
}

/// Whether an SA segment on the mate's chromosome lands near the mate or
/// near this alignment
pub fn has_nearby_split_counterpart(
    record: &AlignmentRecord,
    references: &ReferenceCatalog,
) -> bool {
    let (segments, mate_chrom) = match (&record.supplementary, references.name(record.mtid)) {
        (Some(segments), Some(mate_chrom)) => (segments, mate_chrom),
        _ => return false,
    };
    segments.iter().any(|segment| {
        segment.rname == mate_chrom
            && [record.mpos, record.pos, record.end]
                .iter()
                .any(|anchor| (segment.pos - anchor).abs() < utils::SPLIT_COUNTERPART_DIST)
    })
}

fn is_flanked_by_soft_clips(cigar: &[Cigar]) -> bool {
    match (cigar.first(), cigar.last()) {
        (Some(Cigar::SoftClip(_)), Some(Cigar::SoftClip(right))) => cigar.len() > 1 && *right > 5,
        _ => false,
    }
}

fn is_clip(op: &Cigar) -> bool {
    matches!(op, Cigar::SoftClip(_) | Cigar::HardClip(_))
}

/// A single SA segment clipped at both ends leaves part of the read
/// unplaced. Reads split more than once are not judged.
pub fn has_clipped_splitter(record: &AlignmentRecord) -> bool {
    match record.supplementary.as_deref() {
        Some([segment]) => {
            segment.cigar.len() > 1
                && segment.cigar.first().is_some_and(is_clip)
                && segment.cigar.last().is_some_and(is_clip)
        }
        _ => false,
    }
}

/// Mismatch-heavy, indel-heavy or excessively clipped distant evidence
pub fn is_sketchy(
    record: &AlignmentRecord,
    references: &ReferenceCatalog,
    thresholds: &MismatchThresholds,
) -> bool {
    let (adjusted, indel_events) = get_adjusted_mismatches(record);
    if adjusted > thresholds.max_mismatches || indel_events > thresholds.max_indel_events {
        return true;
    }
    if thresholds.reject_flanked_clips && is_flanked_by_soft_clips(&record.cigar) {
        return true;
    }
    if thresholds.reject_clipped_splitters && has_clipped_splitter(record) {
        return true;
    }
    if !is_inter_or_distant(record) {
        return false;
    }
    if thresholds.reject_alt_hits && record.has_alt_hits {
        return true;
    }
    if has_nearby_split_counterpart(record, references) {
        return false;
    }
    adjusted > thresholds.max_distant_mismatches
        || ClipCounts::from_cigar(&record.cigar).clipped_fraction() > thresholds.max_clip_fraction
}
