use rust_htslib::bam::record::Cigar;

use crate::bam_sa_parser::{get_cigarseg_complete_read_offset, get_complete_read_length};
use crate::containers::AlignmentRecord;

/// Reads shorter than this are never judged
const MIN_JUDGED_LENGTH: usize = 50;

/// Bases at each end of the read that must be covered exactly once
const END_FLANK: usize = 25;

/// Maximum bases in the end flanks with coverage other than one
const MAX_BAD_END_BASES: usize = 5;

/// Maximum bases anywhere in the read with coverage other than one
const MAX_NON_ONE_BASES: usize = 40;

/// Decide whether per-base read coverage shows overlapping or gapped segments.
///
/// Bases strictly between `END_FLANK` and `len - END_FLANK - 1` are only
/// counted toward the overall limit.
pub fn is_bad(counts: &[u16]) -> bool {
    if counts.len() < MIN_JUDGED_LENGTH {
        return false;
    }
    let lo = END_FLANK;
    let hi = counts.len() - END_FLANK - 1;
    let mut bad_ends = 0;
    let mut non_one = 0;
    for (i, c) in counts.iter().enumerate() {
        if *c == 1 {
            continue;
        }
        non_one += 1;
        if i <= lo || i >= hi {
            bad_ends += 1;
        }
    }
    bad_ends > MAX_BAD_END_BASES || non_one > MAX_NON_ONE_BASES
}

/// Count how many segments cover each base of the read.
///
/// Match and insertion operations cover bases. Every query-consuming
/// operation advances the read offset, and so do hard clips.
pub fn count_bases(cigars: &[Vec<Cigar>], read_length: usize) -> Vec<u16> {
    let mut counts = vec![0u16; read_length];
    for cigar in cigars {
        let mut offset = 0;
        for op in cigar {
            if let Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) | Cigar::Ins(len) = op
            {
                let start = offset.min(read_length);
                let end = (offset + *len as usize).min(read_length);
                for count in counts[start..end].iter_mut() {
                    *count = count.saturating_add(1);
                }
            }
            offset += get_cigarseg_complete_read_offset(op);
        }
    }
    counts
}

/// Express the primary and every supplementary CIGAR in the primary's
/// orientation, returning them with the full read length.
fn get_oriented_cigars(record: &AlignmentRecord) -> (Vec<Vec<Cigar>>, usize) {
    let primary: Vec<Cigar> = record.cigar.iter().cloned().collect();
    let mut read_length = get_complete_read_length(&primary);
    let mut cigars = vec![primary];
    let primary_fwd = !record.is_reverse();
    if let Some(segments) = &record.supplementary {
        for segment in segments {
            let mut cigar: Vec<Cigar> = segment.cigar.iter().cloned().collect();
            if segment.is_fwd_strand != primary_fwd {
                cigar.reverse();
            }
            read_length = read_length.max(get_complete_read_length(&cigar));
            cigars.push(cigar);
        }
    }
    (cigars, read_length)
}

/// A bad splitter has segments that don't partition the read, especially at
/// its ends. e.g.
/// good: 110M40S 110S40M
/// bad: 110M40S 90M60S
///
/// Records without an SA tag are never bad splitters.
pub fn is_bad_splitter(record: &AlignmentRecord) -> bool {
    if !record.is_split() {
        return false;
    }
    let (cigars, read_length) = get_oriented_cigars(record);
    let counts = count_bases(&cigars, read_length);
    is_bad(&counts)
}
