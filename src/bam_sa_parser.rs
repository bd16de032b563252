// SA tag handling adapted from the sawfish sv caller. Modified for evidence filtering

use log::warn;
use rust_htslib::bam::{
    self,
    record::{Aux, Cigar, CigarString},
};

use crate::{
    containers::{AlignmentRecord, MismatchTag, SplitAlignmentSegment},
    errors::{FilterError, FilterResult},
};

const SA_AUX_TAG: &[u8] = b"SA";
const NM_AUX_TAG: &[u8] = b"NM";
const XA_AUX_TAG: &[u8] = b"XA";

fn parse_sa_segment(seg: &str) -> Result<SplitAlignmentSegment, String> {
    let sa_fields = seg.split_terminator(',').collect::<Vec<_>>();
    if sa_fields.len() != 6 {
        return Err(format!("Unexpected segment in bam SA tag: {seg}"));
    }
    let rname = sa_fields[0].to_string();
    let pos = sa_fields[1]
        .parse::<i64>()
        .map_err(|_| format!("Non-numeric SA position in segment: {seg}"))?
        - 1;
    let is_fwd_strand = match sa_fields[2] {
        "+" => true,
        "-" => false,
        strand => return Err(format!("Unexpected SA strand {strand} in segment: {seg}")),
    };
    let cigar = CigarString::try_from(sa_fields[3].as_bytes())
        .map_err(|_| format!("Unparsable SA CIGAR in segment: {seg}"))?;
    if cigar.is_empty() {
        return Err(format!("Empty SA CIGAR in segment: {seg}"));
    }
    let mapq = sa_fields[4]
        .parse::<u8>()
        .map_err(|_| format!("Non-numeric SA mapq in segment: {seg}"))?;
    Ok(SplitAlignmentSegment {
        rname,
        pos,
        is_fwd_strand,
        cigar,
        mapq,
    })
}

pub fn parse_sa_aux_val(sa_aux_val: &str) -> Result<Vec<SplitAlignmentSegment>, String> {
    let segments = sa_aux_val
        .split_terminator(';')
        .map(parse_sa_segment)
        .collect::<Result<Vec<SplitAlignmentSegment>, String>>()?;
    if segments.is_empty() {
        return Err("SA tag has no segments".to_string());
    }
    Ok(segments)
}

fn malformed(record: &bam::Record, name: &str, detail: String) -> FilterError {
    FilterError::MalformedRecord {
        name: name.to_string(),
        tid: record.tid(),
        pos: record.pos(),
        detail,
    }
}

/// Retrieve a string aux tag from bam file
///
/// A tag with a non-string value is a malformed record
///
pub fn get_optional_string_aux_tag(
    record: &bam::Record,
    aux_tag: &[u8],
) -> FilterResult<Option<String>> {
    match record.aux(aux_tag) {
        Ok(Aux::String(val)) => Ok(Some(val.to_string())),
        Ok(aux_val) => {
            let qname = String::from_utf8_lossy(record.qname()).to_string();
            Err(malformed(
                record,
                &qname,
                format!(
                    "Unexpected {} tag format: {:?}",
                    String::from_utf8_lossy(aux_tag),
                    aux_val
                ),
            ))
        }
        Err(_) => Ok(None),
    }
}

/// Canonicalize an integer aux value of any width
pub fn mismatch_tag_from_aux(aux_val: &Aux<'_>) -> MismatchTag {
    match *aux_val {
        Aux::U32(val) => MismatchTag::Value(val as i64),
        Aux::I32(val) => MismatchTag::Value(val as i64),
        Aux::U16(val) => MismatchTag::Value(val as i64),
        Aux::I16(val) => MismatchTag::Value(val as i64),
        Aux::U8(val) => MismatchTag::Value(val as i64),
        Aux::I8(val) => MismatchTag::Value(val as i64),
        _ => MismatchTag::UnknownWidth,
    }
}

/// Decode the `NM` tag. Unknown encodings are logged and count as zero.
pub fn decode_mismatch_tag(record: &bam::Record) -> MismatchTag {
    match record.aux(NM_AUX_TAG) {
        Ok(aux_val) => {
            let tag = mismatch_tag_from_aux(&aux_val);
            if tag == MismatchTag::UnknownWidth {
                warn!(
                    "Unexpected NM tag format in read {}: {:?}, using 0",
                    String::from_utf8_lossy(record.qname()),
                    aux_val
                );
            }
            tag
        }
        Err(_) => MismatchTag::Absent,
    }
}

/// Decode everything the filters need from a BAM record.
pub fn parse_alignment_record(record: &bam::Record) -> FilterResult<AlignmentRecord> {
    let name = match String::from_utf8(record.qname().to_vec()) {
        Ok(name) => name,
        Err(_) => {
            return Err(malformed(
                record,
                "<non-utf8>",
                "Failed to get read name from record".to_string(),
            ))
        }
    };
    let supplementary = match get_optional_string_aux_tag(record, SA_AUX_TAG)? {
        Some(sa_aux_val) => Some(
            parse_sa_aux_val(&sa_aux_val).map_err(|detail| malformed(record, &name, detail))?,
        ),
        None => None,
    };

    let mut alignment = AlignmentRecord::new(&name, record.tid(), record.pos(), record.cigar().take());
    alignment.mapq = record.mapq();
    alignment.flags = record.flags();
    alignment.mtid = record.mtid();
    alignment.mpos = record.mpos();
    alignment.mismatches = decode_mismatch_tag(record);
    alignment.supplementary = supplementary;
    alignment.has_alt_hits = record.aux(XA_AUX_TAG).is_ok();
    Ok(alignment)
}

/// Number of reference bases spanned by a CIGAR
pub fn get_reference_length(cigar: &[Cigar]) -> i64 {
    cigar.iter().map(get_cigarseg_ref_offset).sum()
}

/// Full read length implied by a CIGAR, including hard-clipped bases
pub fn get_complete_read_length(cigar: &[Cigar]) -> usize {
    cigar.iter().map(get_cigarseg_complete_read_offset).sum()
}

fn get_cigarseg_ref_offset(c: &Cigar) -> i64 {
    use Cigar::*;
    match c {
        Del(len) | RefSkip(len) | Diff(len) | Equal(len) | Match(len) => *len as i64,
        _ => 0,
    }
}

pub fn get_cigarseg_complete_read_offset(c: &Cigar) -> usize {
    use Cigar::*;
    match c {
        HardClip(len) | Ins(len) | SoftClip(len) | Diff(len) | Equal(len) | Match(len) => {
            *len as usize
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sa_aux_val() {
        let test_val = "chr3,10001,+,5535S10=1D39=2X11438S,60,192;\
        chr3,10001,+,3073S15=2D20=2X11=1X5=1I23=1X5=14798S,22,44;\
        chr4,106872270,-,23=1I226=1I195=1X147=1D1021=7362S,60,19;";

        let result = parse_sa_aux_val(test_val).unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[2].rname, "chr4");
        assert_eq!(result[1].pos, 10_000);
        assert_eq!(result[0].mapq, 60);
        assert!(!result[2].is_fwd_strand);
    }

    #[test]
    fn test_parse_sa_aux_val_malformed() {
        assert!(parse_sa_aux_val("chr1,100,+,50M").is_err());
        assert!(parse_sa_aux_val("chr1,abc,+,50M,60,0;").is_err());
        assert!(parse_sa_aux_val("chr1,100,+,50Q,60,0;").is_err());
        assert!(parse_sa_aux_val("chr1,100,?,50M,60,0;").is_err());
        assert!(parse_sa_aux_val("").is_err());
    }

    #[test]
    fn test_mismatch_tag_from_aux() {
        assert_eq!(mismatch_tag_from_aux(&Aux::U8(3)), MismatchTag::Value(3));
        assert_eq!(mismatch_tag_from_aux(&Aux::I16(-2)), MismatchTag::Value(-2));
        assert_eq!(mismatch_tag_from_aux(&Aux::U32(70000)), MismatchTag::Value(70000));
        assert_eq!(mismatch_tag_from_aux(&Aux::Float(1.5)), MismatchTag::UnknownWidth);
    }

    #[test]
    fn test_cigar_lengths() {
        let cigar = CigarString::try_from("5H10S30M2I20M3D15M4S".as_bytes()).unwrap();
        assert_eq!(get_reference_length(&cigar), 68);
        assert_eq!(get_complete_read_length(&cigar), 86);
    }

    #[test]
    fn test_parse_alignment_record() {
        let mut record = bam::Record::new();
        let cigar = CigarString(vec![Cigar::Match(100), Cigar::SoftClip(50)]);
        record.set(b"read1", Some(&cigar), &[b'A'; 150], &[30; 150]);
        record.set_tid(1);
        record.set_pos(5000);
        record.set_mapq(42);
        record.set_mtid(3);
        record.set_mpos(9000);
        record.push_aux(b"NM", Aux::U8(2)).unwrap();
        record
            .push_aux(b"SA", Aux::String("chr5,20001,-,100S50M,60,0;"))
            .unwrap();

        let alignment = parse_alignment_record(&record).unwrap();
        assert_eq!(alignment.name, "read1");
        assert_eq!(alignment.tid, 1);
        assert_eq!(alignment.pos, 5000);
        assert_eq!(alignment.end, 5100);
        assert_eq!(alignment.mapq, 42);
        assert_eq!(alignment.mtid, 3);
        assert_eq!(alignment.mpos, 9000);
        assert_eq!(alignment.mismatches, MismatchTag::Value(2));
        let segments = alignment.supplementary.unwrap();
        assert_eq!(segments[0].rname, "chr5");
        assert_eq!(segments[0].pos, 20000);
        assert!(!alignment.has_alt_hits);
    }

    #[test]
    fn test_parse_alignment_record_bad_sa() {
        let mut record = bam::Record::new();
        let cigar = CigarString(vec![Cigar::Match(10)]);
        record.set(b"read2", Some(&cigar), &[b'A'; 10], &[30; 10]);
        record.push_aux(b"SA", Aux::String("chr5;")).unwrap();
        match parse_alignment_record(&record) {
            Err(FilterError::MalformedRecord { name, .. }) => assert_eq!(name, "read2"),
            other => panic!("expected malformed record error, got {other:?}"),
        }
    }
}
