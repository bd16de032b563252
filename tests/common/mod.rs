#![allow(dead_code)]

use rust_htslib::bam::{
    self,
    header::HeaderRecord,
    record::{Aux, Cigar, CigarString},
    Read,
};
use std::path::Path;

pub const CHR1: i32 = 0;
pub const CHR2: i32 = 1;
pub const DECOY: i32 = 2;

const REFERENCES: [(&str, u64); 3] = [
    ("chr1", 50_000_000),
    ("chr2", 50_000_000),
    ("hs37d5", 10_000_000),
];

const FLAG_PAIRED: u16 = 0x1;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_MATE_REVERSE: u16 = 0x20;
const FLAG_FIRST: u16 = 0x40;
const FLAG_SECOND: u16 = 0x80;
pub const FLAG_SUPPLEMENTARY: u16 = 0x800;
pub const FLAG_DUPLICATE: u16 = 0x400;

/// Minimal description of one alignment to write into a test BAM
#[derive(Debug, Clone)]
pub struct TestRead {
    pub name: String,
    pub tid: i32,
    pub pos: i64,
    pub cigar: String,
    pub mapq: u8,
    pub flags: u16,
    pub mtid: i32,
    pub mpos: i64,
    pub sa: Option<String>,
}

impl TestRead {
    pub fn new(name: &str, tid: i32, pos: i64) -> Self {
        TestRead {
            name: name.to_string(),
            tid,
            pos,
            cigar: "100M".to_string(),
            mapq: 60,
            flags: 0,
            mtid: -1,
            mpos: -1,
            sa: None,
        }
    }

    pub fn with_cigar(mut self, cigar: &str) -> Self {
        self.cigar = cigar.to_string();
        self
    }

    pub fn with_sa(mut self, sa: &str) -> Self {
        self.sa = Some(sa.to_string());
        self
    }

    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags |= flags;
        self
    }

    fn to_record(&self) -> bam::Record {
        let cigar = CigarString::try_from(self.cigar.as_bytes()).unwrap();
        let query_length: u32 = cigar
            .iter()
            .map(|op| match op {
                Cigar::Match(len)
                | Cigar::Ins(len)
                | Cigar::SoftClip(len)
                | Cigar::Equal(len)
                | Cigar::Diff(len) => *len,
                _ => 0,
            })
            .sum();
        let seq = vec![b'A'; query_length as usize];
        let qual = vec![30u8; query_length as usize];
        let mut record = bam::Record::new();
        record.set(self.name.as_bytes(), Some(&cigar), &seq, &qual);
        record.set_tid(self.tid);
        record.set_pos(self.pos);
        record.set_mapq(self.mapq);
        record.set_flags(self.flags);
        record.set_mtid(self.mtid);
        record.set_mpos(self.mpos);
        record.push_aux(b"NM", Aux::U8(0)).unwrap();
        if let Some(sa) = &self.sa {
            record.push_aux(b"SA", Aux::String(sa)).unwrap();
        }
        record
    }
}

/// Both ends of a read pair
pub fn create_test_pair(name: &str, tid: i32, pos: i64, mtid: i32, mpos: i64) -> Vec<TestRead> {
    let mut first = TestRead::new(name, tid, pos);
    first.flags = FLAG_PAIRED | FLAG_FIRST | FLAG_MATE_REVERSE;
    first.mtid = mtid;
    first.mpos = mpos;
    let mut second = TestRead::new(name, mtid, mpos);
    second.flags = FLAG_PAIRED | FLAG_SECOND | FLAG_REVERSE;
    second.mtid = tid;
    second.mpos = pos;
    vec![first, second]
}

/// Well-behaved pairs on chr1 with 300 bp inserts, `spacing` apart
pub fn create_test_well_paired_reads(pairs: usize, start: i64, spacing: i64) -> Vec<TestRead> {
    (0..pairs)
        .flat_map(|i| {
            let pos = start + i as i64 * spacing;
            create_test_pair(&format!("pair{}", i), CHR1, pos, CHR1, pos + 300)
        })
        .collect()
}

/// A split read as written by a split extractor: primary named `A...`,
/// supplementary named `B...`, each carrying the other as SA
pub fn create_test_split_read(name: &str, pos: i64, sa_pos: i64) -> Vec<TestRead> {
    let primary = TestRead::new(&format!("A{}", name), CHR1, pos)
        .with_cigar("100M50S")
        .with_sa(&format!("chr2,{},+,100S50M,60,0;", sa_pos + 1));
    let supplementary = TestRead::new(&format!("B{}", name), CHR2, sa_pos)
        .with_cigar("100H50M")
        .with_flags(FLAG_SUPPLEMENTARY)
        .with_sa(&format!("chr1,{},+,100M50S,60,0;", pos + 1));
    vec![primary, supplementary]
}

pub fn create_test_header() -> bam::Header {
    let mut header = bam::Header::new();
    let mut hd = HeaderRecord::new(b"HD");
    hd.push_tag(b"VN", "1.6").push_tag(b"SO", "coordinate");
    header.push_record(&hd);
    for (name, length) in REFERENCES {
        let mut sq = HeaderRecord::new(b"SQ");
        sq.push_tag(b"SN", name).push_tag(b"LN", length);
        header.push_record(&sq);
    }
    header
}

/// Write the reads in coordinate order and index the BAM
pub fn write_test_bam(path: &Path, mut reads: Vec<TestRead>) {
    reads.sort_by_key(|read| (read.tid, read.pos));
    {
        let header = create_test_header();
        let mut writer = bam::Writer::from_path(path, &header, bam::Format::Bam).unwrap();
        for read in &reads {
            writer.write(&read.to_record()).unwrap();
        }
    }
    bam::index::build(path, None, bam::index::Type::Bai, 1).unwrap();
}

/// (name, tid, pos) of every record, in file order
pub fn read_test_bam(path: &Path) -> Vec<(String, i32, i64)> {
    let mut reader = bam::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|result| {
            let record = result.unwrap();
            (
                String::from_utf8(record.qname().to_vec()).unwrap(),
                record.tid(),
                record.pos(),
            )
        })
        .collect()
}
