mod common;

use common::*;
use std::path::Path;
use svsmoother::containers::FileReport;
use svsmoother::corroboration::CorroborationStrategy;
use svsmoother::errors::FilterError;
use svsmoother::two_pass::{run_filter, FilterConfig, SampleJob};

fn create_test_split_reads() -> Vec<TestRead> {
    let mut reads = create_test_split_read("split1", 1_000_000, 500_000);
    reads.extend(create_test_split_read("split2", 1_000_200, 500_300));
    reads
}

fn create_test_sample(dir: &Path, disc_reads: Vec<TestRead>) -> SampleJob {
    let job = SampleJob {
        disc: dir.join("sample.disc.bam"),
        split: dir.join("sample.split.bam"),
    };
    write_test_bam(&job.disc, disc_reads);
    write_test_bam(&job.split, create_test_split_reads());
    job
}

fn run_test_filter(job: &SampleJob, config: &FilterConfig) -> (FileReport, FileReport) {
    let reports = run_filter(std::slice::from_ref(job), config).unwrap();
    assert_eq!(reports.len(), 2);
    (reports[0].clone(), reports[1].clone())
}

fn strategies() -> [CorroborationStrategy; 2] {
    [CorroborationStrategy::Sweep, CorroborationStrategy::Kdtree]
}

#[test]
fn test_well_paired_records_survive() {
    for strategy in strategies() {
        let dir = tempfile::tempdir().unwrap();
        let job = create_test_sample(dir.path(), create_test_well_paired_reads(500, 100_000, 10_000));
        let config = FilterConfig {
            strategy,
            ..Default::default()
        };
        let (disc, split) = run_test_filter(&job, &config);
        assert_eq!(disc.counts.total, 1_000);
        assert_eq!(disc.counts.removed(), 0);
        assert_eq!(disc.counts.written, 1_000);
        assert!(!disc.is_split);

        // split halves are counted under one normalized name
        assert!(split.is_split);
        assert_eq!(split.counts.total, 4);
        assert_eq!(split.counts.written, 4);

        assert_eq!(read_test_bam(&job.disc).len(), 1_000);
        assert!(job.disc.with_extension("bam.bai").exists());
        assert!(job.split.with_extension("bam.bai").exists());
    }
}

#[test]
fn test_lone_distant_pair_removed() {
    for strategy in strategies() {
        let dir = tempfile::tempdir().unwrap();
        let mut reads = create_test_well_paired_reads(500, 100_000, 10_000);
        reads.extend(create_test_pair("lone", CHR1, 7_000_000, CHR2, 3_000_000));
        let job = create_test_sample(dir.path(), reads);
        let config = FilterConfig {
            strategy,
            ..Default::default()
        };
        let (disc, _) = run_test_filter(&job, &config);
        assert_eq!(disc.counts.total, 1_002);
        assert_eq!(disc.counts.orphan, 2);
        assert_eq!(disc.counts.written, 1_000);

        let remaining = read_test_bam(&job.disc);
        assert_eq!(remaining.len(), 1_000);
        assert!(remaining.iter().all(|(name, _, _)| name != "lone"));
    }
}

#[test]
fn test_corroborated_distant_pairs_kept() {
    for strategy in strategies() {
        let dir = tempfile::tempdir().unwrap();
        let mut reads = create_test_well_paired_reads(10, 100_000, 10_000);
        reads.extend(create_test_pair("near1", CHR1, 6_000_000, CHR2, 2_000_000));
        reads.extend(create_test_pair("near2", CHR1, 6_000_400, CHR2, 2_000_500));
        reads.extend(create_test_pair("far", CHR1, 6_000_800, CHR2, 2_900_000));
        let job = create_test_sample(dir.path(), reads);
        let config = FilterConfig {
            strategy,
            ..Default::default()
        };
        let (disc, _) = run_test_filter(&job, &config);
        assert_eq!(disc.counts.total, 26);
        assert_eq!(disc.counts.orphan, 2);

        let names: Vec<String> = read_test_bam(&job.disc)
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names.iter().filter(|name| name.starts_with("near")).count(), 4);
        assert!(!names.contains(&"far".to_string()));
    }
}

#[test]
fn test_discordant_pair_with_local_sa_kept() {
    for strategy in strategies() {
        let dir = tempfile::tempdir().unwrap();
        let mut reads = create_test_well_paired_reads(10, 100_000, 10_000);
        let mut with_sa = create_test_pair("sa1", CHR1, 6_000_000, CHR2, 2_000_000);
        with_sa[0].cigar = "100M50S".to_string();
        with_sa[0].sa = Some("chr1,6050001,+,100S50M,60,0;".to_string());
        reads.extend(with_sa);
        reads.extend(create_test_pair("near", CHR1, 6_000_400, CHR2, 2_000_500));
        let job = create_test_sample(dir.path(), reads);
        let config = FilterConfig {
            strategy,
            ..Default::default()
        };
        let (disc, _) = run_test_filter(&job, &config);
        assert_eq!(disc.counts.total, 24);
        assert_eq!(disc.counts.removed(), 0);

        let names: Vec<String> = read_test_bam(&job.disc)
            .into_iter()
            .map(|(name, _, _)| name)
            .collect();
        assert_eq!(names.iter().filter(|name| *name == "sa1").count(), 2);
    }
}

#[test]
fn test_malformed_record_leaves_input_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut reads = create_test_well_paired_reads(10, 100_000, 10_000);
    let mut bad = create_test_pair("bad", CHR1, 3_000_000, CHR1, 3_000_300);
    bad[1].sa = Some("chr5;".to_string());
    reads.extend(bad);
    let job = create_test_sample(dir.path(), reads);
    let before = std::fs::read(&job.disc).unwrap();

    let result = run_filter(std::slice::from_ref(&job), &FilterConfig::default());
    match result {
        Err(FilterError::MalformedRecord { name, .. }) => assert_eq!(name, "bad"),
        other => panic!("expected malformed record error, got {other:?}"),
    }
    assert_eq!(std::fs::read(&job.disc).unwrap(), before);
}

#[test]
fn test_index_rebuilt_when_split_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let job = create_test_sample(dir.path(), create_test_well_paired_reads(10, 100_000, 10_000));
    write_test_bam(
        &job.split,
        vec![TestRead::new("Abad", CHR1, 100).with_sa("chr5;")],
    );
    let disc_index = job.disc.with_extension("bam.bai");
    std::fs::remove_file(&disc_index).unwrap();

    let result = run_filter(std::slice::from_ref(&job), &FilterConfig::default());
    assert!(matches!(result, Err(FilterError::MalformedRecord { .. })));
    // the discordant file was already replaced, and its index with it
    assert!(disc_index.exists());
    assert_eq!(read_test_bam(&job.disc).len(), 20);
}

#[test]
fn test_filter_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let mut reads = create_test_well_paired_reads(50, 100_000, 10_000);
    reads.extend(create_test_pair("near1", CHR1, 6_000_000, CHR2, 2_000_000));
    reads.extend(create_test_pair("near2", CHR1, 6_000_400, CHR2, 2_000_500));
    reads.extend(create_test_pair("lone", CHR1, 7_000_000, CHR2, 3_000_000));
    let mut low_quality = create_test_pair("lowq", CHR1, 8_000_000, CHR1, 8_000_300);
    low_quality[0].mapq = 10;
    reads.extend(low_quality);
    let mut duplicate = create_test_pair("dup", CHR1, 9_000_000, CHR1, 9_000_300);
    duplicate[1].flags |= FLAG_DUPLICATE;
    reads.extend(duplicate);
    let job = create_test_sample(dir.path(), reads);

    let config = FilterConfig::default();
    let (first, _) = run_test_filter(&job, &config);
    assert_eq!(first.counts.total, 110);
    assert_eq!(first.counts.low_mapq, 1);
    assert_eq!(first.counts.qc_fail_or_duplicate, 1);
    // lone pair plus the mates of the two filtered records
    assert_eq!(first.counts.orphan, 4);
    assert_eq!(first.counts.written, 104);

    let (second, second_split) = run_test_filter(&job, &config);
    assert_eq!(second.counts.total, 104);
    assert_eq!(second.counts.removed(), 0);
    assert_eq!(second.counts.written, 104);
    assert_eq!(second_split.counts.removed(), 0);
}

#[test]
fn test_excluded_reference_and_no_extra_filters() {
    let dir = tempfile::tempdir().unwrap();
    let mut reads = create_test_well_paired_reads(10, 100_000, 10_000);
    reads.extend(create_test_pair("decoy", DECOY, 1_000, DECOY, 1_300));
    reads.extend(create_test_pair("to_decoy", CHR1, 4_000_000, DECOY, 5_000));
    let job = create_test_sample(dir.path(), reads.clone());

    let (disc, _) = run_test_filter(&job, &FilterConfig::default());
    assert_eq!(disc.counts.excluded_reference, 3);
    assert_eq!(disc.counts.excluded_mate, 1);
    assert_eq!(disc.counts.written, 20);

    // only mapq, flag and depth filters
    let dir = tempfile::tempdir().unwrap();
    let job = create_test_sample(dir.path(), reads);
    let config = FilterConfig {
        extra_filters: false,
        ..Default::default()
    };
    let (disc, _) = run_test_filter(&job, &config);
    assert_eq!(disc.counts.region_quality_removed(), 0);
    // the distant pair into the decoy is still uncorroborated
    assert_eq!(disc.counts.orphan, 2);
    assert_eq!(disc.counts.written, 22);
}

#[test]
fn test_exclude_bed_and_report() {
    let dir = tempfile::tempdir().unwrap();
    let exclude_bed = dir.path().join("exclude.bed");
    // covers pair0 and pair1, at 100,000 and 110,000
    std::fs::write(&exclude_bed, "chr1\t99000\t111000\n").unwrap();
    let report = dir.path().join("report.json");
    let job = create_test_sample(dir.path(), create_test_well_paired_reads(10, 100_000, 10_000));
    let config = FilterConfig {
        exclude_bed: Some(exclude_bed),
        report: Some(report.clone()),
        ..Default::default()
    };
    let (disc, _) = run_test_filter(&job, &config);
    assert_eq!(disc.counts.high_depth, 4);
    assert_eq!(disc.counts.written, 16);

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(value.as_array().unwrap().len(), 2);
    assert_eq!(value[0]["counts"]["high_depth"], 4);
    assert_eq!(value[1]["is_split"], true);
}
