use log::{debug, info};
use rayon::prelude::*;
use rust_htslib::bam::{self, Read};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::bam_sa_parser::parse_alignment_record;
use crate::containers::{AlignmentRecord, DropReason, FileReport, FilterCounts, ReferenceCatalog};
use crate::corroboration::{
    mark_orphans, CorroborationStrategy, EvidencePoint, NameCountTable, SpatialIndex,
};
use crate::errors::{FilterError, FilterResult};
use crate::ingester;
use crate::mismatch_filter::{is_sketchy, MismatchThresholds};
use crate::region_filter::{DepthRegionIndex, PreFilter, ReferenceExclusion};
use crate::result_writer;
use crate::splitter_validator::is_bad_splitter;
use crate::utils;

/// Validated settings for filtering discordant and split BAMs
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub min_mapq: u8,
    pub thresholds: MismatchThresholds,
    pub window: i64,
    pub strategy: CorroborationStrategy,
    /// Reference exclusion and the splitter/mismatch heuristics
    pub extra_filters: bool,
    pub exclude_chroms: Vec<String>,
    pub exclude_bed: Option<PathBuf>,
    pub depth_bed: Option<PathBuf>,
    /// Run mosdepth for a high-depth track when no depth BED is given
    pub max_depth: Option<u32>,
    pub fasta: Option<PathBuf>,
    pub threads: usize,
    pub report: Option<PathBuf>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            min_mapq: utils::MIN_MAPQ,
            thresholds: MismatchThresholds::default(),
            window: utils::CORROBORATION_WINDOW,
            strategy: CorroborationStrategy::Sweep,
            extra_filters: true,
            exclude_chroms: utils::split_list(utils::DEFAULT_EXCLUDE_CHROMS),
            exclude_bed: None,
            depth_bed: None,
            max_depth: None,
            fasta: None,
            threads: 1,
            report: None,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> FilterResult<()> {
        if self.window < 0 {
            return Err(FilterError::config(format!(
                "Window must be non-negative, got {}",
                self.window
            )));
        }
        if !(0.0..=1.0).contains(&self.thresholds.max_clip_fraction) {
            return Err(FilterError::config(format!(
                "Clip fraction must be between 0 and 1, got {}",
                self.thresholds.max_clip_fraction
            )));
        }
        if self.threads == 0 {
            return Err(FilterError::config("Threads must be at least 1"));
        }
        for path in [&self.exclude_bed, &self.depth_bed, &self.fasta]
            .into_iter()
            .flatten()
        {
            if !utils::is_local_file(path) {
                return Err(FilterError::config(format!(
                    "File not found {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn runs_mosdepth(&self) -> bool {
        self.max_depth.is_some() && self.depth_bed.is_none()
    }
}

/// The discordant and split BAMs of one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleJob {
    pub disc: PathBuf,
    pub split: PathBuf,
}

/// Stages of filtering one file, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPhase {
    Scanning,
    Deciding,
    Rewriting,
    Finalizing,
}

impl fmt::Display for FilterPhase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FilterPhase::Scanning => "scanning",
            FilterPhase::Deciding => "deciding",
            FilterPhase::Rewriting => "rewriting",
            FilterPhase::Finalizing => "finalizing",
        };
        write!(formatter, "{}", name)
    }
}

/// Per-record predicates of one file
struct RecordFilter<'a> {
    pre_filter: PreFilter<'a>,
    references: &'a ReferenceCatalog,
    thresholds: &'a MismatchThresholds,
    extra_filters: bool,
}

impl RecordFilter<'_> {
    fn check(&self, record: &AlignmentRecord) -> Option<DropReason> {
        if let Some(reason) = self.pre_filter.check(record) {
            return Some(reason);
        }
        if !self.extra_filters {
            return None;
        }
        if is_bad_splitter(record) {
            return Some(DropReason::BadSplitter);
        }
        if is_sketchy(record, self.references, self.thresholds) {
            return Some(DropReason::SketchyMismatch);
        }
        None
    }
}

fn log_phase(path: &Path, phase: FilterPhase, phase_start: &mut SystemTime) {
    debug!(
        "{}: {} done in {}ms",
        path.display(),
        phase,
        phase_start.elapsed().map(|d| d.as_millis()).unwrap_or(0)
    );
    *phase_start = SystemTime::now();
}

/// Filter one BAM in place.
///
/// The first pass counts records per read name among those passing the
/// per-record filters and collects their evidence points. Orphaned points
/// then lower their name's count, and the second pass writes only records
/// whose name still has at least two records. The filtered file replaces
/// the input and is reindexed.
pub fn filter_file(
    path: &Path,
    is_split: bool,
    config: &FilterConfig,
    exclusion: &ReferenceExclusion,
    depth_regions: &DepthRegionIndex,
    temp_dir: &Path,
) -> FilterResult<FileReport> {
    let start_time = SystemTime::now();
    let mut phase_start = start_time;

    // Scanning
    let mut reader = bam::Reader::from_path(path)?;
    let references = ReferenceCatalog::from_header(reader.header());
    let record_filter = RecordFilter {
        pre_filter: PreFilter::new(
            config.min_mapq,
            exclusion,
            depth_regions,
            &references,
            config.extra_filters,
        ),
        references: &references,
        thresholds: &config.thresholds,
        extra_filters: config.extra_filters,
    };
    let mut name_counts = NameCountTable::new();
    let mut spatial_index = SpatialIndex::new();
    let mut record = bam::Record::new();
    while let Some(result) = reader.read(&mut record) {
        result?;
        let alignment = parse_alignment_record(&record)?;
        if record_filter.check(&alignment).is_some() {
            continue;
        }
        let name = NameCountTable::normalize_name(&alignment.name, is_split);
        name_counts.increment(&name);
        if let Some((pair, point)) =
            EvidencePoint::from_record(&alignment, &references, &name, is_split)
        {
            spatial_index.insert(pair, point);
        }
    }
    drop(reader);
    log_phase(path, FilterPhase::Scanning, &mut phase_start);

    // Deciding
    let engine = config.strategy.engine();
    let orphan_points = mark_orphans(
        &spatial_index,
        &mut name_counts,
        engine.as_ref(),
        config.window,
        utils::MIN_NAME_COUNT,
    );
    debug!(
        "{}: {} of {} evidence points orphaned",
        path.display(),
        orphan_points,
        spatial_index.len()
    );
    drop(spatial_index);
    log_phase(path, FilterPhase::Deciding, &mut phase_start);

    // Rewriting
    let file_name = path
        .file_name()
        .ok_or_else(|| FilterError::config(format!("Not a file path: {}", path.display())))?;
    let temp_path = temp_dir.join(file_name);
    let mut counts = FilterCounts::default();
    {
        let mut reader = bam::Reader::from_path(path)?;
        let header = bam::Header::from_template(reader.header());
        let mut writer = bam::Writer::from_path(&temp_path, &header, bam::Format::Bam)?;
        writer.set_compression_level(bam::CompressionLevel::Fastest)?;
        while let Some(result) = reader.read(&mut record) {
            result?;
            counts.total += 1;
            let alignment = parse_alignment_record(&record)?;
            if let Some(reason) = record_filter.check(&alignment) {
                counts.add(reason);
                continue;
            }
            let name = NameCountTable::normalize_name(&alignment.name, is_split);
            if name_counts.get(&name) < utils::MIN_NAME_COUNT {
                counts.add(DropReason::Orphan);
                continue;
            }
            writer.write(&record)?;
            counts.written += 1;
        }
    }
    log_phase(path, FilterPhase::Rewriting, &mut phase_start);

    // Finalizing
    result_writer::replace_file(&temp_path, path)?;
    result_writer::index_bam(path, 1)?;
    log_phase(path, FilterPhase::Finalizing, &mut phase_start);

    let report = FileReport {
        path: path.display().to_string(),
        is_split,
        counts,
        seconds: start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0),
    };
    result_writer::log_file_report(&report);
    Ok(report)
}

/// Exclusion regions for one file: the static BEDs, plus a fresh mosdepth
/// track when requested
fn get_depth_regions(
    path: &Path,
    config: &FilterConfig,
    temp_dir: &Path,
) -> FilterResult<DepthRegionIndex> {
    let depth_bed = match (&config.depth_bed, config.max_depth) {
        (None, Some(max_depth)) => {
            // mosdepth needs an index of the unfiltered file
            result_writer::index_bam(path, 1)?;
            let prefix = temp_dir.join("mosdepth");
            Some(ingester::run_mosdepth(
                path,
                max_depth,
                config.fasta.as_deref(),
                &prefix,
            )?)
        }
        (depth_bed, _) => depth_bed.clone(),
    };
    ingester::load_depth_regions(config.exclude_bed.as_deref(), depth_bed.as_deref())
}

/// Filter the discordant then the split BAM of a sample. The two files are
/// handled serially to bound memory per worker.
pub fn run_sample_job(
    job: &SampleJob,
    config: &FilterConfig,
    exclusion: &ReferenceExclusion,
) -> FilterResult<Vec<FileReport>> {
    let mut reports = Vec::with_capacity(2);
    for (path, is_split) in [(&job.disc, false), (&job.split, true)] {
        let temp_dir = tempfile::Builder::new()
            .prefix("svsmoother-")
            .tempdir()
            .map_err(|e| FilterError::io(std::env::temp_dir(), e))?;
        let depth_regions = get_depth_regions(path, config, temp_dir.path())?;
        reports.push(filter_file(
            path,
            is_split,
            config,
            exclusion,
            &depth_regions,
            temp_dir.path(),
        )?);
    }
    Ok(reports)
}

/// Filter every sample on a pool of `config.threads` workers. External
/// tools are checked before any file is touched.
pub fn run_filter(jobs: &[SampleJob], config: &FilterConfig) -> FilterResult<Vec<FileReport>> {
    config.validate()?;
    if config.runs_mosdepth() {
        let version = ingester::check_mosdepth()?;
        debug!("Using {}", version);
    }
    for job in jobs {
        for path in [&job.disc, &job.split] {
            if !utils::is_local_file(path) {
                return Err(FilterError::config(format!(
                    "Input BAM not found: {}",
                    path.display()
                )));
            }
        }
    }
    let exclusion = ReferenceExclusion::new(&config.exclude_chroms)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.threads)
        .build()
        .map_err(|e| FilterError::config(format!("Failed to create thread pool: {}", e)))?;
    let results: Vec<FilterResult<Vec<FileReport>>> = pool.install(|| {
        jobs.par_iter()
            .map(|job| run_sample_job(job, config, &exclusion))
            .collect()
    });

    let mut reports = Vec::with_capacity(jobs.len() * 2);
    for result in results {
        reports.extend(result?);
    }
    let total: u64 = reports.iter().map(|r| r.counts.total).sum();
    let written: u64 = reports.iter().map(|r| r.counts.written).sum();
    info!(
        "Filtered {} files: {} of {} alignments kept",
        reports.len(),
        written,
        total
    );
    if let Some(report_path) = &config.report {
        result_writer::write_report(&reports, report_path)?;
    }
    Ok(reports)
}
