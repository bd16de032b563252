use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::corroboration::CorroborationStrategy;
use crate::errors::{FilterError, FilterResult};
use crate::evidence_window::WindowConfig;
use crate::mismatch_filter::MismatchThresholds;
use crate::two_pass::{FilterConfig, SampleJob};
use crate::utils;

#[derive(Clone, Parser)]
#[clap(author, version, about)]
pub struct Arguments {
    #[clap(subcommand)]
    pub command: Command,

    /// Optional flag to print verbose output for debugging purposes.
    #[clap(long = "verbose", global = true)]
    pub verbose: bool,
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Remove low-quality and uncorroborated evidence from discordant and split BAMs, in place.
    Filter(FilterArgs),

    /// Pool distant evidence across several sorted, indexed BAMs, writing <stem>.ev.bam for each.
    Window(WindowArgs),
}

#[derive(Clone, clap::Args)]
pub struct FilterArgs {
    /// Discordant-pair BAM, one per sample. Sorted and indexed.
    #[clap(required = true)]
    #[clap(long = "disc")]
    #[clap(value_name = "BAM")]
    #[clap(num_args = 1..)]
    pub disc: Vec<PathBuf>,

    /// Split-read BAM, one per sample, in the same order as `--disc`.
    #[clap(required = true)]
    #[clap(long = "split")]
    #[clap(value_name = "BAM")]
    #[clap(num_args = 1..)]
    pub split: Vec<PathBuf>,

    /// BED file of regions to exclude from analysis. GZIP files allowed.
    #[clap(long = "exclude-bed")]
    #[clap(value_name = "BED")]
    pub exclude_bed: Option<PathBuf>,

    /// Quantized BED of high-depth regions to exclude. GZIP files allowed.
    #[clap(long = "depth-bed")]
    #[clap(value_name = "BED")]
    pub depth_bed: Option<PathBuf>,

    /// Exclude regions deeper than this, computed with mosdepth unless `--depth-bed` is given
    #[clap(long = "max-depth")]
    #[clap(value_name = "INT")]
    pub max_depth: Option<u32>,

    /// Reference FASTA passed to mosdepth (required for CRAM)
    #[clap(long = "fasta")]
    #[clap(value_name = "FASTA")]
    pub fasta: Option<PathBuf>,

    /// Comma-delimited reference names to exclude. Entries starting with `~` are regular expressions.
    #[clap(long = "exclude-chroms")]
    #[clap(value_name = "STRING")]
    #[clap(default_value = utils::DEFAULT_EXCLUDE_CHROMS)]
    pub exclude_chroms: String,

    /// Minimum mapping quality
    #[clap(long = "min-mapq")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MIN_MAPQ)]
    pub min_mapq: u8,

    /// Maximum indel-adjusted mismatches for any alignment
    #[clap(long = "max-mismatches")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MAX_MISMATCHES)]
    pub max_mismatches: i64,

    /// Maximum indel-adjusted mismatches for an inter-chromosomal or distant alignment
    #[clap(long = "max-distant-mismatches")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::MAX_DISTANT_MISMATCHES)]
    pub max_distant_mismatches: i64,

    /// Maximum clipped fraction of an inter-chromosomal or distant alignment
    #[clap(long = "max-clip-fraction")]
    #[clap(value_name = "FLOAT")]
    #[clap(default_value_t = utils::MAX_CLIP_FRACTION)]
    pub max_clip_fraction: f64,

    /// Window in bp within which two pieces of evidence corroborate each other
    #[clap(long = "window")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::CORROBORATION_WINDOW)]
    pub window: i64,

    /// Corroboration search strategy
    #[clap(long = "strategy")]
    #[clap(value_enum)]
    #[clap(default_value = "sweep")]
    pub strategy: CorroborationStrategy,

    /// Reject inter-chromosomal or distant alignments with alternative hits (XA)
    #[clap(long = "reject-alt-hits")]
    pub reject_alt_hits: bool,

    /// Reject alignments soft-clipped on both ends with more than 5 bases clipped on the right
    #[clap(long = "reject-flanked-clips")]
    pub reject_flanked_clips: bool,

    /// Reject split reads whose only supplementary alignment is clipped on both ends
    #[clap(long = "reject-clipped-splitters")]
    pub reject_clipped_splitters: bool,

    /// Only apply mapping quality, flag and depth filters
    #[clap(long = "no-extra-filters")]
    pub no_extra_filters: bool,

    /// Number of samples filtered in parallel. Defaults to available parallelism.
    #[clap(long = "threads")]
    #[clap(value_name = "INT")]
    pub threads: Option<usize>,

    /// Write per-file statistics as JSON, gzipped if the path ends in .gz
    #[clap(long = "report")]
    #[clap(value_name = "JSON")]
    pub report: Option<PathBuf>,
}

impl FilterArgs {
    /// Pair up the inputs by sample and build the filter settings
    pub fn to_config(&self) -> FilterResult<(Vec<SampleJob>, FilterConfig)> {
        if self.disc.len() != self.split.len() {
            return Err(FilterError::config(format!(
                "{} discordant BAMs but {} split BAMs",
                self.disc.len(),
                self.split.len()
            )));
        }
        let jobs = self
            .disc
            .iter()
            .zip(self.split.iter())
            .map(|(disc, split)| SampleJob {
                disc: disc.clone(),
                split: split.clone(),
            })
            .collect();
        let threads = self.threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let config = FilterConfig {
            min_mapq: self.min_mapq,
            thresholds: MismatchThresholds {
                max_mismatches: self.max_mismatches,
                max_distant_mismatches: self.max_distant_mismatches,
                max_clip_fraction: self.max_clip_fraction,
                reject_alt_hits: self.reject_alt_hits,
                reject_flanked_clips: self.reject_flanked_clips,
                reject_clipped_splitters: self.reject_clipped_splitters,
                ..Default::default()
            },
            window: self.window,
            strategy: self.strategy,
            extra_filters: !self.no_extra_filters,
            exclude_chroms: utils::split_list(&self.exclude_chroms),
            exclude_bed: self.exclude_bed.clone(),
            depth_bed: self.depth_bed.clone(),
            max_depth: self.max_depth,
            fasta: self.fasta.clone(),
            threads,
            report: self.report.clone(),
        };
        config.validate()?;
        Ok((jobs, config))
    }
}

#[derive(Clone, clap::Args)]
pub struct WindowArgs {
    /// Size of the sliding window in bp
    #[clap(long = "window")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::STREAMING_WINDOW)]
    pub window: i64,

    /// Pieces of evidence to the same reference required in the window
    #[clap(long = "evidence")]
    #[clap(value_name = "INT")]
    #[clap(default_value_t = utils::STREAMING_MIN_EVIDENCE)]
    pub evidence: u32,

    /// Sorted, indexed BAMs sharing one reference list
    #[clap(required = true)]
    #[clap(value_name = "BAM")]
    pub bams: Vec<PathBuf>,
}

impl WindowArgs {
    pub fn to_config(&self) -> FilterResult<WindowConfig> {
        let config = WindowConfig {
            inputs: self.bams.clone(),
            window: self.window,
            min_evidence: self.evidence,
        };
        config.validate()?;
        Ok(config)
    }
}

pub fn get_args() -> Arguments {
    Arguments::parse()
}
