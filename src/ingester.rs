use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;

use crate::containers::GenomicInterval;
use crate::errors::{FilterError, FilterResult};
use crate::region_filter::DepthRegionIndex;
use crate::utils;

const MOSDEPTH: &str = "mosdepth";

/// Given a bedfile entry where a string is tab-delimited into
/// at least three fields, with the first being a string
/// and the next two being integers, create an interval to
/// represent them
fn bed_entry_to_interval(entry: &str, path: &Path) -> FilterResult<GenomicInterval> {
    let fields: Vec<&str> = entry.split_whitespace().collect();
    if fields.len() < 3 {
        return Err(FilterError::config(format!(
            "Invalid entry length in {}: \"{}\"",
            path.display(),
            entry
        )));
    }
    let parse_position = |field: &str| -> FilterResult<i64> {
        field.parse().map_err(|_| {
            FilterError::config(format!(
                "Non-numeric position in {}: \"{}\"",
                path.display(),
                entry
            ))
        })
    };
    let start = parse_position(fields[1])?;
    let end = parse_position(fields[2])?;
    Ok(GenomicInterval::new(fields[0].to_string(), start, end))
}

/// Reads a BED file of genomic regions. Can read a GZIP compressed or
/// uncompressed file from a local path.
pub fn load_bed_regions(path: &Path) -> FilterResult<Vec<GenomicInterval>> {
    let lines = utils::read_file_from_path(path)?;
    let mut regions = Vec::with_capacity(lines.len());
    for line in lines {
        if line.starts_with('#') || line.trim().is_empty() {
            // skip headers
            continue;
        }
        regions.push(bed_entry_to_interval(&line, path)?);
    }
    debug!("{} regions read from {}", regions.len(), path.display());
    Ok(regions)
}

/// Merge the static exclude regions and a high-depth track into one index
pub fn load_depth_regions(
    exclude_bed: Option<&Path>,
    depth_bed: Option<&Path>,
) -> FilterResult<DepthRegionIndex> {
    let mut regions = Vec::new();
    for path in [exclude_bed, depth_bed].into_iter().flatten() {
        regions.extend(load_bed_regions(path)?);
    }
    let index = DepthRegionIndex::from_regions(regions);
    if !index.is_empty() {
        debug!("{} excluded regions loaded", index.len());
    }
    Ok(index)
}

/// Verify mosdepth can be run, returning its version line
pub fn check_mosdepth() -> FilterResult<String> {
    let output = Command::new(MOSDEPTH)
        .arg("--version")
        .output()
        .map_err(|e| FilterError::external_tool(MOSDEPTH.to_string(), e.to_string()))?;
    if !output.status.success() {
        return Err(FilterError::external_tool(
            MOSDEPTH.to_string(),
            format!("--version exited with {}", output.status),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn mosdepth_command(
    bam_path: &Path,
    max_depth: u32,
    fasta: Option<&Path>,
    prefix: &Path,
) -> Command {
    let mut command = Command::new(MOSDEPTH);
    // a single open-ended bin, so every reported interval is high depth
    command
        .arg("-n")
        .arg("--quantize")
        .arg(format!("{}:", max_depth + 1));
    if let Some(fasta) = fasta {
        command.arg("-f").arg(fasta);
    }
    command.arg(prefix).arg(bam_path);
    command
}

/// Run `mosdepth --quantize` on an indexed BAM and return the path of the
/// quantized BED of regions deeper than `max_depth`.
pub fn run_mosdepth(
    bam_path: &Path,
    max_depth: u32,
    fasta: Option<&Path>,
    prefix: &Path,
) -> FilterResult<PathBuf> {
    let start_time = SystemTime::now();
    let mut command = mosdepth_command(bam_path, max_depth, fasta, prefix);
    debug!("Running {:?}", command);

    let output = command
        .output()
        .map_err(|e| FilterError::external_tool(MOSDEPTH.to_string(), e.to_string()))?;
    if !output.status.success() {
        return Err(FilterError::external_tool(
            MOSDEPTH.to_string(),
            format!(
                "failed on {}: {}",
                bam_path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ));
    }
    let quantized = PathBuf::from(format!("{}.quantized.bed.gz", prefix.display()));
    if !utils::is_local_file(&quantized) {
        return Err(FilterError::external_tool(
            MOSDEPTH.to_string(),
            format!("expected output {} not found", quantized.display()),
        ));
    }
    debug!(
        "mosdepth on {}: {}s",
        bam_path.display(),
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );
    Ok(quantized)
}
