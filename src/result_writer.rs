use flate2::write::GzEncoder;
use log::{debug, info, warn};
use rust_htslib::bam;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::containers::FileReport;
use crate::errors::{FilterError, FilterResult};

/// Move a finished output over the original. Rename does not work across
/// devices, so fall back to copying and deleting the temporary file.
pub fn replace_file(temp_path: &Path, target: &Path) -> FilterResult<()> {
    if let Err(rename_error) = std::fs::rename(temp_path, target) {
        debug!(
            "Rename of {} failed ({}), copying instead",
            temp_path.display(),
            rename_error
        );
        std::fs::copy(temp_path, target).map_err(|e| FilterError::io(target, e))?;
        std::fs::remove_file(temp_path).map_err(|e| FilterError::io(temp_path, e))?;
    }
    Ok(())
}

/// Build a BAI next to a coordinate-sorted BAM
pub fn index_bam(bam_path: &Path, threads: u32) -> FilterResult<()> {
    bam::index::build(bam_path, None, bam::index::Type::Bai, threads)?;
    debug!("Indexed {}", bam_path.display());
    Ok(())
}

fn percent(count: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    100.0 * count as f64 / total as f64
}

/// Log the per-file summary lines
pub fn log_file_report(report: &FileReport) {
    let counts = &report.counts;
    let name = Path::new(&report.path)
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| report.path.clone());
    info!(
        "removed {} alignments out of {} ({:.2}%) with low quality, high depth or from excluded chroms from {} in {} seconds",
        counts.region_quality_removed(),
        counts.total,
        percent(counts.region_quality_removed(), counts.total),
        name,
        report.seconds
    );
    info!(
        "removed {} alignments out of {} ({:.2}%) that were bad interchromosomals or bad splitters from {}",
        counts.heuristic_removed(),
        counts.total,
        percent(counts.heuristic_removed(), counts.total),
        name
    );
    info!(
        "removed {} orphans out of {} ({:.2}%) from {}, {:.2}% of alignments survive",
        counts.orphan,
        counts.total,
        percent(counts.orphan, counts.total),
        name,
        counts.survivor_percent()
    );
    if counts.total > 0 && counts.written == 0 {
        warn!("No alignments survived filtering in {}", name);
    }
}

/// Write the per-file reports as pretty JSON, gzipped if the path ends in `.gz`
pub fn write_report(reports: &[FileReport], report_path: &Path) -> FilterResult<()> {
    let json_string = serde_json::to_string_pretty(reports)?;
    write_json(&json_string, report_path).map_err(|e| FilterError::io(report_path, e))?;
    info!("Report written to {}", report_path.display());
    Ok(())
}

fn write_json(json_string: &str, json_path: &Path) -> io::Result<()> {
    let file_handle = File::create(json_path)?;
    if json_path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        let mut gzip_filehandle = GzEncoder::new(file_handle, flate2::Compression::default());
        gzip_filehandle.write_all(json_string.as_bytes())?;
        gzip_filehandle.finish()?;
    } else {
        let mut writer = io::BufWriter::new(file_handle);
        writer.write_all(json_string.as_bytes())?;
        writer.flush()?
    }
    Ok(())
}
