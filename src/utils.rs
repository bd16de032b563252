use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::errors::{FilterError, FilterResult};

/// Minimum required mapping quality (MAPQ) for a record to be kept
pub const MIN_MAPQ: u8 = 20;

/// Maximum indel-adjusted mismatches for any record
pub const MAX_MISMATCHES: i64 = 5;

/// Maximum indel-adjusted mismatches for an inter-chromosomal or distant record
pub const MAX_DISTANT_MISMATCHES: i64 = 4;

/// Maximum number of insertion/deletion events in a record
pub const MAX_INDEL_EVENTS: usize = 2;

/// Maximum fraction of clipped bases for an inter-chromosomal or distant record
pub const MAX_CLIP_FRACTION: f64 = 0.40;

/// Same-chromosome mate separation beyond which a pair counts as distant
pub const DISTANT_MATE_DIST: i64 = 8_000_000;

/// Greatest distance in bp between a supplementary segment and the mate
/// for the segment to count as a split counterpart of the pair
pub const SPLIT_COUNTERPART_DIST: i64 = 500;

/// Window in bp that two breakpoints must share, in both dimensions,
/// to corroborate each other
pub const CORROBORATION_WINDOW: i64 = 1_000;

/// Sliding window in bp used when pooling evidence across several streams
pub const STREAMING_WINDOW: i64 = 10_000;

/// Pieces of evidence, including the record itself, required in the streaming window
pub const STREAMING_MIN_EVIDENCE: u32 = 2;

/// Minimum number of records sharing a read name after corroboration
pub const MIN_NAME_COUNT: i32 = 2;

/// Reference names excluded unless told otherwise
pub const DEFAULT_EXCLUDE_CHROMS: &str = "hs37d5,~:,~^GL,~decoy";

/// first two bytes of a gzip file that indicate the compression algorithm used
const GZIP_INDICATOR: [u8; 2] = [0x1F, 0x8B];

pub fn is_local_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(metadata) => metadata.is_file(),
        Err(_) => false, // If there is an error (e.g., path doesn't exist), return false
    }
}

/// Check if a file is gzipped (or bgzipped) from its magic bytes
pub fn is_gzipped(path: &Path) -> FilterResult<bool> {
    let file_handle = std::fs::File::open(path).map_err(|e| FilterError::io(path, e))?;
    let mut reader = BufReader::new(file_handle);
    let mut gzip_indicator_bytes = [0; 2];
    match reader.read_exact(&mut gzip_indicator_bytes) {
        Ok(()) => Ok(gzip_indicator_bytes == GZIP_INDICATOR),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(FilterError::io(path, e)),
    }
}

/// Read a plain text or gzipped text file into vector of Strings by line
pub fn read_file_from_path(file_path: &Path) -> FilterResult<Vec<String>> {
    if !is_local_file(file_path) {
        return Err(FilterError::config(format!(
            "File not found {}",
            file_path.display()
        )));
    }

    let lines_result: std::io::Result<Vec<String>> = if is_gzipped(file_path)? {
        let bgzf_reader = rust_htslib::bgzf::Reader::from_path(file_path)?;
        BufReader::new(bgzf_reader).lines().collect()
    } else {
        let file = std::fs::File::open(file_path).map_err(|e| FilterError::io(file_path, e))?;
        BufReader::new(file).lines().collect()
    };
    lines_result.map_err(|e| FilterError::io(file_path, e))
}

/// Split a comma-delimited list, dropping empty entries
pub fn split_list(list: &str) -> Vec<String> {
    list.trim()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
