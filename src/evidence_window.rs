use log::{debug, info};
use rust_htslib::bam::{self, Read};
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::bam_sa_parser::parse_alignment_record;
use crate::containers::ReferenceCatalog;
use crate::errors::{FilterError, FilterResult};
use crate::utils;

/// Settings for pooling distant evidence across several BAMs
#[derive(Debug, Clone)]
pub struct WindowConfig {
    pub inputs: Vec<PathBuf>,
    pub window: i64,
    pub min_evidence: u32,
}

impl WindowConfig {
    pub fn new(inputs: Vec<PathBuf>) -> Self {
        WindowConfig {
            inputs,
            window: utils::STREAMING_WINDOW,
            min_evidence: utils::STREAMING_MIN_EVIDENCE,
        }
    }

    pub fn validate(&self) -> FilterResult<()> {
        if self.inputs.is_empty() {
            return Err(FilterError::config("At least one input BAM is required"));
        }
        if self.window < 0 {
            return Err(FilterError::config(format!(
                "Window must be non-negative, got {}",
                self.window
            )));
        }
        if self.min_evidence == 0 {
            return Err(FilterError::config("Evidence must be at least 1"));
        }
        for input in &self.inputs {
            if !utils::is_local_file(input) {
                return Err(FilterError::config(format!(
                    "Input BAM not found: {}",
                    input.display()
                )));
            }
        }
        Ok(())
    }
}

/// A record waiting in the window, with the references its mate and
/// supplementary segments land on
#[derive(Debug)]
pub struct WindowEntry<T> {
    pub start: i64,
    pub end: i64,
    pub mate_tids: Vec<i32>,
    pub same_reference_mate: bool,
    pub payload: T,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounts {
    pub written: u64,
    pub skipped: u64,
}

impl WindowCounts {
    pub fn skipped_percent(&self) -> f64 {
        let total = self.written + self.skipped;
        if total == 0 {
            return 0.0;
        }
        100.0 * self.skipped as f64 / total as f64
    }
}

/// Sliding window over the records of one chromosome, in start order.
///
/// Records stay pending until a newer record starts more than `window`
/// bases past their end. A pending record counts once toward every
/// reference its mate or SA segments land on, and stops counting as soon
/// as it has been decided.
pub struct EvidenceWindow<T> {
    window: i64,
    min_evidence: u32,
    pending: VecDeque<WindowEntry<T>>,
    counts: HashMap<i32, u32>,
    stats: WindowCounts,
}

impl<T> EvidenceWindow<T> {
    pub fn new(window: i64, min_evidence: u32) -> Self {
        EvidenceWindow {
            window,
            min_evidence,
            pending: VecDeque::new(),
            counts: HashMap::new(),
            stats: WindowCounts::default(),
        }
    }

    /// Add the next record, returning the records it pushes out of the
    /// window with their keep decision
    pub fn push(&mut self, entry: WindowEntry<T>) -> Vec<(T, bool)> {
        let mut released = Vec::new();
        while self
            .pending
            .front()
            .is_some_and(|front| front.end < entry.start - self.window)
        {
            if let Some(front) = self.pending.pop_front() {
                released.push(self.release(front));
            }
        }
        for tid in &entry.mate_tids {
            *self.counts.entry(*tid).or_insert(0) += 1;
        }
        self.pending.push_back(entry);
        released
    }

    /// Release everything still pending, at the end of a chromosome
    pub fn flush(&mut self) -> Vec<(T, bool)> {
        let mut released = Vec::with_capacity(self.pending.len());
        while let Some(entry) = self.pending.pop_front() {
            released.push(self.release(entry));
        }
        self.counts.clear();
        released
    }

    /// The popped record itself is still among the counts it is judged on.
    fn release(&mut self, entry: WindowEntry<T>) -> (T, bool) {
        let keep = entry.mate_tids.is_empty()
            || entry.same_reference_mate
            || entry
                .mate_tids
                .iter()
                .any(|tid| self.counts.get(tid).copied().unwrap_or(0) >= self.min_evidence);
        for tid in &entry.mate_tids {
            if let Some(count) = self.counts.get_mut(tid) {
                *count = count.saturating_sub(1);
            }
        }
        if keep {
            self.stats.written += 1;
        } else {
            self.stats.skipped += 1;
        }
        (entry.payload, keep)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn counts(&self) -> WindowCounts {
        self.stats
    }
}

/// Next unread record of one input stream.
///
/// Ordered in reverse so the heap pops the smallest (start, end) first,
/// with ties going to the lower stream index.
struct MergeHead {
    start: i64,
    end: i64,
    stream: usize,
    record: bam::Record,
}

impl Ord for MergeHead {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (other.start, other.end, other.stream).cmp(&(self.start, self.end, self.stream))
    }
}

impl PartialOrd for MergeHead {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeHead {
    fn eq(&self, other: &Self) -> bool {
        (self.start, self.end, self.stream) == (other.start, other.end, other.stream)
    }
}

impl Eq for MergeHead {}

fn read_next(reader: &mut bam::IndexedReader, stream: usize) -> FilterResult<Option<MergeHead>> {
    let mut record = bam::Record::new();
    match reader.read(&mut record) {
        None => Ok(None),
        Some(Ok(())) => Ok(Some(MergeHead {
            start: record.pos(),
            end: record.cigar().end_pos(),
            stream,
            record,
        })),
        Some(Err(e)) => Err(e.into()),
    }
}

/// k-way merge of one chromosome across indexed inputs, yielding
/// (stream index, record) in (start, end) order
pub struct ChromMerge<'a> {
    readers: &'a mut [bam::IndexedReader],
    heap: BinaryHeap<MergeHead>,
}

impl<'a> ChromMerge<'a> {
    /// Inputs with no index entry for the chromosome contribute nothing.
    pub fn new(readers: &'a mut [bam::IndexedReader], chrom: &str) -> FilterResult<Self> {
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (stream, reader) in readers.iter_mut().enumerate() {
            if reader.header().tid(chrom.as_bytes()).is_none() {
                continue;
            }
            reader.fetch(bam::FetchDefinition::String(chrom.as_bytes()))?;
            if let Some(head) = read_next(reader, stream)? {
                heap.push(head);
            }
        }
        Ok(ChromMerge { readers, heap })
    }
}

impl Iterator for ChromMerge<'_> {
    type Item = FilterResult<(usize, bam::Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        let head = self.heap.pop()?;
        match read_next(&mut self.readers[head.stream], head.stream) {
            Ok(Some(next_head)) => self.heap.push(next_head),
            Ok(None) => {}
            Err(e) => return Some(Err(e)),
        }
        Some(Ok((head.stream, head.record)))
    }
}

/// Build the window entry of a raw record: the mate's reference if it
/// differs, plus the reference of every SA segment
pub fn window_entry(
    record: bam::Record,
    stream: usize,
    references: &ReferenceCatalog,
) -> FilterResult<WindowEntry<(usize, bam::Record)>> {
    let alignment = parse_alignment_record(&record)?;
    let mut mate_tids = Vec::new();
    if alignment.has_mate_reference() && alignment.mtid != alignment.tid {
        mate_tids.push(alignment.mtid);
    }
    if let Some(segments) = &alignment.supplementary {
        for segment in segments {
            match references.tid(&segment.rname) {
                Some(tid) => mate_tids.push(tid),
                None => {
                    return Err(FilterError::MalformedRecord {
                        name: alignment.name.clone(),
                        tid: alignment.tid,
                        pos: alignment.pos,
                        detail: format!("SA reference {} not in header", segment.rname),
                    })
                }
            }
        }
    }
    Ok(WindowEntry {
        start: alignment.pos,
        end: alignment.end,
        same_reference_mate: alignment.mtid == alignment.tid,
        mate_tids,
        payload: (stream, record),
    })
}

/// `<stem>.ev.bam` next to the input
pub fn window_output_path(input: &Path) -> PathBuf {
    input.with_extension("ev.bam")
}

/// Filter inputs jointly, writing one `.ev.bam` per input. All inputs must
/// share one reference list.
pub fn run_evidence_window(config: &WindowConfig) -> FilterResult<(Vec<PathBuf>, WindowCounts)> {
    config.validate()?;
    let start_time = SystemTime::now();

    let mut readers = Vec::with_capacity(config.inputs.len());
    let mut writers = Vec::with_capacity(config.inputs.len());
    let mut outputs = Vec::with_capacity(config.inputs.len());
    let mut references: Option<ReferenceCatalog> = None;
    for input in &config.inputs {
        let reader = bam::IndexedReader::from_path(input)?;
        let catalog = ReferenceCatalog::from_header(reader.header());
        match &references {
            Some(first) if first.names() != catalog.names() => {
                return Err(FilterError::config(format!(
                    "{} has a different reference list than {}",
                    input.display(),
                    config.inputs[0].display()
                )));
            }
            Some(_) => {}
            None => references = Some(catalog),
        }
        let output = window_output_path(input);
        let header = bam::Header::from_template(reader.header());
        let mut writer = bam::Writer::from_path(&output, &header, bam::Format::Bam)?;
        writer.set_compression_level(bam::CompressionLevel::Fastest)?;
        readers.push(reader);
        writers.push(writer);
        outputs.push(output);
    }
    let references = references.unwrap_or_default();

    let mut totals = WindowCounts::default();
    for chrom in references.names() {
        let mut window: EvidenceWindow<(usize, bam::Record)> =
            EvidenceWindow::new(config.window, config.min_evidence);
        for merged in ChromMerge::new(&mut readers, chrom)? {
            let (stream, record) = merged?;
            let entry = window_entry(record, stream, &references)?;
            for ((stream, record), keep) in window.push(entry) {
                if keep {
                    writers[stream].write(&record)?;
                }
            }
        }
        for ((stream, record), keep) in window.flush() {
            if keep {
                writers[stream].write(&record)?;
            }
        }
        let counts = window.counts();
        if counts.written + counts.skipped > 0 {
            debug!(
                "{}: kept {} skipped {}",
                chrom, counts.written, counts.skipped
            );
        }
        totals.written += counts.written;
        totals.skipped += counts.skipped;
    }
    // writers flush on drop
    drop(writers);

    info!(
        "Evidence window skipped {} out of {} ({:.2}%)",
        totals.skipped,
        totals.skipped + totals.written,
        totals.skipped_percent()
    );
    debug!(
        "Evidence window: {}s",
        start_time.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    );
    Ok((outputs, totals))
}
