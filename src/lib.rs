pub mod bam_sa_parser;
pub mod cli;
pub mod containers;
pub mod corroboration;
pub mod errors;
pub mod evidence_window;
pub mod ingester;
pub mod kdtree;
pub mod mismatch_filter;
pub mod region_filter;
pub mod result_writer;
pub mod splitter_validator;
pub mod sweep_corroborator;
pub mod two_pass;
pub mod utils;
