//! # Task Ingestion
//!
//! - `file` - task file names and charset decoding
//! - `query` - query expansion from decoded text
//! - `tag` - per-task run identifiers

pub mod file;
pub mod query;
pub mod tag;

pub use file::TaskFile;
pub use query::{build_plan, QueryPlan, QuoteMode, TaskLayout};
pub use tag::RunTag;
