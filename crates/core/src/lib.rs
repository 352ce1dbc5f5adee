//! # Harvest Core
//!
//! Turns keyword task files into merged site lists by driving a remote
//! search-parsing service.
//!
//! ## Architecture
//!
//! - `task/` - task file names, charset decoding, query expansion, run tags
//! - `service/` - the parsing service boundary and its HTTP client
//! - `jobs/` - per-preset job submission and status polling
//! - `results/` - download, exclusion filtering, domain normalization
//! - `scan` - the watch-directory loop that ties it together
//! - `config` - the `key:value` settings file
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harvest_core::{HttpParserService, Scanner, Settings};
//!
//! let settings = Settings::load_or_create("config.txt".as_ref()).await?;
//! let service = Arc::new(HttpParserService::new(&settings.link, &settings.password)?);
//! let scanner = Scanner::new(settings, service, None)?;
//! scanner.scan_once().await?;
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod results;
pub mod scan;
pub mod service;
pub mod task;

pub use config::{default_presets, Preset, Settings};
pub use error::{ConfigError, PollError, ServiceError};
pub use results::{ExclusionMatcher, ResultSelection};
pub use scan::{ConsumeMode, ScanReport, Scanner, TaskOutcome};
pub use service::{HttpParserService, ParserService};
