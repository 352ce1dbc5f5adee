//! # Results
//!
//! - `merge` - result selection, de-duplication and cleaning
//! - `exclusion` - case-insensitive substring blacklist
//! - `domain` - punycode host decoding for Cyrillic TLDs

pub mod domain;
pub mod exclusion;
pub mod merge;

pub use domain::DomainNormalizer;
pub use exclusion::ExclusionMatcher;
pub use merge::{OutputDoc, ResultMerger, ResultSelection};
