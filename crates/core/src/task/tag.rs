//! # Run Tags
//!
//! Random identifier shared by every job of one task file. It names the
//! remote results file and is the service-side de-duplication key.

use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of every generated tag
pub const RUN_TAG_LEN: usize = 16;

/// Per-task random identifier (`[0-9A-Za-z]{16}`).
///
/// Not cryptographically unique; collisions are negligible at our volumes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTag(String);

impl RunTag {
    /// Draw a fresh tag from the thread RNG
    pub fn generate() -> Self {
        let tag = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(RUN_TAG_LEN)
            .map(char::from)
            .collect();
        Self(tag)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Results file name requested from the service
    pub fn results_file_name(&self) -> String {
        format!("{}.txt", self.0)
    }
}

impl fmt::Display for RunTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
