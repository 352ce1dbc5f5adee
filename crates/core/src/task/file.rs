//! # Task Files
//!
//! Name parsing and charset decoding for files dropped into the watch
//! directory. A task file is named `<prefix>][<batch>][<type>.<ext>`, where the
//! batch and type segments are optional.

use encoding_rs::Encoding;

/// Segment separator inside task file names
const SEGMENT_SEPARATOR: &str = "][";

/// Prefix of every output file name
pub const OUTPUT_PREFIX: &str = "cites web done";

/// Drop a trailing `.ext` made of word characters
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot)
            if dot + 1 < name.len()
                && name[dot + 1..]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            &name[..dot]
        }
        _ => name,
    }
}

/// A task file picked up from the watch directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFile {
    /// Original file name
    pub file_name: String,
    /// Leading name segment
    pub prefix: String,
    /// Batch name used to build the output file name
    pub batch: String,
    /// Optional layout token (third segment)
    pub kind: Option<String>,
}

impl TaskFile {
    /// Split a file name into its segments.
    ///
    /// A name without separators is its own batch name.
    pub fn from_file_name(file_name: &str) -> Self {
        let stem = strip_extension(file_name);
        let mut segments = stem.split(SEGMENT_SEPARATOR);

        let prefix = segments.next().unwrap_or_default().to_string();
        let batch = segments
            .next()
            .map(str::to_string)
            .unwrap_or_else(|| stem.to_string());
        let kind = segments
            .next()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            file_name: file_name.to_string(),
            prefix,
            batch,
            kind,
        }
    }

    /// Name of the merged output file
    pub fn output_name(&self) -> String {
        format!("{}{}{}.csv", OUTPUT_PREFIX, SEGMENT_SEPARATOR, self.batch)
    }

    /// Name of the output file for a single preset
    pub fn preset_output_name(&self, preset: &str) -> String {
        format!(
            "{}{sep}{}{sep}{}.csv",
            OUTPUT_PREFIX,
            self.batch,
            preset,
            sep = SEGMENT_SEPARATOR
        )
    }
}

/// Decode raw task bytes from the legacy 8-bit charset.
///
/// Malformed sequences become U+FFFD; the decoder never fails.
pub fn decode(raw: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, had_errors) = encoding.decode(raw);
    if had_errors {
        tracing::warn!(encoding = encoding.name(), "Task file contained undecodable bytes");
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_with_all_segments() {
        let task = TaskFile::from_file_name("order][Plumbers Moscow][labeled.csv");
        assert_eq!(task.prefix, "order");
        assert_eq!(task.batch, "Plumbers Moscow");
        assert_eq!(task.kind.as_deref(), Some("labeled"));
        assert_eq!(task.output_name(), "cites web done][Plumbers Moscow.csv");
        assert_eq!(
            task.preset_output_name("Google Maps"),
            "cites web done][Plumbers Moscow][Google Maps.csv"
        );
    }

    #[test]
    fn test_name_without_separator() {
        let task = TaskFile::from_file_name("dentists.txt");
        assert_eq!(task.prefix, "dentists");
        assert_eq!(task.batch, "dentists");
        assert_eq!(task.kind, None);
    }

    #[test]
    fn test_decode_windows_1251() {
        // "окна" in cp1251
        let raw = [0xEE, 0xEA, 0xED, 0xE0];
        assert_eq!(decode(&raw, encoding_rs::WINDOWS_1251), "окна");
    }
}
