//! # Settings
//!
//! Runtime configuration for the scan loop, loaded from a `key: value`
//! settings file (default `./config.txt`). Missing keys fall back to defaults,
//! and a missing file is created from the defaults so operators have a
//! template to edit.
//!
//! ## Example
//!
//! ```text
//! link: http://127.0.0.1:9091/API
//! password:
//! task_folder: ./tasks
//! result_folder: ./results
//! delay: 60
//! selection: canonical:Google
//! preset.Bing:
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::jobs::poller::TerminalPolicy;
use crate::results::merge::ResultSelection;
use crate::scan::ConsumeMode;
use crate::task::query::{QuoteMode, TaskLayout};

/// Keys every settings file is expected to carry. Absent ones are reported.
const REQUIRED_KEYS: &[&str] = &["link", "password", "task_folder", "result_folder", "delay"];

/// A named engine preset on the parsing service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    /// Human name, used in logs and per-preset output names (e.g. "Google Maps")
    pub name: String,
    /// Preset identifier known to the service (e.g. "Order::2568_GoogleMaps")
    pub id: String,
}

impl Preset {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }
}

/// The engines every task is fanned out to unless overridden
pub fn default_presets() -> Vec<Preset> {
    vec![
        Preset::new("Bing", "Order::2568_Bing"),
        Preset::new("Google", "Order::2568_Google"),
        Preset::new("Yandex", "Order::2568_Yandex"),
        Preset::new("Google Maps", "Order::2568_GoogleMaps"),
        Preset::new("Yandex Maps", "Order::2568_YandexMaps"),
    ]
}

/// Validated settings handed to the scan loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Parsing service API endpoint
    pub link: String,
    /// Parsing service password
    pub password: String,
    /// Directory watched for task files
    pub task_folder: PathBuf,
    /// Directory receiving output files
    pub result_folder: PathBuf,
    /// Seconds between scan passes
    pub delay: u64,
    /// Optional newline-delimited exclusion list
    pub exclude_file: Option<PathBuf>,
    /// Seconds between status polls of a running job
    pub poll_interval: u64,
    /// Optional upper bound in seconds on waiting for one job
    pub poll_deadline: Option<u64>,
    /// Which job states end polling
    pub terminal: TerminalPolicy,
    /// Default task file layout (a filename type token overrides it)
    pub layout: TaskLayout,
    /// Which term, if any, is wrapped in quotes when combining
    pub quote: QuoteMode,
    /// How result links are chosen and combined
    pub selection: ResultSelection,
    /// How a task file leaves the watch directory
    pub consume: ConsumeMode,
    /// Charset label of task files
    pub encoding: String,
    /// Configuration profile name on the parsing service
    pub config_preset: String,
    /// Engines each task is dispatched to, in output order
    pub presets: Vec<Preset>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            link: "http://127.0.0.1:9091/API".to_string(),
            password: String::new(),
            task_folder: PathBuf::from("./tasks"),
            result_folder: PathBuf::from("./results"),
            delay: 60,
            exclude_file: None,
            poll_interval: 5,
            poll_deadline: None,
            terminal: TerminalPolicy::default(),
            layout: TaskLayout::default(),
            quote: QuoteMode::default(),
            selection: ResultSelection::default(),
            consume: ConsumeMode::default(),
            encoding: "windows-1251".to_string(),
            config_preset: "default".to_string(),
            presets: default_presets(),
        }
    }
}

/// Outcome of parsing a settings file
#[derive(Debug)]
pub struct ParsedSettings {
    pub settings: Settings,
    /// Required keys that were absent and took their default
    pub missing: Vec<&'static str>,
    /// Keys that were not recognized
    pub unknown: Vec<String>,
}

impl Settings {
    /// Delay between scan passes
    pub fn scan_delay(&self) -> Duration {
        Duration::from_secs(self.delay)
    }

    /// Fixed interval between status polls
    pub fn poll_every(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    /// Optional bound on waiting for a single job
    pub fn poll_limit(&self) -> Option<Duration> {
        self.poll_deadline.map(Duration::from_secs)
    }

    /// Resolve the configured charset label
    pub fn text_encoding(&self) -> Result<&'static Encoding, ConfigError> {
        Encoding::for_label(self.encoding.trim().as_bytes())
            .ok_or_else(|| ConfigError::UnknownEncoding(self.encoding.clone()))
    }

    /// Parse `key: value` lines.
    ///
    /// Only the first `:` separates key from value, so URLs with ports survive.
    /// Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<ParsedSettings, ConfigError> {
        let mut settings = Settings::default();
        let mut seen = HashSet::new();
        let mut unknown = Vec::new();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                unknown.push(line.to_string());
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            let line_no = index + 1;
            let invalid = |reason: String| ConfigError::InvalidValue {
                line: line_no,
                key: key.to_string(),
                value: value.to_string(),
                reason,
            };

            match key {
                "link" => settings.link = value.to_string(),
                "password" => settings.password = value.to_string(),
                "task_folder" => settings.task_folder = PathBuf::from(value),
                "result_folder" => settings.result_folder = PathBuf::from(value),
                "delay" => settings.delay = parse_secs(value).map_err(invalid)?,
                "exclude_file" => {
                    settings.exclude_file = (!value.is_empty()).then(|| PathBuf::from(value))
                }
                "poll_interval" => settings.poll_interval = parse_secs(value).map_err(invalid)?,
                "poll_deadline" => {
                    settings.poll_deadline = if value.is_empty() {
                        None
                    } else {
                        Some(parse_secs(value).map_err(invalid)?)
                    }
                }
                "terminal" => settings.terminal = value.parse().map_err(invalid)?,
                "layout" => settings.layout = value.parse().map_err(invalid)?,
                "quote" => settings.quote = value.parse().map_err(invalid)?,
                "selection" => settings.selection = value.parse().map_err(invalid)?,
                "consume" => settings.consume = value.parse().map_err(invalid)?,
                "encoding" => {
                    if Encoding::for_label(value.as_bytes()).is_none() {
                        return Err(ConfigError::UnknownEncoding(value.to_string()));
                    }
                    settings.encoding = value.to_string();
                }
                "config_preset" => settings.config_preset = value.to_string(),
                _ => match key.strip_prefix("preset.") {
                    Some(name) if !name.trim().is_empty() => {
                        set_preset(&mut settings.presets, name.trim(), value)
                    }
                    _ => unknown.push(key.to_string()),
                },
            }

            seen.insert(key.to_string());
        }

        let missing = REQUIRED_KEYS
            .iter()
            .copied()
            .filter(|key| !seen.contains(*key))
            .collect();

        Ok(ParsedSettings {
            settings,
            missing,
            unknown,
        })
    }

    /// Render as a settings file that [`Settings::parse`] reads back
    pub fn to_file_text(&self) -> String {
        let mut lines = vec![
            format!("link: {}", self.link),
            format!("password: {}", self.password),
            format!("task_folder: {}", self.task_folder.display()),
            format!("result_folder: {}", self.result_folder.display()),
            format!("delay: {}", self.delay),
            format!("poll_interval: {}", self.poll_interval),
            format!("terminal: {}", self.terminal),
            format!("layout: {}", self.layout),
            format!("quote: {}", self.quote),
            format!("selection: {}", self.selection),
            format!("consume: {}", self.consume),
            format!("encoding: {}", self.encoding),
            format!("config_preset: {}", self.config_preset),
        ];
        if let Some(path) = &self.exclude_file {
            lines.push(format!("exclude_file: {}", path.display()));
        }
        if let Some(secs) = self.poll_deadline {
            lines.push(format!("poll_deadline: {}", secs));
        }
        for preset in &self.presets {
            lines.push(format!("preset.{}: {}", preset.name, preset.id));
        }
        lines.join("\n")
    }

    /// Load settings from `path`, writing a default file first if none exists
    pub async fn load_or_create(path: &Path) -> Result<Settings, ConfigError> {
        if tokio::fs::metadata(path).await.is_err() {
            tracing::warn!(path = %path.display(), "Settings file not found, creating defaults");
            let settings = Settings::default();
            tokio::fs::write(path, settings.to_file_text()).await?;
            tracing::info!(path = %path.display(), "Default settings file created");
            return Ok(settings);
        }

        let text = tokio::fs::read_to_string(path).await?;
        let parsed = Settings::parse(&text)?;
        for key in &parsed.missing {
            tracing::warn!(key = %key, "Setting missing, using default");
        }
        for key in &parsed.unknown {
            tracing::warn!(key = %key, "Ignoring unknown setting");
        }
        Ok(parsed.settings)
    }

    /// JSON preview for startup logs, with the password masked
    pub fn redacted_preview(&self) -> String {
        let mut shown = self.clone();
        if !shown.password.is_empty() {
            shown.password = "***".to_string();
        }
        serde_json::to_string(&shown).unwrap_or_default()
    }
}

fn parse_secs(value: &str) -> Result<u64, String> {
    value
        .parse::<u64>()
        .map_err(|e| format!("expected whole seconds: {}", e))
}

/// Override a preset by name, append a new one, or remove it on empty id
fn set_preset(presets: &mut Vec<Preset>, name: &str, id: &str) {
    if id.is_empty() {
        presets.retain(|p| p.name != name);
        return;
    }
    match presets.iter_mut().find(|p| p.name == name) {
        Some(existing) => existing.id = id.to_string(),
        None => presets.push(Preset::new(name, id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_keeps_colons_in_values() {
        let parsed = Settings::parse("link: http://10.0.0.2:9091/API\r\ndelay: 30\r\n").unwrap();
        assert_eq!(parsed.settings.link, "http://10.0.0.2:9091/API");
        assert_eq!(parsed.settings.delay, 30);
        assert_eq!(
            parsed.missing,
            vec!["password", "task_folder", "result_folder"]
        );
    }

    #[test]
    fn test_parse_enums_and_presets() {
        let text = "selection: canonical:Google\n\
                    terminal: completed-only\n\
                    layout: labeled\n\
                    preset.Bing:\n\
                    preset.DuckDuckGo: Order::2568_DDG\n\
                    preset.Google: Order::9_Google\n";
        let settings = Settings::parse(text).unwrap().settings;

        assert_eq!(
            settings.selection,
            ResultSelection::Canonical("Google".to_string())
        );
        assert_eq!(settings.terminal, TerminalPolicy::CompletedOnly);
        assert_eq!(settings.layout, TaskLayout::Labeled);

        let names: Vec<&str> = settings.presets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Google", "Yandex", "Google Maps", "Yandex Maps", "DuckDuckGo"]
        );
        assert_eq!(settings.presets[0].id, "Order::9_Google");
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let err = Settings::parse("delay: soon").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { line: 1, .. }));

        let err = Settings::parse("encoding: klingon").unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEncoding(_)));
    }

    #[test]
    fn test_unknown_keys_are_collected() {
        let parsed = Settings::parse("colour: blue\nnonsense\n").unwrap();
        assert_eq!(parsed.unknown, vec!["colour", "nonsense"]);
    }

    #[test]
    fn test_file_text_reads_back() {
        let mut settings = Settings::default();
        settings.poll_deadline = Some(600);
        settings.exclude_file = Some(PathBuf::from("./exclude.txt"));

        let parsed = Settings::parse(&settings.to_file_text()).unwrap();
        assert!(parsed.missing.is_empty());
        assert!(parsed.unknown.is_empty());
        assert_eq!(parsed.settings.poll_deadline, Some(600));
        assert_eq!(parsed.settings.presets, default_presets());
        assert_eq!(parsed.settings.text_encoding().unwrap(), encoding_rs::WINDOWS_1251);
    }

    #[test]
    fn test_redacted_preview_hides_password() {
        let mut settings = Settings::default();
        settings.password = "hunter2".to_string();
        let preview = settings.redacted_preview();
        assert!(!preview.contains("hunter2"));
        assert!(preview.contains("***"));
    }

    #[tokio::test]
    async fn test_load_or_create_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.txt");

        let settings = Settings::load_or_create(&path).await.unwrap();
        assert_eq!(settings.delay, 60);
        assert!(path.exists());

        let reloaded = Settings::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded.link, settings.link);
    }
}
