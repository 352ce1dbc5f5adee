//! # Query Builder
//!
//! Turns decoded task text into the list of search queries sent to every
//! engine. Pure: no IO, no randomness.
//!
//! ## Layouts
//!
//! - `positional` - header row, then `index;value` rows
//! - `labeled` - `term;...;label` rows, label in {index, value, exclude}
//! - `flat` - one finished query per line
//!
//! Index and value terms are combined both ways: every `index value` pair
//! first, then every `value index` pair.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a task file's rows are interpreted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskLayout {
    /// Column 0 is an index term, column 1 a value term, first row is a header
    #[default]
    Positional,
    /// Column 2 names the category of the row's term
    Labeled,
    /// Each line is a query as-is
    Flat,
}

impl FromStr for TaskLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positional" => Ok(TaskLayout::Positional),
            "labeled" | "labelled" => Ok(TaskLayout::Labeled),
            "flat" => Ok(TaskLayout::Flat),
            other => Err(format!(
                "unknown layout '{}', expected positional, labeled or flat",
                other
            )),
        }
    }
}

impl fmt::Display for TaskLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskLayout::Positional => "positional",
            TaskLayout::Labeled => "labeled",
            TaskLayout::Flat => "flat",
        })
    }
}

/// Which term gets wrapped in double quotes when pairs are built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteMode {
    #[default]
    None,
    Primary,
    Secondary,
}

impl FromStr for QuoteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(QuoteMode::None),
            "primary" | "index" => Ok(QuoteMode::Primary),
            "secondary" | "value" => Ok(QuoteMode::Secondary),
            other => Err(format!(
                "unknown quote mode '{}', expected none, primary or secondary",
                other
            )),
        }
    }
}

impl fmt::Display for QuoteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            QuoteMode::None => "none",
            QuoteMode::Primary => "primary",
            QuoteMode::Secondary => "secondary",
        })
    }
}

/// Category of a labeled row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Index,
    Value,
    Exclude,
}

impl Label {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "index" => Some(Label::Index),
            "value" => Some(Label::Value),
            "exclude" => Some(Label::Exclude),
            _ => None,
        }
    }
}

/// Terms extracted from a task file, before combination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phrases {
    pub index: Vec<String>,
    pub value: Vec<String>,
    pub exclude: Vec<String>,
}

/// Everything a task file contributes to a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryPlan {
    /// Queries in submission order
    pub queries: Vec<String>,
    /// Terms whose result lines must be dropped (labeled layout only)
    pub exclusions: Vec<String>,
}

/// Split text into non-empty rows of `;`-separated cells.
///
/// Handles CRLF and bare LF. Triple quotes collapse to one.
pub fn split_rows(text: &str) -> Vec<Vec<String>> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.replace("\"\"\"", "\"")
                .split(';')
                .map(str::to_string)
                .collect()
        })
        .collect()
}

/// Bucket rows into phrase lists according to the layout.
///
/// Flat layout has no phrase lists; use [`build_plan`] instead.
pub fn collect_phrases(rows: &[Vec<String>], layout: TaskLayout) -> Phrases {
    let mut phrases = Phrases::default();

    match layout {
        TaskLayout::Positional => {
            for row in rows.iter().skip(1) {
                if let Some(term) = row.first().filter(|t| !t.is_empty()) {
                    phrases.index.push(term.clone());
                }
                if let Some(term) = row.get(1).filter(|t| !t.is_empty()) {
                    phrases.value.push(term.clone());
                }
            }
        }
        TaskLayout::Labeled => {
            for row in rows {
                let Some(label) = row.get(2).and_then(|l| Label::parse(l)) else {
                    continue;
                };
                let term = row
                    .iter()
                    .take(2)
                    .find(|t| !t.is_empty())
                    .cloned();
                let Some(term) = term else {
                    continue;
                };
                match label {
                    Label::Index => phrases.index.push(term),
                    Label::Value => phrases.value.push(term),
                    Label::Exclude => phrases.exclude.push(term),
                }
            }
        }
        TaskLayout::Flat => {}
    }

    phrases
}

/// Cross index and value terms in both directions.
///
/// Yields `2 * index.len() * value.len()` queries; duplicates are kept.
pub fn combine(index: &[String], value: &[String], quote: QuoteMode) -> Vec<String> {
    let wrap = |term: &str, quoted: bool| {
        if quoted {
            format!("\"{}\"", term)
        } else {
            term.to_string()
        }
    };
    let primary_quoted = quote == QuoteMode::Primary;
    let secondary_quoted = quote == QuoteMode::Secondary;

    let forward = index.iter().flat_map(|i| {
        value
            .iter()
            .map(move |v| format!("{} {}", wrap(i, primary_quoted), wrap(v, secondary_quoted)))
    });
    let backward = value.iter().flat_map(|v| {
        index
            .iter()
            .map(move |i| format!("{} {}", wrap(v, secondary_quoted), wrap(i, primary_quoted)))
    });

    forward.chain(backward).collect()
}

/// Build the queries and exclusion terms for decoded task text
pub fn build_plan(text: &str, layout: TaskLayout, quote: QuoteMode) -> QueryPlan {
    if layout == TaskLayout::Flat {
        let queries = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        return QueryPlan {
            queries,
            exclusions: Vec::new(),
        };
    }

    let rows = split_rows(text);
    let phrases = collect_phrases(&rows, layout);
    QueryPlan {
        queries: combine(&phrases.index, &phrases.value, quote),
        exclusions: phrases.exclude,
    }
}
