//! # Domain Label Normalization
//!
//! Engines return hosts under Cyrillic top-level domains in their ASCII
//! (punycode) form, e.g. `xn--e1afmkfd.xn--p1ai`. Operators want the native
//! form `пример.рф`, so the first such host on every line is decoded label by
//! label. Nothing else on the line changes.

use regex::Regex;
use std::borrow::Cow;

/// ASCII-compatible forms of the Cyrillic TLDs we rewrite
pub const CYRILLIC_ACE_TLDS: &[&str] = &[
    "xn--p1ai",     // рф
    "xn--p1acf",    // рус
    "xn--90ais",    // бел
    "xn--j1amh",    // укр
    "xn--d1alf",    // мкд
    "xn--90ae",     // бг
    "xn--90a3ac",   // срб
    "xn--c1avg",    // орг
    "xn--80asehdb", // онлайн
    "xn--80aswg",   // сайт
    "xn--80adxhks", // москва
];

/// ACE label prefix
const ACE_PREFIX: &str = "xn--";

/// Rewrites punycode hosts under Cyrillic TLDs
#[derive(Debug, Clone)]
pub struct DomainNormalizer {
    host: Regex,
}

impl DomainNormalizer {
    pub fn new() -> Result<Self, regex::Error> {
        // A host token ends in one of the TLDs and is followed by a delimiter
        let pattern = format!(
            r#"(?i)([^\s;/:@"',?#]+\.(?:{}))(?:[\s;/:"',?#]|$)"#,
            CYRILLIC_ACE_TLDS.join("|")
        );
        Ok(Self {
            host: Regex::new(&pattern)?,
        })
    }

    /// Decode the first matching host on the line
    pub fn normalize<'a>(&self, line: &'a str) -> Cow<'a, str> {
        let Some(host) = self.host.captures(line).and_then(|c| c.get(1)) else {
            return Cow::Borrowed(line);
        };

        let decoded = decode_host(host.as_str());
        if decoded == host.as_str() {
            return Cow::Borrowed(line);
        }

        Cow::Owned(format!(
            "{}{}{}",
            &line[..host.start()],
            decoded,
            &line[host.end()..]
        ))
    }

    /// Normalize every line in place; returns how many changed
    pub fn normalize_all(&self, lines: &mut [String]) -> usize {
        let mut changed = 0;
        for line in lines.iter_mut() {
            let rewritten = match self.normalize(line) {
                Cow::Owned(rewritten) => rewritten,
                Cow::Borrowed(_) => continue,
            };
            *line = rewritten;
            changed += 1;
        }
        changed
    }
}

/// Decode every `xn--` label of a host; undecodable labels stay as they are
pub fn decode_host(host: &str) -> String {
    host.split('.')
        .map(|label| decode_label(label).unwrap_or_else(|| label.to_string()))
        .collect::<Vec<_>>()
        .join(".")
}

fn decode_label(label: &str) -> Option<String> {
    let prefix = label.get(..ACE_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(ACE_PREFIX) {
        return None;
    }
    let body = label[ACE_PREFIX.len()..].to_ascii_lowercase();
    idna::punycode::decode_to_string(&body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalizer() -> DomainNormalizer {
        DomainNormalizer::new().unwrap()
    }

    #[test]
    fn test_tld_only_ace() {
        let n = normalizer();
        assert_eq!(n.normalize("пример.xn--p1ai;Окна;8 495"), "пример.рф;Окна;8 495");
    }

    #[test]
    fn test_fully_encoded_host_in_url() {
        let n = normalizer();
        assert_eq!(
            n.normalize("https://www.xn--e1afmkfd.xn--p1ai/contacts;Google"),
            "https://www.пример.рф/contacts;Google"
        );
    }

    #[test]
    fn test_first_occurrence_only() {
        let n = normalizer();
        assert_eq!(
            n.normalize("xn--e1afmkfd.xn--p1ai;see xn--e1afmkfd.xn--p1ai"),
            "пример.рф;see xn--e1afmkfd.xn--p1ai"
        );
    }

    #[test]
    fn test_other_lines_untouched() {
        let n = normalizer();
        for line in [
            "okna.ru;Okna",
            "xn--p1ai.com;odd",
            "https://xn--e1afmkfd.com/",
            "",
        ] {
            assert!(matches!(n.normalize(line), Cow::Borrowed(_)), "{}", line);
        }
    }

    #[test]
    fn test_other_cyrillic_tlds() {
        let n = normalizer();
        assert_eq!(n.normalize("магазин.xn--p1acf/"), "магазин.рус/");
        assert_eq!(n.normalize("site.XN--80ASWG"), "site.сайт");
    }

    #[test]
    fn test_decoded_labels_round_trip() {
        let n = normalizer();
        let host = "xn--d1acufc.xn--e1afmkfd.xn--p1ai";
        let decoded = n.normalize(host).into_owned();

        for (ace, native) in host.split('.').zip(decoded.split('.')) {
            let body = ace.strip_prefix("xn--").unwrap();
            assert_eq!(idna::punycode::encode_str(native).unwrap(), body);
        }
    }

    #[test]
    fn test_normalize_all_counts_changes() {
        let n = normalizer();
        let mut lines = vec![
            "a.xn--p1ai;1".to_string(),
            "b.ru;2".to_string(),
            "c.xn--90ais;3".to_string(),
        ];
        assert_eq!(n.normalize_all(&mut lines), 2);
        assert_eq!(lines[2], "c.бел;3");
    }
}
