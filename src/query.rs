//! Free-text query parsing and matching.
//!
//! A query is a disjunction of OR-groups, each group a conjunction of terms:
//!
//! ```text
//! "hello world" rust OR cargo
//! ```
//!
//! parses to `[["HELLO WORLD" (phrase), "RUST"], ["CARGO"]]`. Plain terms
//! match by case-insensitive containment; quoted phrases must appear bounded
//! by a space or the edge of the text on both sides. Terms of two characters
//! or fewer are ignored, and a query left with no terms matches nothing.
//!
//! Malformed input never errors; it degrades to fewer (or no) terms.

use std::collections::VecDeque;

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::model::Record;

/// Terms at or below this many characters are discarded.
pub const MIN_TERM_LENGTH: usize = 2;

/// Stands in for an extracted phrase while the rest of the query is tokenized.
const PHRASE_MARKER: char = '\u{E000}';

const OR_SEPARATOR: &str = " OR ";

static QUOTED_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""([^"]*)""#).expect("quoted span pattern is valid"));

/// One normalized, uppercased search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchTerm {
    text: String,
    quoted: bool,
}

impl SearchTerm {
    /// A plain containment term.
    #[must_use]
    pub fn plain(text: &str) -> Self {
        Self {
            text: text.to_uppercase(),
            quoted: false,
        }
    }

    /// A whole-phrase term.
    #[must_use]
    pub fn phrase(text: &str) -> Self {
        Self {
            text: text.to_uppercase(),
            quoted: true,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub const fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// Test against text already passed through [`normalize_text`].
    #[must_use]
    pub fn matches(&self, normalized: &str) -> bool {
        if self.quoted {
            contains_bounded(normalized, &self.text)
        } else {
            normalized.contains(self.text.as_str())
        }
    }
}

/// `needle` occurs in `haystack` with a space or the string edge on each side.
fn contains_bounded(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(offset) = haystack[from..].find(needle) {
        let start = from + offset;
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().is_none_or(|c| c == ' ');
        let after_ok = haystack[end..].chars().next().is_none_or(|c| c == ' ');
        if before_ok && after_ok {
            return true;
        }
        // Overlapping occurrences start inside this one.
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    false
}

/// Normalize free text the way queries and candidates are compared.
///
/// NFC, apostrophes removed, `&` and `%` spelled out, everything outside
/// alphanumerics, `#`, `@` and spaces stripped, runs of spaces collapsed.
#[must_use]
pub fn normalize(text: &str) -> String {
    normalize_keeping(text, false)
}

/// [`normalize`] followed by uppercasing, the form candidates are matched in.
#[must_use]
pub fn normalize_text(text: &str) -> String {
    normalize(text).to_uppercase()
}

fn normalize_keeping(text: &str, keep_marker: bool) -> String {
    let mut expanded = String::with_capacity(text.len());
    for c in text.nfc() {
        match c {
            '\'' | '\u{2019}' | '\u{2018}' => {}
            '&' => expanded.push_str(" and "),
            '%' => expanded.push_str(" percent "),
            c if c.is_alphanumeric() || matches!(c, '#' | '@' | ' ') => expanded.push(c),
            c if keep_marker && c == PHRASE_MARKER => expanded.push(c),
            c if c.is_whitespace() => expanded.push(' '),
            _ => {}
        }
    }

    let mut out = String::with_capacity(expanded.len());
    for word in expanded.split(' ').filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

fn long_enough(s: &str) -> bool {
    s.chars().count() > MIN_TERM_LENGTH
}

/// A parsed query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    groups: Vec<Vec<SearchTerm>>,
}

impl Query {
    /// Parse a raw query string. Never fails.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw: String = raw.chars().filter(|&c| c != PHRASE_MARKER).collect();

        let mut phrases = VecDeque::new();
        let marked = QUOTED_SPAN.replace_all(&raw, |caps: &regex::Captures<'_>| {
            let interior = caps.get(1).map_or("", |m| m.as_str()).trim();
            if long_enough(interior) {
                phrases.push_back(interior.to_string());
                format!(" {PHRASE_MARKER} ")
            } else {
                format!(" {interior} ")
            }
        });

        let normalized = normalize_keeping(&marked, true);

        let mut groups = Vec::new();
        for group in normalized.split(OR_SEPARATOR) {
            let mut terms = Vec::new();
            for token in group.split_whitespace() {
                if token.chars().eq(std::iter::once(PHRASE_MARKER)) {
                    let Some(phrase) = phrases.pop_front() else {
                        continue;
                    };
                    let phrase = normalize(&phrase);
                    if long_enough(&phrase) {
                        terms.push(SearchTerm::phrase(&phrase));
                    }
                } else if long_enough(token) {
                    terms.push(SearchTerm::plain(token));
                }
            }
            if !terms.is_empty() {
                groups.push(terms);
            }
        }

        Self { groups }
    }

    /// The OR-groups, in query order.
    #[must_use]
    pub fn groups(&self) -> &[Vec<SearchTerm>] {
        &self.groups
    }

    /// True when nothing usable was parsed; such a query matches nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of terms across all groups.
    #[must_use]
    pub fn term_count(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Whether some group has all of its terms present in `text`.
    #[must_use]
    pub fn matches(&self, text: &str) -> bool {
        if self.groups.is_empty() {
            return false;
        }
        let normalized = normalize_text(text);
        self.groups
            .iter()
            .any(|group| group.iter().all(|term| term.matches(&normalized)))
    }

    /// Keep matching records, preserving their order.
    #[must_use]
    pub fn filter(&self, records: Vec<Record>) -> Vec<Record> {
        if self.is_empty() {
            return Vec::new();
        }
        records
            .into_iter()
            .filter(|record| self.matches(&record.text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(query: &Query) -> Vec<Vec<(String, bool)>> {
        query
            .groups()
            .iter()
            .map(|g| {
                g.iter()
                    .map(|t| (t.text().to_string(), t.is_quoted()))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn phrase_requires_adjacency() {
        let q = Query::parse("\"hello world\"");
        assert!(q.matches("well Hello World, again"));
        assert!(q.matches("hello world"));
        assert!(!q.matches("hello big world"));
        assert!(!q.matches("hello worldwide"));
        assert!(!q.matches("ohello world"));
    }

    #[test]
    fn plain_terms_are_independent() {
        let q = Query::parse("hello world");
        assert!(q.matches("world says hello"));
        assert!(q.matches("helloworld"));
        assert!(!q.matches("hello there"));
    }

    #[test]
    fn or_groups_are_disjunctive() {
        let q = Query::parse("foo OR bar");
        assert!(q.matches("a foo b"));
        assert!(q.matches("a BAR b"));
        assert!(!q.matches("baz qux"));
        assert_eq!(q.groups().len(), 2);
    }

    #[test]
    fn lowercase_or_is_a_term() {
        let q = Query::parse("foo or bar");
        assert_eq!(terms(&q), vec![vec![("FOO".to_string(), false), ("BAR".to_string(), false)]]);
    }

    #[test]
    fn short_tokens_dropped() {
        let q = Query::parse("a an the");
        assert_eq!(terms(&q), vec![vec![("THE".to_string(), false)]]);
        assert!(Query::parse("to be").is_empty());
    }

    #[test]
    fn empty_query_matches_nothing() {
        let q = Query::parse("  ");
        assert!(q.is_empty());
        assert!(!q.matches("anything at all"));
        assert!(Query::parse("\"\"").is_empty());
        assert!(Query::parse("\"ab\"").is_empty());
        assert!(Query::parse("!!! ??").is_empty());
    }

    #[test]
    fn phrases_reinserted_in_order() {
        let q = Query::parse("\"first one\" mid \"second one\" OR \"third one\"");
        assert_eq!(
            terms(&q),
            vec![
                vec![
                    ("FIRST ONE".to_string(), true),
                    ("MID".to_string(), false),
                    ("SECOND ONE".to_string(), true),
                ],
                vec![("THIRD ONE".to_string(), true)],
            ]
        );
    }

    #[test]
    fn phrase_punctuation_normalized() {
        let q = Query::parse("\"don't stop\"");
        assert_eq!(terms(&q), vec![vec![("DONT STOP".to_string(), true)]]);
        assert!(q.matches("I DON'T STOP."));
    }

    #[test]
    fn unclosed_quote_is_stripped() {
        let q = Query::parse("\"dangling words");
        assert_eq!(
            terms(&q),
            vec![vec![("DANGLING".to_string(), false), ("WORDS".to_string(), false)]]
        );
    }

    #[test]
    fn ampersand_and_percent_spelled_out() {
        assert_eq!(normalize("R&D 50%"), "R and D 50 percent");
        let q = Query::parse("percent");
        assert!(q.matches("up 5%"));
        let q = Query::parse("\"rock and roll\"");
        assert!(q.matches("rock&roll"));
    }

    #[test]
    fn hashtags_and_mentions_survive() {
        assert_eq!(normalize("#rust, @ferris!"), "#rust @ferris");
        let q = Query::parse("#rustlang");
        assert!(q.matches("Loving #RustLang today"));
    }

    #[test]
    fn non_latin_text_is_searchable() {
        assert_eq!(normalize("Привет, мир! 東京"), "Привет мир 東京");
        let q = Query::parse("привет");
        assert!(q.matches("ПРИВЕТ всем"));
    }

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize("  a \t  b\n\nc  "), "a b c");
    }

    #[test]
    fn nfc_composes_before_comparison() {
        // "e" + combining acute vs precomposed
        let q = Query::parse("caf\u{0065}\u{0301}");
        assert!(q.matches("a caf\u{00e9} visit"));
    }

    #[test]
    fn marker_in_input_is_ignored() {
        let q = Query::parse("word \u{E000} other");
        assert_eq!(
            terms(&q),
            vec![vec![("WORD".to_string(), false), ("OTHER".to_string(), false)]]
        );
    }

    #[test]
    fn contains_bounded_edges() {
        assert!(contains_bounded("AB CD", "AB"));
        assert!(contains_bounded("AB CD", "CD"));
        assert!(contains_bounded("XAB AB", "AB"));
        assert!(!contains_bounded("XAB ABX", "AB"));
        assert!(!contains_bounded("AB", ""));
    }

    #[test]
    fn phrase_found_at_overlapping_occurrence() {
        assert!(contains_bounded("AHA HA HA", "HA HA"));
        assert!(contains_bounded("AAA AA", "AA"));
        assert!(!contains_bounded("AHA HAH", "HA HA"));
        let q = Query::parse("\"ha ha\"");
        assert!(q.matches("aha ha ha"));
        assert!(!q.matches("aha hah"));
    }

    #[test]
    fn short_quoted_span_kept_as_plain_text() {
        let q = Query::parse("\"5%\" rates");
        assert_eq!(
            terms(&q),
            vec![vec![("PERCENT".to_string(), false), ("RATES".to_string(), false)]]
        );
        assert!(!q.matches("rates went up"));
        assert!(q.matches("rates up 5%"));
    }

    #[test]
    fn filter_preserves_order() {
        let mk = |id: i64, text: &str| Record {
            id,
            id_str: id.to_string(),
            created: crate::model::epoch_utc(),
            updated: crate::model::epoch_utc(),
            favorites: 0,
            retweets: 0,
            ratio: 0.0,
            text: text.to_string(),
            url: String::new(),
            deleted: false,
            media: vec![],
        };
        let records = vec![mk(3, "rust one"), mk(2, "go two"), mk(1, "rust three")];
        let ids: Vec<i64> = Query::parse("rust")
            .filter(records.clone())
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![3, 1]);
        assert!(Query::parse("").filter(records).is_empty());
    }
}
