//! Keyword intent classification for natural-language questions.

use std::sync::LazyLock;

use fathom_types::Intent;
use regex::Regex;

/// Pluggable classifier seam; the retriever only needs `classify`.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Intent;
}

/// Ordered keyword rules; the first rule with a hit wins.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeywordClassifier;

const COUNT_PHRASES: &[&str] = &["how many", "count", "number of"];
const RANK_PHRASES: &[&str] = &[
    "top", "highest", "lowest", "best", "worst", "largest", "smallest", "biggest", "rank",
    "ranked", "ranking",
];
const TIME_PHRASES: &[&str] = &[
    "over time", "trend", "trends", "month", "months", "monthly", "year", "years", "yearly",
    "quarter", "quarterly", "week", "weekly", "daily", "since", "ytd",
];
const AGGREGATE_PHRASES: &[&str] = &["total", "sum", "average", "avg", "mean", "aggregate"];
const JOIN_PHRASES: &[&str] = &[
    "with their", "along with", "together with", "across", "for each", "each customer",
    "per customer", "each account", "per account",
];
const FILTER_PHRASES: &[&str] = &[
    "where", "above", "below", "greater than", "less than", "more than", "over", "under",
    "only", "larger than", "smaller than",
];

/// Lowercase the text and reduce it to single-space separated words, padded
/// with spaces so phrase matching can respect word boundaries.
fn words(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { ' ' })
        .collect();
    let mut out = String::with_capacity(cleaned.len() + 2);
    out.push(' ');
    out.push_str(&cleaned.split_whitespace().collect::<Vec<_>>().join(" "));
    out.push(' ');
    out
}

fn has_phrase(words: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| words.contains(&format!(" {p} ")))
}

/// "last 30 days", "past 6 months", "last week".
fn has_relative_window(words: &str) -> bool {
    let tokens: Vec<&str> = words.split_whitespace().collect();
    tokens.windows(2).any(|w| {
        let anchor = matches!(w[0], "last" | "past" | "previous");
        let unit = |t: &str| {
            matches!(
                t,
                "day" | "days" | "week" | "weeks" | "month" | "months" | "year" | "years"
            )
        };
        anchor && (unit(w[1]) || w[1].chars().all(|c| c.is_ascii_digit()))
    })
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Intent {
        let w = words(text);
        if has_phrase(&w, COUNT_PHRASES) {
            Intent::Count
        } else if has_phrase(&w, RANK_PHRASES) {
            Intent::Rank
        } else if has_phrase(&w, TIME_PHRASES) || has_relative_window(&w) {
            Intent::TimeBased
        } else if has_phrase(&w, AGGREGATE_PHRASES) {
            Intent::Aggregate
        } else if has_phrase(&w, JOIN_PHRASES) {
            Intent::Join
        } else if has_phrase(&w, FILTER_PHRASES) {
            Intent::Filter
        } else {
            Intent::Unknown
        }
    }
}

pub fn classify(text: &str) -> Intent {
    KeywordClassifier.classify(text)
}

static RE_COUNT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bCOUNT\s*\(").ok());
static RE_RANK: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\bORDER\s+BY\b|\bLIMIT\b|\b(?:RANK|DENSE_RANK|ROW_NUMBER)\s*\(").ok()
});
static RE_TIME: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:DATE_TRUNC|DATE_PART|INTERVAL|CURRENT_DATE)\b|\bEXTRACT\s*\(").ok()
});
static RE_AGGREGATE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:SUM|AVG|MIN|MAX)\s*\(|\bGROUP\s+BY\b").ok()
});
static RE_JOIN: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bJOIN\b").ok());
static RE_FILTER: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?i)\bWHERE\b").ok());

/// Whether `sql` uses a construct that answers `intent`. Keywords match as
/// whole words, so identifiers such as `credit_limit` do not count. `UNKNOWN`
/// matches everything.
pub fn sql_matches_intent(sql: &str, intent: Intent) -> bool {
    let re = match intent {
        Intent::Count => &RE_COUNT,
        Intent::Rank => &RE_RANK,
        Intent::TimeBased => &RE_TIME,
        Intent::Aggregate => &RE_AGGREGATE,
        Intent::Join => &RE_JOIN,
        Intent::Filter => &RE_FILTER,
        Intent::Unknown => return true,
    };
    re.as_ref().is_some_and(|r| r.is_match(sql))
}
