//! Article code format
//!
//! An article is `{prefix}{separator}{sequence}` where the prefix is the
//! concatenated category code path and the sequence a zero-padded number,
//! e.g. `BEKP-0001`. Stored articles may omit the separator (`KP0001`).

use crate::domain::errors::{ReconciliationError, ReconciliationResult};
use regex::Regex;

#[derive(Debug, Clone)]
pub struct ArticleFormat {
    separator: String,
    sequence_width: usize,
    /// Matches what follows a known prefix: optional separator, then digits
    tail: Regex,
}

impl ArticleFormat {
    pub fn new(separator: &str, sequence_width: usize) -> ReconciliationResult<Self> {
        if sequence_width == 0 {
            return Err(ReconciliationError::validation(
                "article sequence width must be greater than 0",
            ));
        }
        if separator.chars().any(|c| c.is_ascii_digit()) {
            return Err(ReconciliationError::validation(
                "article separator must not contain digits",
            ));
        }

        let separator_group = if separator.is_empty() {
            String::new()
        } else {
            format!("(?:{})?", regex::escape(separator))
        };
        let tail = Regex::new(&format!(r"^{separator_group}(?P<seq>\d*)$"))
            .map_err(|e| ReconciliationError::validation(format!("invalid article pattern: {e}")))?;

        Ok(Self {
            separator: separator.to_string(),
            sequence_width,
            tail,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn sequence_width(&self) -> usize {
        self.sequence_width
    }

    /// Whether `article` is `prefix`, optionally followed by the separator
    /// and a digit run. The outer `Option` says whether the article belongs
    /// to the prefix, the inner one carries its sequence.
    ///
    /// Matching against a known prefix keeps codes that end in digits
    /// unambiguous when the separator is empty (`B2` + `0001`).
    pub fn sequence_under(&self, article: &str, prefix: &str) -> Option<Option<u64>> {
        let rest = article.trim().strip_prefix(prefix)?;
        let captures = self.tail.captures(rest)?;
        let digits = captures.name("seq").map_or("", |m| m.as_str());
        if digits.is_empty() {
            Some(None)
        } else {
            Some(digits.parse::<u64>().ok())
        }
    }

    pub fn belongs_to(&self, article: &str, prefix: &str) -> bool {
        self.sequence_under(article, prefix).is_some()
    }

    /// Build an article for `prefix` with the given sequence number
    pub fn synthesize(&self, prefix: &str, sequence: u64) -> String {
        let width = self.sequence_width;
        if prefix.is_empty() {
            format!("{sequence:0width$}")
        } else {
            format!("{prefix}{}{sequence:0width$}", self.separator)
        }
    }

    /// Next unused sequence for `prefix` given every existing article.
    /// Fails once the highest stored sequence is `u64::MAX`.
    pub fn next_sequence<'a, I>(&self, prefix: &str, existing: I) -> ReconciliationResult<u64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let highest = existing
            .into_iter()
            .filter_map(|article| self.sequence_under(article, prefix).flatten())
            .max();

        match highest {
            None => Ok(1),
            Some(max) => max.checked_add(1).ok_or_else(|| {
                ReconciliationError::validation(format!("article sequences for prefix '{prefix}' are exhausted"))
            }),
        }
    }
}

impl Default for ArticleFormat {
    fn default() -> Self {
        // The default separator is a plain ASCII dash, which always escapes
        // into a valid pattern.
        Self::new("-", 4).unwrap_or_else(|_| unreachable!("default article format is valid"))
    }
}
