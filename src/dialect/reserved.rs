use std::borrow::Cow;
use std::collections::HashSet;

use lazy_static::lazy_static;

use crate::config::Config;

/// Keywords quoted when `quoteReservedIdentifiers` is on and no override is given.
pub const DEFAULT_RESERVED_KEYWORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "IN", "TABLE", "COLUMN", "KEY", "PRIMARY", "FOREIGN", "INDEX",
    "ALL", "AND", "OR", "AS", "ASC", "DESC", "BEGIN", "BREAK", "BETWEEN", "BY", "ORDER", "IS",
    "DATABASE",
];

lazy_static! {
    static ref DEFAULT_SET: HashSet<String> = DEFAULT_RESERVED_KEYWORDS
        .iter()
        .map(|k| (*k).to_string())
        .collect();
}

/// Backtick-quotes identifiers that collide with a reserved keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedQuoter {
    keywords: HashSet<String>,
}

impl Default for ReservedQuoter {
    fn default() -> Self {
        Self {
            keywords: DEFAULT_SET.clone(),
        }
    }
}

impl ReservedQuoter {
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_ascii_uppercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// Quoter for `config`, or `None` when quoting is disabled.
    #[must_use]
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.quote_reserved_identifiers() {
            return None;
        }
        Some(match config.reserved_keywords() {
            Some(keywords) => Self::new(keywords),
            None => Self::default(),
        })
    }

    #[must_use]
    pub fn is_reserved(&self, identifier: &str) -> bool {
        self.keywords.contains(&identifier.to_ascii_uppercase())
    }

    #[must_use]
    pub fn quote<'a>(&self, identifier: &'a str) -> Cow<'a, str> {
        if self.is_reserved(identifier) {
            Cow::Owned(format!("`{identifier}`"))
        } else {
            Cow::Borrowed(identifier)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::params;

    #[test]
    fn quotes_only_reserved_names() {
        let quoter = ReservedQuoter::default();
        assert_eq!(quoter.quote("order"), "`order`");
        assert_eq!(quoter.quote("Key"), "`Key`");
        assert_eq!(quoter.quote("name"), "name");
    }

    #[test]
    fn config_controls_quoting() {
        let off = Config::new("sqlite", ":memory:");
        assert!(ReservedQuoter::from_config(&off).is_none());

        let custom = off
            .with_param(params::QUOTE_RESERVED_IDENTIFIERS, "true")
            .with_param(params::RESERVED_KEYWORDS, "name, value");
        let quoter = ReservedQuoter::from_config(&custom).unwrap();
        assert_eq!(quoter.quote("value"), "`value`");
        assert_eq!(quoter.quote("order"), "order");
    }
}
