use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;

use crate::model::series::Tags;

/// A compiled regex that compares, hashes, and prints by its pattern text.
///
/// Needed so `Query` (and the data expressions built from it) can be used
/// as a cache key inside one evaluation.
#[derive(Debug, Clone)]
pub struct ReMatcher {
    pattern: String,
    re: Regex,
}

impl ReMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: pattern.to_string(),
            re: Regex::new(pattern)?,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.re.is_match(value)
    }
}

impl PartialEq for ReMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for ReMatcher {}

impl Hash for ReMatcher {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

/// A tag predicate. A predicate over a tag the series does not carry is
/// simply false, never an error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Query {
    True,
    False,
    Equal { key: String, value: String },
    Re { key: String, matcher: ReMatcher },
    HasKey { key: String },
    And(Box<Query>, Box<Query>),
    Or(Box<Query>, Box<Query>),
    Not(Box<Query>),
}

impl Query {
    pub fn equal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Equal {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn re(key: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Query::Re {
            key: key.into(),
            matcher: ReMatcher::new(pattern)?,
        })
    }

    pub fn has(key: impl Into<String>) -> Self {
        Query::HasKey { key: key.into() }
    }

    pub fn and(self, other: Query) -> Self {
        Query::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Query) -> Self {
        Query::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Query::Not(Box::new(self))
    }

    pub fn matches(&self, tags: &Tags) -> bool {
        match self {
            Query::True => true,
            Query::False => false,
            Query::Equal { key, value } => tags.get(key).is_some_and(|v| v == value),
            Query::Re { key, matcher } => tags.get(key).is_some_and(|v| matcher.is_match(v)),
            Query::HasKey { key } => tags.contains_key(key),
            Query::And(a, b) => a.matches(tags) && b.matches(tags),
            Query::Or(a, b) => a.matches(tags) || b.matches(tags),
            Query::Not(q) => !q.matches(tags),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::True => f.write_str("true"),
            Query::False => f.write_str("false"),
            Query::Equal { key, value } => write!(f, "{key}={value}"),
            Query::Re { key, matcher } => write!(f, "{key}=~/{}/", matcher.pattern()),
            Query::HasKey { key } => write!(f, "has({key})"),
            Query::And(a, b) => write!(f, "({a} and {b})"),
            Query::Or(a, b) => write!(f, "({a} or {b})"),
            Query::Not(q) => write!(f, "not({q})"),
        }
    }
}
