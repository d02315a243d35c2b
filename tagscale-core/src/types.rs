//! Core types for Tagscale

use crate::{Result, StorageError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// A (key, value) pair attached to a metric
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag {
    pub key: String,
    pub value: String,
}

impl Tag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Role a tag plays for its metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagClass {
    /// Identity-defining
    Intrinsic,
    /// Descriptive
    Meta,
    /// Caller-supplied, not identity-defining
    External,
}

impl TagClass {
    pub const ALL: [TagClass; 3] = [TagClass::Intrinsic, TagClass::Meta, TagClass::External];

    /// Name persisted in the `type` column
    pub fn as_str(&self) -> &'static str {
        match self {
            TagClass::Intrinsic => "intrinsic",
            TagClass::Meta => "meta",
            TagClass::External => "external",
        }
    }
}

impl FromStr for TagClass {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "intrinsic" => Ok(TagClass::Intrinsic),
            "meta" => Ok(TagClass::Meta),
            "external" => Ok(TagClass::External),
            other => Err(StorageError::invalid(format!("Unknown tag class: {}", other))),
        }
    }
}

/// A uniquely keyed time series.
///
/// Metrics are only created through [`MetricBuilder`], which guarantees at
/// least one intrinsic tag. The key is derived from the intrinsic tags.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Metric {
    key: String,
    intrinsic_tags: BTreeSet<Tag>,
    meta_tags: BTreeSet<Tag>,
    external_tags: BTreeSet<Tag>,
}

impl Metric {
    /// Start building a metric
    pub fn builder() -> MetricBuilder {
        MetricBuilder::default()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn intrinsic_tags(&self) -> &BTreeSet<Tag> {
        &self.intrinsic_tags
    }

    pub fn meta_tags(&self) -> &BTreeSet<Tag> {
        &self.meta_tags
    }

    pub fn external_tags(&self) -> &BTreeSet<Tag> {
        &self.external_tags
    }

    /// Tags of a single class
    pub fn tags(&self, class: TagClass) -> &BTreeSet<Tag> {
        match class {
            TagClass::Intrinsic => &self.intrinsic_tags,
            TagClass::Meta => &self.meta_tags,
            TagClass::External => &self.external_tags,
        }
    }

    /// Look up the first tag with `key`, searching intrinsic, meta, then external
    pub fn first_tag_value(&self, key: &str) -> Option<&str> {
        TagClass::ALL
            .iter()
            .flat_map(|c| self.tags(*c).iter())
            .find(|t| t.key == key)
            .map(|t| t.value.as_str())
    }

    /// Classes that hold at least one tag, in `TagClass::ALL` order
    pub fn tag_classes(&self) -> impl Iterator<Item = TagClass> + '_ {
        TagClass::ALL
            .into_iter()
            .filter(|c| !self.tags(*c).is_empty())
    }

    /// Canonical key for a set of intrinsic tags.
    ///
    /// `\`, `,` and `=` inside keys and values are backslash-escaped, so two
    /// distinct tag sets never share a key.
    fn canonical_key(intrinsic: &BTreeSet<Tag>) -> String {
        let mut s = String::new();
        for (i, tag) in intrinsic.iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            push_escaped(&mut s, &tag.key);
            s.push('=');
            push_escaped(&mut s, &tag.value);
        }
        s
    }
}

fn push_escaped(out: &mut String, raw: &str) {
    for c in raw.chars() {
        if matches!(c, '\\' | ',' | '=') {
            out.push('\\');
        }
        out.push(c);
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Builder for [`Metric`]
#[derive(Debug, Clone, Default)]
pub struct MetricBuilder {
    intrinsic_tags: BTreeSet<Tag>,
    meta_tags: BTreeSet<Tag>,
    external_tags: BTreeSet<Tag>,
}

impl MetricBuilder {
    pub fn intrinsic_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.intrinsic_tags.insert(Tag::new(key, value));
        self
    }

    pub fn meta_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta_tags.insert(Tag::new(key, value));
        self
    }

    pub fn external_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_tags.insert(Tag::new(key, value));
        self
    }

    /// Add a tag of the given class
    pub fn tag(mut self, class: TagClass, tag: Tag) -> Self {
        self.add(class, tag);
        self
    }

    pub(crate) fn add(&mut self, class: TagClass, tag: Tag) {
        match class {
            TagClass::Intrinsic => self.intrinsic_tags.insert(tag),
            TagClass::Meta => self.meta_tags.insert(tag),
            TagClass::External => self.external_tags.insert(tag),
        };
    }

    pub fn has_intrinsic_tags(&self) -> bool {
        !self.intrinsic_tags.is_empty()
    }

    /// Build the metric; fails without at least one intrinsic tag
    pub fn build(self) -> Result<Metric> {
        let key = Metric::canonical_key(&self.intrinsic_tags);
        self.build_with_key(key)
    }

    /// Build under a key that is already persisted. Rows written by other
    /// writers may use a different key format, so the stored key wins.
    pub(crate) fn build_with_key(self, key: String) -> Result<Metric> {
        if self.intrinsic_tags.is_empty() {
            return Err(StorageError::invalid(
                "a metric needs at least one intrinsic tag",
            ));
        }
        Ok(Metric {
            key,
            intrinsic_tags: self.intrinsic_tags,
            meta_tags: self.meta_tags,
            external_tags: self.external_tags,
        })
    }
}

/// A persisted tag row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagFact {
    pub metric_key: String,
    pub tag: Tag,
    pub class: TagClass,
}

/// A single observation of a metric
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: Arc<Metric>,
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    /// Create a new sample
    pub fn new(metric: Arc<Metric>, time: DateTime<Utc>, value: f64) -> Self {
        Self {
            metric,
            time,
            value,
        }
    }
}

/// Tag matcher operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherKind {
    Equals,
    NotEquals,
    EqualsRegex,
    NotEqualsRegex,
}

impl MatcherKind {
    /// PostgreSQL comparison operator (POSIX regex for the regex kinds)
    pub fn sql_operator(&self) -> &'static str {
        match self {
            MatcherKind::Equals => "=",
            MatcherKind::NotEquals => "!=",
            MatcherKind::EqualsRegex => "~",
            MatcherKind::NotEqualsRegex => "!~",
        }
    }
}

impl FromStr for MatcherKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "EQUALS" | "=" => Ok(MatcherKind::Equals),
            "NOT_EQUALS" | "!=" => Ok(MatcherKind::NotEquals),
            "EQUALS_REGEX" | "=~" => Ok(MatcherKind::EqualsRegex),
            "NOT_EQUALS_REGEX" | "!~" => Ok(MatcherKind::NotEqualsRegex),
            other => Err(StorageError::invalid(format!("Unknown tag matcher type: {}", other))),
        }
    }
}

/// A (key, operator, value) constraint on a metric's tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagMatcher {
    pub key: String,
    pub value: String,
    pub kind: MatcherKind,
}

impl TagMatcher {
    pub fn new(key: impl Into<String>, kind: MatcherKind, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            kind,
        }
    }

    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, MatcherKind::Equals, value)
    }

    pub fn not_equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(key, MatcherKind::NotEquals, value)
    }

    pub fn regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(key, MatcherKind::EqualsRegex, pattern)
    }

    pub fn not_regex(key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::new(key, MatcherKind::NotEqualsRegex, pattern)
    }
}

/// Aggregation functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Aggregation {
    /// Raw points, no bucketing
    None,
    Average,
    Max,
    Min,
}

impl Aggregation {
    /// SQL aggregate for bucketed queries; `None` for raw reads
    pub fn sql_function(&self) -> Option<&'static str> {
        match self {
            Aggregation::None => None,
            Aggregation::Average => Some("avg"),
            Aggregation::Max => Some("max"),
            Aggregation::Min => Some("min"),
        }
    }
}

impl FromStr for Aggregation {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(Aggregation::None),
            "average" | "avg" => Ok(Aggregation::Average),
            "max" => Ok(Aggregation::Max),
            "min" => Ok(Aggregation::Min),
            other => Err(StorageError::invalid(format!("Unknown aggregation: {}", other))),
        }
    }
}

/// A read request for a single metric
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub metric: Metric,
    /// Exclusive lower bound
    pub start: DateTime<Utc>,
    /// Exclusive upper bound
    pub end: DateTime<Utc>,
    /// Bucket width; truncated to whole seconds
    pub step: Duration,
    pub aggregation: Aggregation,
}

impl FetchRequest {
    pub fn new(
        metric: Metric,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: Duration,
        aggregation: Aggregation,
    ) -> Self {
        Self {
            metric,
            start,
            end,
            step,
            aggregation,
        }
    }
}
