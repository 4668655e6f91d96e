// Cache port for detection results and queue stats.
//
// Keys embed the version of the rules that produced the value:
//
//   {namespace}:{kind}:v{ruleVersion}:{subjectKind}:{subjectId}
//
// Bumping a rule version changes every key for that heuristic, so stale
// entries are simply never read again and age out on their TTL.

use crate::core::content::Subject;
use crate::core::queue::QueueStats;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Version segment for the stats key; the stats shape has no rule set.
pub const STATS_KEY_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    SpamScore,
    DuplicateFlag,
    QueueStats,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::SpamScore => "spam",
            CacheKind::DuplicateFlag => "dup",
            CacheKind::QueueStats => "stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: String,
    pub kind: CacheKind,
    pub rule_version: u32,
    pub subject_kind: &'static str,
    pub subject_id: String,
}

impl CacheKey {
    pub fn spam_score(namespace: &str, rule_version: u32, subject: Subject) -> Self {
        Self::for_subject(namespace, CacheKind::SpamScore, rule_version, subject)
    }

    pub fn duplicate_flag(namespace: &str, rule_version: u32, subject: Subject) -> Self {
        Self::for_subject(namespace, CacheKind::DuplicateFlag, rule_version, subject)
    }

    pub fn queue_stats(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind: CacheKind::QueueStats,
            rule_version: STATS_KEY_VERSION,
            subject_kind: "queue",
            subject_id: "all".to_string(),
        }
    }

    fn for_subject(namespace: &str, kind: CacheKind, rule_version: u32, subject: Subject) -> Self {
        Self {
            namespace: namespace.to_string(),
            kind,
            rule_version,
            subject_kind: subject.kind(),
            subject_id: subject.id().to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:v{}:{}:{}",
            self.namespace,
            self.kind.as_str(),
            self.rule_version,
            self.subject_kind,
            self.subject_id
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Score(f64),
    Flag(bool),
    Stats(QueueStats),
}

/// Best-effort TTL cache. Callers treat every error as a miss.
pub trait DetectionCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Result<Option<CachedValue>, CacheError>;

    fn put(&self, key: &CacheKey, value: CachedValue, ttl: Duration) -> Result<(), CacheError>;

    fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;
}
