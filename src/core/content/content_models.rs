use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a queue item (or cache entry) is about.
///
/// Exactly one subject per item, so there is no way to end up with a post
/// and a user both claiming to be "the" subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Post(u64),
    Topic(u64),
    User(u64),
}

impl Subject {
    pub fn kind(&self) -> &'static str {
        match self {
            Subject::Post(_) => "post",
            Subject::Topic(_) => "topic",
            Subject::User(_) => "user",
        }
    }

    pub fn id(&self) -> u64 {
        match self {
            Subject::Post(id) | Subject::Topic(id) | Subject::User(id) => *id,
        }
    }

    /// Rebuild a subject from its stored `(kind, id)` pair.
    pub fn from_parts(kind: &str, id: u64) -> Option<Self> {
        match kind {
            "post" => Some(Subject::Post(id)),
            "topic" => Some(Subject::Topic(id)),
            "user" => Some(Subject::User(id)),
            _ => None,
        }
    }

    /// Posts and topics carry text; users don't.
    pub fn is_content(&self) -> bool {
        !matches!(self, Subject::User(_))
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// A post or topic, reduced to the fields the heuristics need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub subject: Subject,
    pub author_id: u64,
    /// Topic the content lives in. For a topic this is its own id.
    pub thread_id: u64,
    /// Only topics have a title.
    pub title: Option<String>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl ContentItem {
    pub fn post(id: u64, author_id: u64, thread_id: u64, body: impl Into<String>) -> Self {
        Self {
            subject: Subject::Post(id),
            author_id,
            thread_id,
            title: None,
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn topic(
        id: u64,
        author_id: u64,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            subject: Subject::Topic(id),
            author_id,
            thread_id: id,
            title: Some(title.into()),
            body: body.into(),
            created_at: Utc::now(),
        }
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_round_trips_through_parts() {
        for subject in [Subject::Post(3), Subject::Topic(9), Subject::User(12)] {
            assert_eq!(
                Subject::from_parts(subject.kind(), subject.id()),
                Some(subject)
            );
        }
        assert_eq!(Subject::from_parts("thread", 1), None);
    }

    #[test]
    fn subject_display_matches_cache_segment() {
        assert_eq!(Subject::Post(5).to_string(), "post:5");
        assert_eq!(Subject::User(77).to_string(), "user:77");
    }

    #[test]
    fn topic_is_its_own_thread() {
        let topic = ContentItem::topic(4, 1, "Hello", "First body");
        assert_eq!(topic.thread_id, 4);
        assert!(topic.subject.is_content());
        assert!(!Subject::User(1).is_content());
    }
}
