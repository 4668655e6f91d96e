//! Heuristic spam scoring for post bodies and topic titles.
//!
//! Scores are additive with per-signal caps and clamped to `[0.0, 1.0]`.
//! Every rule set carries a version number; bump it whenever a pattern list
//! changes so previously cached scores stop matching their cache keys.

use crate::core::content::ContentItem;
use crate::core::errors::ModerationError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Version of the built-in pattern lists below.
pub const SPAM_RULE_VERSION: u32 = 1;

/// Commercial spam, gambling, "click here" and miracle offers.
const DEFAULT_SPAM_PHRASES: &[&str] = &[
    r"\b(?:buy|order|shop)\s+(?:cheap|now|online|today)\b",
    r"\b(?:viagra|cialis|levitra|xanax|tramadol)\b",
    r"\bclick\s+here\b",
    r"\b(?:online\s+casino|sports\s+betting|free\s+spins|jackpot)\b",
    r"\b(?:make|earn)\s+(?:\$?\d+\s+)?(?:money|cash)\s+(?:fast|online|from\s+home)\b",
    r"\b(?:risk[-\s]free|act\s+now|limited\s+time\s+offer|100%\s+free)",
    r"\b(?:miracle|guaranteed)\s+(?:cure|results?|weight\s+loss)\b",
    r"\b(?:crypto|bitcoin)\s+(?:investment|opportunity|giveaway)\b",
    r"\bwork\s+from\s+home\b",
];

/// URL shorteners, throwaway TLDs and bare IP literals.
const DEFAULT_SUSPICIOUS_LINKS: &[&str] = &[
    r"\b(?:bit\.ly|tinyurl\.com|goo\.gl|t\.co|ow\.ly|is\.gd|buff\.ly|cutt\.ly)/\S*",
    r"https?://[^\s/]+\.(?:tk|ml|ga|cf|gq|xyz|top|click|loan|work)\b",
    r"https?://\d{1,3}(?:\.\d{1,3}){3}",
];

static LINK_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:https?://|www\.)\S+").expect("Invalid link regex"));

static DEFAULT_RULES: Lazy<Arc<SpamRules>> = Lazy::new(|| {
    Arc::new(
        SpamRules::compile(
            SPAM_RULE_VERSION,
            DEFAULT_SPAM_PHRASES,
            DEFAULT_SUSPICIOUS_LINKS,
        )
        .expect("Invalid built-in spam rules"),
    )
});

/// A compiled, versioned set of spam patterns.
#[derive(Debug)]
pub struct SpamRules {
    version: u32,
    phrases: Vec<Regex>,
    links: Vec<Regex>,
}

impl SpamRules {
    /// Compile pattern lists (matched case-insensitively).
    pub fn compile(
        version: u32,
        phrases: &[&str],
        links: &[&str],
    ) -> Result<Self, ModerationError> {
        Ok(Self {
            version,
            phrases: compile_all(phrases)?,
            links: compile_all(links)?,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    fn phrase_matches(&self, text: &str) -> usize {
        count_matches(&self.phrases, text)
    }

    fn link_matches(&self, text: &str) -> usize {
        count_matches(&self.links, text)
    }
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>, ModerationError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("(?i){}", p)).map_err(|e| {
                ModerationError::ValidationFailure(format!("Invalid spam pattern '{}': {}", p, e))
            })
        })
        .collect()
}

fn count_matches(patterns: &[Regex], text: &str) -> usize {
    patterns.iter().map(|re| re.find_iter(text).count()).sum()
}

/// Score plus the signals that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SpamAnalysis {
    /// 0.0 (clean) to 1.0 (certainly spam).
    pub score: f64,
    pub reasons: Vec<String>,
}

impl SpamAnalysis {
    fn new(raw: f64, reasons: Vec<String>) -> Self {
        Self {
            score: raw.clamp(0.0, 1.0),
            reasons,
        }
    }
}

/// Stateless scorer over free text. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SpamScorer {
    rules: Arc<SpamRules>,
}

impl SpamScorer {
    pub fn new() -> Self {
        Self {
            rules: Arc::clone(&DEFAULT_RULES),
        }
    }

    pub fn with_rules(rules: SpamRules) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    /// Goes into every cached-score key.
    pub fn rule_version(&self) -> u32 {
        self.rules.version()
    }

    pub fn score(&self, text: &str) -> f64 {
        self.analyze(text).score
    }

    pub fn score_title(&self, text: &str) -> f64 {
        self.analyze_title(text).score
    }

    /// Posts are scored on their body; topics take the worse of title and body.
    pub fn score_content(&self, content: &ContentItem) -> f64 {
        let body = self.score(&content.body);
        match &content.title {
            Some(title) => body.max(self.score_title(title)),
            None => body,
        }
    }

    /// Full analysis for post bodies.
    pub fn analyze(&self, text: &str) -> SpamAnalysis {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let length = text.chars().count();

        let phrases = self.rules.phrase_matches(text);
        if phrases > 0 {
            score += (0.3 + 0.2 * phrases as f64).min(0.8);
            reasons.push(format!("Spam phrases: {}", phrases));
        }

        let links = self.rules.link_matches(text);
        if links > 0 {
            score += (0.2 + 0.15 * links as f64).min(0.5);
            reasons.push(format!("Suspicious links: {}", links));
        }

        if length > 20 && caps_ratio(text, length) > 0.5 {
            score += 0.3;
            reasons.push("Excessive capitalization".to_string());
        }

        if punctuation_ratio(text, length) > 0.1 {
            score += 0.2;
            reasons.push("Excessive punctuation".to_string());
        }

        if length < 50 && LINK_TOKEN.is_match(text) {
            score += 0.4;
            reasons.push("Short post with link".to_string());
        }

        SpamAnalysis::new(score, reasons)
    }

    /// Lighter analysis for short strings like topic titles.
    pub fn analyze_title(&self, text: &str) -> SpamAnalysis {
        let mut score = 0.0;
        let mut reasons = Vec::new();
        let length = text.chars().count();

        let phrases = self.rules.phrase_matches(text);
        if phrases > 0 {
            score += 0.4 * phrases as f64;
            reasons.push(format!("Spam phrases: {}", phrases));
        }

        if caps_ratio(text, length) > 0.7 {
            score += 0.3;
            reasons.push("Excessive capitalization".to_string());
        }

        if punctuation_ratio(text, length) > 0.2 {
            score += 0.3;
            reasons.push("Excessive punctuation".to_string());
        }

        SpamAnalysis::new(score, reasons)
    }
}

impl Default for SpamScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// Uppercase letters over total characters.
fn caps_ratio(text: &str, length: usize) -> f64 {
    if length == 0 {
        return 0.0;
    }
    text.chars().filter(|c| c.is_uppercase()).count() as f64 / length as f64
}

/// `!` and `?` over total characters.
fn punctuation_ratio(text: &str, length: usize) -> f64 {
    if length == 0 {
        return 0.0;
    }
    text.chars().filter(|c| *c == '!' || *c == '?').count() as f64 / length as f64
}
