use evolve_config::PatternsConfig;
use serde::{Deserialize, Serialize};

/// A predicate over a commit subject line. Implementations must never fail;
/// a subject they cannot make sense of simply does not match.
pub trait SubjectClassifier: Send + Sync {
    fn matches(&self, subject: &str) -> bool;
}

/// Case-insensitive substring matching against a fixed keyword list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|keyword| keyword.as_ref().trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

impl SubjectClassifier for KeywordClassifier {
    fn matches(&self, subject: &str) -> bool {
        if self.keywords.is_empty() {
            return false;
        }

        let subject = subject.to_lowercase();
        self.keywords
            .iter()
            .any(|keyword| subject.contains(keyword.as_str()))
    }
}

impl<F> SubjectClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn matches(&self, subject: &str) -> bool {
        self(subject)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PainKind {
    Revert,
    Bugfix,
    Hotfix,
}

impl PainKind {
    pub const ALL: [PainKind; 3] = [Self::Revert, Self::Bugfix, Self::Hotfix];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Revert => "revert",
            Self::Bugfix => "bugfix",
            Self::Hotfix => "hotfix",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Classification {
    pub revert: bool,
    pub bugfix: bool,
    pub hotfix: bool,
}

impl Classification {
    pub fn is_classified(self) -> bool {
        self.revert || self.bugfix || self.hotfix
    }

    pub fn has(self, kind: PainKind) -> bool {
        match kind {
            PainKind::Revert => self.revert,
            PainKind::Bugfix => self.bugfix,
            PainKind::Hotfix => self.hotfix,
        }
    }

    pub fn weight(self) -> u64 {
        u64::from(self.revert) + u64::from(self.bugfix) + u64::from(self.hotfix)
    }
}

/// The three independent pain predicates. A subject may match any subset.
pub struct PainClassifiers {
    revert: Box<dyn SubjectClassifier>,
    bugfix: Box<dyn SubjectClassifier>,
    hotfix: Box<dyn SubjectClassifier>,
}

impl PainClassifiers {
    pub fn new(
        revert: Box<dyn SubjectClassifier>,
        bugfix: Box<dyn SubjectClassifier>,
        hotfix: Box<dyn SubjectClassifier>,
    ) -> Self {
        Self {
            revert,
            bugfix,
            hotfix,
        }
    }

    pub fn from_patterns(patterns: &PatternsConfig) -> Self {
        Self::new(
            Box::new(KeywordClassifier::new(&patterns.revert)),
            Box::new(KeywordClassifier::new(&patterns.bugfix)),
            Box::new(KeywordClassifier::new(&patterns.hotfix)),
        )
    }

    pub fn classify(&self, subject: &str) -> Classification {
        Classification {
            revert: self.revert.matches(subject),
            bugfix: self.bugfix.matches(subject),
            hotfix: self.hotfix.matches(subject),
        }
    }
}

impl Default for PainClassifiers {
    fn default() -> Self {
        Self::from_patterns(&PatternsConfig::default())
    }
}
