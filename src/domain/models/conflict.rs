//! Merge conflict classification types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity class of a conflicting file. Ordered so that `max` gives the
/// worst tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictTier {
    Simple,
    Medium,
    Complex,
}

impl ConflictTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "SIMPLE",
            Self::Medium => "MEDIUM",
            Self::Complex => "COMPLEX",
        }
    }
}

impl fmt::Display for ConflictTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive range of changed lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: u32,
    pub end: u32,
}

impl LineRange {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub const fn overlaps(&self, other: &Self) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

/// What is known about one conflicting file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictInfo {
    pub file: String,
    #[serde(default)]
    pub ours: Option<LineRange>,
    #[serde(default)]
    pub theirs: Option<LineRange>,
    #[serde(default)]
    pub semantic: bool,
}

impl ConflictInfo {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }

    pub fn with_ranges(mut self, ours: LineRange, theirs: LineRange) -> Self {
        self.ours = Some(ours);
        self.theirs = Some(theirs);
        self
    }

    pub fn with_semantic_conflict(mut self) -> Self {
        self.semantic = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedConflict {
    pub file: String,
    pub tier: ConflictTier,
}

/// Per-file verdicts plus the worst tier across them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictAnalysis {
    pub files: Vec<ClassifiedConflict>,
    pub tier: ConflictTier,
}

/// Rungs of the resolution ladder, cheapest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStrategy {
    Auto,
    Rebase,
    Agent,
    Human,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Rebase => "rebase",
            Self::Agent => "agent",
            Self::Human => "human",
        }
    }

    /// Next rung up, `None` past human.
    pub const fn escalate(self) -> Option<Self> {
        match self {
            Self::Auto => Some(Self::Rebase),
            Self::Rebase => Some(Self::Agent),
            Self::Agent => Some(Self::Human),
            Self::Human => None,
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_ordering_worst_wins() {
        let worst = [ConflictTier::Simple, ConflictTier::Complex, ConflictTier::Medium]
            .into_iter()
            .max();
        assert_eq!(worst, Some(ConflictTier::Complex));
    }

    #[test]
    fn test_range_overlap() {
        assert!(LineRange::new(1, 10).overlaps(&LineRange::new(10, 20)));
        assert!(LineRange::new(5, 6).overlaps(&LineRange::new(1, 30)));
        assert!(!LineRange::new(1, 9).overlaps(&LineRange::new(10, 20)));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&ConflictTier::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(serde_json::to_string(&ResolutionStrategy::Agent).unwrap(), "\"agent\"");
    }
}
