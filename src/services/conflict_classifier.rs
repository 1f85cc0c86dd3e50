//! Tiers conflicting files by how risky they are to resolve.

use std::collections::HashSet;
use std::path::Path;

use crate::domain::models::{
    ClassifiedConflict, ClassifierConfig, ConflictAnalysis, ConflictInfo, ConflictTier,
    ResolutionStrategy,
};

/// Machine-written files that are always safe to auto-resolve.
const SIMPLE_FILES: &[&str] = &[
    ".chorus/tasks.jsonl",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    ".agent/learnings.md",
];

#[derive(Debug, Clone)]
pub struct ConflictClassifier {
    simple_files: HashSet<String>,
}

impl Default for ConflictClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictClassifier {
    pub fn new() -> Self {
        Self {
            simple_files: SIMPLE_FILES.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new().with_simple_files(config.simple_files.iter().cloned())
    }

    pub fn with_simple_files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.simple_files.extend(files);
        self
    }

    fn is_machine_generated(&self, file: &str) -> bool {
        if self.simple_files.contains(file) {
            return true;
        }
        let path = Path::new(file);
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(file);
        if self.simple_files.contains(name) && !name.starts_with('.') {
            return true;
        }
        if file.contains(".generated.") || file.ends_with(".min.js") || file.ends_with(".min.css") {
            return true;
        }
        let extension = path.extension().and_then(|e| e.to_str());
        if matches!(extension, Some("lock" | "lockb")) {
            return true;
        }
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem == "lock" || stem == "lockfile" || stem.ends_with("-lock"))
    }

    /// Machine-generated files are SIMPLE; otherwise overlapping edits or a
    /// semantic flag make a file COMPLEX and anything else is MEDIUM.
    pub fn classify_file(&self, file: &str, info: Option<&ConflictInfo>) -> ConflictTier {
        if self.is_machine_generated(file) {
            return ConflictTier::Simple;
        }
        let Some(info) = info else {
            return ConflictTier::Medium;
        };
        if info.semantic {
            return ConflictTier::Complex;
        }
        match (&info.ours, &info.theirs) {
            (Some(ours), Some(theirs)) if ours.overlaps(theirs) => ConflictTier::Complex,
            _ => ConflictTier::Medium,
        }
    }

    /// Classify every file; the overall tier is the worst one.
    pub fn analyze(&self, files: &[String], infos: &[ConflictInfo]) -> ConflictAnalysis {
        let files: Vec<ClassifiedConflict> = files
            .iter()
            .map(|file| ClassifiedConflict {
                file: file.clone(),
                tier: self.classify_file(file, infos.iter().find(|i| &i.file == file)),
            })
            .collect();
        let tier = files
            .iter()
            .map(|c| c.tier)
            .max()
            .unwrap_or(ConflictTier::Simple);
        ConflictAnalysis { files, tier }
    }

    /// Entry rung of the resolution ladder for a tier.
    pub fn suggested_strategy(tier: ConflictTier, agent_failed: bool) -> ResolutionStrategy {
        match tier {
            ConflictTier::Simple => ResolutionStrategy::Auto,
            ConflictTier::Medium => ResolutionStrategy::Rebase,
            ConflictTier::Complex if agent_failed => ResolutionStrategy::Human,
            ConflictTier::Complex => ResolutionStrategy::Agent,
        }
    }

    pub fn is_auto_resolvable(tier: ConflictTier) -> bool {
        tier == ConflictTier::Simple
    }
}
