use std::path::Path;

use chrono::Utc;
use evolve_config::SignalsConfig;
use evolve_core::{CommitRecord, GitContext, TimeWindow, wildcard_match};
use tracing::{debug, info};

use crate::{
    AdoptionOptions, ChurnOptions, PainClassifiers, PainOptions, ReportMetadata, SignalsError,
    SignalsReport, extract_adoption, extract_churn, extract_pain,
};

/// Reads one commit window and runs the three extractors over it.
pub struct SignalsAnalyzer<'a> {
    context: &'a GitContext,
    config: &'a SignalsConfig,
    classifiers: PainClassifiers,
}

impl<'a> SignalsAnalyzer<'a> {
    pub fn new(context: &'a GitContext, config: &'a SignalsConfig) -> Self {
        Self {
            context,
            config,
            classifiers: PainClassifiers::from_patterns(&config.patterns),
        }
    }

    pub fn with_classifiers(mut self, classifiers: PainClassifiers) -> Self {
        self.classifiers = classifiers;
        self
    }

    pub fn analyze(&self, window: TimeWindow) -> Result<SignalsReport, SignalsError> {
        let history = self.context.history(window);
        let mut commits = Vec::new();
        for commit in history.iter()? {
            commits.push(self.without_excluded(commit?));
        }

        let known_files: Vec<String> = if self.config.include_untouched {
            self.context
                .tracked_files()?
                .into_iter()
                .filter(|path| !self.is_excluded(path))
                .collect()
        } else {
            Vec::new()
        };

        debug!(
            commits = commits.len(),
            known_files = known_files.len(),
            "collected history for signal extraction"
        );

        let adoption = extract_adoption(
            &commits,
            &AdoptionOptions {
                tracked: &self.config.tracked,
                top_n: self.config.top_n,
                bottom_n: self.config.bottom_n,
                known_files: &known_files,
            },
        );
        let churn = extract_churn(
            &commits,
            &ChurnOptions {
                top_n: self.config.top_n,
                known_files: &known_files,
            },
        );
        let pain = extract_pain(
            &commits,
            &self.classifiers,
            &PainOptions {
                top_n: self.config.top_n,
                recent_limit: self.config.recent_limit,
                known_files: &known_files,
            },
        );

        let window = history.window();
        info!(
            window = %window.label,
            commits = commits.len(),
            reverts = pain.summary.total_reverts,
            bug_fixes = pain.summary.total_bug_fixes,
            hotfixes = pain.summary.total_hotfixes,
            "extracted git signals"
        );

        Ok(SignalsReport {
            metadata: ReportMetadata {
                generated_at: Utc::now().to_rfc3339(),
                window: window.label.clone(),
                since: window.since,
                until: window.until,
                commits_analyzed: commits.len(),
                head: self.context.head_commit_hash(),
            },
            adoption,
            churn,
            pain,
        })
    }

    fn without_excluded(&self, mut commit: CommitRecord) -> CommitRecord {
        if !self.config.exclude_patterns.is_empty() {
            commit.files.retain(|file| !self.is_excluded(&file.path));
        }
        commit
    }

    fn is_excluded(&self, path: &str) -> bool {
        let file_name = Path::new(path)
            .file_name()
            .and_then(|value| value.to_str())
            .unwrap_or(path);

        self.config.exclude_patterns.iter().any(|pattern| {
            wildcard_match(pattern, path)
                || (!pattern.contains('/') && wildcard_match(pattern, file_name))
        })
    }
}
