use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const EVOLVE_DIR_NAME: &str = ".evolve";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_SINCE: &str = "1 year ago";
pub const DEFAULT_SIGNALS_OUTPUT_DIR: &str = "todos/git-signals";
pub const DEFAULT_TAG_PREFIX: &str = "evolution-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DirtyTreePolicy {
    #[default]
    Block,
    Warn,
}

impl DirtyTreePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Warn => "warn",
        }
    }
}

impl std::str::FromStr for DirtyTreePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "block" => Ok(Self::Block),
            "warn" => Ok(Self::Warn),
            other => Err(format!(
                "invalid dirty policy '{other}', expected one of: block, warn"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EvolveConfig {
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub snapshots: SnapshotsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub diff: DiffConfig,
    #[serde(default)]
    pub validate: ValidateConfig,
    #[serde(default)]
    pub triggers: TriggersConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub since: String,
    pub output_dir: String,
    pub top_n: usize,
    pub bottom_n: usize,
    pub recent_limit: usize,
    pub exclude_patterns: Vec<String>,
    pub include_untouched: bool,
    pub tracked: TrackedItemsConfig,
    pub patterns: PatternsConfig,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            since: DEFAULT_SINCE.to_owned(),
            output_dir: DEFAULT_SIGNALS_OUTPUT_DIR.to_owned(),
            top_n: 20,
            bottom_n: 10,
            recent_limit: 10,
            exclude_patterns: Vec::new(),
            include_untouched: true,
            tracked: TrackedItemsConfig::default(),
            patterns: PatternsConfig::default(),
        }
    }
}

/// Which repository files count as tracked command documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackedItemsConfig {
    pub root: String,
    pub file_prefix: String,
    pub extension: String,
}

impl Default for TrackedItemsConfig {
    fn default() -> Self {
        Self {
            root: "commands".to_owned(),
            file_prefix: "pb-".to_owned(),
            extension: "md".to_owned(),
        }
    }
}

impl TrackedItemsConfig {
    /// Returns the command identifier (file stem) when `path` is a tracked item.
    pub fn item_id(&self, path: &str) -> Option<String> {
        let root = self.root.trim_matches('/');
        let relative = if root.is_empty() {
            path
        } else {
            path.strip_prefix(root)?.strip_prefix('/')?
        };

        let file_name = relative.rsplit('/').next()?;
        let suffix = format!(".{}", self.extension.trim_start_matches('.'));
        let stem = file_name.strip_suffix(suffix.as_str())?;
        if !stem.starts_with(self.file_prefix.as_str()) || stem.len() <= self.file_prefix.len() {
            return None;
        }

        Some(stem.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternsConfig {
    pub revert: Vec<String>,
    pub bugfix: Vec<String>,
    pub hotfix: Vec<String>,
}

impl Default for PatternsConfig {
    fn default() -> Self {
        Self {
            revert: strings(&["revert"]),
            bugfix: strings(&["fix:", "fix(", "bug:", "fix bug", "bugfix"]),
            hotfix: strings(&["hotfix", "urgent", "critical", "p0:", "p1:"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotsConfig {
    pub metadata_path: String,
    pub tag_prefix: String,
    pub dirty_policy: DirtyTreePolicy,
    pub rollback_marker_commit: bool,
    pub keep: usize,
}

impl Default for SnapshotsConfig {
    fn default() -> Self {
        Self {
            metadata_path: ".evolve/snapshots.json".to_owned(),
            tag_prefix: DEFAULT_TAG_PREFIX.to_owned(),
            dirty_policy: DirtyTreePolicy::Block,
            rollback_marker_commit: true,
            keep: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub log_path: String,
    pub changelog_path: String,
    pub timeline_path: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: ".evolve/audit.jsonl".to_owned(),
            changelog_path: "todos/evolution-changelog.md".to_owned(),
            timeline_path: "todos/evolution-timeline.json".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    pub report_path: String,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            report_path: "todos/evolution-diff-report.md".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateConfig {
    pub required_fields: Vec<String>,
    pub categories: Vec<String>,
    pub difficulties: Vec<String>,
    pub model_hints: Vec<String>,
    pub max_related: usize,
    pub max_tags: usize,
    pub review_stale_days: u32,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            required_fields: strings(&[
                "name",
                "title",
                "category",
                "difficulty",
                "model_hint",
                "execution_pattern",
                "related_commands",
                "tags",
                "last_reviewed",
            ]),
            categories: strings(&[
                "core",
                "planning",
                "development",
                "deployment",
                "reviews",
                "repo",
                "people",
                "templates",
                "utilities",
            ]),
            difficulties: strings(&["beginner", "intermediate", "advanced", "expert"]),
            model_hints: strings(&["haiku", "sonnet", "opus"]),
            max_related: 5,
            max_tags: 5,
            review_stale_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggersConfig {
    pub cycle_interval_days: u32,
    pub review_stale_days: u32,
    pub stale_ratio: f64,
}

impl Default for TriggersConfig {
    fn default() -> Self {
        Self {
            cycle_interval_days: 90,
            review_stale_days: 180,
            stale_ratio: 0.25,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

pub fn evolve_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(EVOLVE_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    evolve_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<EvolveConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(EvolveConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: EvolveConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<EvolveConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(evolve_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = EvolveConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

/// Non-fatal problems with an otherwise loadable config.
pub fn validate_config(config: &EvolveConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    let patterns = &config.signals.patterns;
    for (kind, set) in [
        ("revert", &patterns.revert),
        ("bugfix", &patterns.bugfix),
        ("hotfix", &patterns.hotfix),
    ] {
        if set.is_empty() {
            warnings.push(ConfigWarning {
                code: "empty_pattern_set",
                message: format!("signals.patterns.{kind} is empty; no commit will be classified as {kind}"),
            });
        }
    }

    if config.signals.top_n == 0 {
        warnings.push(ConfigWarning {
            code: "empty_ranking",
            message: "signals.top_n is 0; most-touched rankings will be empty".to_owned(),
        });
    }

    if config.signals.tracked.extension.is_empty() {
        warnings.push(ConfigWarning {
            code: "empty_extension",
            message: "signals.tracked.extension is empty; no file will match as a tracked item"
                .to_owned(),
        });
    }

    if config.snapshots.keep == 0 {
        warnings.push(ConfigWarning {
            code: "prune_keeps_nothing",
            message: "snapshots.keep is 0; prune will delete every snapshot".to_owned(),
        });
    }

    if config.snapshots.tag_prefix.is_empty() {
        warnings.push(ConfigWarning {
            code: "empty_tag_prefix",
            message: "snapshots.tag_prefix is empty; snapshot tags share the global tag namespace"
                .to_owned(),
        });
    }

    if !(0.0..=1.0).contains(&config.triggers.stale_ratio) {
        warnings.push(ConfigWarning {
            code: "stale_ratio_out_of_range",
            message: format!(
                "triggers.stale_ratio {} is outside 0.0..=1.0",
                config.triggers.stale_ratio
            ),
        });
    }

    warnings
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| (*value).to_owned()).collect()
}

fn normalize_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .collect()
}

fn normalize_or_default(value: &str, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: EvolveConfig) -> EvolveConfig {
    let signals = &mut config.signals;
    signals.since = normalize_or_default(&signals.since, DEFAULT_SINCE);
    signals.output_dir = normalize_or_default(&signals.output_dir, DEFAULT_SIGNALS_OUTPUT_DIR);
    signals.exclude_patterns = normalize_list(std::mem::take(&mut signals.exclude_patterns));
    signals.tracked.root = signals.tracked.root.trim().trim_matches('/').to_owned();
    signals.tracked.extension = signals
        .tracked
        .extension
        .trim()
        .trim_start_matches('.')
        .to_owned();

    let patterns = &mut signals.patterns;
    patterns.revert = normalize_list(std::mem::take(&mut patterns.revert));
    patterns.bugfix = normalize_list(std::mem::take(&mut patterns.bugfix));
    patterns.hotfix = normalize_list(std::mem::take(&mut patterns.hotfix));

    config.snapshots.tag_prefix = config.snapshots.tag_prefix.trim().to_owned();

    let defaults = ValidateConfig::default();
    let validate = &mut config.validate;
    validate.required_fields = normalize_list(std::mem::take(&mut validate.required_fields));
    for (values, fallback) in [
        (&mut validate.categories, defaults.categories),
        (&mut validate.difficulties, defaults.difficulties),
        (&mut validate.model_hints, defaults.model_hints),
    ] {
        let normalized = normalize_list(std::mem::take(values));
        *values = if normalized.is_empty() {
            fallback
        } else {
            normalized
        };
    }

    config
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ensure_workspace_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();

        let config = ensure_workspace_config(workspace).expect("ensure config");

        assert_eq!(config.signals.since, DEFAULT_SINCE);
        assert_eq!(config.snapshots.dirty_policy, DirtyTreePolicy::Block);
        assert!(config_path(workspace).exists());

        let content = fs::read_to_string(config_path(workspace)).expect("read config file");
        assert!(content.contains("[signals.patterns]"));
        assert!(content.contains("dirty_policy = \"block\""));

        let reloaded = load_workspace_config(workspace).expect("reload");
        assert_eq!(reloaded, config);
    }

    #[test]
    fn missing_file_means_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_workspace_config(temp.path()).expect("load");
        assert_eq!(config, EvolveConfig::default());
        assert!(validate_config(&config).is_empty());
    }

    #[test]
    fn load_workspace_config_merges_partial_sections() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(evolve_dir(workspace)).expect("create .evolve");

        let raw = r#"
[signals]
since = " 3 months ago "
exclude_patterns = ["*.lock", "  "]

[signals.patterns]
hotfix = []

[snapshots]
dirty_policy = "warn"
keep = 0

[validate]
categories = []
"#;
        fs::write(config_path(workspace), raw).expect("write config");

        let config = load_workspace_config(workspace).expect("load config");
        assert_eq!(config.signals.since, "3 months ago");
        assert_eq!(config.signals.top_n, 20);
        assert_eq!(config.signals.exclude_patterns, vec!["*.lock"]);
        assert_eq!(config.signals.patterns.revert, vec!["revert"]);
        assert_eq!(config.snapshots.dirty_policy, DirtyTreePolicy::Warn);
        assert_eq!(config.audit, AuditConfig::default());
        assert_eq!(config.validate.categories, ValidateConfig::default().categories);

        let codes: Vec<_> = validate_config(&config)
            .into_iter()
            .map(|warning| warning.code)
            .collect();
        assert_eq!(codes, vec!["empty_pattern_set", "prune_keeps_nothing"]);
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let temp = tempdir().expect("tempdir");
        let workspace = temp.path();
        fs::create_dir_all(evolve_dir(workspace)).expect("create .evolve");
        fs::write(config_path(workspace), "[signals\n").expect("write config");

        assert!(matches!(
            load_workspace_config(workspace),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn tracked_item_ids_follow_root_prefix_and_extension() {
        let tracked = TrackedItemsConfig::default();
        assert_eq!(
            tracked.item_id("commands/pb-start.md").as_deref(),
            Some("pb-start")
        );
        assert_eq!(
            tracked.item_id("commands/core/pb-guide.md").as_deref(),
            Some("pb-guide")
        );
        assert_eq!(tracked.item_id("commands/README.md"), None);
        assert_eq!(tracked.item_id("docs/pb-start.md"), None);
        assert_eq!(tracked.item_id("commands/pb-start.txt"), None);
        assert_eq!(tracked.item_id("commandsx/pb-start.md"), None);
    }

    #[test]
    fn dirty_policy_parses_from_str() {
        assert_eq!("warn".parse::<DirtyTreePolicy>(), Ok(DirtyTreePolicy::Warn));
        assert!("ask".parse::<DirtyTreePolicy>().is_err());
    }
}
