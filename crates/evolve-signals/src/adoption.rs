use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use evolve_config::TrackedItemsConfig;
use evolve_core::CommitRecord;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAdoption {
    pub path: String,
    pub touches: u64,
    pub authors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAdoption {
    pub command: String,
    pub touches: u64,
    pub authors: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AdoptionReport {
    pub commits_analyzed: usize,
    pub files: Vec<FileAdoption>,
    pub commands: Vec<CommandAdoption>,
    pub most_touched: Vec<CommandAdoption>,
    pub least_touched: Vec<CommandAdoption>,
    pub files_by_change_frequency: Vec<FileAdoption>,
}

impl AdoptionReport {
    pub fn file(&self, path: &str) -> Option<&FileAdoption> {
        self.files.iter().find(|file| file.path == path)
    }

    pub fn command(&self, command: &str) -> Option<&CommandAdoption> {
        self.commands.iter().find(|entry| entry.command == command)
    }
}

#[derive(Debug, Clone)]
pub struct AdoptionOptions<'a> {
    pub tracked: &'a TrackedItemsConfig,
    pub top_n: usize,
    pub bottom_n: usize,
    /// Tracked files present at HEAD; they are reported even when untouched.
    pub known_files: &'a [String],
}

#[derive(Default)]
struct Tally {
    touches: u64,
    authors: BTreeSet<String>,
}

pub fn extract_adoption(commits: &[CommitRecord], options: &AdoptionOptions<'_>) -> AdoptionReport {
    let mut by_file = BTreeMap::<String, Tally>::new();
    let mut by_command = BTreeMap::<String, Tally>::new();

    for path in options.known_files {
        if let Some(command) = options.tracked.item_id(path) {
            by_command.entry(command).or_default();
        }
    }

    for commit in commits {
        let author = author_key(commit);
        let mut commands_in_commit = BTreeSet::new();

        for file in &commit.files {
            let tally = by_file.entry(file.path.clone()).or_default();
            tally.touches += 1;
            tally.authors.insert(author.clone());

            if let Some(command) = options.tracked.item_id(&file.path) {
                commands_in_commit.insert(command);
            }
        }

        // One commit counts once per command, even if it edits several of its files.
        for command in commands_in_commit {
            let tally = by_command.entry(command).or_default();
            tally.touches += 1;
            tally.authors.insert(author.clone());
        }
    }

    let files: Vec<FileAdoption> = by_file
        .into_iter()
        .map(|(path, tally)| FileAdoption {
            path,
            touches: tally.touches,
            authors: tally.authors.len() as u64,
        })
        .collect();

    let commands: Vec<CommandAdoption> = by_command
        .into_iter()
        .map(|(command, tally)| CommandAdoption {
            command,
            touches: tally.touches,
            authors: tally.authors.len() as u64,
        })
        .collect();

    let mut most_touched = commands.clone();
    most_touched.sort_by(|left, right| {
        right
            .touches
            .cmp(&left.touches)
            .then_with(|| left.command.cmp(&right.command))
    });
    most_touched.truncate(options.top_n);

    let mut least_touched = commands.clone();
    least_touched.sort_by(|left, right| {
        left.touches
            .cmp(&right.touches)
            .then_with(|| left.command.cmp(&right.command))
    });
    least_touched.truncate(options.bottom_n);

    let mut files_by_change_frequency = files.clone();
    files_by_change_frequency.sort_by(by_touches_desc);
    files_by_change_frequency.truncate(options.top_n);

    AdoptionReport {
        commits_analyzed: commits.len(),
        files,
        commands,
        most_touched,
        least_touched,
        files_by_change_frequency,
    }
}

fn by_touches_desc(left: &FileAdoption, right: &FileAdoption) -> Ordering {
    right
        .touches
        .cmp(&left.touches)
        .then_with(|| left.path.cmp(&right.path))
}

fn author_key(commit: &CommitRecord) -> String {
    if commit.author.is_empty() {
        commit.author_email.to_ascii_lowercase()
    } else {
        commit.author.clone()
    }
}

#[cfg(test)]
mod tests {
    use evolve_core::FileChange;

    use super::*;

    fn commit(hash: &str, author: &str, paths: &[&str]) -> CommitRecord {
        CommitRecord {
            hash: hash.to_owned(),
            author: author.to_owned(),
            author_email: format!("{author}@example.com"),
            timestamp: 0,
            subject: "docs: update".to_owned(),
            files: paths
                .iter()
                .map(|path| FileChange {
                    path: (*path).to_owned(),
                    lines_added: 1,
                    lines_removed: 0,
                    binary: false,
                })
                .collect(),
        }
    }

    #[test]
    fn ranks_commands_with_name_tiebreak_and_untouched_entries() {
        let tracked = TrackedItemsConfig::default();
        let known = vec![
            "commands/core/pb-zeta.md".to_owned(),
            "commands/core/pb-alpha.md".to_owned(),
            "commands/core/pb-idle.md".to_owned(),
            "README.md".to_owned(),
        ];
        let commits = vec![
            commit("c3", "ann", &["commands/core/pb-zeta.md"]),
            commit("c2", "bob", &["commands/core/pb-alpha.md", "README.md"]),
            commit("c1", "ann", &["commands/core/pb-alpha.md"]),
            commit("c0", "cat", &["commands/core/pb-zeta.md"]),
        ];

        let report = extract_adoption(
            &commits,
            &AdoptionOptions {
                tracked: &tracked,
                top_n: 2,
                bottom_n: 2,
                known_files: &known,
            },
        );

        let most: Vec<_> = report
            .most_touched
            .iter()
            .map(|entry| (entry.command.as_str(), entry.touches))
            .collect();
        assert_eq!(most, vec![("pb-alpha", 2), ("pb-zeta", 2)]);

        let least: Vec<_> = report
            .least_touched
            .iter()
            .map(|entry| (entry.command.as_str(), entry.touches))
            .collect();
        assert_eq!(least, vec![("pb-idle", 0), ("pb-alpha", 2)]);

        assert_eq!(report.command("pb-alpha").map(|entry| entry.authors), Some(2));
        assert_eq!(report.file("README.md").map(|file| file.touches), Some(1));
        assert_eq!(report.files_by_change_frequency.len(), 2);
        assert_eq!(report.commits_analyzed, 4);
    }

    #[test]
    fn one_commit_touching_two_files_of_a_command_counts_once() {
        let tracked = TrackedItemsConfig {
            root: "commands".to_owned(),
            file_prefix: "pb-".to_owned(),
            extension: "md".to_owned(),
        };
        let commits = vec![commit(
            "c0",
            "ann",
            &["commands/a/pb-start.md", "commands/b/pb-start.md"],
        )];

        let report = extract_adoption(
            &commits,
            &AdoptionOptions {
                tracked: &tracked,
                top_n: 5,
                bottom_n: 5,
                known_files: &[],
            },
        );

        assert_eq!(report.command("pb-start").map(|entry| entry.touches), Some(1));
        assert_eq!(report.files.len(), 2);
    }
}
