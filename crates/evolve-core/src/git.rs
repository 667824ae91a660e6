use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::debug;

use crate::window::TimeWindow;
use crate::{CommitRecord, ErrorClass, FileChange, normalize_path};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("repository unavailable at {path}: {reason}")]
    RepositoryUnavailable { path: String, reason: String },
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("history walk failed: {0}")]
    Walk(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GitError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::RepositoryUnavailable { .. } | Self::ReferenceNotFound(_) => ErrorClass::Input,
            Self::CommandFailed { .. } | Self::Walk(_) | Self::Io(_) => ErrorClass::Internal,
        }
    }
}

pub struct GitContext {
    repo: gix::Repository,
    root: PathBuf,
}

impl GitContext {
    pub fn open(workspace: &Path) -> Result<Self, GitError> {
        let repo = gix::discover(workspace).map_err(|err| GitError::RepositoryUnavailable {
            path: workspace.display().to_string(),
            reason: err.to_string(),
        })?;

        let Some(root) = repo.workdir().map(Path::to_path_buf) else {
            return Err(GitError::RepositoryUnavailable {
                path: workspace.display().to_string(),
                reason: "bare repositories have no working tree".to_owned(),
            });
        };

        Ok(Self { repo, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn head_commit_hash(&self) -> Option<String> {
        let head_id = self.repo.head_id().ok()?.detach();
        Some(head_id.to_string().to_ascii_lowercase())
    }

    pub fn history(&self, window: TimeWindow) -> CommitHistory<'_> {
        CommitHistory {
            context: self,
            window,
        }
    }

    pub fn collect_history(&self, window: TimeWindow) -> Result<Vec<CommitRecord>, GitError> {
        self.history(window).iter()?.collect()
    }

    /// Per-file line statistics for one commit, diffed against its parent (or
    /// the empty tree for a root commit). Merge commits report no files; their
    /// changes are counted on the commits being merged.
    pub fn file_changes(&self, commit_hash: &str) -> Result<Vec<FileChange>, GitError> {
        let stdout = self.run_git(&[
            "diff-tree",
            "--numstat",
            "--no-commit-id",
            "--no-renames",
            "-r",
            "--root",
            "-z",
            commit_hash,
        ])?;

        Ok(parse_numstat(&stdout))
    }

    pub fn tracked_files(&self) -> Result<Vec<String>, GitError> {
        if self.head_commit_hash().is_none() {
            return Ok(Vec::new());
        }

        let stdout = self.run_git(&["ls-files", "-z"])?;
        let mut files = split_nul(&stdout);
        files.sort();
        Ok(files)
    }

    pub fn resolve_commit(&self, reference: &str) -> Result<String, GitError> {
        let revspec = format!("{reference}^{{commit}}");
        let output = git_cmd()
            .arg("-C")
            .arg(&self.root)
            .args(["rev-parse", "--verify", "--quiet", revspec.as_str()])
            .output()?;
        if !output.status.success() {
            return Err(GitError::ReferenceNotFound(reference.to_owned()));
        }

        let hash = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        if hash.is_empty() {
            return Err(GitError::ReferenceNotFound(reference.to_owned()));
        }
        Ok(hash.to_ascii_lowercase())
    }

    pub fn tree_hash(&self, reference: &str) -> Result<String, GitError> {
        let commit = self.resolve_commit(reference)?;
        let revspec = format!("{commit}^{{tree}}");
        Ok(self.run_git(&["rev-parse", revspec.as_str()])?.trim().to_owned())
    }

    /// Short branch name, or `None` on a detached or unborn HEAD.
    pub fn current_branch(&self) -> Option<String> {
        let branch = self
            .run_git(&["rev-parse", "--abbrev-ref", "HEAD"])
            .ok()?
            .trim()
            .to_owned();
        (!branch.is_empty() && branch != "HEAD").then_some(branch)
    }

    pub fn dirty_paths(&self) -> Result<Vec<String>, GitError> {
        let stdout = self.run_git(&["status", "--porcelain", "--untracked-files=no"])?;
        Ok(stdout
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| normalize_path(&line[3..]))
            .collect())
    }

    pub fn is_dirty(&self) -> Result<bool, GitError> {
        Ok(!self.dirty_paths()?.is_empty())
    }

    pub fn tag_exists(&self, name: &str) -> Result<bool, GitError> {
        let reference = format!("refs/tags/{name}");
        let status = git_cmd()
            .arg("-C")
            .arg(&self.root)
            .args(["rev-parse", "--verify", "--quiet", reference.as_str()])
            .output()?
            .status;
        Ok(status.success())
    }

    pub fn create_annotated_tag(
        &self,
        name: &str,
        message: &str,
        commit: &str,
    ) -> Result<(), GitError> {
        self.run_git(&["tag", "-a", name, "-m", message, commit])?;
        debug!(tag = %name, commit = %commit, "created annotated tag");
        Ok(())
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.run_git(&["tag", "-d", name])?;
        debug!(tag = %name, "deleted tag");
        Ok(())
    }

    pub fn reset_hard(&self, commit: &str) -> Result<(), GitError> {
        self.run_git(&["reset", "--hard", commit])?;
        Ok(())
    }

    /// Writes a commit object for `tree` with a single `parent` and returns its
    /// hash. HEAD, the index and the working tree are left alone.
    pub fn commit_tree(
        &self,
        tree: &str,
        parent: &str,
        message: &str,
    ) -> Result<String, GitError> {
        let hash = self.run_git(&["commit-tree", tree, "-p", parent, "-m", message])?;
        let hash = hash.trim().to_ascii_lowercase();
        if hash.is_empty() {
            return Err(GitError::CommandFailed {
                command: "commit-tree".to_owned(),
                stderr: "no commit hash returned".to_owned(),
            });
        }
        Ok(hash)
    }

    pub fn changed_paths(&self, from: &str, to: &str) -> Result<Vec<String>, GitError> {
        let stdout = self.run_git(&["diff", "--name-only", "--no-renames", "-z", from, to])?;
        let mut paths = split_nul(&stdout);
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    /// File content at `reference`, or `None` when the path does not exist there.
    pub fn file_at(&self, reference: &str, path: &str) -> Result<Option<String>, GitError> {
        let revspec = format!("{reference}:{path}");
        let exists = git_cmd()
            .arg("-C")
            .arg(&self.root)
            .args(["cat-file", "-e", revspec.as_str()])
            .output()?
            .status
            .success();
        if !exists {
            return Ok(None);
        }

        self.run_git(&["cat-file", "blob", revspec.as_str()]).map(Some)
    }

    fn head_walk(&self) -> Result<Option<gix::revision::Walk<'_>>, GitError> {
        let head = self
            .repo
            .head()
            .map_err(|err| GitError::Walk(err.to_string()))?;
        if head.is_unborn() {
            return Ok(None);
        }

        let head_id = self
            .repo
            .head_id()
            .map_err(|err| GitError::Walk(err.to_string()))?
            .detach();

        let walk = self
            .repo
            .rev_walk([head_id])
            .sorting(gix::revision::walk::Sorting::ByCommitTime(
                gix::traverse::commit::simple::CommitTimeOrder::NewestFirst,
            ))
            .all()
            .map_err(|err| GitError::Walk(err.to_string()))?;
        Ok(Some(walk))
    }

    fn commit_record(&self, id: gix::ObjectId) -> Result<CommitRecord, GitError> {
        let commit = self
            .repo
            .find_commit(id)
            .map_err(|err| GitError::Walk(err.to_string()))?;

        let (author, author_email) = commit
            .author()
            .map(|signature| {
                (
                    decode_text(signature.name.as_ref()),
                    decode_text(signature.email.as_ref()),
                )
            })
            .unwrap_or_default();
        let timestamp = commit.time().map(|time| time.seconds).unwrap_or(0);
        let subject = first_line(commit.message_raw_sloppy().as_ref());
        let hash = id.to_string().to_ascii_lowercase();
        let files = self.file_changes(&hash)?;

        Ok(CommitRecord {
            hash,
            author,
            author_email,
            timestamp,
            subject,
            files,
        })
    }

    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        let output = git_cmd().arg("-C").arg(&self.root).args(args).output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A commit window over one repository. Every call to [`CommitHistory::iter`]
/// starts a fresh walk from HEAD, so the sequence can be consumed repeatedly.
pub struct CommitHistory<'repo> {
    context: &'repo GitContext,
    window: TimeWindow,
}

impl<'repo> CommitHistory<'repo> {
    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    pub fn iter(&self) -> Result<CommitIter<'repo>, GitError> {
        Ok(CommitIter {
            context: self.context,
            walk: self.context.head_walk()?,
            window: self.window.clone(),
        })
    }
}

pub struct CommitIter<'repo> {
    context: &'repo GitContext,
    walk: Option<gix::revision::Walk<'repo>>,
    window: TimeWindow,
}

impl Iterator for CommitIter<'_> {
    type Item = Result<CommitRecord, GitError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let walk = self.walk.as_mut()?;
            let info = match walk.next()? {
                Ok(info) => info,
                Err(err) => {
                    self.walk = None;
                    return Some(Err(GitError::Walk(err.to_string())));
                }
            };

            let record = match self.context.commit_record(info.id) {
                Ok(record) => record,
                Err(err) => {
                    self.walk = None;
                    return Some(Err(err));
                }
            };

            // Newest-first order: the first commit older than the window ends it.
            if self.window.is_before_start(record.timestamp) {
                self.walk = None;
                return None;
            }
            if self.window.is_after_end(record.timestamp) {
                continue;
            }

            return Some(Ok(record));
        }
    }
}

fn git_cmd() -> Command {
    let mut cmd = Command::new("git");
    cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");
    cmd
}

fn parse_numstat(stdout: &str) -> Vec<FileChange> {
    let mut files = Vec::new();
    for entry in stdout.split('\0') {
        let entry = entry.trim_matches('\n');
        if entry.is_empty() {
            continue;
        }

        let mut parts = entry.splitn(3, '\t');
        let added = parts.next().unwrap_or_default().trim();
        let removed = parts.next().unwrap_or_default().trim();
        let path = normalize_path(parts.next().unwrap_or_default());
        if path.is_empty() {
            continue;
        }

        let binary = added == "-" || removed == "-";
        files.push(FileChange {
            path,
            lines_added: added.parse().unwrap_or(0),
            lines_removed: removed.parse().unwrap_or(0),
            binary,
        });
    }
    files
}

fn split_nul(stdout: &str) -> Vec<String> {
    stdout
        .split('\0')
        .map(normalize_path)
        .filter(|path| !path.is_empty())
        .collect()
}

fn decode_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}

fn first_line(bytes: &[u8]) -> String {
    let line = bytes
        .split(|byte| *byte == b'\n')
        .next()
        .unwrap_or_default();
    decode_text(line)
}
