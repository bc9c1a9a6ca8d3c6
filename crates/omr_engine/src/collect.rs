//! Flattening of dropped files and folders into one list of leaf files.
//!
//! A traversal keeps a pending-count of entries that are not yet resolved:
//! every root starts with one slot, a directory holds its slot until a read
//! comes back empty (or fails), and each child discovered by a read adds a
//! slot of its own before it is visited. The traversal completes exactly when
//! the count reaches zero.
//!
//! All outstanding reads of one traversal are polled from a single
//! [`FuturesUnordered`] owned by that traversal, so the counter is a plain
//! integer and never shared with another traversal.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use omr_core::FileEntry;
use omr_logging::{next_correlation_id, omr_debug, omr_error, omr_info, omr_warn};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("failed to read {subtree}: {message}")]
    Read { subtree: String, message: String },
    #[error("cannot inspect {subtree}: {message}")]
    Inspect { subtree: String, message: String },
}

impl CollectError {
    /// Name or path of the subtree that was abandoned.
    pub fn subtree(&self) -> &str {
        match self {
            CollectError::Read { subtree, .. } | CollectError::Inspect { subtree, .. } => subtree,
        }
    }
}

/// A node handed to the collector: a leaf file, a directory still to be read,
/// or a child that could not be inspected and is reported as a failed subtree.
pub enum Entry {
    File(FileEntry),
    Directory(Box<dyn DirectoryReader>),
    Failed(CollectError),
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Entry::File(file) => f.debug_tuple("File").field(&file.name()).finish(),
            Entry::Directory(dir) => f.debug_tuple("Directory").field(&dir.name()).finish(),
            Entry::Failed(err) => f.debug_tuple("Failed").field(err).finish(),
        }
    }
}

/// Asynchronous, chunked access to the children of one directory.
#[async_trait::async_trait]
pub trait DirectoryReader: Send {
    fn name(&self) -> &str;

    /// Returns the next batch of children. An empty batch means the
    /// directory is exhausted; callers keep reading until they see one.
    async fn read_entries(&mut self) -> Result<Vec<Entry>, CollectError>;
}

#[derive(Debug, Clone)]
pub struct CollectSettings {
    /// Maximum children returned by one filesystem directory read.
    pub read_chunk: usize,
}

impl Default for CollectSettings {
    fn default() -> Self {
        Self { read_chunk: 64 }
    }
}

/// Result of one traversal: every leaf reached, plus the subtrees that failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectOutcome {
    pub files: Vec<FileEntry>,
    pub failures: Vec<CollectError>,
}

impl CollectOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

type ReadFuture = BoxFuture<'static, (Box<dyn DirectoryReader>, Result<Vec<Entry>, CollectError>)>;

fn read_next(mut dir: Box<dyn DirectoryReader>) -> ReadFuture {
    async move {
        let result = dir.read_entries().await;
        (dir, result)
    }
    .boxed()
}

struct Traversal {
    pending: usize,
    reads: FuturesUnordered<ReadFuture>,
    outcome: CollectOutcome,
}

impl Traversal {
    fn new(roots: usize) -> Self {
        Self {
            pending: roots,
            reads: FuturesUnordered::new(),
            outcome: CollectOutcome::default(),
        }
    }

    /// Resolves one counted entry: a file releases its slot, a directory
    /// keeps it until its reads are exhausted.
    fn visit(&mut self, entry: Entry) {
        match entry {
            Entry::File(file) => {
                self.outcome.files.push(file);
                self.release();
            }
            Entry::Directory(dir) => self.reads.push(read_next(dir)),
            Entry::Failed(err) => {
                omr_warn!("abandoning subtree: {}", err);
                self.outcome.failures.push(err);
                self.release();
            }
        }
    }

    fn release(&mut self) {
        debug_assert!(self.pending > 0, "pending-count underflow");
        self.pending -= 1;
    }

    async fn run(mut self) -> CollectOutcome {
        while self.pending > 0 {
            let Some((dir, result)) = self.reads.next().await else {
                omr_error!(
                    "traversal stalled with {} pending entries and no reads in flight",
                    self.pending
                );
                break;
            };
            match result {
                Ok(children) if children.is_empty() => self.release(),
                Ok(children) => {
                    self.pending += children.len();
                    for child in children {
                        self.visit(child);
                    }
                    self.reads.push(read_next(dir));
                }
                Err(err) => self.visit(Entry::Failed(err)),
            }
        }
        self.outcome
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeCollector {
    settings: CollectSettings,
}

impl TreeCollector {
    pub fn new(settings: CollectSettings) -> Self {
        Self { settings }
    }

    /// Walks all roots of one user interaction and resolves once, after every
    /// reachable entry has been collected or its subtree has failed.
    pub async fn collect(&self, roots: Vec<Entry>) -> CollectOutcome {
        let id = next_correlation_id();
        omr_debug!("traversal {}: starting with {} roots", id, roots.len());
        let mut traversal = Traversal::new(roots.len());
        for root in roots {
            traversal.visit(root);
        }
        let outcome = traversal.run().await;
        omr_info!(
            "traversal {}: collected {} files, {} failed subtrees",
            id,
            outcome.files.len(),
            outcome.failures.len()
        );
        outcome
    }

    /// Same as [`collect`](Self::collect) for filesystem paths. A path that
    /// cannot be inspected is reported as a failed subtree.
    pub async fn collect_paths(&self, paths: &[PathBuf]) -> CollectOutcome {
        let mut roots = Vec::with_capacity(paths.len());
        let mut failures = Vec::new();
        for path in paths {
            match classify(path, self.settings.read_chunk).await {
                Ok(Some(entry)) => roots.push(entry),
                Ok(None) => omr_debug!("skipping {}: not a file or directory", path.display()),
                Err(err) => failures.push(err),
            }
        }
        let mut outcome = self.collect(roots).await;
        failures.append(&mut outcome.failures);
        outcome.failures = failures;
        outcome
    }
}

async fn classify(path: &Path, read_chunk: usize) -> Result<Option<Entry>, CollectError> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|err| CollectError::Inspect {
            subtree: path.display().to_string(),
            message: err.to_string(),
        })?;
    Ok(if meta.is_dir() {
        Some(Entry::Directory(Box::new(
            FsDirectory::new(path).with_read_chunk(read_chunk),
        )))
    } else if meta.is_file() {
        Some(Entry::File(FileEntry::from_path(path)))
    } else {
        None
    })
}

/// A real directory, read through `tokio::fs` a chunk at a time.
pub struct FsDirectory {
    path: PathBuf,
    name: String,
    read_chunk: usize,
    read_dir: Option<tokio::fs::ReadDir>,
    /// Error hit after some children were already read; reported on the next read.
    deferred: Option<CollectError>,
    exhausted: bool,
}

impl FsDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: path.display().to_string(),
            path,
            read_chunk: CollectSettings::default().read_chunk,
            read_dir: None,
            deferred: None,
            exhausted: false,
        }
    }

    pub fn with_read_chunk(mut self, read_chunk: usize) -> Self {
        self.read_chunk = read_chunk.max(1);
        self
    }

    fn read_error(&self, err: std::io::Error) -> CollectError {
        CollectError::Read {
            subtree: self.name.clone(),
            message: err.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl DirectoryReader for FsDirectory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn read_entries(&mut self) -> Result<Vec<Entry>, CollectError> {
        if let Some(err) = self.deferred.take() {
            return Err(err);
        }
        if self.exhausted {
            return Ok(Vec::new());
        }
        if self.read_dir.is_none() {
            let read_dir = tokio::fs::read_dir(&self.path)
                .await
                .map_err(|err| self.read_error(err))?;
            self.read_dir = Some(read_dir);
        }
        let Some(read_dir) = self.read_dir.as_mut() else {
            return Ok(Vec::new());
        };

        let mut children = Vec::new();
        while children.len() < self.read_chunk {
            let next = match read_dir.next_entry().await {
                Ok(next) => next,
                Err(err) => {
                    let err = CollectError::Read {
                        subtree: self.name.clone(),
                        message: err.to_string(),
                    };
                    if children.is_empty() {
                        return Err(err);
                    }
                    self.deferred = Some(err);
                    break;
                }
            };
            let Some(dir_entry) = next else {
                self.exhausted = true;
                break;
            };
            let path = dir_entry.path();
            let child = match dir_entry.file_type().await {
                Ok(file_type) if file_type.is_dir() => Some(Entry::Directory(Box::new(
                    FsDirectory::new(&path).with_read_chunk(self.read_chunk),
                ))),
                Ok(file_type) if file_type.is_file() => {
                    Some(Entry::File(FileEntry::from_path(&path)))
                }
                // Links are resolved like dropped roots, directories included.
                Ok(file_type) if file_type.is_symlink() => classify(&path, self.read_chunk)
                    .await
                    .unwrap_or_else(|err| Some(Entry::Failed(err))),
                Ok(_) => None,
                Err(err) => Some(Entry::Failed(CollectError::Inspect {
                    subtree: path.display().to_string(),
                    message: err.to_string(),
                })),
            };
            match child {
                Some(child) => children.push(child),
                None => omr_debug!("skipping {}: not a file or directory", path.display()),
            }
        }
        Ok(children)
    }
}
