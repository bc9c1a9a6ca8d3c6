use crate::FileEntry;

/// Ordered upload queue backing both the preview list and the submission.
///
/// Indices are positions, not identities: every removal shifts later entries
/// down by one. Out-of-range indices are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStore {
    files: Vec<FileEntry>,
}

impl BatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends in the order given. Duplicate names are kept.
    pub fn add(&mut self, files: impl IntoIterator<Item = FileEntry>) {
        self.files.extend(files);
    }

    pub fn remove_at(&mut self, index: usize) -> Option<FileEntry> {
        if index < self.files.len() {
            Some(self.files.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }
}
