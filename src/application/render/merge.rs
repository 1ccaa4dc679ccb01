//! Ordered concatenation of finished documents.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("no documents to merge")]
    Empty,
    /// `position` is 1-based.
    #[error("document {position} is empty")]
    EmptyDocument { position: usize },
    #[error("document {position} could not be parsed: {message}")]
    Parse { position: usize, message: String },
    #[error("document {position} is encrypted")]
    Encrypted { position: usize },
    #[error("failed to write merged document: {message}")]
    Write { message: String },
}

/// Capability that concatenates whole documents page-wise.
pub trait DocumentMerger: Send + Sync {
    /// Merge two or more documents, keeping list order.
    fn merge(&self, documents: &[Vec<u8>]) -> Result<Vec<u8>, MergeError>;
}

/// Validate the list and merge it. A single document is returned untouched
/// and the merger is not consulted.
pub fn merge_documents(
    merger: &dyn DocumentMerger,
    mut documents: Vec<Vec<u8>>,
) -> Result<Vec<u8>, MergeError> {
    if documents.is_empty() {
        return Err(MergeError::Empty);
    }
    if let Some(index) = documents.iter().position(Vec::is_empty) {
        return Err(MergeError::EmptyDocument {
            position: index + 1,
        });
    }
    if documents.len() == 1 {
        return Ok(documents.swap_remove(0));
    }
    merger.merge(&documents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMerger {
        calls: AtomicUsize,
    }

    impl DocumentMerger for CountingMerger {
        fn merge(&self, documents: &[Vec<u8>]) -> Result<Vec<u8>, MergeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(documents.concat())
        }
    }

    #[test]
    fn single_document_passes_through_without_merging() {
        let merger = CountingMerger::default();
        let output = merge_documents(&merger, vec![b"%PDF-single".to_vec()]).expect("merge");
        assert_eq!(output, b"%PDF-single");
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejects_empty_list_and_empty_entries() {
        let merger = CountingMerger::default();
        assert_eq!(merge_documents(&merger, Vec::new()), Err(MergeError::Empty));
        assert_eq!(
            merge_documents(&merger, vec![b"a".to_vec(), Vec::new()]),
            Err(MergeError::EmptyDocument { position: 2 })
        );
        assert_eq!(merger.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn multiple_documents_are_delegated_in_order() {
        let merger = CountingMerger::default();
        let output =
            merge_documents(&merger, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()])
                .expect("merge");
        assert_eq!(output, b"abc");
        assert_eq!(merger.calls.load(Ordering::SeqCst), 1);
    }
}
