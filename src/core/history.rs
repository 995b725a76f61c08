//! Build history records and the walk back to the last meaningful build

use crate::core::state::BuildResult;
use std::sync::Arc;

/// A finished or running build, linked to the build before it.
///
/// Records belong to the build-history provider; the engine only reads them.
#[derive(Debug)]
pub struct BuildRecord {
    /// Build number
    pub id: u64,

    /// `None` while the build is still running
    pub result: Option<BuildResult>,

    /// Previous build of the same job; `None` ends the chain
    pub previous: Option<Arc<BuildRecord>>,
}

impl BuildRecord {
    pub fn new(id: u64, result: Option<BuildResult>, previous: Option<Arc<BuildRecord>>) -> Self {
        Self {
            id,
            result,
            previous,
        }
    }

    /// Build a chain from results listed newest first
    pub fn chain<I>(newest_first: I) -> Option<Arc<BuildRecord>>
    where
        I: IntoIterator<Item = (u64, Option<BuildResult>)>,
        I::IntoIter: DoubleEndedIterator,
    {
        let mut head: Option<Arc<BuildRecord>> = None;
        for (id, result) in newest_first.into_iter().rev() {
            head = Some(Arc::new(BuildRecord::new(id, result, head)));
        }
        head
    }

    pub fn is_aborted(&self) -> bool {
        self.result == Some(BuildResult::Aborted)
    }
}

// The default drop would recurse once per link.
impl Drop for BuildRecord {
    fn drop(&mut self) {
        let mut next = self.previous.take();
        while let Some(link) = next {
            match Arc::try_unwrap(link) {
                Ok(mut record) => next = record.previous.take(),
                Err(_) => break,
            }
        }
    }
}

/// The most recent build whose result is not `Aborted`.
///
/// Pending builds are returned as-is. An empty or entirely aborted chain
/// yields `None`.
pub fn last_non_aborted(build: Option<&BuildRecord>) -> Option<&BuildRecord> {
    let mut current = build;
    while let Some(record) = current {
        if !record.is_aborted() {
            return Some(record);
        }
        current = record.previous.as_deref();
    }
    None
}
