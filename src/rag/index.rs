//! In-memory vector index and the process-wide handle that serves it.
//!
//! A [`VectorIndex`] is immutable once built. Uploads build a complete new index and swap it into
//! the [`IndexHandle`]; queries clone the current `Arc` and search that snapshot, so a reader sees
//! either the old index or the new one, never a partial build. Concurrent uploads are not
//! serialised: the last swap wins.

use super::types::{Chunk, DocumentInfo, IndexError, IndexStatus, ScoredChunk};
use parking_lot::RwLock;
use std::sync::Arc;

/// Default number of chunks returned per query.
pub const DEFAULT_TOP_K: usize = 2;

struct IndexEntry {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Exhaustive cosine-similarity index over one document's chunks.
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    document: DocumentInfo,
}

impl VectorIndex {
    /// Build an index from chunks and their embeddings, paired by position.
    ///
    /// Every vector must have `dimension` components. Stored vectors are L2-normalised so a
    /// search is a dot product per entry.
    pub fn build(
        chunks: Vec<Chunk>,
        vectors: Vec<Vec<f32>>,
        dimension: usize,
        document: DocumentInfo,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }
        if chunks.len() != vectors.len() {
            return Err(IndexError::CountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                if vector.len() == dimension {
                    Ok(IndexEntry {
                        chunk,
                        vector: normalized(vector),
                    })
                } else {
                    Err(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: vector.len(),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            entries,
            dimension,
            document,
        })
    }

    /// Return the `k` chunks most similar to `query`, nearest first.
    ///
    /// Yields `min(k, len)` results. Equal scores keep insertion order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, IndexError> {
        if query.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let query = normalized(query.to_vec());
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (position, dot(&query, &entry.vector)))
            .collect();
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(position, score)| ScoredChunk {
                chunk: self.entries[position].chunk.clone(),
                score,
            })
            .collect())
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no chunks. Always `false` for a built index.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension accepted by [`VectorIndex::search`].
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Document this index was built from.
    pub fn document(&self) -> &DocumentInfo {
        &self.document
    }
}

fn normalized(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

/// Lifecycle of the served index.
#[derive(Clone, Default)]
pub enum IndexState {
    /// Nothing uploaded yet.
    #[default]
    Uninitialized,
    /// A fully built index is being served.
    Ready(Arc<VectorIndex>),
}

/// Shared, atomically swappable reference to the active index.
#[derive(Default)]
pub struct IndexHandle {
    state: RwLock<IndexState>,
}

impl IndexHandle {
    /// Create a handle in the [`IndexState::Uninitialized`] state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `index` as the active index and return the one it replaced.
    pub fn replace(&self, index: VectorIndex) -> Option<Arc<VectorIndex>> {
        let next = IndexState::Ready(Arc::new(index));
        match std::mem::replace(&mut *self.state.write(), next) {
            IndexState::Uninitialized => None,
            IndexState::Ready(previous) => Some(previous),
        }
    }

    /// Snapshot of the active index, or [`IndexError::NotReady`] before the first upload.
    pub fn current(&self) -> Result<Arc<VectorIndex>, IndexError> {
        match &*self.state.read() {
            IndexState::Uninitialized => Err(IndexError::NotReady),
            IndexState::Ready(index) => Ok(Arc::clone(index)),
        }
    }

    /// Client-facing description of the current state.
    pub fn status(&self) -> IndexStatus {
        match &*self.state.read() {
            IndexState::Uninitialized => IndexStatus::Empty,
            IndexState::Ready(index) => IndexStatus::Ready {
                document: index.document().clone(),
            },
        }
    }
}
