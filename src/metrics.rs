use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload and query activity.
#[derive(Default)]
pub struct RagMetrics {
    documents_indexed: AtomicU64,
    chunks_indexed: AtomicU64,
    last_chunk_count: AtomicU64,
    queries_answered: AtomicU64,
    query_failures: AtomicU64,
}

impl RagMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an indexed document and the number of chunks produced for it.
    pub fn record_document(&self, chunk_count: u64) {
        self.documents_indexed.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
        self.last_chunk_count.store(chunk_count, Ordering::Relaxed);
    }

    /// Record a question that produced an answer.
    pub fn record_answer(&self) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a question that failed after the index check.
    pub fn record_query_failure(&self) {
        self.query_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let documents_indexed = self.documents_indexed.load(Ordering::Relaxed);
        MetricsSnapshot {
            documents_indexed,
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            last_chunk_count: (documents_indexed > 0)
                .then(|| self.last_chunk_count.load(Ordering::Relaxed)),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            query_failures: self.query_failures.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Documents indexed since startup.
    pub documents_indexed: u64,
    /// Chunks produced across all indexed documents.
    pub chunks_indexed: u64,
    /// Chunk count of the most recent document, absent before the first upload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_chunk_count: Option<u64>,
    /// Questions answered successfully.
    pub queries_answered: u64,
    /// Questions that failed in retrieval or generation.
    pub query_failures: u64,
}
