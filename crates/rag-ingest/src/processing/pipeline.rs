//! Page-at-a-time ingestion run with per-object error isolation

use futures::future::join_all;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::config::IngestConfig;
use crate::error::{Error, Result};
use crate::ingestion::{ContentExtractor, DedupIndex, ObjectLister, TokenChunker};
use crate::providers::{EmbeddingProvider, ObjectStoreProvider, VectorStoreProvider};
use crate::types::{Chunk, IndexedRecord, ObjectDescriptor};

use super::report::{Decision, ObjectOutcome, ObjectState, RunReport};

/// Result of the time-budgeted part of processing one object
enum Prepared {
    /// Terminal outcome reached before anything was submitted
    Finished(ObjectOutcome),
    /// Embedded records ready to insert
    Records(Vec<IndexedRecord>),
}

/// Run-level knobs of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Key prefix to ingest
    pub prefix: String,
    /// Objects of one page processed concurrently
    pub parallel_objects: usize,
    /// Concurrent embedding calls per object
    pub parallel_embeddings: usize,
    /// Time budget for one object
    pub object_timeout: Duration,
    /// Prepended to chunk text before embedding
    pub document_prefix: String,
    /// List and dedup only
    pub dry_run: bool,
}

impl PipelineOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            prefix: config.object_store.prefix.clone(),
            parallel_objects: config.processing.workers(),
            parallel_embeddings: config.embeddings.parallel_requests.max(1),
            object_timeout: Duration::from_secs(config.processing.object_timeout_secs),
            document_prefix: config.embeddings.document_prefix.clone(),
            dry_run: false,
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

/// Orchestrates listing, dedup, extraction, chunking, embedding and insert
///
/// Every collaborator is constructed by the caller; the pipeline performs no
/// connection or model setup of its own.
pub struct IngestionPipeline {
    lister: ObjectLister,
    dedup: DedupIndex,
    objects: Arc<dyn ObjectStoreProvider>,
    extractor: ContentExtractor,
    chunker: TokenChunker,
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStoreProvider>,
    options: PipelineOptions,
}

impl IngestionPipeline {
    /// Assemble a pipeline from already-constructed components
    pub fn new(
        lister: ObjectLister,
        dedup: DedupIndex,
        objects: Arc<dyn ObjectStoreProvider>,
        extractor: ContentExtractor,
        chunker: TokenChunker,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStoreProvider>,
    ) -> Self {
        Self {
            lister,
            dedup,
            objects,
            extractor,
            chunker,
            embedder,
            vectors,
            options: PipelineOptions::default(),
        }
    }

    /// Replace the run options
    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ingest every new object under the configured prefix
    ///
    /// Returns `Err` only when listing or a dedup query fails. Per-object
    /// failures are recorded in the report and the run continues.
    pub async fn run(&self) -> Result<RunReport> {
        let mut report = RunReport::start();

        tracing::info!(
            "Ingestion run started: prefix '{}', {} parallel objects, {} parallel embeddings{}",
            self.options.prefix,
            self.options.parallel_objects,
            self.options.parallel_embeddings,
            if self.options.dry_run { " (dry run)" } else { "" }
        );

        let mut pages = self.lister.stream(&self.options.prefix);
        while let Some(page) = pages.next().await {
            let page = page.map_err(|e| {
                tracing::error!("Listing failed after {} pages: {}", report.pages, e);
                e
            })?;
            report.pages += 1;

            if page.is_empty() {
                continue;
            }

            let page_size = page.len();
            tracing::debug!(
                state = %ObjectState::Discovered,
                "Page {}: {} objects listed",
                report.pages,
                page_size
            );

            let partition = self.dedup.partition_page(page).await.map_err(|e| {
                tracing::error!(
                    state = %ObjectState::Discovered,
                    "Dedup query failed on page {}, {} objects not processed: {}",
                    report.pages,
                    page_size,
                    e
                );
                e
            })?;

            tracing::info!(
                "Page {}: {} objects, {} new, {} already stored, {} without identity",
                report.pages,
                page_size,
                partition.ingest.len(),
                partition.skip.len(),
                partition.unidentified.len()
            );

            for object in &partition.skip {
                Self::log_outcome(object, Decision::Skip, &ObjectOutcome::Skipped);
                report.record(&object.key, &ObjectOutcome::Skipped);
            }
            for object in &partition.unidentified {
                Self::log_outcome(object, Decision::Unidentified, &ObjectOutcome::Unidentified);
                report.record(&object.key, &ObjectOutcome::Unidentified);
            }

            for (key, outcome) in self.process_objects(partition.ingest).await {
                report.record(&key, &outcome);
            }
        }

        report.finish();
        tracing::info!("Ingestion run complete: {}", report);
        Ok(report)
    }

    /// Process the new objects of one page on a bounded worker pool
    async fn process_objects(&self, objects: Vec<ObjectDescriptor>) -> Vec<(String, ObjectOutcome)> {
        let semaphore = Arc::new(Semaphore::new(self.options.parallel_objects.max(1)));
        let object_timeout = self.options.object_timeout;

        let futures: Vec<_> = objects
            .into_iter()
            .map(|object| {
                let sem = semaphore.clone();

                async move {
                    let _permit = match sem.acquire().await {
                        Ok(permit) => permit,
                        Err(e) => {
                            let outcome = ObjectOutcome::Failed {
                                stage: ObjectState::Deduped,
                                error: Error::internal(format!("Worker pool closed: {}", e)).to_string(),
                            };
                            return (object.key, outcome);
                        }
                    };

                    let start_time = Instant::now();
                    let state = Mutex::new(ObjectState::Deduped);

                    // Only download through embedding is time-budgeted
                    let prepared = match timeout(object_timeout, self.prepare_object(&object, &state)).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(object_timeout)),
                    };

                    let outcome = match prepared {
                        Ok(Prepared::Finished(outcome)) => outcome,
                        Ok(Prepared::Records(records)) => self.submit_records(&records, &state).await,
                        Err(e) => ObjectOutcome::Failed {
                            stage: *state.lock(),
                            error: e.to_string(),
                        },
                    };

                    let elapsed = start_time.elapsed();
                    if elapsed.as_secs() > 60 {
                        tracing::warn!(
                            "Slow processing for '{}': took {:.1}s",
                            object.key,
                            elapsed.as_secs_f64()
                        );
                    }

                    Self::log_outcome(&object, Decision::New, &outcome);
                    (object.key, outcome)
                }
            })
            .collect();

        join_all(futures).await
    }

    /// Download, extract, chunk and embed one new object
    ///
    /// `state` is advanced as each stage completes so a failure or timeout
    /// can report how far the object got.
    async fn prepare_object(
        &self,
        object: &ObjectDescriptor,
        state: &Mutex<ObjectState>,
    ) -> Result<Prepared> {
        if !ContentExtractor::supports(&object.key) {
            return Ok(Prepared::Finished(ObjectOutcome::UnsupportedFormat));
        }
        if self.options.dry_run {
            return Ok(Prepared::Finished(ObjectOutcome::WouldIngest));
        }

        let data = self.objects.get_object(&object.key).await?;

        let extractor = self.extractor.clone();
        let key = object.key.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.extract(&key, &data))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;
        *state.lock() = ObjectState::Extracted;

        if !extracted.has_text() {
            return Ok(Prepared::Finished(ObjectOutcome::Empty));
        }

        let pages_read = extracted.pages_read;
        let pages_total = extracted.pages_total;
        let chunker = self.chunker.clone();
        let key = object.key.clone();
        let identity = object.content_identity.clone();
        let text = extracted.full_text;
        let chunks = tokio::task::spawn_blocking(move || chunker.chunk_object(&key, &identity, &text))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;
        *state.lock() = ObjectState::Chunked;

        if chunks.is_empty() {
            return Ok(Prepared::Finished(ObjectOutcome::Empty));
        }

        tracing::debug!(
            "[{}] {} pages read of {}, {} chunks",
            object.key,
            pages_read,
            pages_total,
            chunks.len()
        );

        let records = self.embed_chunks(&object.key, chunks).await?;
        Ok(Prepared::Records(records))
    }

    /// Insert one object's full record set in a single call
    async fn submit_records(&self, records: &[IndexedRecord], state: &Mutex<ObjectState>) -> ObjectOutcome {
        *state.lock() = ObjectState::Submitted;

        match self.vectors.insert_records(records).await {
            Ok(inserted) => {
                *state.lock() = ObjectState::Done;
                ObjectOutcome::Ingested { chunks: inserted }
            }
            Err(e) => ObjectOutcome::Failed {
                stage: ObjectState::Submitted,
                error: e.to_string(),
            },
        }
    }

    /// Embed all chunks of one object, `parallel_embeddings` texts per batch
    ///
    /// Any failed embedding fails the object; no partial record set is built.
    async fn embed_chunks(&self, key: &str, chunks: Vec<Chunk>) -> Result<Vec<IndexedRecord>> {
        let dimensions = self.embedder.dimensions();
        let total_batches = chunks.len().div_ceil(self.options.parallel_embeddings);
        let mut records = Vec::with_capacity(chunks.len());

        for (batch_num, batch) in chunks.chunks(self.options.parallel_embeddings).enumerate() {
            let inputs: Vec<String> = batch
                .iter()
                .map(|chunk| format!("{}{}", self.options.document_prefix, chunk.text))
                .collect();
            let vectors = self.embedder.embed_batch(&inputs).await?;
            if vectors.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "Batch {} of {}: sent {} texts, got {} embeddings",
                    batch_num + 1,
                    key,
                    batch.len(),
                    vectors.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                if vector.len() != dimensions {
                    return Err(Error::embedding(format!(
                        "Chunk {}: expected {} dimensions, got {}",
                        chunk.external_id(),
                        dimensions,
                        vector.len()
                    )));
                }
                records.push(IndexedRecord::from_chunk(chunk.clone(), vector));
            }

            tracing::debug!("[{}] Embedded batch {}/{}", key, batch_num + 1, total_batches);
        }

        Ok(records)
    }

    fn log_outcome(object: &ObjectDescriptor, decision: Decision, outcome: &ObjectOutcome) {
        match outcome {
            ObjectOutcome::Failed { stage, error } => tracing::warn!(
                key = %object.key,
                identity = %object.content_identity,
                ?decision,
                "Failed after {}: {}",
                stage,
                error
            ),
            ObjectOutcome::Ingested { chunks } => tracing::info!(
                key = %object.key,
                identity = %object.content_identity,
                ?decision,
                "Ingested {} chunks",
                chunks
            ),
            other => tracing::info!(
                key = %object.key,
                identity = %object.content_identity,
                ?decision,
                "{:?}",
                other
            ),
        }
    }
}
