use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, info_span, warn};

use crate::db::Database;
use crate::embedding::{Chunker, EmbeddingBackend};
use crate::error::{ConversionError, EmbeddingError, PdfragError};
use crate::index::{IndexStore, VectorIndex};
use crate::processor::ConversionBackend;
use crate::sanitize;
use crate::store::{ContentStore, DocumentRecord, Metadata, NewDocument, SaveOutcome, SqliteStore};
use crate::worker::Task;

use super::claims::ContentClaims;
use super::config::PipelineConfig;
use super::error::PipelineError;
use super::progress::{ProgressReporter, Stage};

/// Result of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document: DocumentRecord,
    /// True when identical content was already stored and nothing new was
    /// embedded or indexed.
    pub duplicate: bool,
    pub chunks: usize,
}

/// Runs convert, hash, dedup, persist, chunk, embed and index for one file.
pub struct Pipeline {
    converter: Box<dyn ConversionBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    store: Arc<dyn ContentStore>,
    index: Arc<dyn IndexStore>,
    chunker: Chunker,
    claims: ContentClaims,
}

impl Pipeline {
    /// Builds a pipeline from explicit components.
    pub fn new(
        converter: Box<dyn ConversionBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        store: Arc<dyn ContentStore>,
        index: Arc<dyn IndexStore>,
        chunker: Chunker,
    ) -> Self {
        Self {
            converter,
            embedder,
            store,
            index,
            chunker,
            claims: ContentClaims::new(),
        }
    }

    /// Production constructor: selects backends from the config and wires
    /// the SQLite-backed store and index on `db`.
    pub fn from_config(config: &PipelineConfig, db: Database) -> Result<Self, PdfragError> {
        let embedder: Arc<dyn EmbeddingBackend> =
            Arc::from(config.embedder.build(&config.embedding)?);
        let index = VectorIndex::open(db.clone(), config.index_dimension)?;

        Ok(Self::new(
            config.converter.build(),
            embedder,
            Arc::new(SqliteStore::new(db)),
            Arc::new(index),
            config.chunker,
        ))
    }

    pub fn embedder(&self) -> Arc<dyn EmbeddingBackend> {
        Arc::clone(&self.embedder)
    }

    pub fn store(&self) -> Arc<dyn ContentStore> {
        Arc::clone(&self.store)
    }

    pub fn index(&self) -> Arc<dyn IndexStore> {
        Arc::clone(&self.index)
    }

    /// Runs the pipeline for `task`, reporting progress through its hooks.
    ///
    /// Errors are returned unchanged; retry policy belongs to the caller.
    pub fn execute(&self, task: &Task) -> Result<IngestOutcome, PipelineError> {
        let filename = sanitize::redact_path(&task.source_path);
        let _pipeline_span = info_span!("pipeline",
            task_id = %task.id,
            filename = %filename,
        )
        .entered();

        self.run(&task.source_path, &task.title, &task.metadata, task)
    }

    fn run(
        &self,
        source_path: &Path,
        title: &str,
        base_metadata: &Metadata,
        progress: &dyn ProgressReporter,
    ) -> Result<IngestOutcome, PipelineError> {
        // Step 1: metadata
        let (path, metadata) = {
            let _step = info_span!("metadata").entered();
            let path = canonical_source(source_path)?;
            let metadata = collect_metadata(&path, base_metadata)?;
            progress.report(Stage::Metadata.percent(), Stage::Metadata);
            (path, metadata)
        };

        // Step 2: convert
        let text = {
            let _step = info_span!("convert", backend = self.converter.name()).entered();
            let text = self.converter.convert(&path)?;
            if text.trim().is_empty() {
                return Err(ConversionError::Empty(path).into());
            }
            progress.report(Stage::Parsed.percent(), Stage::Parsed);
            text
        };

        // Steps 3+4: hash and dedup. The claim is held until this run has
        // either indexed its row or removed it again.
        let hash = content_hash(&text);
        let _claim = self.claims.claim(&hash);
        {
            let _step = info_span!("dedup").entered();
            if let Some(existing) = self.store.get_by_hash(&hash)? {
                info!(
                    "Duplicate content hash for {}, matches document {}",
                    sanitize::redact_path(&path),
                    existing.id
                );
                return Ok(duplicate(existing, progress));
            }
        }

        // Step 5: persist
        let document = {
            let _step = info_span!("persist").entered();
            let ingest_source = metadata
                .get("ingest_source")
                .and_then(|v| v.as_str())
                .map(str::to_string);
            let outcome = self.store.save(NewDocument {
                title: title.to_string(),
                source_path: path.display().to_string(),
                text,
                content_hash: hash,
                metadata,
                ingest_source,
            })?;
            match outcome {
                SaveOutcome::Inserted(record) => record,
                // Another process sharing the database stored it first.
                SaveOutcome::Existing(existing) => return Ok(duplicate(existing, progress)),
            }
        };

        // Steps 6-8: chunk, embed, index. A failure here removes the row so
        // a retry is not mistaken for a duplicate.
        match self.index_document(&document, progress) {
            Ok(chunks) => {
                info!(
                    "Ingested {} as document {} ({} chunks)",
                    sanitize::redact_path(&path),
                    document.id,
                    chunks
                );
                Ok(IngestOutcome {
                    document,
                    duplicate: false,
                    chunks,
                })
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete(document.id) {
                    warn!(
                        "Failed to remove partially ingested document {}: {}",
                        document.id, cleanup
                    );
                }
                Err(e)
            }
        }
    }

    fn index_document(
        &self,
        document: &DocumentRecord,
        progress: &dyn ProgressReporter,
    ) -> Result<usize, PipelineError> {
        let chunks = {
            let _step = info_span!("chunk").entered();
            let chunks = self.chunker.split(&document.text);
            debug!("Generated {} chunks", chunks.len());
            progress.report(Stage::Chunked.percent(), Stage::Chunked);
            chunks
        };

        let embeddings = {
            let _step = info_span!("embed", provider = self.embedder.provider()).entered();
            let embeddings = self.embedder.embed(&chunks)?;
            if embeddings.len() != chunks.len() {
                return Err(EmbeddingError::CountMismatch {
                    expected: chunks.len(),
                    actual: embeddings.len(),
                }
                .into());
            }
            progress.report(Stage::Embedded.percent(), Stage::Embedded);
            embeddings
        };

        {
            let _step = info_span!("index").entered();
            self.index.add(document.id, &embeddings)?;
            progress.report(Stage::Completed.percent(), Stage::Completed);
        }

        Ok(chunks.len())
    }
}

fn duplicate(existing: DocumentRecord, progress: &dyn ProgressReporter) -> IngestOutcome {
    progress.report(Stage::Duplicate.percent(), Stage::Duplicate);
    IngestOutcome {
        document: existing,
        duplicate: true,
        chunks: 0,
    }
}

/// Lowercase hex SHA-256 of the normalized text.
pub fn content_hash(text: &str) -> String {
    Sha256::digest(text.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn canonical_source(path: &Path) -> Result<PathBuf, PipelineError> {
    match path.canonicalize() {
        Ok(p) if p.is_file() => Ok(p),
        Ok(p) => Err(PipelineError::SourceNotFound(p)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(PipelineError::SourceNotFound(path.to_path_buf()))
        }
        Err(e) => Err(PipelineError::Metadata {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Merges filesystem facts into `base` without overwriting caller keys.
fn collect_metadata(path: &Path, base: &Metadata) -> Result<Metadata, PipelineError> {
    let fs_meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => PipelineError::SourceNotFound(path.to_path_buf()),
        _ => PipelineError::Metadata {
            path: path.to_path_buf(),
            source: e,
        },
    })?;

    let mut metadata = base.clone();
    let mut set_default = |key: &str, value: serde_json::Value| {
        metadata.entry(key.to_string()).or_insert(value);
    };

    set_default("source_path", path.display().to_string().into());
    set_default("file_size", fs_meta.len().into());
    if let Ok(modified) = fs_meta.modified() {
        set_default("modified_at", DateTime::<Utc>::from(modified).to_rfc3339().into());
    }
    if let Some(changed) = status_changed(&fs_meta) {
        set_default("created_at", changed.to_rfc3339().into());
    }
    set_default(
        "mime_type",
        mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
            .into(),
    );

    Ok(metadata)
}

/// Inode change time (`st_ctime`) on unix.
#[cfg(unix)]
fn status_changed(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    use std::os::unix::fs::MetadataExt;
    DateTime::from_timestamp(meta.ctime(), meta.ctime_nsec().clamp(0, 999_999_999) as u32)
}

/// Elsewhere the creation time is the closest equivalent.
#[cfg(not(unix))]
fn status_changed(meta: &std::fs::Metadata) -> Option<DateTime<Utc>> {
    meta.created().ok().map(DateTime::<Utc>::from)
}
