//! Folder ingestion with optional chunking

use super::Engine;
use crate::config::expand_path;
use crate::embedding::{content_hash, document_id, Partition};
use crate::error::{RagtierError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Counts from one ingestion run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub skipped_unchanged: usize,
    pub failed: usize,
    /// Chunks dropped because their source now splits into fewer parts
    pub pruned: usize,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.ingested += other.ingested;
        self.skipped_unchanged += other.skipped_unchanged;
        self.failed += other.failed;
        self.pruned += other.pruned;
    }

    pub fn total(&self) -> usize {
        self.ingested + self.skipped_unchanged + self.failed
    }
}

/// Split `text` into windows of `chunk_size` characters, consecutive windows
/// sharing `overlap` characters. Texts that fit in one window come back whole.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chunk_size == 0 || chars.len() <= chunk_size {
        return vec![text.to_string()];
    }

    let step = chunk_size.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

impl Engine {
    /// Ingest the configured FAQ folder into the FAQ partition and the docs
    /// folder into the general partition. Missing folders are skipped.
    pub fn ingest_configured(&self) -> Result<IngestReport> {
        let ingestion = &self.config().ingestion;
        let faq_dir = expand_path(&ingestion.faq_folder)?;
        let docs_dir = expand_path(&ingestion.docs_folder)?;

        let mut report = IngestReport::default();
        for (dir, partition) in [(faq_dir, Partition::Faq), (docs_dir, Partition::General)] {
            if !dir.is_dir() {
                warn!("Skipping missing {} folder: {}", partition, dir.display());
                continue;
            }
            report.merge(self.ingest_dir(&dir, partition)?);
        }
        Ok(report)
    }

    /// Ingest every file with an allowed extension directly inside `dir`.
    ///
    /// Subdirectories are not visited, so a FAQ folder nested in the docs
    /// folder is never ingested twice. Unreadable or empty files are counted
    /// as failed; embedding and index errors abort the run. Chunks of a file
    /// that no longer exist after re-splitting it are deleted.
    pub fn ingest_dir(&self, dir: &Path, partition: Partition) -> Result<IngestReport> {
        let files = self.list_files(dir)?;
        let mut report = IngestReport::default();
        let mut pending: Vec<(String, String)> = Vec::new();

        for path in files {
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_string(),
                None => {
                    warn!("Skipping non UTF-8 file name: {}", path.display());
                    report.failed += 1;
                    continue;
                }
            };

            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to read {}: {}", path.display(), e);
                    report.failed += 1;
                    continue;
                }
            };

            if text.trim().is_empty() {
                warn!("Skipping empty file: {}", path.display());
                report.failed += 1;
                continue;
            }

            let parts = self.split_source(&name, &text);
            let keep: Vec<String> = parts.iter().map(|(part, _)| document_id(part)).collect();
            report.pruned += self.index(partition).prune_source(&name, &keep)?;
            pending.extend(parts);
        }

        report.merge(self.ingest_pending(pending, partition)?);

        info!(
            "Ingested {} into {}: {} new or changed, {} unchanged, {} failed, {} pruned",
            dir.display(),
            partition,
            report.ingested,
            report.skipped_unchanged,
            report.failed,
            report.pruned
        );
        Ok(report)
    }

    fn list_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let allowed = &self.config().ingestion.allowed_extensions;
        let entries = std::fs::read_dir(dir).map_err(|e| RagtierError::Io {
            source: e,
            context: format!("Failed to read directory: {}", dir.display()),
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| {
                        let ext = ext.trim_start_matches('.');
                        allowed
                            .iter()
                            .any(|a| a.trim_start_matches('.').eq_ignore_ascii_case(ext))
                    })
                    .unwrap_or(false)
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// One `(source_name, text)` per chunk, or the whole file when chunking
    /// is off or the text is short
    fn split_source(&self, name: &str, text: &str) -> Vec<(String, String)> {
        let ingestion = &self.config().ingestion;
        if !ingestion.enable_chunking {
            return vec![(name.to_string(), text.to_string())];
        }

        let chunks = chunk_text(text, ingestion.chunk_size, ingestion.chunk_overlap);
        if chunks.len() == 1 {
            return vec![(name.to_string(), text.to_string())];
        }
        debug!("Split {} into {} chunks", name, chunks.len());
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| (format!("{}#{}", name, i + 1), chunk))
            .collect()
    }

    /// Embed changed sources in batches and upsert them
    fn ingest_pending(
        &self,
        pending: Vec<(String, String)>,
        partition: Partition,
    ) -> Result<IngestReport> {
        let index = self.index(partition);
        let mut report = IngestReport::default();

        let changed: Vec<(String, String)> = pending
            .into_iter()
            .filter(|(name, text)| {
                let unchanged = index
                    .get(name)
                    .map(|doc| doc.content_hash == content_hash(text))
                    .unwrap_or(false);
                if unchanged {
                    report.skipped_unchanged += 1;
                }
                !unchanged
            })
            .collect();

        let batch_size = self.config().embedding.batch_size.max(1);
        for batch in changed.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            let vectors = self.provider().embed_batch(&texts)?;

            for ((name, text), vector) in batch.iter().zip(vectors) {
                index.upsert(name, text, vector)?;
                report.ingested += 1;
            }
            debug!("Embedded batch of {} into {}", batch.len(), partition);
        }

        Ok(report)
    }
}
