//! Incremental ingestion of a document tree.
//!
//! Walks the root, picks files that are new or whose mtime differs from the
//! manifest, and runs extract → chunk → insert on each one. The manifest is
//! persisted after every file, so an interrupted run loses at most the file
//! in progress.
//!
//! Per-file problems (unreadable files, extraction errors, failed embedding
//! or store batches) are logged and counted; the file stays out of the
//! manifest and is retried on the next run. Only a missing root, a bad
//! exclude pattern, or a failed manifest write abort a run.
//!
//! The manifest lives beside whichever store layer opened (see
//! [`StoreAccess::manifest_path`]), so an entry is only ever recorded next
//! to the chunks it vouches for.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use crate::chunk::Chunker;
use crate::config::{Config, OcrConfig};
use crate::embedding;
use crate::error::IngestError;
use crate::extract::{self, FileKind};
use crate::manifest::{self, Manifest};
use crate::store_access::{StoreAccess, StoreHandle};

/// Counts for one ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub scanned: usize,
    pub unsupported: usize,
    pub unchanged: usize,
    pub ingested: usize,
    pub failed: usize,
    pub chunks_inserted: usize,
    pub chunks_already_present: usize,
    pub chunks_skipped: usize,
}

pub struct Ingestor<'a> {
    access: &'a StoreAccess,
    handle: &'a StoreHandle,
    chunker: Chunker,
    ocr: OcrConfig,
    manifest_path: PathBuf,
    exclude: GlobSet,
    follow_symlinks: bool,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        config: &Config,
        access: &'a StoreAccess,
        handle: &'a StoreHandle,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            access,
            handle,
            chunker: Chunker::from_config(&config.chunking),
            ocr: config.ocr.clone(),
            manifest_path: access.manifest_path(handle.origin()),
            exclude: build_globset(&config.ingest.exclude_globs)?,
            follow_symlinks: config.ingest.follow_symlinks,
        })
    }

    pub async fn ingest(&self, root: &Path) -> Result<IngestReport, IngestError> {
        if !root.is_dir() {
            return Err(IngestError::MissingRoot(root.to_path_buf()));
        }

        let mut manifest = Manifest::load(&self.manifest_path);
        debug!(manifest = %self.manifest_path.display(), origin = %self.handle.origin(), "manifest loaded");
        let mut report = IngestReport::default();

        let walker = WalkDir::new(root)
            .follow_links(self.follow_symlinks)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_ignored_name(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = relative_key(root, path);
            if self.exclude.is_match(&relative) {
                debug!(file = %relative, "excluded by pattern");
                continue;
            }
            report.scanned += 1;

            let kind = FileKind::from_path(path);
            if !kind.is_supported() {
                if kind == FileKind::Xlsx {
                    warn!(file = %relative, "spreadsheet support not compiled in, skipping");
                } else {
                    debug!(file = %relative, "unsupported file type, skipping");
                }
                report.unsupported += 1;
                continue;
            }

            let mtime = match manifest::mtime_nanos(path) {
                Ok(mtime) => mtime,
                Err(e) => {
                    warn!(file = %relative, error = %e, "cannot stat file, skipping");
                    report.failed += 1;
                    continue;
                }
            };
            if manifest.is_current(&relative, mtime) {
                report.unchanged += 1;
                continue;
            }

            if !self.ingest_file(path, &relative, &mut report).await {
                report.failed += 1;
                continue;
            }

            manifest.record(relative.clone(), mtime);
            manifest.persist().map_err(IngestError::Manifest)?;
            report.ingested += 1;
        }

        info!(
            scanned = report.scanned,
            ingested = report.ingested,
            unchanged = report.unchanged,
            failed = report.failed,
            "ingestion finished"
        );
        Ok(report)
    }

    /// Extract, chunk, and insert one file. Returns whether the file may be
    /// recorded in the manifest.
    async fn ingest_file(
        &self,
        path: &Path,
        relative: &str,
        report: &mut IngestReport,
    ) -> bool {
        let units = {
            let path = path.to_path_buf();
            let source = relative.to_string();
            let ocr = self.ocr.clone();
            tokio::task::spawn_blocking(move || extract::extract_file(&path, &source, &ocr)).await
        };
        let units = match units {
            Ok(Ok(units)) => units,
            Ok(Err(e)) => {
                warn!(file = %relative, error = %e, "extraction failed, will retry next run");
                return false;
            }
            Err(e) => {
                warn!(file = %relative, error = %e, "extraction task failed, will retry next run");
                return false;
            }
        };

        let chunks = self.chunker.split_units(&units);
        let chunk_count = chunks.len();
        let insert = self.access.insert(self.handle, chunks).await;

        report.chunks_inserted += insert.inserted;
        report.chunks_already_present += insert.already_present;
        report.chunks_skipped += insert.skipped;

        if insert.had_failures() {
            warn!(
                file = %relative,
                failed_chunks = insert.failed,
                "some batches failed, file will be retried next run"
            );
            return false;
        }

        info!(
            file = %relative,
            chunks = chunk_count,
            inserted = insert.inserted,
            "ingested"
        );
        true
    }
}

/// Open the configured store and ingest `root` (or `ingest.root`).
pub async fn run_ingest(config: &Config, root: Option<&Path>) -> Result<IngestReport> {
    let root = root.unwrap_or(config.ingest.root.as_path());
    let embedder = embedding::create_embedder(&config.embedding)
        .context("Failed to create embedding provider")?;
    let access = StoreAccess::new(config);
    let handle = access
        .open(embedder)
        .await
        .context("Failed to open vector store")?;
    info!(origin = %handle.origin(), "vector store ready");

    let ingestor = Ingestor::new(config, &access, &handle)?;
    let report = ingestor.ingest(root).await?;
    handle.store().close().await;
    Ok(report)
}

/// Dotfiles and Office lock files (`~$report.docx`).
fn is_ignored_name(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name.starts_with("~$")
}

/// `/`-separated path of `path` relative to `root`.
fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, IngestError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::fake::HashEmbedder;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct Fixture {
        _tmp: TempDir,
        root: PathBuf,
        config: Config,
    }

    fn fixture() -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("uploads");
        std::fs::create_dir_all(&root).unwrap();
        let mut config = Config::default();
        config.store.dir = tmp.path().join("store");
        config.store.cache_dir = tmp.path().join("cache");
        config.store.fallback_dir = tmp.path().join("ephemeral");
        config.ingest.exclude_globs = vec!["drafts/**".to_string()];
        Fixture {
            _tmp: tmp,
            root,
            config,
        }
    }

    #[test]
    fn relative_keys_use_forward_slashes() {
        let root = Path::new("/data/uploads");
        assert_eq!(
            relative_key(root, &root.join("a").join("b.pdf")),
            "a/b.pdf"
        );
    }

    #[tokio::test]
    async fn missing_root_is_an_error() {
        let fx = fixture();
        let access = StoreAccess::new(&fx.config);
        let handle = access.open(Arc::new(HashEmbedder::new())).await.unwrap();
        let ingestor = Ingestor::new(&fx.config, &access, &handle).unwrap();
        let err = ingestor.ingest(&fx.root.join("nope")).await.unwrap_err();
        assert!(matches!(err, IngestError::MissingRoot(_)));
    }

    #[tokio::test]
    async fn hidden_lock_and_excluded_files_are_ignored() {
        let fx = fixture();
        std::fs::write(fx.root.join("keep.txt"), "kept text").unwrap();
        std::fs::write(fx.root.join(".hidden.txt"), "secret").unwrap();
        std::fs::write(fx.root.join("~$lock.txt"), "lock").unwrap();
        std::fs::create_dir_all(fx.root.join("drafts")).unwrap();
        std::fs::write(fx.root.join("drafts/wip.txt"), "draft").unwrap();

        let access = StoreAccess::new(&fx.config);
        let handle = access.open(Arc::new(HashEmbedder::new())).await.unwrap();
        let report = Ingestor::new(&fx.config, &access, &handle)
            .unwrap()
            .ingest(&fx.root)
            .await
            .unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(report.ingested, 1);
        let manifest = Manifest::load(fx.config.store.manifest_path());
        assert_eq!(manifest.entries().keys().collect::<Vec<_>>(), vec!["keep.txt"]);
    }

    #[tokio::test]
    async fn invalid_exclude_pattern_is_rejected() {
        let mut fx = fixture();
        fx.config.ingest.exclude_globs = vec!["[".to_string()];
        let access = StoreAccess::new(&fx.config);
        let handle = access.open(Arc::new(HashEmbedder::new())).await.unwrap();
        assert!(matches!(
            Ingestor::new(&fx.config, &access, &handle),
            Err(IngestError::Pattern(_))
        ));
    }
}
