//! Opening and populating the vector store.
//!
//! # Open strategy
//!
//! The primary store may sit on a mount that is read-only, flaky, or empty.
//! [`StoreAccess::open`] walks a fallback chain and reports which layer it
//! ended on through [`StoreOrigin`]:
//!
//! 1. **Primary**: open `store.dir` directly.
//! 2. **Cache**: copy `store.dir` into `store.cache_dir` (retrying transient
//!    I/O errors with exponential backoff) and open the copy. A cache at
//!    least as new as the primary manifest is reused without copying.
//! 3. **Ephemeral**: wipe `store.fallback_dir` and open an empty store there.
//!
//! Only a failure of the last step, or a transient copy error that outlives
//! every retry, is fatal.
//!
//! Each layer keeps its own manifest ([`StoreAccess::manifest_path`]), so
//! ingestion never marks a file as done in a directory whose store did not
//! receive its chunks.
//!
//! # Insert strategy
//!
//! [`StoreAccess::insert`] drops already-stored chunks, then embeds the rest
//! in batches. A token-budget rejection halves the batch and retries the same
//! slice; the smaller size sticks for the rest of the call.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::error::{EmbedError, StoreError};
use crate::manifest;
use crate::models::DocumentChunk;
use crate::retriever::Retriever;
use crate::store::VectorStore;

/// Written into the cache directory after a completed copy.
pub const SYNC_STAMP: &str = ".docqa-synced";
const MAX_COPY_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOrigin {
    Primary,
    Cache,
    Ephemeral,
}

impl fmt::Display for StoreOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreOrigin::Primary => "primary",
            StoreOrigin::Cache => "cache",
            StoreOrigin::Ephemeral => "ephemeral",
        };
        f.write_str(name)
    }
}

/// An open store together with the embedder that fills and queries it.
pub struct StoreHandle {
    store: VectorStore,
    origin: StoreOrigin,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
}

impl StoreHandle {
    pub fn origin(&self) -> StoreOrigin {
        self.origin
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        self.store.count().await
    }
}

#[async_trait]
impl Retriever for StoreHandle {
    async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>, StoreError> {
        let query_vec = embedding::embed_query(self.embedder.as_ref(), query).await?;
        let hits = self.store.similarity_search(&query_vec, self.top_k).await?;
        Ok(hits.into_iter().map(|(chunk, _)| chunk).collect())
    }
}

/// Outcome of one [`StoreAccess::insert`] call.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InsertReport {
    /// New rows written.
    pub inserted: usize,
    /// Chunks whose hash was already stored; never sent to the embedder.
    pub already_present: usize,
    /// Single chunks that exceeded the token budget on their own.
    pub skipped: usize,
    /// Chunks in batches that failed for any other reason.
    pub failed: usize,
    /// Batch size in effect when the call finished.
    pub final_batch_size: usize,
}

impl InsertReport {
    pub fn had_failures(&self) -> bool {
        self.failed > 0
    }
}

pub struct StoreAccess {
    dir: PathBuf,
    cache_dir: PathBuf,
    fallback_dir: PathBuf,
    manifest_path: PathBuf,
    skip_manifest_in_cache_copy: bool,
    copy_retries: u32,
    copy_backoff: Duration,
    batch_size: usize,
    top_k: usize,
}

impl StoreAccess {
    pub fn new(config: &Config) -> Self {
        Self {
            dir: config.store.dir.clone(),
            cache_dir: config.store.cache_dir.clone(),
            fallback_dir: config.store.fallback_dir.clone(),
            manifest_path: config.store.manifest_path(),
            skip_manifest_in_cache_copy: config.store.skip_manifest_in_cache_copy,
            copy_retries: config.store.copy_retries.max(1),
            copy_backoff: Duration::from_millis(config.store.copy_backoff_ms),
            batch_size: config.embedding.batch_size.max(1),
            top_k: config.store.top_k,
        }
    }

    pub async fn open(&self, embedder: Arc<dyn Embedder>) -> Result<StoreHandle, StoreError> {
        match VectorStore::open(&self.dir, embedder.as_ref()).await {
            Ok(store) => return Ok(self.handle(store, StoreOrigin::Primary, embedder)),
            Err(e) => warn!(error = %e, "primary store unavailable, trying cache"),
        }

        if self.dir.is_dir() && self.refresh_cache().await? {
            match VectorStore::open(&self.cache_dir, embedder.as_ref()).await {
                Ok(store) => {
                    info!(dir = %self.cache_dir.display(), "using cached store copy");
                    return Ok(self.handle(store, StoreOrigin::Cache, embedder));
                }
                Err(e) => warn!(error = %e, "cached store unavailable"),
            }
        }

        warn!(
            dir = %self.fallback_dir.display(),
            "falling back to an empty ephemeral store; answers will lack persisted context"
        );
        reset_dir(&self.fallback_dir)?;
        let store = VectorStore::open(&self.fallback_dir, embedder.as_ref()).await?;
        Ok(self.handle(store, StoreOrigin::Ephemeral, embedder))
    }

    fn handle(
        &self,
        store: VectorStore,
        origin: StoreOrigin,
        embedder: Arc<dyn Embedder>,
    ) -> StoreHandle {
        StoreHandle {
            store,
            origin,
            embedder,
            top_k: self.top_k,
        }
    }

    /// Manifest that tracks what the store opened at `origin` holds.
    ///
    /// The primary uses the configured path. The cache and ephemeral layers
    /// keep a manifest of the same name inside their own directory, so it is
    /// replaced or wiped together with the chunks it describes.
    pub fn manifest_path(&self, origin: StoreOrigin) -> PathBuf {
        let dir = match origin {
            StoreOrigin::Primary => return self.manifest_path.clone(),
            StoreOrigin::Cache => &self.cache_dir,
            StoreOrigin::Ephemeral => &self.fallback_dir,
        };
        dir.join(self.manifest_file_name())
    }

    fn manifest_file_name(&self) -> std::ffi::OsString {
        self.manifest_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| manifest::DEFAULT_FILE_NAME.into())
    }

    /// Make sure the cache holds a usable copy of the primary store.
    /// Returns `Ok(false)` when the copy failed for a non-transient reason.
    async fn refresh_cache(&self) -> Result<bool, StoreError> {
        self.refresh_cache_with(copy_tree).await
    }

    async fn refresh_cache_with<F>(&self, mut copy: F) -> Result<bool, StoreError>
    where
        F: FnMut(&Path, &Path, Option<&std::ffi::OsStr>) -> io::Result<()>,
    {
        if self.cache_is_fresh() {
            debug!(dir = %self.cache_dir.display(), "cache is current, skipping copy");
            return Ok(true);
        }

        let skip = if self.skip_manifest_in_cache_copy {
            Some(self.manifest_file_name())
        } else {
            None
        };

        let mut attempt = 1u32;
        loop {
            let result = reset_dir(&self.cache_dir)
                .and_then(|_| copy(&self.dir, &self.cache_dir, skip.as_deref()))
                .and_then(|_| write_stamp(&self.cache_dir));

            match result {
                Ok(()) => {
                    info!(from = %self.dir.display(), to = %self.cache_dir.display(), "store copied to cache");
                    return Ok(true);
                }
                Err(e) if is_transient(&e) => {
                    if attempt >= self.copy_retries {
                        return Err(StoreError::CopyExhausted {
                            from: self.dir.clone(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                    let delay = copy_backoff(self.copy_backoff, attempt);
                    warn!(attempt, ?delay, error = %e, "transient error copying store, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(error = %e, "failed to copy store to cache");
                    return Ok(false);
                }
            }
        }
    }

    /// The cache is fresh when its marker (its manifest if present, else the
    /// sync stamp) is at least as new as the primary manifest. Without a
    /// primary manifest any existing marker counts as fresh.
    fn cache_is_fresh(&self) -> bool {
        let cache_manifest = self.manifest_path(StoreOrigin::Cache);
        let marker = if cache_manifest.exists() {
            cache_manifest
        } else {
            self.cache_dir.join(SYNC_STAMP)
        };
        let Ok(cached) = manifest::mtime_nanos(&marker) else {
            return false;
        };
        match manifest::mtime_nanos(&self.manifest_path) {
            Ok(primary) => cached >= primary,
            Err(_) => true,
        }
    }

    /// Embed and store `chunks`, skipping those already present. Store and
    /// provider failures are counted in the report, never returned.
    pub async fn insert(&self, handle: &StoreHandle, chunks: Vec<DocumentChunk>) -> InsertReport {
        let mut report = InsertReport {
            final_batch_size: self.batch_size,
            ..Default::default()
        };

        let hashes: Vec<String> = chunks.iter().map(DocumentChunk::content_hash).collect();
        let mut seen = match handle.store.existing_hashes(&hashes).await {
            Ok(seen) => seen,
            Err(e) => {
                warn!(error = %e, chunks = hashes.len(), "failed to look up stored chunks, skipping");
                report.failed = hashes.len();
                return report;
            }
        };
        let mut pending = Vec::with_capacity(chunks.len());
        for (chunk, hash) in chunks.into_iter().zip(hashes) {
            if seen.insert(hash) {
                pending.push(chunk);
            } else {
                report.already_present += 1;
            }
        }

        let mut batch_size = self.batch_size;
        let mut start = 0usize;
        while start < pending.len() {
            let end = (start + batch_size).min(pending.len());
            let batch = &pending[start..end];
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            match handle.embedder.embed(&texts).await {
                Ok(vectors) => {
                    match handle.store.add(batch, &vectors).await {
                        Ok(n) => report.inserted += n,
                        Err(e) => {
                            warn!(error = %e, chunks = batch.len(), "failed to store batch");
                            report.failed += batch.len();
                        }
                    }
                    start = end;
                }
                Err(EmbedError::TokenBudget(msg)) if batch.len() > 1 => {
                    batch_size = (batch.len() / 2).max(1);
                    debug!(batch_size, reason = %msg, "token budget exceeded, shrinking batch");
                }
                Err(EmbedError::TokenBudget(msg)) => {
                    warn!(
                        source = %batch[0].metadata.source,
                        reason = %msg,
                        "chunk exceeds token budget on its own, skipping"
                    );
                    report.skipped += 1;
                    start = end;
                }
                Err(e) => {
                    warn!(error = %e, chunks = batch.len(), "embedding batch failed, skipping");
                    report.failed += batch.len();
                    start = end;
                }
            }
        }

        report.final_batch_size = batch_size;
        report
    }
}

/// Stale handles, broken or closed pipes, and closed files are worth
/// retrying; everything else is not.
pub fn is_transient(err: &io::Error) -> bool {
    // 116 is ESTALE on Linux.
    if err.kind() == io::ErrorKind::BrokenPipe
        || (cfg!(target_os = "linux") && err.raw_os_error() == Some(116))
    {
        return true;
    }
    let msg = err.to_string().to_ascii_lowercase();
    msg.contains("stale file handle") || msg.contains("closed pipe") || msg.contains("closed file")
}

/// `base * 2^(attempt-1)`, capped at 8 s.
pub fn copy_backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
    base.saturating_mul(factor).min(MAX_COPY_BACKOFF)
}

fn reset_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

fn copy_tree(from: &Path, to: &Path, skip_name: Option<&std::ffi::OsStr>) -> io::Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if skip_name.is_some_and(|skip| entry.file_name() == skip) {
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
    }
    Ok(())
}

fn write_stamp(dir: &Path) -> io::Result<()> {
    std::fs::write(dir.join(SYNC_STAMP), chrono::Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::fake::HashEmbedder;
    use crate::models::ChunkMetadata;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn test_config(root: &Path) -> Config {
        let mut config = Config::default();
        config.store.dir = root.join("primary");
        config.store.cache_dir = root.join("cache");
        config.store.fallback_dir = root.join("ephemeral");
        config.store.copy_backoff_ms = 1;
        config
    }

    fn chunks(n: usize) -> Vec<DocumentChunk> {
        (0..n)
            .map(|i| DocumentChunk::new(format!("chunk number {}", i), ChunkMetadata::new("doc.txt")))
            .collect()
    }

    #[test]
    fn transient_errors_are_classified() {
        assert!(is_transient(&io::Error::from(io::ErrorKind::BrokenPipe)));
        assert!(is_transient(&io::Error::other("read on closed file")));
        assert!(is_transient(&io::Error::other("Stale file handle")));
        assert!(!is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(1000);
        assert_eq!(copy_backoff(base, 1), Duration::from_secs(1));
        assert_eq!(copy_backoff(base, 3), Duration::from_secs(4));
        assert_eq!(copy_backoff(base, 5), Duration::from_secs(8));
        assert_eq!(copy_backoff(base, 30), Duration::from_secs(8));
    }

    #[test]
    fn manifest_follows_the_opened_layer() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let access = StoreAccess::new(&config);
        assert_eq!(
            access.manifest_path(StoreOrigin::Primary),
            config.store.manifest_path()
        );
        assert_eq!(
            access.manifest_path(StoreOrigin::Cache),
            config.store.cache_dir.join(manifest::DEFAULT_FILE_NAME)
        );
        assert_eq!(
            access.manifest_path(StoreOrigin::Ephemeral),
            config.store.fallback_dir.join(manifest::DEFAULT_FILE_NAME)
        );
    }

    #[tokio::test]
    async fn transient_copy_errors_are_retried_until_the_copy_succeeds() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.store.copy_retries = 3;
        std::fs::create_dir_all(&config.store.dir).unwrap();
        std::fs::write(config.store.dir.join("index.sqlite"), "data").unwrap();
        let access = StoreAccess::new(&config);

        let mut attempts = 0;
        let copied = access
            .refresh_cache_with(|from, to, skip| {
                attempts += 1;
                if attempts <= 2 {
                    Err(io::Error::other("Stale file handle"))
                } else {
                    copy_tree(from, to, skip)
                }
            })
            .await
            .unwrap();

        assert!(copied);
        assert_eq!(attempts, 3);
        assert!(config.store.cache_dir.join("index.sqlite").exists());
        assert!(config.store.cache_dir.join(SYNC_STAMP).exists());
    }

    #[tokio::test]
    async fn persistent_transient_copy_errors_exhaust_the_retries() {
        let tmp = TempDir::new().unwrap();
        let mut config = test_config(tmp.path());
        config.store.copy_retries = 3;
        std::fs::create_dir_all(&config.store.dir).unwrap();
        let access = StoreAccess::new(&config);

        let mut attempts = 0;
        let err = access
            .refresh_cache_with(|_, _, _| {
                attempts += 1;
                Err(io::Error::from(io::ErrorKind::BrokenPipe))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::CopyExhausted { attempts: 3, .. }));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn other_copy_errors_give_up_without_retrying() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        std::fs::create_dir_all(&config.store.dir).unwrap();
        let access = StoreAccess::new(&config);

        let mut attempts = 0;
        let copied = access
            .refresh_cache_with(|_, _, _| {
                attempts += 1;
                Err(io::Error::from(io::ErrorKind::PermissionDenied))
            })
            .await
            .unwrap();

        assert!(!copied);
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn healthy_primary_is_used_directly() {
        let tmp = TempDir::new().unwrap();
        let access = StoreAccess::new(&test_config(tmp.path()));
        let handle = access.open(Arc::new(HashEmbedder::new())).await.unwrap();
        assert_eq!(handle.origin(), StoreOrigin::Primary);
    }

    #[tokio::test]
    async fn copy_skips_the_manifest_and_stamps_the_cache() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        let primary = &config.store.dir;
        std::fs::create_dir_all(primary.join("sub")).unwrap();
        std::fs::write(primary.join("processed_files.json"), "{}").unwrap();
        std::fs::write(primary.join("sub/extra.bin"), "x").unwrap();

        let access = StoreAccess::new(&config);
        assert!(access.refresh_cache().await.unwrap());

        let cache = &config.store.cache_dir;
        assert!(cache.join("sub/extra.bin").exists());
        assert!(!cache.join("processed_files.json").exists());
        assert!(cache.join(SYNC_STAMP).exists());
        assert!(access.cache_is_fresh());
    }

    #[tokio::test]
    async fn stale_cache_is_not_fresh() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        std::fs::create_dir_all(&config.store.dir).unwrap();
        std::fs::create_dir_all(&config.store.cache_dir).unwrap();
        let manifest = config.store.manifest_path();
        let stamp = config.store.cache_dir.join(SYNC_STAMP);
        std::fs::write(&manifest, "{}").unwrap();
        std::fs::write(&stamp, "").unwrap();
        filetime::set_file_mtime(&stamp, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
        filetime::set_file_mtime(&manifest, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

        assert!(!StoreAccess::new(&config).cache_is_fresh());
    }

    #[test]
    fn stamped_cache_is_fresh_without_a_primary_manifest() {
        let tmp = TempDir::new().unwrap();
        let config = test_config(tmp.path());
        std::fs::create_dir_all(&config.store.cache_dir).unwrap();
        let access = StoreAccess::new(&config);
        assert!(!access.cache_is_fresh());

        std::fs::write(config.store.cache_dir.join(SYNC_STAMP), "").unwrap();
        assert!(access.cache_is_fresh());
    }

    #[tokio::test]
    async fn insert_skips_known_chunks_before_embedding() {
        let tmp = TempDir::new().unwrap();
        let access = StoreAccess::new(&test_config(tmp.path()));
        let embedder = Arc::new(HashEmbedder::new());
        let handle = access.open(embedder.clone()).await.unwrap();

        let first = access.insert(&handle, chunks(3)).await;
        assert_eq!(first.inserted, 3);
        assert_eq!(embedder.calls(), 1);

        let second = access.insert(&handle, chunks(3)).await;
        assert_eq!(second.inserted, 0);
        assert_eq!(second.already_present, 3);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn token_budget_halves_the_batch_until_it_fits() {
        let tmp = TempDir::new().unwrap();
        let access = StoreAccess::new(&test_config(tmp.path()));
        let embedder = Arc::new(HashEmbedder::with_max_batch(8));
        let handle = access.open(embedder.clone()).await.unwrap();

        let report = access.insert(&handle, chunks(20)).await;
        assert_eq!(report.inserted, 20);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.failed, 0);
        assert!(report.final_batch_size <= 8);
        assert_eq!(handle.count().await.unwrap(), 20);
    }

    #[tokio::test]
    async fn store_lookup_failure_counts_every_chunk_as_failed() {
        let tmp = TempDir::new().unwrap();
        let access = StoreAccess::new(&test_config(tmp.path()));
        let embedder = Arc::new(HashEmbedder::new());
        let handle = access.open(embedder.clone()).await.unwrap();
        handle.store().close().await;

        let report = access.insert(&handle, chunks(3)).await;
        assert_eq!(report.failed, 3);
        assert_eq!(report.inserted, 0);
        assert!(report.had_failures());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn chunk_over_budget_alone_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let access = StoreAccess::new(&test_config(tmp.path()));
        let handle = access
            .open(Arc::new(HashEmbedder::with_max_batch(0)))
            .await
            .unwrap();

        let report = access.insert(&handle, chunks(3)).await;
        assert_eq!(report.inserted, 0);
        assert_eq!(report.skipped, 3);
        assert!(!report.had_failures());
    }
}
