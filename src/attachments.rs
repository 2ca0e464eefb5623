//! Request-scoped attachments.
//!
//! Files attached to a question are extracted and chunked in memory only.
//! They never reach the store or the manifest. Any extension the extractor
//! does not know is read as lossy UTF-8 text.

use std::path::Path;

use tracing::debug;

use crate::chunk::Chunker;
use crate::config::OcrConfig;
use crate::error::ExtractError;
use crate::extract::{self, FileKind};
use crate::models::DocumentChunk;

/// Extract and chunk each attachment, labelling chunks with the file name.
pub fn load_attachments(
    paths: &[impl AsRef<Path>],
    ocr: &OcrConfig,
    chunker: &Chunker,
) -> Result<Vec<DocumentChunk>, ExtractError> {
    let mut chunks = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let units = if FileKind::from_path(path).is_supported() {
            extract::extract_file(path, &name, ocr)?
        } else {
            let bytes = std::fs::read(path).map_err(|source| ExtractError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            extract::extract_plain(&bytes, &name)
        };

        let before = chunks.len();
        chunks.extend(chunker.split_units(&units));
        debug!(file = %name, chunks = chunks.len() - before, "attachment loaded");
    }
    Ok(chunks)
}
