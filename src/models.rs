//! Core data models used throughout docqa.
//!
//! These types represent the text units, chunks, and chat turns that flow
//! through the ingestion and answering pipeline.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Structural tag attached to units extracted from tabular content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Table,
}

/// Where a piece of text came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Source path, relative to the ingestion root (or the upload name).
    pub source: String,
    /// 1-based slide number for presentation content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide: Option<usize>,
    /// 1-based page number for PDF content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<usize>,
    /// Worksheet name for spreadsheet content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChunkKind>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn table(mut self) -> Self {
        self.kind = Some(ChunkKind::Table);
        self
    }
}

/// One plain-text unit produced by the format extractor, before chunking.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceUnit {
    pub text: String,
    pub metadata: ChunkMetadata,
}

impl SourceUnit {
    pub fn new(text: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// A bounded, non-empty text segment: the unit stored in and retrieved from
/// the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

impl DocumentChunk {
    pub fn new(content: impl Into<String>, metadata: ChunkMetadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// SHA-256 over source, metadata, and content. Used as the store's
    /// primary key so identical chunks are never stored twice.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.metadata.source.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.metadata_json().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn metadata_json(&self) -> String {
        serde_json::to_string(&self.metadata).unwrap_or_else(|_| "{}".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One turn of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_serializes_table_tag_as_type() {
        let meta = ChunkMetadata::new("sheet.csv").table();
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "table");
        assert_eq!(json["source"], "sheet.csv");
        assert!(json.get("slide").is_none());
    }

    #[test]
    fn content_hash_depends_on_source_and_content() {
        let a = DocumentChunk::new("same text", ChunkMetadata::new("a.txt"));
        let b = DocumentChunk::new("same text", ChunkMetadata::new("b.txt"));
        let a2 = DocumentChunk::new("same text", ChunkMetadata::new("a.txt"));
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash(), a2.content_hash());
    }

    #[test]
    fn chat_history_parses_from_wire_shape() {
        let raw = r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#;
        let history: Vec<ChatMessage> = serde_json::from_str(raw).unwrap();
        assert_eq!(history[0], ChatMessage::user("hi"));
        assert_eq!(history[1].role, Role::Assistant);
    }
}
