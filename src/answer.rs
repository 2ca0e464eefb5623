//! Conversational answering.
//!
//! [`answer`] is a pure function of its inputs: each call builds its own
//! composite retriever and prompt, so nothing is shared between requests.
//!
//! 1. **Contextualize**: with history present, the model rewrites the latest
//!    question into a standalone one. With no history the question is used
//!    as-is and no model call is made.
//! 2. **Answer**: retrieve with the standalone question (persisted results,
//!    then request-scoped chunks) and ask the model with the persona, the
//!    context block, the history, and the original question.

use tracing::debug;

use crate::error::AnswerError;
use crate::llm::{ChatModel, PromptMessage};
use crate::models::{ChatMessage, DocumentChunk};
use crate::retriever::{CompositeRetriever, Retriever};

const CONTEXTUALIZE_PROMPT: &str = "Given the conversation so far and the latest user question, \
which may refer to earlier turns, rewrite the question so it can be understood without the \
conversation. Do not answer it. Return only the rewritten question, or the question unchanged \
if it already stands on its own.";

const PERSONA_PROMPT: &str = "You are a document assistant for an internal team. Answer using \
the retrieved context below. If the context does not contain the information needed, say so \
plainly. If you then answer from general knowledge, state clearly that the answer is not based \
on the provided documents. Keep answers concise and cite the source file names you relied on.";

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub question: String,
    pub chat_history: Vec<ChatMessage>,
    /// Chat model identifier, e.g. `"gpt-4o-mini"`.
    pub model: String,
    /// Chunks from files attached to this request only.
    pub ephemeral_chunks: Vec<DocumentChunk>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub answer: String,
}

pub async fn answer(
    request: AnswerRequest,
    chat_model: &dyn ChatModel,
    persisted: &dyn Retriever,
) -> Result<Answer, AnswerError> {
    let AnswerRequest {
        question,
        chat_history,
        model,
        ephemeral_chunks,
    } = request;

    let standalone = contextualize(&question, &chat_history, &model, chat_model).await?;
    debug!(question = %standalone, "retrieving context");

    let retriever = CompositeRetriever::new(persisted, ephemeral_chunks);
    let context = retriever.retrieve(&standalone).await?;

    let mut messages = Vec::with_capacity(chat_history.len() + 2);
    messages.push(PromptMessage::system(format!(
        "{}\n\nContext:\n{}",
        PERSONA_PROMPT,
        format_context(&context)
    )));
    messages.extend(chat_history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::user(question));

    let text = chat_model.complete(&model, &messages).await?;
    Ok(Answer { answer: text })
}

async fn contextualize(
    question: &str,
    history: &[ChatMessage],
    model: &str,
    chat_model: &dyn ChatModel,
) -> Result<String, AnswerError> {
    if history.is_empty() {
        return Ok(question.to_string());
    }

    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(PromptMessage::system(CONTEXTUALIZE_PROMPT));
    messages.extend(history.iter().map(PromptMessage::from));
    messages.push(PromptMessage::user(question));

    let rewritten = chat_model.complete(model, &messages).await?;
    let rewritten = rewritten.trim();
    if rewritten.is_empty() {
        Ok(question.to_string())
    } else {
        Ok(rewritten.to_string())
    }
}

/// Render retrieved chunks as the context block, one labelled section each.
pub fn format_context(chunks: &[DocumentChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| {
            let mut label = format!("[{}", chunk.metadata.source);
            if let Some(page) = chunk.metadata.page {
                label.push_str(&format!(", page {}", page));
            }
            if let Some(slide) = chunk.metadata.slide {
                label.push_str(&format!(", slide {}", slide));
            }
            if let Some(ref sheet) = chunk.metadata.sheet {
                label.push_str(&format!(", sheet {}", sheet));
            }
            label.push(']');
            format!("{}\n{}", label, chunk.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ChatError, StoreError};
    use crate::models::ChunkMetadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct ScriptedModel {
        calls: Mutex<Vec<Vec<PromptMessage>>>,
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn complete(&self, _model: &str, messages: &[PromptMessage]) -> Result<String, ChatError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            Ok(if calls.len() == 1 && messages[0].content == CONTEXTUALIZE_PROMPT {
                "What is the refund window for hardware?".to_string()
            } else {
                "Thirty days.".to_string()
            })
        }
    }

    struct RecordingRetriever {
        queries: Mutex<Vec<String>>,
        results: Vec<DocumentChunk>,
    }

    #[async_trait]
    impl Retriever for RecordingRetriever {
        async fn retrieve(&self, query: &str) -> Result<Vec<DocumentChunk>, StoreError> {
            self.queries.lock().unwrap().push(query.to_string());
            Ok(self.results.clone())
        }
    }

    fn request(history: Vec<ChatMessage>, ephemeral: Vec<DocumentChunk>) -> AnswerRequest {
        AnswerRequest {
            question: "and for hardware?".to_string(),
            chat_history: history,
            model: "gpt-4o-mini".to_string(),
            ephemeral_chunks: ephemeral,
        }
    }

    #[tokio::test]
    async fn empty_history_skips_rewrite() {
        let model = ScriptedModel::default();
        let retriever = RecordingRetriever {
            queries: Mutex::new(Vec::new()),
            results: Vec::new(),
        };

        let out = answer(request(Vec::new(), Vec::new()), &model, &retriever)
            .await
            .unwrap();

        assert_eq!(out.answer, "Thirty days.");
        assert_eq!(model.calls.lock().unwrap().len(), 1);
        assert_eq!(*retriever.queries.lock().unwrap(), vec!["and for hardware?"]);
    }

    #[tokio::test]
    async fn history_triggers_rewrite_and_retrieval_uses_it() {
        let model = ScriptedModel::default();
        let retriever = RecordingRetriever {
            queries: Mutex::new(Vec::new()),
            results: vec![DocumentChunk::new("Refunds within 30 days.", ChunkMetadata::new("policy.pdf"))],
        };
        let history = vec![
            ChatMessage::user("What is the refund window?"),
            ChatMessage::assistant("Fourteen days for software."),
        ];
        let attached = DocumentChunk::new("Hardware: 30 days.", ChunkMetadata::new("upload.txt"));

        let out = answer(request(history, vec![attached]), &model, &retriever)
            .await
            .unwrap();

        assert_eq!(out.answer, "Thirty days.");
        assert_eq!(
            *retriever.queries.lock().unwrap(),
            vec!["What is the refund window for hardware?"]
        );

        let calls = model.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let final_call = &calls[1];
        assert_eq!(final_call[0].role, "system");
        assert!(final_call[0].content.contains("[policy.pdf]\nRefunds within 30 days."));
        assert!(final_call[0].content.contains("[upload.txt]\nHardware: 30 days."));
        assert_eq!(final_call.len(), 4);
        assert_eq!(final_call[3], PromptMessage::user("and for hardware?"));
    }

    #[test]
    fn context_labels_carry_location() {
        let mut meta = ChunkMetadata::new("deck.pptx");
        meta.slide = Some(3);
        let text = format_context(&[DocumentChunk::new("Revenue up", meta)]);
        assert_eq!(text, "[deck.pptx, slide 3]\nRevenue up");
    }
}
