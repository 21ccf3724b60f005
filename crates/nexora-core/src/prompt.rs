use std::fmt::Write as _;

use nexora_llm::Message;
use nexora_memory::{ChatMessage, MessageRole, ScoredChunk};

/// Answer returned without calling the generator when retrieval finds nothing.
pub const NO_CONTEXT_ANSWER: &str = "I don't have information about that.";

#[must_use]
pub fn system_instruction() -> String {
    format!(
        "You are Nexora, an assistant that answers questions from the documentation it is given.\n\
         \n\
         Rules:\n\
         1. Answer using ONLY the information in the provided context documents.\n\
         2. If the answer is not in the context, reply exactly: \"{NO_CONTEXT_ANSWER}\"\n\
         3. Cite the documents you used as [Document N].\n\
         4. Be concise but complete, in a friendly and professional tone.\n\
         \n\
         Never invent information that is not in the documents."
    )
}

/// Render retrieved chunks as numbered, source-tagged documents.
#[must_use]
pub fn format_context(chunks: &[ScoredChunk]) -> String {
    let mut out = String::new();
    for (i, hit) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let _ = write!(
            out,
            "[Document {}]\nSource: {}\nRelevance: {:.2}\nContent:\n{}",
            i + 1,
            hit.chunk.source_url,
            hit.score,
            hit.chunk.content
        );
    }
    out
}

/// Distinct source URLs in retrieval order.
#[must_use]
pub fn distinct_sources(chunks: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for hit in chunks {
        if !sources.iter().any(|s| *s == hit.chunk.source_url) {
            sources.push(hit.chunk.source_url.clone());
        }
    }
    sources
}

/// Assemble the generator input: system instruction with context, bounded history as
/// prior turns, then the current question.
#[must_use]
pub fn build_messages(
    question: &str,
    chunks: &[ScoredChunk],
    history: &[ChatMessage],
) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(format!(
        "{}\n\nContext Documents:\n\n{}",
        system_instruction(),
        format_context(chunks)
    )));
    for turn in history {
        messages.push(match turn.role {
            MessageRole::User => Message::user(&turn.content),
            MessageRole::Assistant => Message::assistant(&turn.content),
        });
    }
    messages.push(Message::user(question));
    messages
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use nexora_llm::Role;
    use nexora_memory::{Chunk, SourceType, TenantId};

    use super::*;

    fn hit(source: &str, index: u32, content: &str, score: f32) -> ScoredChunk {
        let tenant = TenantId::new("t").unwrap();
        ScoredChunk {
            chunk: Chunk {
                id: Chunk::point_id(&tenant, source, index).to_string(),
                tenant_id: tenant,
                source_url: source.into(),
                source_type: SourceType::Web,
                content: content.into(),
                chunk_index: index,
                total_chunks: 2,
                embedding: Vec::new(),
                embedding_model: "hashing-384".into(),
                created_at: Utc::now(),
            },
            score,
        }
    }

    #[test]
    fn context_tags_each_document_with_source() {
        let chunks = [
            hit("wiki/python", 0, "Python is a language.", 0.8123),
            hit("wiki/rust", 0, "Rust is fast.", 0.5),
        ];
        let context = format_context(&chunks);
        assert_eq!(
            context,
            "[Document 1]\nSource: wiki/python\nRelevance: 0.81\nContent:\nPython is a language.\n\n\
             [Document 2]\nSource: wiki/rust\nRelevance: 0.50\nContent:\nRust is fast."
        );
    }

    #[test]
    fn sources_are_distinct_in_order() {
        let chunks = [
            hit("b", 0, "x", 0.9),
            hit("a", 1, "y", 0.8),
            hit("b", 1, "z", 0.7),
        ];
        assert_eq!(distinct_sources(&chunks), vec!["b", "a"]);
    }

    #[test]
    fn messages_end_with_question_after_history() {
        let history = vec![
            ChatMessage::user("What is Python?"),
            ChatMessage::assistant("A language.", vec!["wiki/python".into()]),
        ];
        let chunks = [hit("wiki/python", 1, "It was created in 1991.", 0.7)];
        let messages = build_messages("When was it created?", &chunks, &history);

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("It was created in 1991."));
        assert!(messages[0].content.contains(NO_CONTEXT_ANSWER));
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[3], Message::user("When was it created?"));
    }
}
