use std::sync::Arc;

use nexora_core::prompt::NO_CONTEXT_ANSWER;
use nexora_core::retriever::RetrievalParams;
use nexora_core::{AskRequest, ErrorKind, RagService, ServiceOptions};
use nexora_llm::hashing::HashingEmbedder;
use nexora_llm::mock::MockProvider;
use nexora_memory::document::{SplitterConfig, TextSplitter};
use nexora_memory::{
    InMemoryIndex, MessageRole, SourceType, SqliteIndex, SqliteStore, TenantId, VectorIndex,
};

type Service = RagService<HashingEmbedder, MockProvider>;

async fn in_memory_service(generator: MockProvider) -> Service {
    let store = SqliteStore::new(":memory:").await.unwrap();
    RagService::new(
        HashingEmbedder::default(),
        generator,
        Arc::new(InMemoryIndex::new()),
        store,
        ServiceOptions::default(),
    )
    .unwrap()
}

fn tenant(id: &str) -> TenantId {
    TenantId::new(id).unwrap()
}

fn python_chunks() -> Vec<String> {
    vec![
        "Python is a language.".into(),
        "It was created in 1991.".into(),
    ]
}

// -- Chunker --

fn reconstruct(chunks: &[String], overlap: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i == 0 {
            out.push_str(chunk);
        } else {
            out.extend(chunk.chars().skip(overlap));
        }
    }
    out
}

#[test]
fn chunks_cover_document_and_are_deterministic() {
    let text = "Nexora answers questions from ingested documents.\n\n\
                Each tenant has its own corpus. Sessions keep the conversation.\n\n"
        .repeat(20);
    let splitter = TextSplitter::new(SplitterConfig {
        chunk_size: 120,
        chunk_overlap: 20,
    })
    .unwrap();

    let first = splitter.split(&text);
    let second = splitter.split(&text);
    assert!(first.len() > 1);
    assert_eq!(first, second);
    assert_eq!(reconstruct(&first, 20), text);
    assert!(first.iter().all(|c| c.chars().count() <= 120));
}

// -- Ingestion and retrieval --

#[tokio::test]
async fn tenants_never_see_each_others_chunks() {
    let service = in_memory_service(MockProvider::default()).await;
    let a = tenant("tenant-a");
    let b = tenant("tenant-b");
    service
        .ingest_chunks(&a, "wiki/python", SourceType::Web, python_chunks())
        .await
        .unwrap();
    service
        .ingest_chunks(
            &b,
            "wiki/python",
            SourceType::Web,
            vec!["Python is a snake found in Africa and Asia.".into()],
        )
        .await
        .unwrap();

    let params = RetrievalParams {
        top_k: 10,
        min_score: -1.0,
    };
    let hits = service
        .pipeline()
        .retriever()
        .retrieve(&a, "What is Python?", params)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.chunk.tenant_id == a));
}

#[tokio::test]
async fn repeated_ingest_does_not_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nexora.db");
    let store = SqliteStore::new(path.to_str().unwrap()).await.unwrap();
    let index: Arc<dyn VectorIndex> = Arc::new(SqliteIndex::new(store.pool().clone()));
    let service = RagService::new(
        HashingEmbedder::default(),
        MockProvider::default(),
        Arc::clone(&index),
        store,
        ServiceOptions::default(),
    )
    .unwrap();
    let t = tenant("acme");

    for _ in 0..2 {
        let stored = service
            .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
            .await
            .unwrap();
        assert_eq!(stored, 2);
    }
    assert_eq!(index.count(&t).await.unwrap(), 2);
    assert_eq!(service.stats(&t).await.unwrap().chunks, 2);
}

// -- Answering --

#[tokio::test]
async fn empty_corpus_gets_fixed_answer() {
    let generator = MockProvider::default();
    let service = in_memory_service(generator.clone()).await;

    let answer = service
        .ask(AskRequest::new(tenant("fresh"), "anything"))
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
    assert_eq!(generator.generate_calls(), 0);
}

#[tokio::test]
async fn python_question_cites_source() {
    let generator =
        MockProvider::with_responses(vec!["Python is a programming language [Document 1].".into()]);
    let service = in_memory_service(generator.clone()).await;
    let t = tenant("acme");
    service
        .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
        .await
        .unwrap();

    let answer = service
        .ask(AskRequest::new(t, "What is Python?"))
        .await
        .unwrap();
    assert_eq!(answer.sources, vec!["wiki/python"]);
    let context = &generator.last_messages()[0].content;
    assert!(context.contains("Python is a language."));
}

#[tokio::test]
async fn deleted_source_is_no_longer_answered() {
    let service = in_memory_service(MockProvider::default()).await;
    let t = tenant("acme");
    service
        .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
        .await
        .unwrap();

    assert_eq!(service.delete_source(&t, "wiki/python").await.unwrap(), 2);
    assert_eq!(service.delete_source(&t, "wiki/python").await.unwrap(), 0);

    let answer = service
        .ask(AskRequest::new(t, "What is Python?"))
        .await
        .unwrap();
    assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn session_history_is_append_only() {
    let service = in_memory_service(MockProvider::default()).await;
    let t = tenant("acme");
    service
        .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
        .await
        .unwrap();

    let questions = [
        "What is Python?",
        "When was it created?",
        "Is Python a language?",
        "Who uses Python?",
    ];
    let mut session = None;
    for question in questions {
        let mut request = AskRequest::new(t.clone(), question);
        if let Some(id) = session.clone() {
            request = request.in_session(id);
        }
        let answer = service.ask(request).await.unwrap();
        if let Some(id) = &session {
            assert_eq!(&answer.session_id, id);
        }
        session = Some(answer.session_id);
    }

    let history = service
        .get_history(&t, &session.unwrap())
        .await
        .unwrap();
    assert_eq!(history.len(), questions.len() * 2);
    for (pair, question) in history.chunks(2).zip(questions) {
        assert_eq!(pair[0].role, MessageRole::User);
        assert_eq!(pair[0].content, question);
        assert_eq!(pair[1].role, MessageRole::Assistant);
    }
}

#[tokio::test]
async fn corpus_is_bound_to_its_embedding_model() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nexora.db");
    let path = path.to_str().unwrap();
    let t = tenant("acme");

    {
        let store = SqliteStore::new(path).await.unwrap();
        let index = Arc::new(SqliteIndex::new(store.pool().clone()));
        let service = RagService::new(
            HashingEmbedder::new(64),
            MockProvider::default(),
            index,
            store,
            ServiceOptions::default(),
        )
        .unwrap();
        service
            .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
            .await
            .unwrap();
    }

    let store = SqliteStore::new(path).await.unwrap();
    let index = Arc::new(SqliteIndex::new(store.pool().clone()));
    let service = RagService::new(
        HashingEmbedder::new(128),
        MockProvider::default(),
        index,
        store,
        ServiceOptions::default(),
    )
    .unwrap();

    let err = service
        .ask(AskRequest::new(t.clone(), "What is Python?"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let report = service.purge_tenant(&t).await.unwrap();
    assert_eq!(report.chunks_deleted, 2);
    service
        .ingest_chunks(&t, "wiki/python", SourceType::Web, python_chunks())
        .await
        .unwrap();
}
