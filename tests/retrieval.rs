//! Library-level flow: ingest a content directory, load the written index
//! through the store, and answer through the assistant.

use async_trait::async_trait;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use folio::ask::{Answer, Assistant};
use folio::chat::{ChatCompleter, ChatError};
use folio::config::{AnchorConfig, Config};
use folio::embedding::{Embedder, EmbeddingError};
use folio::index_store::{FileIndexFetcher, IndexStore};
use folio::ingest::run_ingest;
use folio::models::ChatTurn;

/// Maps text to a 3-d topic vector by keyword: work, hobbies, other.
struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let t = text.to_lowercase();
        let v = if t.contains("rust") || t.contains("engineer") {
            vec![1.0, 0.0, 0.0]
        } else if t.contains("climb") {
            vec![0.0, 1.0, 0.0]
        } else {
            vec![0.0, 0.0, 1.0]
        };
        Ok(v)
    }

    fn model_name(&self) -> &str {
        "keyword"
    }
}

#[derive(Default)]
struct CapturingChat {
    seen: Mutex<Vec<(String, String, usize)>>,
}

#[async_trait]
impl ChatCompleter for CapturingChat {
    async fn complete(
        &self,
        message: &str,
        context: &str,
        history: &[ChatTurn],
    ) -> Result<String, ChatError> {
        self.seen
            .lock()
            .unwrap()
            .push((message.to_string(), context.to_string(), history.len()));
        Ok("answer".to_string())
    }
}

fn build_site() -> (TempDir, Config) {
    let dir = TempDir::new().unwrap();
    let content = dir.path().join("content");
    fs::create_dir_all(&content).unwrap();
    fs::write(
        content.join("experience.md"),
        "## Acme\nRust engineer on storage.\n## Globex\nRust engineer on networking.\n## Initech\nRust engineer on billing.",
    )
    .unwrap();
    fs::write(content.join("hobbies.md"), "I climb on weekends.").unwrap();
    fs::write(content.join("resume.json"), r#"{"summary": "Generalist"}"#).unwrap();

    let mut cfg = Config::default();
    cfg.content.root = content;
    cfg.index.path = dir.path().join("static/data/index.json");
    cfg.retrieval.top_k = 3;
    cfg.retrieval.anchors = vec![AnchorConfig {
        source: "resume.json".to_string(),
        boost: 0.0,
    }];
    (dir, cfg)
}

#[tokio::test]
async fn test_ingest_then_answer() {
    let (_dir, cfg) = build_site();
    let report = run_ingest(&cfg, &KeywordEmbedder, false).await.unwrap();
    assert_eq!(report.chunks, 5);

    let store = Arc::new(IndexStore::new(Arc::new(FileIndexFetcher::new(&cfg.index.path))));
    let chat = Arc::new(CapturingChat::default());
    let assistant = Assistant::new(&cfg, store.clone(), Arc::new(KeywordEmbedder), chat.clone());

    let history = vec![ChatTurn::user("hi"), ChatTurn::assistant("hello")];
    let answer = assistant
        .answer("What Rust work have you done?", &history)
        .await
        .unwrap();

    // Two experience chunks (cap of ceil(3/2)); the backfilled hobbies
    // chunk gives way to the resume anchor.
    match &answer {
        Answer::Grounded { reply, sources } => {
            assert_eq!(reply, "answer");
            assert_eq!(sources.len(), 2);
            assert!(sources[0].ends_with("experience.md"));
            assert!(sources[1].ends_with("resume.json"));
        }
        other => panic!("expected grounded answer, got {:?}", other),
    }

    let seen = chat.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (message, context, prior) = &seen[0];
    assert_eq!(message, "What Rust work have you done?");
    assert_eq!(*prior, 2);
    assert!(context.contains("## Acme"));
    assert!(context.contains("-----\n{\"summary\": \"Generalist\"}"));
    assert!(!context.contains("climb"));

    assert_eq!(store.get().unwrap().len(), 5);
}

#[tokio::test]
async fn test_unrelated_question_is_refused() {
    let (_dir, mut cfg) = build_site();
    // Without the resume every chunk is orthogonal to an off-topic query.
    fs::remove_file(cfg.content.root.join("resume.json")).unwrap();
    cfg.retrieval.anchors.clear();
    run_ingest(&cfg, &KeywordEmbedder, false).await.unwrap();

    let store = Arc::new(IndexStore::new(Arc::new(FileIndexFetcher::new(&cfg.index.path))));
    let chat = Arc::new(CapturingChat::default());
    let assistant = Assistant::new(&cfg, store, Arc::new(KeywordEmbedder), chat.clone());

    let answer = assistant.answer("Best pizza in town?", &[]).await.unwrap();
    assert_eq!(
        answer,
        Answer::OutOfScope {
            reply: cfg.chat.refusal.clone()
        }
    );
    assert!(chat.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_index_still_answers() {
    let (dir, cfg) = build_site();
    let store = Arc::new(IndexStore::new(Arc::new(FileIndexFetcher::new(
        dir.path().join("missing.json"),
    ))));
    let chat = Arc::new(CapturingChat::default());
    let assistant = Assistant::new(&cfg, store, Arc::new(KeywordEmbedder), chat.clone());

    let answer = assistant.answer("Anything?", &[]).await.unwrap();
    assert!(answer.sources().is_empty());
    assert_eq!(chat.seen.lock().unwrap()[0].1, "");
}
