//! Session controller: one analyzed repository at a time.
//!
//! ```text
//! Uninitialized ──analyze──▶ Analyzing ──ok──▶ Ready ──analyze──▶ Analyzing ...
//!                                │
//!                                └─err──▶ Failed ──▶ Uninitialized
//! ```
//!
//! A [`Session`] is built completely before it is published, and it is
//! never mutated afterwards: a new analyze replaces the whole value.
//! Questions hold their own `Arc<Session>`, so a concurrent analyze cannot
//! change the session a question is being answered from.

use crate::answer;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, RagResult};
use crate::index::{IndexOptions, VectorIndex};
use crate::llm::ChatModel;
use crate::loader;
use crate::snapshot::{self, Snapshot, SnapshotSource};
use crate::splitter::TextSplitter;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Live state for one analyzed repository
pub struct Session {
    pub snapshot: Snapshot,
    pub index: VectorIndex,
    /// README text, always part of the prompt
    pub readme: String,
    pub chat: Arc<dyn ChatModel>,
    pub document_count: usize,
    pub chunk_count: usize,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("snapshot", &self.snapshot)
            .field("vectors", &self.index.len())
            .field("readme_bytes", &self.readme.len())
            .field("chat_model", &self.chat.model())
            .field("document_count", &self.document_count)
            .field("chunk_count", &self.chunk_count)
            .finish()
    }
}

pub enum SessionState {
    Uninitialized,
    Analyzing,
    Ready(Arc<Session>),
    Failed,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Analyzing => "analyzing",
            SessionState::Ready(_) => "ready",
            SessionState::Failed => "failed",
        }
    }
}

pub struct SessionController {
    fetcher: Arc<dyn SnapshotSource>,
    embedding: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    splitter: TextSplitter,
    index_options: IndexOptions,
    top_k: usize,
    state: RwLock<SessionState>,
    /// Message of the most recent failed analysis, cleared on success
    last_failure: RwLock<Option<String>>,
}

impl SessionController {
    pub fn new(
        fetcher: Arc<dyn SnapshotSource>,
        embedding: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatModel>,
        splitter: TextSplitter,
        index_options: IndexOptions,
        top_k: usize,
    ) -> Self {
        Self {
            fetcher,
            embedding,
            chat,
            splitter,
            index_options,
            top_k,
            state: RwLock::new(SessionState::Uninitialized),
            last_failure: RwLock::new(None),
        }
    }

    /// Fetch, load, split and index `url`, then publish the new session.
    ///
    /// The previous session is dropped as soon as analysis starts and its
    /// snapshot is disposed in the background. On failure the controller
    /// passes through `Failed`, ends up `Uninitialized`, and keeps the
    /// error message for [`SessionController::last_failure`].
    pub async fn analyze(&self, url: &str) -> RagResult<Arc<Session>> {
        {
            let mut state = self.state.write().await;
            if let SessionState::Ready(previous) =
                std::mem::replace(&mut *state, SessionState::Analyzing)
            {
                snapshot::dispose(previous.snapshot.path.clone());
            }
        }

        match self.build_session(url).await {
            Ok(session) => {
                let session = Arc::new(session);
                *self.last_failure.write().await = None;
                *self.state.write().await = SessionState::Ready(session.clone());
                tracing::info!("Session ready for {}", session.snapshot.url);
                Ok(session)
            }
            Err(e) => {
                // Separate writes: Failed is visible before the reset
                *self.state.write().await = SessionState::Failed;
                tracing::error!("Analysis of {} failed: {}", url, e);
                *self.last_failure.write().await = Some(e.to_string());
                *self.state.write().await = SessionState::Uninitialized;
                Err(e)
            }
        }
    }

    async fn build_session(&self, url: &str) -> RagResult<Session> {
        let snapshot = self.fetcher.fetch(url).await?;

        let loaded = loader::load(&snapshot.path);
        let chunks = self.splitter.split_documents(&loaded.documents);

        let index =
            match VectorIndex::build(&chunks, self.embedding.clone(), self.index_options).await {
                Ok(index) => index,
                Err(e) => {
                    snapshot::dispose(snapshot.path.clone());
                    return Err(e);
                }
            };

        Ok(Session {
            snapshot,
            index,
            readme: loaded.readme,
            chat: self.chat.clone(),
            document_count: loaded.documents.len(),
            chunk_count: chunks.len(),
        })
    }

    /// Answer a question from the current session.
    ///
    /// Rejected while an analysis is running; answered with the
    /// not-initialized message when no repository has been analyzed.
    pub async fn ask(&self, question: &str) -> RagResult<String> {
        let session = match &*self.state.read().await {
            SessionState::Ready(session) => Some(session.clone()),
            SessionState::Analyzing => {
                return Err(RagError::SessionNotReady { state: "analyzing" })
            }
            SessionState::Uninitialized | SessionState::Failed => None,
        };

        answer::answer(session.as_deref(), question, self.top_k).await
    }

    /// The published session, if any
    pub async fn current(&self) -> Option<Arc<Session>> {
        match &*self.state.read().await {
            SessionState::Ready(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub async fn state_name(&self) -> &'static str {
        self.state.read().await.name()
    }

    /// Why the most recent analysis failed, if it did
    pub async fn last_failure(&self) -> Option<String> {
        self.last_failure.read().await.clone()
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.read().await, SessionState::Ready(_))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::index::tests::LetterEmbedding;
    use anyhow::Result;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Writes a fixed file tree into a fresh snapshot directory.
    pub(crate) struct FixtureSource {
        pub workspace: PathBuf,
        pub files: Vec<(&'static str, &'static str)>,
    }

    #[async_trait::async_trait]
    impl SnapshotSource for FixtureSource {
        async fn fetch(&self, url: &str) -> RagResult<Snapshot> {
            if url.contains("missing") {
                return Err(RagError::RepositoryFetch {
                    url: url.to_string(),
                    source: anyhow::anyhow!("repository not found"),
                });
            }
            let path = snapshot::new_snapshot_path(&self.workspace);
            for (rel, content) in &self.files {
                let file = path.join(rel);
                std::fs::create_dir_all(file.parent().unwrap()).unwrap();
                std::fs::write(file, content).unwrap();
            }
            std::fs::create_dir_all(&path).unwrap();
            Ok(Snapshot {
                url: url.to_string(),
                path,
            })
        }
    }

    /// Records every prompt and answers with a canned reply.
    #[derive(Default)]
    pub(crate) struct RecordingChat {
        pub prompts: Mutex<Vec<String>>,
        pub fail: bool,
    }

    #[async_trait::async_trait]
    impl ChatModel for RecordingChat {
        async fn complete(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                anyhow::bail!("model overloaded");
            }
            Ok("canned answer".to_string())
        }

        fn model(&self) -> &str {
            "recording"
        }
    }

    pub(crate) fn controller(
        source: FixtureSource,
        embedding: LetterEmbedding,
        chat: Arc<RecordingChat>,
    ) -> SessionController {
        SessionController::new(
            Arc::new(source),
            Arc::new(embedding),
            chat,
            TextSplitter::default(),
            IndexOptions::default(),
            4,
        )
    }

    async fn wait_until_removed(path: &Path) -> bool {
        for _ in 0..100 {
            if !path.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    fn primary_context(prompt: &str) -> &str {
        let start = prompt.find("**Primary Context (from README.md):**\n").unwrap()
            + "**Primary Context (from README.md):**\n".len();
        let end = start + prompt[start..].find("\n---\n").unwrap();
        &prompt[start..end]
    }

    #[tokio::test]
    async fn test_readme_only_repository_feeds_primary_context() {
        let workspace = tempfile::tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("README.md", "Hello world project.")],
            },
            LetterEmbedding::new(),
            chat.clone(),
        );

        let session = controller.analyze("https://example.com/hello.git").await.unwrap();
        assert_eq!(session.readme, "Hello world project.");
        assert_eq!(session.document_count, 1);
        assert_eq!(controller.state_name().await, "ready");

        let reply = controller.ask("What is this project?").await.unwrap();
        assert_eq!(reply, "canned answer");

        let prompts = chat.prompts.lock().unwrap();
        assert_eq!(primary_context(&prompts[0]), "Hello world project.");
        assert!(prompts[0].contains("**User's Question:** What is this project?"));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_session_uninitialized() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat::default()),
        );

        let err = controller
            .analyze("https://example.com/missing.git")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::RepositoryFetch { .. }));
        assert_eq!(controller.state_name().await, "uninitialized");
        assert!(controller
            .last_failure()
            .await
            .unwrap()
            .contains("repository not found"));
        assert!(controller.current().await.is_none());
        assert_eq!(
            controller.ask("hello?").await.unwrap(),
            answer::NOT_INITIALIZED_MESSAGE
        );
    }

    #[tokio::test]
    async fn test_second_analyze_replaces_session() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("README.md", "# Demo"), ("src/app.py", "print('hi')")],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat::default()),
        );

        let first = controller.analyze("https://example.com/one.git").await.unwrap();
        let second = controller.analyze("https://example.com/two.git").await.unwrap();

        assert_ne!(first.snapshot.path, second.snapshot.path);
        let current = controller.current().await.unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
        assert!(wait_until_removed(&first.snapshot.path).await);
        assert!(second.snapshot.path.exists());
    }

    #[tokio::test]
    async fn test_empty_repository_answers_from_empty_context() {
        let workspace = tempfile::tempdir().unwrap();
        let chat = Arc::new(RecordingChat::default());
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("logo.png", "not text")],
            },
            LetterEmbedding::new(),
            chat.clone(),
        );

        let session = controller.analyze("https://example.com/empty.git").await.unwrap();
        assert_eq!(session.chunk_count, 0);
        assert!(session.index.is_empty());

        let reply = controller.ask("What is this?").await.unwrap();
        assert_eq!(reply, "canned answer");
        assert_eq!(primary_context(&chat.prompts.lock().unwrap()[0]), "");
    }

    #[tokio::test]
    async fn test_embedding_failure_discards_snapshot() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("main.go", "package main")],
            },
            LetterEmbedding::failing(),
            Arc::new(RecordingChat::default()),
        );

        let err = controller
            .analyze("https://example.com/go.git")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingService(_)));
        assert!(!controller.is_ready().await);

        let mut leftovers = true;
        for _ in 0..100 {
            if std::fs::read_dir(workspace.path()).unwrap().count() == 0 {
                leftovers = false;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!leftovers, "failed analysis left its snapshot behind");
    }

    #[tokio::test]
    async fn test_answer_failure_keeps_session_usable() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("README.md", "# Demo")],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat {
                fail: true,
                ..Default::default()
            }),
        );

        controller.analyze("https://example.com/demo.git").await.unwrap();
        let err = controller.ask("Why?").await.unwrap_err();
        assert!(matches!(err, RagError::AnswerGeneration(_)));
        assert!(controller.is_ready().await);
    }

    #[tokio::test]
    async fn test_questions_rejected_while_analyzing() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat::default()),
        );

        *controller.state.write().await = SessionState::Analyzing;
        let err = controller.ask("Too early?").await.unwrap_err();
        assert!(matches!(err, RagError::SessionNotReady { state: "analyzing" }));
    }

    #[tokio::test]
    async fn test_session_debug_shows_snapshot_and_counts() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("README.md", "# Demo"), ("app.py", "print('hi')")],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat::default()),
        );

        let session = controller.analyze("https://example.com/demo.git").await.unwrap();
        let debug = format!("{:?}", session);
        assert!(debug.contains("https://example.com/demo.git"));
        assert!(debug.contains("document_count: 2"));
        assert!(debug.contains("chat_model: \"recording\""));
    }

    #[tokio::test]
    async fn test_success_clears_previous_failure() {
        let workspace = tempfile::tempdir().unwrap();
        let controller = controller(
            FixtureSource {
                workspace: workspace.path().to_path_buf(),
                files: vec![("README.md", "# Demo")],
            },
            LetterEmbedding::new(),
            Arc::new(RecordingChat::default()),
        );

        assert!(controller.analyze("https://example.com/missing.git").await.is_err());
        assert!(controller.last_failure().await.is_some());

        controller.analyze("https://example.com/demo.git").await.unwrap();
        assert!(controller.last_failure().await.is_none());
        assert_eq!(controller.state_name().await, "ready");
    }
}
