use crate::mcp::types::Content;
use crate::session::SessionController;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;

/// Tool handlers for MCP server
pub struct ToolHandlers {
    controller: Arc<SessionController>,
}

impl ToolHandlers {
    pub fn new(controller: Arc<SessionController>) -> Self {
        Self { controller }
    }

    /// Whether `ask_question` is currently offered
    pub async fn accepts_questions(&self) -> bool {
        self.controller.is_ready().await
    }

    /// Handle analyze_repository tool
    pub async fn handle_analyze_repository(&self, args: &Value) -> Result<Vec<Content>> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .context("Missing 'url' argument")?
            .trim();

        if url.is_empty() {
            anyhow::bail!("Please enter a repository URL.");
        }

        let session = self.controller.analyze(url).await?;

        Ok(vec![Content::text(format!(
            "Repository analyzed successfully! You can now ask questions.\n\
             Repository: {}\n\
             Documents: {}\n\
             Chunks: {}\n\
             README: {}",
            session.snapshot.url,
            session.document_count,
            session.chunk_count,
            if session.readme.is_empty() { "not found" } else { "found" },
        ))])
    }

    /// Handle ask_question tool
    pub async fn handle_ask_question(&self, args: &Value) -> Result<Vec<Content>> {
        let question = args
            .get("question")
            .and_then(|v| v.as_str())
            .context("Missing 'question' argument")?
            .trim();

        if question.is_empty() {
            anyhow::bail!("Please enter a question about the codebase.");
        }

        let answer = self.controller.ask(question).await?;
        Ok(vec![Content::text(answer)])
    }

    /// Handle get_session_status tool
    pub async fn handle_get_session_status(&self, _args: &Value) -> Result<Vec<Content>> {
        let text = match self.controller.current().await {
            Some(session) => format!(
                "Status: ready\nRepository: {}\nSnapshot: {}\nDocuments: {}\nChunks: {}\nIndexed vectors: {}\nREADME: {}",
                session.snapshot.url,
                session.snapshot.path.display(),
                session.document_count,
                session.chunk_count,
                session.index.len(),
                if session.readme.is_empty() { "not found" } else { "found" },
            ),
            None => {
                let mut text = format!("Status: {}", self.controller.state_name().await);
                if let Some(failure) = self.controller.last_failure().await {
                    text.push_str(&format!("\nLast analysis failed: {}", failure));
                }
                text
            }
        };

        Ok(vec![Content::text(text)])
    }
}
