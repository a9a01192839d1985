use super::protocol::Protocol;
use super::types::*;
use crate::config::Config;
use crate::handlers::tool_handlers::ToolHandlers;
use crate::index::IndexOptions;
use crate::session::SessionController;
use crate::snapshot::GitFetcher;
use crate::splitter::TextSplitter;
use crate::{embedding, llm};
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "repo-chat";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

const ANALYZE_TOOL: &str = "analyze_repository";
const ASK_TOOL: &str = "ask_question";
const STATUS_TOOL: &str = "get_session_status";

/// Main MCP Server
pub struct McpServer {
    protocol: Protocol,
    tool_handlers: Arc<Mutex<ToolHandlers>>,
}

impl McpServer {
    pub fn new(config: &Config) -> Result<Self> {
        let embedding = embedding::from_config(config)?;
        let chat = llm::from_config(config)?;
        let fetcher = Arc::new(GitFetcher::new(&config.workspace_dir, config.clone_timeout));
        let splitter = TextSplitter::new(config.chunk_size, config.chunk_overlap)?;
        let index_options = IndexOptions {
            batch_size: config.embedding.batch_size,
            concurrency: config.embedding.concurrency,
        };

        let controller = Arc::new(SessionController::new(
            fetcher,
            embedding,
            chat,
            splitter,
            index_options,
            config.top_k,
        ));

        Ok(Self::with_controller(controller))
    }

    /// Server on stdin/stdout around an existing session controller
    pub fn with_controller(controller: Arc<SessionController>) -> Self {
        Self {
            protocol: Protocol::new(),
            tool_handlers: Arc::new(Mutex::new(ToolHandlers::new(controller))),
        }
    }

    pub async fn start(mut self) -> Result<()> {
        tracing::info!("MCP server started, waiting for requests...");

        // Main request loop
        loop {
            match self.protocol.read_request().await {
                Ok(Some(request)) => {
                    let refresh_tools = changes_tool_list(&request);
                    if let Some(response) = self.handle_request(request).await {
                        if let Err(e) = self.protocol.send_response(response).await {
                            tracing::error!("Failed to send response: {}", e);
                        }
                    }
                    if refresh_tools {
                        if let Err(e) = self
                            .protocol
                            .send_notification("notifications/tools/list_changed", json!({}))
                            .await
                        {
                            tracing::error!("Failed to send notification: {}", e);
                        }
                    }
                }
                Ok(None) => {
                    tracing::info!("Client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::error!("Failed to read request: {}", e);
                    let error_response = self.protocol.error_response(
                        json!(null),
                        JsonRpcError::parse_error(),
                    );
                    let _ = self.protocol.send_response(error_response).await;
                }
            }
        }

        Ok(())
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Received request: method={}, id={:?}", request.method, request.id);

        if request.is_notification() {
            tracing::debug!("Notification {} acknowledged", request.method);
            return None;
        }

        if request.jsonrpc != "2.0" {
            return Some(
                self.protocol
                    .error_response(request.id, JsonRpcError::invalid_request()),
            );
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.id, request.params).await,
            "tools/list" => self.handle_tools_list(request.id).await,
            "tools/call" => self.handle_tools_call(request.id, request.params).await,
            _ => self
                .protocol
                .error_response(request.id, JsonRpcError::method_not_found()),
        };
        Some(response)
    }

    async fn handle_initialize(&self, id: serde_json::Value, params: serde_json::Value) -> JsonRpcResponse {
        match serde_json::from_value::<InitializeRequest>(params) {
            Ok(req) => {
                tracing::info!(
                    "Client connected: {} v{} (protocol {})",
                    req.clientInfo.name,
                    req.clientInfo.version,
                    req.protocolVersion
                );
            }
            Err(e) => {
                tracing::warn!("Failed to parse initialize request: {}", e);
                return self.protocol.error_response(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)),
                );
            }
        }

        let response = InitializeResponse {
            protocolVersion: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: ToolsCapability {
                    listChanged: Some(true),
                },
            },
            serverInfo: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: SERVER_VERSION.to_string(),
            },
        };

        self.protocol.success_response(id, json!(response))
    }

    async fn handle_tools_list(&self, id: serde_json::Value) -> JsonRpcResponse {
        let ready = self.tool_handlers.lock().await.accepts_questions().await;
        let response = ListToolsResponse {
            tools: tool_definitions(ready),
        };
        self.protocol.success_response(id, json!(response))
    }

    async fn handle_tools_call(&self, id: serde_json::Value, params: serde_json::Value) -> JsonRpcResponse {
        let call_request: CallToolRequest = match serde_json::from_value(params) {
            Ok(req) => req,
            Err(e) => {
                return self.protocol.error_response(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                );
            }
        };

        let handlers = self.tool_handlers.lock().await;
        let result = match call_request.name.as_str() {
            ANALYZE_TOOL => handlers.handle_analyze_repository(&call_request.arguments).await,
            ASK_TOOL => handlers.handle_ask_question(&call_request.arguments).await,
            STATUS_TOOL => handlers.handle_get_session_status(&call_request.arguments).await,
            _ => {
                return self.protocol.error_response(
                    id,
                    JsonRpcError::invalid_params(format!("Unknown tool: {}", call_request.name)),
                );
            }
        };

        match result {
            Ok(content) => {
                let response = CallToolResponse {
                    content,
                    isError: None,
                };
                self.protocol.success_response(id, json!(response))
            }
            Err(e) => {
                let response = CallToolResponse {
                    content: vec![Content::text(format!("Error: {:#}", e))],
                    isError: Some(true),
                };
                self.protocol.success_response(id, json!(response))
            }
        }
    }
}

/// An analyze call changes session state, and with it the tool list.
fn changes_tool_list(request: &JsonRpcRequest) -> bool {
    request.method == "tools/call"
        && request.params.get("name").and_then(|v| v.as_str()) == Some(ANALYZE_TOOL)
}

/// Tools offered to the client. `ask_question` is only listed once a
/// repository has been analyzed.
fn tool_definitions(accepts_questions: bool) -> Vec<Tool> {
    let mut tools = vec![
        Tool {
            name: ANALYZE_TOOL.to_string(),
            description: r#"Clone a public git repository and index its files so questions can be asked about it.

Replaces any previously analyzed repository. Large repositories can take several minutes."#
                .to_string(),
            inputSchema: json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "Public repository URL, e.g. https://github.com/owner/repo"
                    }
                },
                "required": ["url"]
            }),
        },
        Tool {
            name: STATUS_TOOL.to_string(),
            description: "Report whether a repository is analyzed and ready for questions."
                .to_string(),
            inputSchema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ];

    if accepts_questions {
        tools.push(Tool {
            name: ASK_TOOL.to_string(),
            description: "Ask a natural-language question about the analyzed repository. The answer is grounded in its README and the most relevant files."
                .to_string(),
            inputSchema: json!({
                "type": "object",
                "properties": {
                    "question": {
                        "type": "string",
                        "description": "Question about the codebase"
                    }
                },
                "required": ["question"]
            }),
        });
    }

    tools
}
