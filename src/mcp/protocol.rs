use super::types::*;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// MCP Protocol handler for newline-delimited JSON-RPC
pub struct Protocol<R = BufReader<tokio::io::Stdin>, W = tokio::io::Stdout> {
    reader: R,
    writer: W,
}

impl Protocol {
    /// Protocol over the process's stdin/stdout
    pub fn new() -> Self {
        Self::with_io(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Protocol<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn with_io(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Read next JSON-RPC request
    pub async fn read_request(&mut self) -> Result<Option<JsonRpcRequest>> {
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line).await {
                Ok(0) => return Ok(None), // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue; // Skip empty lines
                    }
                    let request: JsonRpcRequest = serde_json::from_str(trimmed)?;
                    return Ok(Some(request));
                }
                Err(_) => return Ok(None),
            }
        }
    }

    /// Send JSON-RPC response
    pub async fn send_response(&mut self, response: JsonRpcResponse) -> Result<()> {
        self.write_line(&response).await
    }

    /// Send a notification, e.g. `notifications/tools/list_changed`
    pub async fn send_notification(&mut self, method: &str, params: Value) -> Result<()> {
        let notification = Notification {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        };
        self.write_line(&notification).await
    }

    async fn write_line<T: Serialize>(&mut self, message: &T) -> Result<()> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Create success response
    pub fn success_response<T: Serialize>(&self, id: Value, result: T) -> JsonRpcResponse<T> {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create error response
    pub fn error_response(&self, id: Value, error: JsonRpcError) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    #[cfg(test)]
    pub fn into_writer(self) -> W {
        self.writer
    }
}
