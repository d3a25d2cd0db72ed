//! Query Endpoint
//!
//! Line-delimited JSON-RPC 2.0 over any byte stream (stdio for the daemon).
//! Every call goes through [`CatalogLink::access`], so answering a query also
//! pulls whatever the ingestion side has sent since the last one.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use kura_protocol::{Content, JsonRpcRequest, JsonRpcResponse, Platform, Tombstone};

use crate::catalog::CatalogEntry;
use crate::common::{AppError, AppResult};
use crate::ingest::read_asset;
use crate::link::CatalogLink;

/// A catalog entry as clients see it
#[derive(Debug, Clone, Serialize)]
pub struct ContentView {
    #[serde(flatten)]
    pub content: Content,
    /// File name in the file-transfer namespace
    pub package: String,
}

impl From<&CatalogEntry> for ContentView {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            content: entry.content.clone(),
            package: entry.package_name(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UpdatesView {
    pub updated: Vec<ContentView>,
    pub removed: Vec<Tombstone>,
}

#[derive(Debug, Serialize)]
pub struct ThumbnailView {
    pub path: String,
    /// Base64 of the raw bytes
    pub data: String,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    platform: Option<Platform>,
}

#[derive(Debug, Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Debug, Deserialize)]
struct UpdatesParams {
    since: DateTime<Utc>,
    #[serde(default)]
    platform: Option<Platform>,
}

pub struct QueryHandler {
    link: Arc<CatalogLink>,
}

impl QueryHandler {
    pub fn new(link: Arc<CatalogLink>) -> Self {
        Self { link }
    }

    /// Handle one request
    pub async fn handle(&self, request: &JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone().unwrap_or(Value::Null);
        debug!("Handling {}", request.method);

        match self.dispatch(&request.method, &request.params).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                debug!("{} failed: {}", request.method, e);
                error_response(id, e)
            }
        }
    }

    async fn dispatch(&self, method: &str, params: &Value) -> AppResult<Value> {
        match method {
            "contents.list" => to_value(self.list(parse_params(params)?).await),
            "contents.get" => to_value(self.get(parse_params(params)?).await?),
            "contents.updates" => to_value(self.updates(parse_params(params)?).await),
            "contents.thumbnail" => to_value(self.thumbnail(parse_params(params)?).await?),
            _ => Err(AppError::method_not_found(method)),
        }
    }

    async fn list(&self, params: ListParams) -> Vec<ContentView> {
        self.link
            .access(|state| {
                state
                    .list_all(params.platform)
                    .into_iter()
                    .map(ContentView::from)
                    .collect()
            })
            .await
    }

    async fn get(&self, params: IdParams) -> AppResult<ContentView> {
        self.link
            .access(|state| state.get_by_id(&params.id).map(ContentView::from))
            .await
            .ok_or_else(|| AppError::content_not_found(&params.id))
    }

    async fn updates(&self, params: UpdatesParams) -> UpdatesView {
        self.link
            .access(|state| {
                let changes = state.changes_since(params.since, params.platform);
                UpdatesView {
                    updated: changes.updated.into_iter().map(ContentView::from).collect(),
                    removed: changes.removed.into_iter().cloned().collect(),
                }
            })
            .await
    }

    async fn thumbnail(&self, params: IdParams) -> AppResult<ThumbnailView> {
        let located: Option<(PathBuf, Option<String>)> = self
            .link
            .access(|state| {
                state
                    .get_by_id(&params.id)
                    .map(|entry| (entry.path.clone(), entry.content.thumbnail.clone()))
            })
            .await;

        let (package, entry) = located.ok_or_else(|| AppError::content_not_found(&params.id))?;
        let entry = entry.ok_or_else(|| AppError::asset_not_found(&params.id, "thumbnail"))?;

        // Read after the catalog lock is released
        let read_entry = entry.clone();
        let data = tokio::task::spawn_blocking(move || read_asset(&package, &read_entry))
            .await
            .map_err(|e| AppError::internal(format!("Thumbnail read failed: {}", e)))?
            .map_err(|e| AppError::internal(format!("Thumbnail read failed: {}", e)))?
            .ok_or_else(|| AppError::asset_not_found(&params.id, &entry))?;

        Ok(ThumbnailView {
            path: entry,
            data: base64::engine::general_purpose::STANDARD.encode(data),
        })
    }

    /// Handle one line of input. Returns the response line, or None when
    /// nothing should be written back (notifications only).
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        match serde_json::from_str::<Value>(line) {
            Err(e) => to_line(&error_response(
                Value::Null,
                AppError::parse_error(format!("Parse error: {}", e)),
            )),
            Ok(Value::Array(batch)) => {
                if batch.is_empty() {
                    return to_line(&error_response(Value::Null, AppError::invalid_request("Empty batch")));
                }
                let mut responses = Vec::new();
                for value in batch {
                    if let Some(response) = self.handle_value(value).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    return None;
                }
                to_line(&responses)
            }
            Ok(value) => to_line(&self.handle_value(value).await?),
        }
    }

    async fn handle_value(&self, value: Value) -> Option<JsonRpcResponse> {
        let request = match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => request,
            Err(e) => {
                return Some(error_response(
                    Value::Null,
                    AppError::invalid_request(format!("Invalid request: {}", e)),
                ))
            }
        };

        if let Err(e) = request.validate() {
            let id = request.id.clone().unwrap_or(Value::Null);
            return Some(error_response(id, AppError::invalid_request(e.to_string())));
        }

        let response = self.handle(&request).await;
        if request.is_notification() {
            return None;
        }
        Some(response)
    }
}

/// Serve requests from `reader` until EOF or until `stop` resolves.
///
/// EOF only ends serving; `stop` alone decides when this returns after that.
pub async fn serve_until<R, W, S>(handler: &QueryHandler, reader: R, writer: W, stop: S) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    tokio::pin!(stop);
    tokio::select! {
        result = serve(handler, reader, writer) => result?,
        _ = &mut stop => return Ok(()),
    }
    stop.await;
    Ok(())
}

/// Serve requests from `reader` until EOF
pub async fn serve<R, W>(handler: &QueryHandler, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(response) = handler.handle_line(trimmed).await {
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
    }

    info!("Query input closed");
    Ok(())
}

fn error_response(id: Value, error: AppError) -> JsonRpcResponse {
    JsonRpcResponse::error(id, error.code.code(), error.message, None)
}

/// Missing params read as `{}`
fn parse_params<T: DeserializeOwned>(params: &Value) -> AppResult<T> {
    let params = match params {
        Value::Null => Value::Object(serde_json::Map::new()),
        other => other.clone(),
    };
    serde_json::from_value(params).map_err(|e| AppError::invalid_params(format!("Invalid params: {}", e)))
}

fn to_value<T: Serialize>(value: T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::internal(format!("Failed to encode result: {}", e)))
}

fn to_line<T: Serialize>(value: &T) -> Option<String> {
    match serde_json::to_string(value) {
        Ok(line) => Some(line),
        Err(e) => {
            warn!("Failed to encode response: {}", e);
            None
        }
    }
}
