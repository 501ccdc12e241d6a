//! Second Brain MCP Server implementation

use anyhow::Result;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use second_brain::core::note::{NoteFilter, NoteId, Scope, TimeRange};
use second_brain::search::{Brain, Session};
use second_brain::Note;

/// Parameters for brain_search tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchParams {
    /// Free-text query (e.g., "what did I note about fox behaviour")
    #[schemars(description = "Search query; empty lists the newest notes")]
    pub query: String,
    /// Maximum number of results to return (default: 5)
    #[schemars(description = "Maximum number of results (default: 5)")]
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Only notes whose tags contain every one of these
    #[schemars(description = "Required tags (substring match)")]
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    5
}

/// Parameters for brain_add tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddParams {
    #[schemars(description = "Note text")]
    pub body: String,
    #[schemars(description = "Comma-separated tags")]
    #[serde(default)]
    pub tags: String,
}

/// Parameters for brain_get_note tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetNoteParams {
    #[schemars(description = "Note id")]
    pub id: NoteId,
}

/// Parameters for brain_list_notes tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListNotesParams {
    /// Case-insensitive substring of the note body
    #[schemars(description = "Body substring filter")]
    #[serde(default)]
    pub text: Option<String>,
    #[schemars(description = "Required tags (substring match)")]
    #[serde(default)]
    pub tags: Vec<String>,
    /// Maximum number of results (default: 50)
    #[schemars(description = "Maximum results (default: 50)")]
    #[serde(default = "default_list_limit")]
    pub limit: usize,
}

fn default_list_limit() -> usize {
    50
}

/// Note info for JSON output
#[derive(Debug, Serialize)]
struct NoteJson {
    id: NoteId,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<NoteId>,
    timestamp: String,
    tags: Vec<String>,
    favorite: bool,
    body: String,
}

impl From<Note> for NoteJson {
    fn from(note: Note) -> Self {
        Self {
            id: note.id,
            parent_id: note.parent_id,
            timestamp: note.timestamp.to_rfc3339(),
            tags: note.tags,
            favorite: note.favorite,
            body: note.body,
        }
    }
}

/// Second Brain MCP Service
#[derive(Clone)]
pub struct BrainService {
    brain: Brain,
    tool_router: ToolRouter<Self>,
}

impl BrainService {
    pub fn new(brain: Brain) -> Self {
        Self {
            brain,
            tool_router: Self::tool_router(),
        }
    }

    /// Run `f` on the blocking pool with a fresh session, serialized as JSON.
    async fn with_session<T, F>(&self, f: F) -> Result<CallToolResult, McpError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&Session) -> second_brain::Result<T> + Send + 'static,
    {
        let brain = self.brain.clone();
        let value = tokio::task::spawn_blocking(move || {
            let session = brain.session()?;
            f(&session)
        })
        .await
        .map_err(|e| McpError::internal_error(format!("Worker failed: {}", e), None))?
        .map_err(|e| McpError::internal_error(format!("{} ({})", e, e.kind()), None))?;

        let output = serde_json::to_string_pretty(&value).map_err(|e| {
            McpError::internal_error(format!("JSON serialization failed: {}", e), None)
        })?;
        Ok(CallToolResult::success(vec![Content::text(output)]))
    }
}

#[tool_router]
impl BrainService {
    /// Hybrid keyword + semantic search
    #[tool(description = "Search the personal note store. Combines full-text and semantic similarity; returns note ids, bodies and fused scores.")]
    async fn brain_search(
        &self,
        Parameters(params): Parameters<SearchParams>,
    ) -> Result<CallToolResult, McpError> {
        // Clamp limit: default 5, max 100
        let limit = if params.limit == 0 { 5 } else { params.limit.min(100) };
        let scope = Scope::new(&params.tags, TimeRange::default());

        self.with_session(move |session| session.topk(&params.query, limit, &scope))
            .await
    }

    #[tool(description = "Save a note. Long text is split into linked chunks. Returns the stored ids and any embedding warning.")]
    async fn brain_add(
        &self,
        Parameters(params): Parameters<AddParams>,
    ) -> Result<CallToolResult, McpError> {
        self.with_session(move |session| {
            let mut chunks = Vec::new();
            for outcome in session.add(&params.body, &params.tags)? {
                chunks.push(match outcome {
                    Ok(report) => serde_json::to_value(report)?,
                    Err(e) => serde_json::json!({ "error": e.to_string(), "kind": e.kind() }),
                });
            }
            Ok(chunks)
        })
        .await
    }

    #[tool(description = "Get one note with its metadata by id.")]
    async fn brain_get_note(
        &self,
        Parameters(params): Parameters<GetNoteParams>,
    ) -> Result<CallToolResult, McpError> {
        let id = params.id;
        self.with_session(move |session| {
            session
                .get(id)?
                .map(NoteJson::from)
                .ok_or(second_brain::BrainError::NotFound(id))
        })
        .await
    }

    #[tool(description = "List notes newest first, optionally filtered by body text and tags.")]
    async fn brain_list_notes(
        &self,
        Parameters(params): Parameters<ListNotesParams>,
    ) -> Result<CallToolResult, McpError> {
        // Clamp limit: default 50, max 500
        let limit = if params.limit == 0 { 50 } else { params.limit.min(500) };
        let filter = NoteFilter {
            text: params.text,
            scope: Scope::new(&params.tags, TimeRange::default()),
        };

        self.with_session(move |session| {
            Ok(session
                .list(&filter, Some(limit))?
                .into_iter()
                .map(NoteJson::from)
                .collect::<Vec<_>>())
        })
        .await
    }

    #[tool(description = "Note store status: note and embedding counts, vector index size, database location.")]
    async fn brain_status(&self) -> Result<CallToolResult, McpError> {
        self.with_session(|session| session.stats()).await
    }
}

#[tool_handler]
impl ServerHandler for BrainService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Second Brain MCP Server. Search, read and add notes in a personal knowledge store.".to_string()
            ),
            ..Default::default()
        }
    }
}

/// Run the MCP server
pub async fn run_mcp_server(brain: Brain) -> Result<()> {
    use tokio::io::{stdin, stdout};

    let service = BrainService::new(brain);
    let transport = (stdin(), stdout());
    let server = service.serve(transport).await?;
    server.waiting().await?;

    Ok(())
}
