//! MCP server for CyberKG: question answering, ingestion and lookups via
//! the Model Context Protocol.
//!
//! Tools: ask, ingest_framework, knowledge_base_stats, lookup_technique,
//! list_frameworks.

pub mod params;

use crate::chat::SearchMode;
use crate::framework::{Framework, Scope};
use crate::services::Services;
use params::*;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Serialize;
use tracing::{error, info};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ok_text(text: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn err_text(msg: String) -> Result<CallToolResult, McpError> {
    Ok(CallToolResult::error(vec![Content::text(msg)]))
}

fn ok_json<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    match serde_json::to_string_pretty(value) {
        Ok(text) => ok_text(text),
        Err(e) => Err(McpError::internal_error(e.to_string(), None)),
    }
}

// ---------------------------------------------------------------------------
// CyberKgMcpServer
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct CyberKgMcpServer {
    services: Services,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl CyberKgMcpServer {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "Answer a question from the ATT&CK and compliance knowledge graph")]
    async fn ask(&self, Parameters(p): Parameters<AskParams>) -> Result<CallToolResult, McpError> {
        let scope = match p.scope.as_deref().map(str::parse::<Scope>).transpose() {
            Ok(scope) => scope.unwrap_or_default(),
            Err(e) => return err_text(e.to_string()),
        };
        let mode = match p.mode.as_deref().map(str::parse::<SearchMode>).transpose() {
            Ok(mode) => mode.unwrap_or_default(),
            Err(e) => return err_text(e.to_string()),
        };
        ok_text(self.services.chat.ask(&p.question, scope, mode).await)
    }

    #[tool(description = "Ingest one framework into the knowledge graph (ATT&CK uses the enterprise domain)")]
    async fn ingest_framework(
        &self,
        Parameters(p): Parameters<IngestFrameworkParams>,
    ) -> Result<CallToolResult, McpError> {
        let framework: Framework = match p.framework.parse() {
            Ok(f) => f,
            Err(e) => return err_text(format!("{e}")),
        };
        let outcome = self.services.ingestor.ingest_framework(framework).await;
        if outcome.is_ok() {
            ok_json(&serde_json::json!({ "framework": framework.code(), "outcome": outcome }))
        } else {
            err_text(serde_json::to_string_pretty(&outcome).unwrap_or_else(|_| format!("{outcome:?}")))
        }
    }

    #[tool(description = "Node counts per label, total nodes and relationship count")]
    fn knowledge_base_stats(&self) -> Result<CallToolResult, McpError> {
        match self.services.queries.stats() {
            Ok(stats) => ok_json(&stats),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "Look up an ATT&CK technique by ID with its tactics, threat groups and malware")]
    fn lookup_technique(
        &self,
        Parameters(p): Parameters<LookupTechniqueParams>,
    ) -> Result<CallToolResult, McpError> {
        let queries = &self.services.queries;
        let detail = match queries.technique_by_id(&p.technique_id) {
            Ok(Some(detail)) => detail,
            Ok(None) => return err_text(format!("technique not found: {}", p.technique_id)),
            Err(e) => return err_text(e.to_string()),
        };
        if !p.include_mitigations.unwrap_or(false) {
            return ok_json(&detail);
        }
        match queries.technique_mitigations(&p.technique_id) {
            Ok(mitigations) => ok_json(&serde_json::json!({
                "technique": detail,
                "mitigations": mitigations,
            })),
            Err(e) => err_text(e.to_string()),
        }
    }

    #[tool(description = "List the supported frameworks with their live node counts")]
    fn list_frameworks(&self) -> Result<CallToolResult, McpError> {
        match self.services.queries.framework_info() {
            Ok(frameworks) => ok_json(&frameworks),
            Err(e) => err_text(e.to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for CyberKgMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "CyberKG MCP server: questions, ingestion and lookups over MITRE ATT&CK, CIS, NIST CSF, HIPAA, FFIEC and PCI DSS"
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Serve on stdio until the client disconnects. Returns an exit code.
pub async fn serve_stdio(services: Services) -> i32 {
    let server = CyberKgMcpServer::new(services);
    info!("cyberkg mcp server starting on stdio");

    let service = match server.serve(rmcp::transport::stdio()).await {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to start MCP server");
            return 1;
        }
    };

    if let Err(e) = service.waiting().await {
        error!(error = %e, "MCP server error");
        return 1;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::graph::{Label, Node};
    use crate::ingest::{FileStixSource, LopdfExtractor, AttackDomain};
    use crate::llm::MockClient;
    use crate::storage::{GraphStore, OpenStore, SqliteStore};
    use std::sync::Arc;

    fn server() -> CyberKgMcpServer {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store
            .upsert_node(
                &Node::new(Label::Technique, "attack-pattern--1")
                    .with_property("identifier", "T1055")
                    .with_property("name", "Process Injection"),
            )
            .unwrap();
        let services = Services::assemble(
            store,
            Arc::new(MockClient::unavailable()),
            Arc::new(FileStixSource::new()),
            Arc::new(LopdfExtractor),
            &Settings::default(),
            vec![AttackDomain::Enterprise],
        );
        CyberKgMcpServer::new(services)
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text())
            .map(|t| t.text.clone())
            .collect()
    }

    #[test]
    fn lookup_technique_returns_detail() {
        let result = server()
            .lookup_technique(Parameters(LookupTechniqueParams {
                technique_id: "t1055".into(),
                include_mitigations: Some(true),
            }))
            .unwrap();
        assert_ne!(result.is_error, Some(true));
        assert!(text(&result).contains("Process Injection"));
        assert!(text(&result).contains("mitigations"));
    }

    #[test]
    fn unknown_technique_is_a_tool_error() {
        let result = server()
            .lookup_technique(Parameters(LookupTechniqueParams {
                technique_id: "T9999".into(),
                include_mitigations: None,
            }))
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[test]
    fn stats_and_frameworks_serialize() {
        let server = server();
        let stats = text(&server.knowledge_base_stats().unwrap());
        assert!(stats.contains("\"total_nodes\": 1"));
        let frameworks = text(&server.list_frameworks().unwrap());
        assert!(frameworks.contains("PCI Data Security Standard v4.0.1"));
    }

    #[tokio::test]
    async fn ask_rejects_unknown_scope_and_answers_otherwise() {
        let server = server();
        let bad = server
            .ask(Parameters(AskParams {
                question: "q".into(),
                scope: Some("iso27001".into()),
                mode: None,
            }))
            .await
            .unwrap();
        assert_eq!(bad.is_error, Some(true));

        let good = server
            .ask(Parameters(AskParams {
                question: "process injection".into(),
                scope: Some("attack".into()),
                mode: Some("smart".into()),
            }))
            .await
            .unwrap();
        assert!(text(&good).contains("--- Searched: techniques, malware, threat_groups"));
    }

    #[tokio::test]
    async fn failed_ingest_is_a_tool_error() {
        let result = server()
            .ingest_framework(Parameters(IngestFrameworkParams {
                framework: "attack".into(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("failed"));
    }
}
