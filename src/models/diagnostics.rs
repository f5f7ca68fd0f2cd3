use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Response for diagnostics information
#[derive(Serialize, Deserialize, ToSchema)]
pub struct DiagnosticsResponse {
    pub n_conn: u64,
    pub n_sessions: u64,
    pub total_connections: u64,
    pub total_changes: u64,
    pub total_chat_messages: u64,
}
