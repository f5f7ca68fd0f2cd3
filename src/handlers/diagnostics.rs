use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use tracing::info;

use crate::models::DiagnosticsResponse;
use crate::ws::CollabHub;

/// Report hub-wide collaboration counters.
pub async fn diagnostics(
    State(hub): State<Arc<CollabHub>>,
) -> (StatusCode, Json<DiagnosticsResponse>) {
    let stats = hub.stats();

    info!(
        "Diagnostics: Conn: {}, Sessions: {}, Changes: {}, Chat: {}",
        stats.current_connections, stats.open_sessions, stats.total_changes,
        stats.total_chat_messages
    );

    (
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn: stats.current_connections as u64,
            n_sessions: stats.open_sessions as u64,
            total_connections: stats.total_connections,
            total_changes: stats.total_changes,
            total_chat_messages: stats.total_chat_messages,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NullStore;
    use crate::ws::SessionKey;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn reports_hub_counters() {
        let hub = Arc::new(CollabHub::new(16, Arc::new(NullStore)));
        let (tx, _rx) = mpsc::unbounded_channel();
        let conn = hub.register("1".into(), "Ada".into(), tx).unwrap();
        hub.join(&conn, SessionKey::new("10", None)).await;
        hub.record_change();

        let (status, Json(body)) = diagnostics(State(hub)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.n_conn, 1u64);
        assert_eq!(body.n_sessions, 1u64);
        assert_eq!(body.total_connections, 1);
        assert_eq!(body.total_changes, 1);
    }
}
