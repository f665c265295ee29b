//! API routes for the doc-rag server

pub mod chat;
pub mod events;
pub mod records;

use axum::{
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Object-storage notifications
        .route("/events/storage", post(events::storage_events))
        .route("/events/backfill", post(events::backfill))
        // Chat
        .route("/chat/:session/messages", post(chat::send_message))
        .route(
            "/chat/:session",
            get(chat::get_history).delete(chat::clear_session),
        )
        // Operator queries
        .route("/records", get(records::list_records))
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "doc-rag",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "POST /api/events/storage": "Object-storage created/deleted notifications",
            "POST /api/events/backfill": "Index every object in the ingestion container",
            "POST /api/chat/:session/messages": "Send a message; answer streams as server-sent events",
            "GET /api/chat/:session": "Conversation history",
            "DELETE /api/chat/:session": "Clear the conversation",
            "GET /api/records?file_path=": "Records for a source"
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::RagConfig;
    use crate::providers::{LocalObjectStorage, MemoryDocumentStore, ObjectStorage};
    use crate::server::{state::AppState, RagServer};
    use crate::testing::{HashEmbedder, ScriptedCompletion};

    struct TestApp {
        _dir: TempDir,
        root: std::path::PathBuf,
        storage: Arc<LocalObjectStorage>,
        state: AppState,
        router: Router,
    }

    fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let storage = Arc::new(LocalObjectStorage::new(root.clone()).unwrap());
        let mut config = RagConfig::default();
        config.vectorization.sweep_on_start = false;

        let state = AppState::from_parts(
            config,
            Arc::new(HashEmbedder::new(32)),
            Arc::new(ScriptedCompletion::replying(&["Hello ", "there."])),
            Arc::new(MemoryDocumentStore::new()),
            storage.clone(),
        );
        TestApp {
            _dir: dir,
            root,
            storage,
            state: state.clone(),
            router: RagServer::with_state(state).build_router(),
        }
    }

    impl TestApp {
        fn put(&self, path: &str, content: &str) -> String {
            let full = self.root.join("rag-docs").join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
            self.storage.object_url("rag-docs", path)
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, String) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, String::from_utf8(body.to_vec()).unwrap())
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let (status, body) = app.send(get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");

        let (status, _) = app.send(get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_created_event_indexes_object() {
        let app = app();
        let url = app.put("notes.md", "Hello");

        let (status, body) = app
            .send(post_json(
                "/api/events/storage",
                json!([{ "eventType": "Microsoft.Storage.BlobCreated", "data": { "url": url } }]),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        let outcome: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(outcome["results"][0]["outcome"], "indexed");

        let uri = format!("/api/records?file_path={}", url.replace('/', "%2F").replace(':', "%3A"));
        let (status, body) = app.send(get(&uri)).await;
        assert_eq!(status, StatusCode::OK);
        let records: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(records.as_array().unwrap().len(), 1);
        assert_eq!(records[0]["content"], "# notes.md\n\nHello");
    }

    #[tokio::test]
    async fn test_malformed_event_is_bad_request() {
        let app = app();
        let (status, body) = app
            .send(post_json("/api/events/storage", json!({ "eventType": "Created" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid_event"));
    }

    #[tokio::test]
    async fn test_records_query_requires_filter() {
        let app = app();
        let (status, _) = app.send(get("/api/records")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_chat_streams_events_and_keeps_history() {
        let app = app();
        let (status, body) = app
            .send(post_json("/api/chat/s1/messages", json!({ "message": "Hi?" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("event: delta"));
        assert!(body.contains("Hello "));
        assert!(body.contains("event: done"));
        assert!(!body.contains("event: error"));

        let (_, body) = app.send(get("/api/chat/s1")).await;
        let history: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(history["history"].as_array().unwrap().len(), 2);
        assert_eq!(history["history"][1]["content"], "Hello there.");
        assert_eq!(app.state.sessions().len(), 1);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/chat/s1")
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(app.state.sessions().is_empty());

        let (_, body) = app.send(get("/api/chat/s1")).await;
        let history: Value = serde_json::from_str(&body).unwrap();
        assert!(history["history"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected() {
        let app = app();
        let (status, _) = app
            .send(post_json("/api/chat/s1/messages", json!({ "message": "  " })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
