use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::{handlers, integrations, middleware::metrics_middleware, tickets};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health, config, metrics
        .route("/health", get(handlers::health))
        .route("/config", get(handlers::get_config))
        .route("/metrics", get(handlers::metrics))
        // Tickets
        .route("/tickets", post(tickets::create_ticket))
        .route("/tickets", get(tickets::list_tickets))
        .route("/tickets/{id}", get(tickets::get_ticket))
        .route("/tickets/{id}/comments", post(tickets::add_comment))
        .route("/tickets/{id}/assign", post(tickets::assign_ticket))
        .route("/tickets/{id}/transition", post(tickets::transition_ticket))
        // Integrations
        .route("/integrations/jira/sync/{id}", post(integrations::sync_jira))
        .route(
            "/integrations/github/create-issue/{id}",
            post(integrations::create_github_issue),
        )
        .route(
            "/integrations/testrail/push/{id}",
            post(integrations::push_testrail),
        )
        .route(
            "/integrations/{target}/status/{id}",
            get(integrations::get_status),
        )
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tickd_core::{
        Config, Dispatcher, LifecycleManager, SqliteEventLog, SqlitePushRecordStore,
        SqliteTicketStore,
    };
    use tower::ServiceExt;

    fn create_test_state() -> Arc<AppState> {
        let tickets = Arc::new(SqliteTicketStore::in_memory().unwrap());
        let events = Arc::new(SqliteEventLog::in_memory().unwrap());
        let push_records = Arc::new(SqlitePushRecordStore::in_memory().unwrap());

        let config = Config::default();
        let dispatcher = Arc::new(Dispatcher::new(
            vec![],
            Arc::clone(&tickets),
            Arc::clone(&events),
            Arc::clone(&push_records),
            config.integrations.retry.clone(),
            config.integrations.queue_capacity,
        ));
        let handle = dispatcher.start();

        let lifecycle = Arc::new(
            LifecycleManager::new(Arc::clone(&tickets), Arc::clone(&events))
                .with_dispatcher(handle),
        );

        Arc::new(AppState::new(
            config,
            lifecycle,
            tickets,
            events,
            push_records,
            dispatcher,
        ))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_body() -> Value {
        json!({
            "title": "Login broken",
            "description": "Login returns 500 for all users",
            "reporter": "alice",
            "priority": "high",
            "tags": ["auth", "bug"]
        })
    }

    async fn create_ticket(app: &Router) -> Value {
        let response = app
            .clone()
            .oneshot(json_request("POST", "/tickets", create_body()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await
    }

    #[tokio::test]
    async fn test_health() {
        let app = create_router(create_test_state());
        let response = app.oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_ticket() {
        let app = create_router(create_test_state());
        let ticket = create_ticket(&app).await;

        assert!(ticket["id"].is_string());
        assert_eq!(ticket["title"], "Login broken");
        assert_eq!(ticket["reporter"], "alice");
        assert_eq!(ticket["priority"], "high");
        assert_eq!(ticket["status"], "open");
        assert_eq!(ticket["tags"], json!(["auth", "bug"]));
        assert_eq!(ticket["comments"], json!([]));
        assert!(ticket.get("assignee").is_none());
    }

    #[tokio::test]
    async fn test_create_ticket_validation_error() {
        let app = create_router(create_test_state());
        let mut body = create_body();
        body["title"] = json!("   ");

        let response = app
            .oneshot(json_request("POST", "/tickets", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("title"));
    }

    #[tokio::test]
    async fn test_create_ticket_defaults_priority_to_medium() {
        let app = create_router(create_test_state());
        let mut body = create_body();
        body.as_object_mut().unwrap().remove("priority");

        let response = app
            .oneshot(json_request("POST", "/tickets", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let ticket = body_json(response).await;
        assert_eq!(ticket["priority"], "medium");
    }

    #[tokio::test]
    async fn test_get_ticket() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(get_request(&format!("/tickets/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], created["id"]);

        let response = app
            .oneshot(get_request("/tickets/unknown-id"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_tickets_with_status_filter() {
        let app = create_router(create_test_state());
        let first = create_ticket(&app).await;
        create_ticket(&app).await;

        // Move the first ticket along.
        let id = first["id"].as_str().unwrap();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/transition", id),
                json!({"target_status": "in_progress"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.clone().oneshot(get_request("/tickets")).await.unwrap();
        let all = body_json(response).await;
        assert_eq!(all.as_array().unwrap().len(), 2);

        let response = app
            .clone()
            .oneshot(get_request("/tickets?status=open"))
            .await
            .unwrap();
        let open = body_json(response).await;
        assert_eq!(open.as_array().unwrap().len(), 1);

        let response = app
            .oneshot(get_request("/tickets?status=bogus"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_add_comment() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/comments", id),
                json!({"author": "bob", "body": "taking a look"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["comments"][0]["author"], "bob");
        assert_eq!(json["comments"][0]["body"], "taking a look");

        // Empty body is a validation error.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/comments", id),
                json!({"author": "bob", "body": "  "}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // Unknown ticket is a 404.
        let response = app
            .oneshot(json_request(
                "POST",
                "/tickets/unknown-id/comments",
                json!({"author": "bob", "body": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_assign_ticket() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/assign", id),
                json!({"assignee": "bob"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["assignee"], "bob");

        let response = app
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/assign", id),
                json!({"assignee": ""}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_transition_flow_and_conflict() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        for target in ["in_progress", "closed"] {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    &format!("/tickets/{}/transition", id),
                    json!({"target_status": target}),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        // closed is terminal: further transitions are a 409 naming both statuses.
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/tickets/{}/transition", id),
                json!({"target_status": "in_progress"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.contains("closed"));
        assert!(detail.contains("in_progress"));

        let response = app
            .oneshot(json_request(
                "POST",
                "/tickets/unknown-id/transition",
                json!({"target_status": "closed"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_sync_without_configured_target() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/integrations/jira/sync/{}", id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("jira"));
    }

    #[tokio::test]
    async fn test_integration_status_endpoint() {
        let app = create_router(create_test_state());
        let created = create_ticket(&app).await;
        let id = created["id"].as_str().unwrap();

        let response = app
            .clone()
            .oneshot(get_request(&format!("/integrations/github/status/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["target"], "github");
        assert_eq!(json["status"], "pending");
        assert_eq!(json["attempt_count"], 0);
        assert_eq!(json["last_delivered_sequence"], 0);
        // The created event is already in the log, so the pair lags by one.
        assert_eq!(json["latest_sequence"], 1);

        // Unknown target and unknown ticket.
        let response = app
            .clone()
            .oneshot(get_request(&format!("/integrations/slack/status/{}", id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(get_request("/integrations/github/status/unknown-id"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_config_endpoint_redacts_secrets() {
        let app = create_router(create_test_state());
        let response = app.oneshot(get_request("/config")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["server"]["port"], 8080);
        assert!(json["integrations"].get("jira").is_none());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let app = create_router(create_test_state());
        create_ticket(&app).await;

        let response = app.oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.contains("tickd_tickets_by_status"));
    }
}
