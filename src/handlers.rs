// SPDX-License-Identifier: EUPL-1.2

//! Axum route handlers for projects and their configuration.

use crate::{
    db::AppState,
    error::ConsoleError,
    identity::Identity,
    models::{ChangeProjectRequest, ProjectsResponse, ServicePasswordResponse},
    project::configs::{ProjectConfigKey, ProjectConfigs},
    project::store::UpdateOutcome,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health`: Health check
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "onyxia-console",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ── Projects ──────────────────────────────────────────────────────────────────

/// `GET /projects`: Projects the caller can select.
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ProjectsResponse>, ConsoleError> {
    let session = state.session(&identity).await;
    Ok(Json(ProjectsResponse {
        projects: identity.projects(&state.settings)?,
        selected_project_id: session.store.current_project().await.map(|p| p.id),
    }))
}

/// `POST /project`: Select a project, migrating its configuration if needed.
///
/// Body: `{ "projectId": "projet-alpha" }`
pub async fn change_project(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<ChangeProjectRequest>,
) -> Result<Json<ProjectConfigs>, ConsoleError> {
    let project = state.project_of(&identity, &req.project_id)?;
    let session = state.session(&identity).await;
    session.change_project(project).await?;

    tracing::info!("{} switched to project {}", identity.username, req.project_id);
    Ok(Json(session.store.configs().await?))
}

/// `POST /project/service-password`: Replace the project's service password.
pub async fn renew_service_password(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ServicePasswordResponse>, ConsoleError> {
    let session = state.ready_session(&identity).await?;
    let service_password = session.store.renew_service_password().await?;
    Ok(Json(ServicePasswordResponse { service_password }))
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// `GET /project/configs`
pub async fn get_project_configs(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<ProjectConfigs>, ConsoleError> {
    let session = state.ready_session(&identity).await?;
    Ok(Json(session.store.configs().await?))
}

/// `PUT /project/configs/:key`: Replace one top-level value.
///
/// Answers `409` with `"reload": true` when someone else changed the value
/// since it was loaded.
pub async fn update_config_value(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(key): Path<String>,
    Json(value): Json<Value>,
) -> Result<Json<Value>, ConsoleError> {
    let key: ProjectConfigKey = key.parse()?;
    let session = state.ready_session(&identity).await?;
    let outcome = session.store.update_config_value(key, value).await?;

    Ok(Json(json!({
        "key": key.as_str(),
        "updated": outcome == UpdateOutcome::Updated,
    })))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{signed_jwt, signed_jwt_with, test_settings};
    use crate::project::secrets::{Secret, SecretsManager};
    use crate::s3::region::DeploymentRegion;
    use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode};
    use axum_test::TestServer;

    fn server() -> (Arc<AppState>, TestServer) {
        let state = Arc::new(AppState::in_memory(test_settings(), DeploymentRegion::default()).unwrap());
        let server = TestServer::new(crate::router(state.clone())).unwrap();
        (state, server)
    }

    fn auth() -> (HeaderName, HeaderValue) {
        let jwt = signed_jwt(&json!({
            "sub": "1234",
            "preferred_username": "jdoe",
            "groups": ["alpha"],
        }));
        (AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {jwt}")).unwrap())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let resp = health().await;
        assert_eq!(resp.0["status"], "ok");
        assert_eq!(resp.0["service"], "onyxia-console");
    }

    #[tokio::test]
    async fn requests_without_token_are_rejected() {
        let (_, server) = server();
        server
            .get("/projects")
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn tokens_signed_with_another_key_are_rejected() {
        let (state, server) = server();
        let forged = signed_jwt_with(&json!({ "preferred_username": "victim" }), "guessed");
        server
            .get("/project/configs")
            .add_header(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {forged}")).unwrap())
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        // No session or secret was created for the forged user.
        assert!(state
            .secrets
            .list("onyxia/user-victim/.onyxia")
            .await
            .unwrap()
            .files
            .is_empty());
    }

    #[tokio::test]
    async fn projects_are_listed_from_the_token() {
        let (_, server) = server();
        let resp = server
            .get("/projects")
            .add_header(AUTHORIZATION, auth().1)
            .await;

        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["projects"][0]["id"], "user-jdoe");
        assert_eq!(body["projects"][1]["id"], "projet-alpha");
        assert_eq!(body["selectedProjectId"], Value::Null);
    }

    #[tokio::test]
    async fn personal_project_is_loaded_on_first_use() {
        let (state, server) = server();
        let resp = server
            .get("/project/configs")
            .add_header(AUTHORIZATION, auth().1)
            .await;

        resp.assert_status_ok();
        let body: Value = resp.json();
        assert_eq!(body["__modelVersion"], 2);
        assert!(state
            .secrets
            .get("onyxia/user-jdoe/.onyxia/servicePassword")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_project_is_not_found() {
        let (_, server) = server();
        server
            .post("/project")
            .add_header(AUTHORIZATION, auth().1)
            .json(&json!({ "projectId": "projet-other" }))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn concurrent_change_asks_for_reload() {
        let (state, server) = server();
        let (name, value) = auth();
        server
            .post("/project")
            .add_header(name, value)
            .json(&json!({ "projectId": "projet-alpha" }))
            .await
            .assert_status_ok();

        state
            .secrets
            .put(
                "onyxia/projet-alpha/.onyxia/clusterNotificationCheckoutTime",
                Secret::scalar(json!(5)),
            )
            .await
            .unwrap();

        let (name, value) = auth();
        let resp = server
            .put("/project/configs/clusterNotificationCheckoutTime")
            .add_header(name, value)
            .json(&json!(10))
            .await;
        resp.assert_status(StatusCode::CONFLICT);
        assert_eq!(resp.json::<Value>()["reload"], true);

        // The next request reloads the same project with the remote value.
        let (name, value) = auth();
        let body: Value = server.get("/project/configs").add_header(name, value).await.json();
        assert_eq!(body["clusterNotificationCheckoutTime"], 5);

        let (name, value) = auth();
        let body: Value = server.get("/projects").add_header(name, value).await.json();
        assert_eq!(body["selectedProjectId"], "projet-alpha");
    }

    #[tokio::test]
    async fn config_values_are_updated_and_validated() {
        let (_, server) = server();
        let (name, value) = auth();
        let body: Value = server
            .put("/project/configs/clusterNotificationCheckoutTime")
            .add_header(name, value)
            .json(&json!(1700000000000_i64))
            .await
            .json();
        assert_eq!(body["updated"], true);

        let (name, value) = auth();
        server
            .put("/project/configs/nope")
            .add_header(name, value)
            .json(&json!(1))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let (name, value) = auth();
        server
            .put("/project/configs/restorableServiceConfigs")
            .add_header(name, value)
            .json(&json!("not a list"))
            .await
            .assert_status(StatusCode::UNPROCESSABLE_ENTITY);

        let (name, value) = auth();
        let body: Value = server
            .post("/project/service-password")
            .add_header(name, value)
            .await
            .json();
        assert_eq!(body["servicePassword"].as_str().unwrap().len(), 32);
    }
}
