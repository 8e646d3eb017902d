//! `GatherServer` — axum HTTP + WebSocket server assembly.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use gather_store::membership::MembershipStore;
use gather_store::repository::EventRepository;

use crate::auth::Authenticator;
use crate::cache::CacheStore;
use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::http::events;
use crate::realtime::broadcast::Broadcaster;
use crate::realtime::presence::PresenceCoordinator;
use crate::realtime::registry::ConnectionRegistry;
use crate::realtime::rooms::RoomDirectory;
use crate::realtime::session::run_ws_session;
use crate::shutdown::ShutdownCoordinator;
use crate::update::UpdateCoordinator;

/// Shared state passed to every handler and session task.
///
/// All registries are process-scoped values constructed once in
/// [`GatherServer::new`] and carried as explicit handles — nothing here is
/// a module-level singleton.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Authoritative event store.
    pub repo: Arc<dyn EventRepository>,
    /// TTL read cache.
    pub cache: Arc<CacheStore>,
    /// Live session tracking.
    pub registry: Arc<ConnectionRegistry>,
    /// Room membership.
    pub rooms: Arc<RoomDirectory>,
    /// Frame fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Presence orchestration.
    pub presence: Arc<PresenceCoordinator>,
    /// Mutation pipeline.
    pub updates: Arc<UpdateCoordinator>,
    /// Handshake authentication.
    pub auth: Arc<dyn Authenticator>,
    /// Shutdown coordination.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Metrics handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

/// The gather server.
pub struct GatherServer {
    state: AppState,
}

impl GatherServer {
    /// Wire up all components around the supplied collaborator seams.
    pub fn new(
        config: ServerConfig,
        auth: Arc<dyn Authenticator>,
        repo: Arc<dyn EventRepository>,
        membership: Arc<dyn MembershipStore>,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(config.cache_ttl()));
        let registry = Arc::new(ConnectionRegistry::new());
        let rooms = Arc::new(RoomDirectory::new(membership));
        let broadcaster = Arc::new(Broadcaster::new(rooms.clone()));
        let presence = Arc::new(PresenceCoordinator::new(
            registry.clone(),
            rooms.clone(),
            broadcaster.clone(),
        ));
        let updates = Arc::new(UpdateCoordinator::new(
            repo.clone(),
            cache.clone(),
            broadcaster.clone(),
        ));

        Self {
            state: AppState {
                config: Arc::new(config),
                repo,
                cache,
                registry,
                rooms,
                broadcaster,
                presence,
                updates,
                auth,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                start_time: Instant::now(),
                metrics,
            },
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .route("/ws", get(ws_handler))
            .route(
                "/api/events",
                get(events::list_events).post(events::create_event),
            )
            .route(
                "/api/events/{id}",
                get(events::get_event)
                    .put(events::update_event)
                    .delete(events::delete_event),
            )
            .route("/api/events/{id}/attend", axum::routing::post(events::attend_event))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind and serve. Returns the bound address and the serve task; the
    /// task exits when the shutdown token fires.
    pub async fn listen(&self) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let addr = format!("{}:{}", self.state.config.host, self.state.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;
        info!(%local_addr, "server listening");

        let _sweeper = self.state.cache.spawn_sweeper(
            self.state.config.cache_sweep_interval(),
            self.state.shutdown.token(),
        );

        let app = self.router();
        let token = self.state.shutdown.token();
        let handle = tokio::spawn(async move {
            let shutdown = async move { token.cancelled().await };
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "server error");
            }
        });
        Ok((local_addr, handle))
    }

    /// Shared state (used by the binary and tests).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Presence coordinator.
    pub fn presence(&self) -> &Arc<PresenceCoordinator> {
        &self.state.presence
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Read cache.
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.state.cache
    }

    /// Room directory.
    pub fn rooms(&self) -> &Arc<RoomDirectory> {
        &self.state.rooms
    }

    /// Connection registry.
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.state.registry
    }
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let connections = state.broadcaster.connection_count().await;
    let rooms = state.rooms.room_count();
    Json(health::health_check(state.start_time, connections, rooms))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => crate::metrics::render(handle).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct WsParams {
    token: Option<String>,
}

/// GET /ws?token=…
///
/// The credential is verified before the upgrade; a missing or invalid
/// token refuses the connection with 401.
async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(token) = params.token else {
        warn!("websocket handshake without token refused");
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match state.auth.verify(&token).await {
        Ok(principal) => {
            ws.on_upgrade(move |socket| run_ws_session(socket, principal, state))
        }
        Err(err) => {
            warn!(error = %err, "websocket handshake refused");
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use gather_store::{InMemoryEventRepository, InMemoryMembershipStore};

    use crate::auth::JwtAuthenticator;

    fn make_server() -> (GatherServer, Arc<JwtAuthenticator>) {
        let auth = Arc::new(JwtAuthenticator::new("test-secret"));
        let server = GatherServer::new(
            ServerConfig::default(),
            auth.clone(),
            Arc::new(InMemoryEventRepository::new()),
            Arc::new(InMemoryMembershipStore::new()),
            None,
        );
        (server, auth)
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["active_rooms"], 0);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/nonexistent")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_without_recorder_returns_404() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn create_without_token_is_unauthorized() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn create_list_get_roundtrip() {
        let (server, auth) = make_server();
        let token = auth
            .issue(&gather_core::ids::PrincipalId::from("alice"), 60)
            .unwrap();
        let app = server.router();

        let new_event = serde_json::json!({
            "title": "Rust Meetup",
            "description": "Monthly meetup",
            "date": "2026-09-01T18:00:00Z",
            "category": "social",
            "location": "Berlin",
            "maxAttendees": 50
        });
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {token}"))
                    .body(Body::from(new_event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_owned();
        assert_eq!(created["attendeeCount"], 0);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/events?term=rust&categories=social")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let page = body_json(resp).await;
        assert_eq!(page["pagination"]["total"], 1);
        assert_eq!(page["events"][0]["title"], "Rust Meetup");

        let resp = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/events/{id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let detail = body_json(resp).await;
        assert_eq!(detail["id"], id.as_str());
    }

    #[tokio::test]
    async fn update_by_non_owner_is_forbidden() {
        let (server, auth) = make_server();
        let alice = auth
            .issue(&gather_core::ids::PrincipalId::from("alice"), 60)
            .unwrap();
        let mallory = auth
            .issue(&gather_core::ids::PrincipalId::from("mallory"), 60)
            .unwrap();
        let app = server.router();

        let new_event = serde_json::json!({
            "title": "Meetup",
            "description": "d",
            "date": "2026-09-01T18:00:00Z",
            "category": "social",
            "location": "Berlin"
        });
        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/events")
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {alice}"))
                    .body(Body::from(new_event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let id = body_json(resp).await["id"].as_str().unwrap().to_owned();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("PUT")
                    .uri(format!("/api/events/{id}"))
                    .header("content-type", "application/json")
                    .header("authorization", format!("Bearer {mallory}"))
                    .body(Body::from(r#"{"title":"Hijacked"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        let body = body_json(resp).await;
        assert_eq!(body["code"], "FORBIDDEN");
    }

    #[tokio::test]
    async fn missing_event_returns_404_body() {
        let (server, _) = make_server();
        let resp = server
            .router()
            .oneshot(
                Request::builder()
                    .uri("/api/events/ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["code"], "NOT_FOUND");
        assert_eq!(body["message"], "Event not found");
    }

    #[tokio::test]
    async fn listen_binds_auto_port() {
        let (server, _) = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        server.shutdown().shutdown();
        handle.await.unwrap();
    }
}
