/// WebSocket upgrade and hub operational endpoints.
///
/// Identity verification happens upstream (gateway); this service trusts the
/// `x-user-id` header (or `user_id` query parameter for browser WebSocket
/// clients, which cannot set headers). A request with no verified identity
/// never reaches the hub.
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{NewNotification, NotificationPriority, NotificationType};
use crate::state::AppState;
use crate::websocket::{ServerEnvelope, WsSession};

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastRequest {
    pub message: String,
    pub from: Option<String>,
    #[serde(default = "default_broadcast_priority")]
    pub priority: NotificationPriority,
}

fn default_broadcast_priority() -> NotificationPriority {
    NotificationPriority::High
}

#[derive(Debug, Deserialize)]
pub struct NotifyRequest {
    #[serde(default = "default_notify_type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default = "default_notify_priority")]
    pub priority: NotificationPriority,
    pub action_url: Option<String>,
}

fn default_notify_type() -> NotificationType {
    NotificationType::SystemAnnouncement
}

fn default_notify_priority() -> NotificationPriority {
    NotificationPriority::Medium
}

fn verified_identity(req: &HttpRequest) -> Option<Uuid> {
    req.headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
}

/// WebSocket upgrade: GET /api/v1/ws
pub async fn ws_connect(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();
    let Some(user_id) = verified_identity(&req).or(params.user_id) else {
        warn!("websocket connection rejected: no verified identity");
        return Ok(HttpResponse::Unauthorized().finish());
    };

    let session = WsSession::new(user_id, state.hub.clone(), state.store.clone());
    ws::start(session, &req, stream)
}

/// GET /api/v1/ws/online-users
pub async fn online_users(state: web::Data<AppState>) -> HttpResponse {
    let online = state.hub.list_online();

    HttpResponse::Ok().json(json!({
        "online_users": online,
        "count": online.len(),
    }))
}

/// GET /api/v1/ws/status/{user_id}
pub async fn ws_status(path: web::Path<Uuid>, state: web::Data<AppState>) -> HttpResponse {
    let user_id = path.into_inner();
    let connection_count = state.hub.connection_count(user_id);

    HttpResponse::Ok().json(json!({
        "user_id": user_id,
        "connected": connection_count > 0,
        "connection_count": connection_count,
    }))
}

/// POST /api/v1/ws/broadcast
///
/// Administrative broadcast to every connected user. Reports reach, never
/// delivery failure.
pub async fn broadcast_message(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<BroadcastRequest>,
) -> Result<HttpResponse, AppError> {
    if verified_identity(&req).is_none() {
        return Err(AppError::Unauthorized);
    }

    let body = body.into_inner();
    let envelope = ServerEnvelope::broadcast_message(body.message, body.from, body.priority);
    let delivered = state.hub.broadcast(&envelope, None);

    Ok(HttpResponse::Ok().json(json!({
        "message": "broadcast sent",
        "recipients": state.hub.connected_users_count(),
        "delivered": delivered,
    })))
}

/// POST /api/v1/ws/notify/{user_id}
///
/// Direct notification to one user: persisted via the emitter, pushed
/// best-effort. Only a persistence failure surfaces as a request failure.
pub async fn notify_user(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
    body: web::Json<NotifyRequest>,
) -> Result<HttpResponse, AppError> {
    let Some(caller) = verified_identity(&req) else {
        return Err(AppError::Unauthorized);
    };

    let recipient = path.into_inner();
    let body = body.into_inner();

    let created = state
        .notifications
        .emit(NewNotification {
            user_id: recipient,
            notification_type: body.notification_type,
            title: body.title,
            message: body.message,
            priority: body.priority,
            ticket_id: None,
            room_id: None,
            triggered_by: Some(caller),
            action_url: body.action_url,
        })
        .await?;

    Ok(HttpResponse::Ok().json(json!({
        "user_id": recipient,
        "notification_created": created.is_some(),
        "delivered_realtime": state.hub.is_online(recipient),
    })))
}

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/ws")
            .route("", web::get().to(ws_connect))
            .route("/online-users", web::get().to(online_users))
            .route("/status/{user_id}", web::get().to(ws_status))
            .route("/broadcast", web::post().to(broadcast_message))
            .route("/notify/{user_id}", web::post().to(notify_user)),
    );
}
