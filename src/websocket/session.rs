/// Per-connection protocol handler.
///
/// Each admitted connection runs as its own actor: inbound frames are decoded
/// once into `ClientFrame` and dispatched; outbound envelopes arrive through
/// the connection's registry channel and are forwarded to the socket. Every
/// exit path funnels through `stopped`, so registry cleanup is unconditional.
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::services::NotificationStore;

use super::hub::RealtimeHub;
use super::messages::{ClientFrame, ServerEnvelope};
use super::registry::ConnectionHandle;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound envelope routed from the hub to this connection's socket
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Deliver(ServerEnvelope);

pub struct WsSession {
    user_id: Uuid,
    connection_id: Uuid,
    hub: Arc<RealtimeHub>,
    store: Arc<dyn NotificationStore>,
    hb: Instant,
    // Consumed on start: the handle moves into the registry, the receiver
    // into the forwarding task
    handle: Option<ConnectionHandle>,
    rx: Option<mpsc::Receiver<ServerEnvelope>>,
}

impl WsSession {
    pub fn new(user_id: Uuid, hub: Arc<RealtimeHub>, store: Arc<dyn NotificationStore>) -> Self {
        let (handle, rx) = ConnectionHandle::new();
        Self {
            user_id,
            connection_id: handle.id(),
            hub,
            store,
            hb: Instant::now(),
            handle: Some(handle),
            rx: Some(rx),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!(user_id = %act.user_id, "heartbeat timed out, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_envelope(&self, envelope: &ServerEnvelope, ctx: &mut ws::WebsocketContext<Self>) {
        match envelope.to_json() {
            Ok(json) => ctx.text(json),
            Err(e) => error!(user_id = %self.user_id, error = %e, "failed to encode envelope"),
        }
    }

    fn handle_frame(&mut self, frame: ClientFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame {
            ClientFrame::Ping => {
                self.hb = Instant::now();
                self.send_envelope(&ServerEnvelope::pong(), ctx);
            }
            ClientFrame::JoinRoom { room_id } => {
                self.hub.join_room(self.user_id, room_id);
            }
            ClientFrame::LeaveRoom { room_id } => {
                self.hub.leave_room(self.user_id, room_id);
            }
            ClientFrame::Typing { room_id, is_typing } => {
                self.hub.send_typing(room_id, self.user_id, is_typing);
            }
            ClientFrame::MarkNotificationRead { notification_id } => {
                let store = self.store.clone();
                let user_id = self.user_id;
                actix::spawn(async move {
                    if let Err(e) = store.mark_read(notification_id, user_id).await {
                        warn!(%notification_id, error = %e, "failed to mark notification read");
                    }
                });
            }
            ClientFrame::Unknown => {
                warn!(user_id = %self.user_id, "unrecognized frame type, ignoring");
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(user_id = %self.user_id, connection_id = %self.connection_id, "session started");

        self.hb(ctx);

        // Bridge the registry channel to this socket
        if let Some(mut rx) = self.rx.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(envelope) = rx.recv().await {
                    addr.do_send(Deliver(envelope));
                }
            });
        }

        if let Some(handle) = self.handle.take() {
            self.hub.admit(self.user_id, handle);
        }

        let welcome = ServerEnvelope::welcome(self.user_id, self.hub.list_online());
        self.send_envelope(&welcome, ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // Unconditional cleanup on every exit path
        self.hub.remove(self.user_id, self.connection_id);
        info!(user_id = %self.user_id, connection_id = %self.connection_id, "session stopped");
    }
}

impl Handler<Deliver> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        self.send_envelope(&msg.0, ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.hb = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => self.handle_frame(frame, ctx),
                Err(e) => {
                    // One bad frame does not cost the connection
                    warn!(user_id = %self.user_id, error = %e, "undecodable frame");
                    self.send_envelope(
                        &ServerEnvelope::error("failed to process message".to_string()),
                        ctx,
                    );
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!(user_id = %self.user_id, "binary frames not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                info!(user_id = %self.user_id, ?reason, "close frame received");
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                warn!(user_id = %self.user_id, error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
