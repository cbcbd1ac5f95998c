//! Websocket listener. Authentication happens inside the upgrade handshake, so
//! an unauthenticated client never gets a socket.

use crate::middleware::auth::bearer_token;
use crate::state::AppState;
use crate::websocket::session::run_session;
use actix_web::web;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identity established during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: Uuid,
    pub device_id: Option<String>,
}

/// Upgrade request query string, percent-decoded
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeParams {
    pub token: Option<String>,
    pub device_id: Option<String>,
}

impl HandshakeParams {
    pub fn parse(query: &str) -> Result<Self, ErrorResponse> {
        let params = web::Query::<HandshakeParams>::from_query(query)
            .map_err(|_| unauthorized("malformed query string"))?
            .into_inner();
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Ok(Self {
            token: non_empty(params.token),
            device_id: non_empty(params.device_id),
        })
    }
}

fn unauthorized(message: &str) -> ErrorResponse {
    let body = serde_json::json!({ "error": "UNAUTHENTICATED", "message": message }).to_string();
    let mut response = ErrorResponse::new(Some(body));
    *response.status_mut() = StatusCode::UNAUTHORIZED;
    response
}

/// Authenticate an upgrade request from `?token=` or `Authorization: Bearer`.
pub fn authenticate(state: &AppState, req: &Request) -> Result<Handshake, ErrorResponse> {
    let params = HandshakeParams::parse(req.uri().query().unwrap_or_default())?;

    let token = params.token.as_deref().or_else(|| {
        req.headers()
            .get("Authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
    });
    let Some(token) = token else {
        return Err(unauthorized("missing token"));
    };

    let claims = state
        .jwt
        .validate(token)
        .map_err(|_| unauthorized("invalid token"))?;

    let device_id = params.device_id.or(claims.device_id);

    Ok(Handshake {
        user_id: claims.sub,
        device_id,
    })
}

/// Upgrade one accepted stream and run its session to completion.
pub async fn handle_connection<S>(stream: S, state: AppState)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut handshake = None;
    let callback = |req: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let identity = authenticate(&state, req)?;
        handshake = Some(identity);
        Ok(response)
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(error = %e, "websocket handshake rejected");
            return;
        }
    };

    // The callback ran to completion, so the identity is always set here
    let Some(Handshake { user_id, device_id }) = handshake else {
        return;
    };
    run_session(ws, state, user_id, device_id).await;
}

pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    info!(addr = ?listener.local_addr().ok(), "websocket gateway listening");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
                continue;
            }
        };
        debug!(%peer, "connection accepted");

        let state = state.clone();
        tokio::spawn(async move {
            handle_connection(stream, state).await;
        });
    }
}
