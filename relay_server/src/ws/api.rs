use actix_web::{HttpResponse, Result, error::ErrorUnauthorized, get, web};
use campusconnect_auth::verify_token;
use serde::Deserialize;
use tokio::task::spawn_local;

use crate::ws::handler;
use crate::{AppState, RELAY_SERVER_HANDLE};

#[derive(Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    token: Option<String>,
}

/// Authenticated WebSocket upgrade.
///
/// The credential is verified and resolved through the directory before
/// `actix_ws::handle` runs, so a bad token rejects the handshake outright
/// and no connection state is ever created.
#[get("/ws")]
pub async fn websocket(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    query: web::Query<ConnectRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let token = query.token.as_deref().ok_or_else(|| {
        log::warn!("Rejected handshake: missing token");
        ErrorUnauthorized("Unauthorized")
    })?;

    let claims = verify_token(&state.ws_secret, token).map_err(|error| {
        log::warn!("Rejected handshake: {error:?}");
        ErrorUnauthorized("Unauthorized")
    })?;

    let profile = state.directory.resolve(&claims.sub).await.map_err(|error| {
        log::warn!("Rejected handshake for {}: {error:?}", claims.sub);
        ErrorUnauthorized("Unauthorized")
    })?;

    let relay_server = RELAY_SERVER_HANDLE.lock().unwrap().as_ref().unwrap().clone();
    let (res, session, msg_stream) = actix_ws::handle(&req, stream)?;

    // spawn websocket handler (and don't await it) so that the response is returned immediately
    spawn_local(handler::relay_ws(
        relay_server,
        session,
        msg_stream,
        profile,
        state.join_policy,
    ));

    Ok(res)
}
