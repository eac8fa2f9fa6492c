use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::websocket::{connection::Identity, session::Hub, transport::split_socket};

/// WebSocket upgrade handler for the fan-out channel.
///
/// The bearer token is taken as an already-authenticated identity and is not
/// validated here. Clients without one get a fresh anonymous identity.
pub async fn websocket_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    State(hub): State<Hub>,
) -> Response {
    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Rejected non-upgrade request");
            return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response();
        }
    };
    let identity = bearer
        .map(|TypedHeader(auth)| Identity::new(auth.token()))
        .unwrap_or_else(Identity::anonymous);

    ws.on_failed_upgrade(|e| {
        tracing::warn!(error = %e, "WebSocket upgrade failed");
    })
    .on_upgrade(move |socket| async move {
        let (sink, stream) = split_socket(socket);
        hub.serve(identity, sink, stream).await;
    })
}
