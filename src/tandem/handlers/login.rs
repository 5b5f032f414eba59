use crate::tandem::{
    handlers::{client_ip, session_cookies, AppState, Credentials, SessionResponse},
    session::SessionError,
};
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Extension, Path},
    http::{HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/login/{user_id}",
    params(("user_id" = String, Path, description = "User id returned by /register")),
    request_body = Credentials,
    responses (
        (status = 200, description = "Logged in; access_token and refresh_token cookies set", body = SessionResponse),
        (status = 400, description = "Missing or malformed credentials"),
        (status = 401, description = "Email or password does not match"),
        (status = 404, description = "User not found"),
    ),
    tag= "auth"
)]
#[instrument(skip(state, headers, payload))]
pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    Path(user_id): Path<String>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<impl IntoResponse, SessionError> {
    let Json(credentials) =
        payload.map_err(|_| SessionError::InvalidRequest("invalid request data"))?;

    let ip = client_ip(&headers, peer, state.login_ip);
    let issued = state
        .session
        .login(&user_id, &credentials.email, &credentials.password, &ip)
        .await?;

    Ok((
        StatusCode::OK,
        AppendHeaders(session_cookies(&state, &issued)),
        Json(SessionResponse {
            message: "successfully logged in".to_string(),
            expires_in: issued.expires_in,
        }),
    ))
}
