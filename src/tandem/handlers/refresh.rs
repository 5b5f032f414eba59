use crate::tandem::{
    handlers::{
        client_ip, read_cookie, session_cookies, AppState, SessionResponse, ACCESS_COOKIE,
        REFRESH_COOKIE,
    },
    session::SessionError,
};
use axum::{
    extract::{ConnectInfo, Extension},
    http::{HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use std::{net::SocketAddr, sync::Arc};
use tracing::instrument;

#[utoipa::path(
    post,
    path= "/refresh",
    responses (
        (status = 200, description = "Pair rotated; new cookies set", body = SessionResponse),
        (status = 400, description = "access_token or refresh_token cookie missing"),
        (status = 401, description = "Invalid, expired, unpaired or already rotated credentials"),
        (status = 403, description = "Origin does not match the session and the policy rejects it"),
    ),
    tag= "auth"
)]
#[instrument(skip(state, headers))]
pub async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, SessionError> {
    let access = read_cookie(&headers, ACCESS_COOKIE)
        .ok_or(SessionError::InvalidRequest("access token required"))?;
    let refresh = read_cookie(&headers, REFRESH_COOKIE)
        .ok_or(SessionError::InvalidRequest("refresh token required"))?;

    let ip = client_ip(&headers, peer, state.refresh_ip);
    let issued = state.session.refresh(&access, &refresh, &ip).await?;

    Ok((
        StatusCode::OK,
        AppendHeaders(session_cookies(&state, &issued)),
        Json(SessionResponse {
            message: "successfully refreshed".to_string(),
            expires_in: issued.expires_in,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tandem::{
        handlers::{tests::test_state, CookieSettings, IpSource},
        session::tests::test_service,
        store::MemoryUserStore,
    };
    use crate::token::MismatchPolicy;
    use axum::{
        body::Body,
        extract::connect_info::MockConnectInfo,
        http::{header::COOKIE, Request},
        routing::post,
        Router,
    };
    use tower::ServiceExt;

    fn app(state: Arc<AppState>, peer: [u8; 4]) -> Router {
        Router::new()
            .route("/refresh", post(refresh))
            .layer(Extension(state))
            .layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
    }

    fn request(cookie: Option<String>) -> anyhow::Result<Request<Body>> {
        let mut builder = Request::builder().method("POST").uri("/refresh");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        Ok(builder.body(Body::empty())?)
    }

    async fn logged_in(state: &AppState) -> anyhow::Result<String> {
        let user_id = state.session.register("alice@example.com", "secret").await?;
        let issued = state
            .session
            .login(&user_id.to_string(), "alice@example.com", "secret", "10.0.0.1")
            .await?;
        Ok(format!(
            "access_token={}; refresh_token={}",
            issued.access_token, issued.refresh_cookie
        ))
    }

    #[tokio::test]
    async fn refresh_rotates_and_rejects_replay() -> anyhow::Result<()> {
        let state = test_state();
        let cookie = logged_in(&state).await?;

        let response = app(state.clone(), [10, 0, 0, 1])
            .oneshot(request(Some(cookie.clone()))?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get_all(axum::http::header::SET_COOKIE)
                .iter()
                .count(),
            2
        );

        let replay = app(state, [10, 0, 0, 1])
            .oneshot(request(Some(cookie))?)
            .await?;
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn missing_cookies_are_bad_requests() -> anyhow::Result<()> {
        let state = test_state();
        let response = app(state.clone(), [10, 0, 0, 1])
            .oneshot(request(None)?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app(state, [10, 0, 0, 1])
            .oneshot(request(Some("access_token=abc".to_string()))?)
            .await?;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reject_policy_forbids_new_origin() -> anyhow::Result<()> {
        let (session, mut queue) = test_service(Arc::new(MemoryUserStore::new()));
        let state = Arc::new(AppState {
            session: session.with_policy(MismatchPolicy::RejectOnMismatch),
            cookies: CookieSettings::default(),
            login_ip: IpSource::Remote,
            refresh_ip: IpSource::Remote,
        });
        let cookie = logged_in(&state).await?;

        let response = app(state, [192, 168, 1, 1])
            .oneshot(request(Some(cookie))?)
            .await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(queue.try_recv().is_ok());
        Ok(())
    }
}
