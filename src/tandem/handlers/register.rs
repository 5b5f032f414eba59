use crate::tandem::{
    handlers::{AppState, Credentials},
    session::SessionError,
};
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Registered {
    pub message: String,
    pub user_id: String,
}

#[utoipa::path(
    post,
    path= "/register",
    request_body = Credentials,
    responses (
        (status = 201, description = "Registration successful", body = Registered, content_type = "application/json"),
        (status = 400, description = "Missing or malformed email or password"),
        (status = 409, description = "User with the specified email already exists"),
    ),
    tag= "auth"
)]
#[instrument(skip(state, payload))]
pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<Credentials>, JsonRejection>,
) -> Result<(StatusCode, Json<Registered>), SessionError> {
    let Json(credentials) =
        payload.map_err(|_| SessionError::InvalidRequest("invalid request data"))?;

    let user_id = state
        .session
        .register(&credentials.email, &credentials.password)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Registered {
            message: "successfully registered".to_string(),
            user_id: user_id.to_string(),
        }),
    ))
}
