use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    data::{ModelError, NewUser, Password},
    errors::ApiError,
    state::AppState,
};

use super::dto::{RegisterRequest, UserEnvelope};

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/v1/users", post(register_user))
}

#[instrument(skip(state, payload))]
pub async fn register_user(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserEnvelope>), ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // argon2 is CPU bound
    let plaintext = payload.password;
    let password = tokio::task::spawn_blocking(move || Password::set(&plaintext))
        .await
        .map_err(anyhow::Error::from)??;

    let new_user = NewUser {
        name: payload.name,
        email: payload.email,
        password,
    };

    let user = match state.models.users.insert(&state.query_ctx(), new_user).await {
        Ok(u) => u,
        Err(ModelError::DuplicateEmail) => {
            warn!("email already registered");
            return Err(ModelError::DuplicateEmail.into());
        }
        Err(e) => return Err(e.into()),
    };

    info!(user_id = user.id(), "user registered");
    Ok((StatusCode::CREATED, Json(UserEnvelope { user })))
}
