use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    data::{ListParams, ModelError},
    errors::ApiError,
    state::AppState,
};

use super::dto::{
    CreateMovieRequest, MessageEnvelope, MovieEnvelope, MoviesEnvelope, UpdateMovieRequest,
};

pub fn movie_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/movies", get(list_movies).post(create_movie))
        .route(
            "/v1/movies/:id",
            get(show_movie).patch(update_movie).delete(delete_movie),
        )
}

/// Ids that are not positive integers cannot exist.
fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ModelError::NotFound.into()),
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

#[instrument(skip(state))]
pub async fn list_movies(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<MoviesEnvelope>, ApiError> {
    let search = params.into_movie_search().map_err(ApiError::validation)?;
    let (movies, metadata) = state
        .models
        .movies
        .get_all(&state.query_ctx(), &search.title, &search.genres, &search.filters)
        .await?;
    Ok(Json(MoviesEnvelope { movies, metadata }))
}

#[instrument(skip(state, payload))]
pub async fn create_movie(
    State(state): State<AppState>,
    payload: Result<Json<CreateMovieRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = json_body(payload)?;
    let movie = state
        .models
        .movies
        .insert(&state.query_ctx(), body.into())
        .await?;

    info!(movie_id = movie.id(), title = %movie.title, "movie created");
    let location = format!("/v1/movies/{}", movie.id());
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(MovieEnvelope { movie }),
    ))
}

#[instrument(skip(state))]
pub async fn show_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MovieEnvelope>, ApiError> {
    let id = parse_id(&id)?;
    let movie = state.models.movies.get(&state.query_ctx(), id).await?;
    Ok(Json(MovieEnvelope { movie }))
}

/// Applies a partial update. When `X-Expected-Version` is sent it must match
/// the version currently stored.
#[instrument(skip(state, headers, payload))]
pub async fn update_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<UpdateMovieRequest>, JsonRejection>,
) -> Result<Json<MovieEnvelope>, ApiError> {
    let id = parse_id(&id)?;
    let ctx = state.query_ctx();
    let mut movie = state.models.movies.get(&ctx, id).await?;

    if let Some(expected) = headers.get("X-Expected-Version") {
        let expected = expected.to_str().unwrap_or_default();
        if expected != movie.version().to_string() {
            warn!(movie_id = id, expected, current = movie.version(), "stale expected version");
            return Err(ModelError::EditConflict.into());
        }
    }

    json_body(payload)?.apply(&mut movie);
    state.models.movies.update(&ctx, &mut movie).await?;

    info!(movie_id = id, version = movie.version(), "movie updated");
    Ok(Json(MovieEnvelope { movie }))
}

#[instrument(skip(state))]
pub async fn delete_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageEnvelope>, ApiError> {
    let id = parse_id(&id)?;
    state.models.movies.delete(&state.query_ctx(), id).await?;

    info!(movie_id = id, "movie deleted");
    Ok(Json(MessageEnvelope {
        message: "movie successfully deleted".into(),
    }))
}
