use serde::{Deserialize, Serialize};

use crate::data::{Metadata, Movie, MovieInput};

/// Request body for `POST /v1/movies`. Missing fields fall back to zero values
/// and are then reported by validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateMovieRequest {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

impl From<CreateMovieRequest> for MovieInput {
    fn from(r: CreateMovieRequest) -> Self {
        Self {
            title: r.title,
            year: r.year,
            runtime: r.runtime,
            genres: r.genres,
        }
    }
}

/// Request body for `PATCH /v1/movies/:id`; absent fields stay unchanged.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieRequest {
    pub title: Option<String>,
    pub year: Option<i32>,
    pub runtime: Option<i32>,
    pub genres: Option<Vec<String>>,
}

impl UpdateMovieRequest {
    pub fn apply(self, movie: &mut Movie) {
        if let Some(title) = self.title {
            movie.title = title;
        }
        if let Some(year) = self.year {
            movie.year = year;
        }
        if let Some(runtime) = self.runtime {
            movie.runtime = runtime;
        }
        if let Some(genres) = self.genres {
            movie.genres = genres;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MovieEnvelope {
    pub movie: Movie,
}

#[derive(Debug, Serialize)]
pub struct MoviesEnvelope {
    pub movies: Vec<Movie>,
    pub metadata: Metadata,
}

#[derive(Debug, Serialize)]
pub struct MessageEnvelope {
    pub message: String,
}
