use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use tracing::debug;

use super::context::QueryCtx;
use super::errors::{ModelError, ModelResult};
use super::filters::{calculate_metadata, Filters, Metadata, MOVIE_SORT_SAFELIST};
use super::validator::{unique, ValidationErrors};

pub const MIN_YEAR: i32 = 1888;
pub const MAX_TITLE_BYTES: usize = 500;
pub const MAX_GENRES: usize = 5;

const MOVIE_COLUMNS: &str = "id, created_at, title, year, runtime, genres, version";

/// Row in the `movies` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct MovieRow {
    pub id: i64,
    pub created_at: OffsetDateTime,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
    pub version: i32,
}

#[derive(Debug, FromRow)]
struct MovieListRow {
    total_records: i64,
    #[sqlx(flatten)]
    movie: MovieRow,
}

/// A stored catalog record.
///
/// `id`, `version` and `created_at` are assigned by storage and are read-only
/// for callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Movie {
    id: i64,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
    version: i32,
}

impl Movie {
    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn created_at(&self) -> OffsetDateTime {
        self.created_at
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_movie(&self.title, self.year, self.runtime, &self.genres)
    }
}

impl From<MovieRow> for Movie {
    fn from(r: MovieRow) -> Self {
        Self {
            id: r.id,
            created_at: r.created_at,
            title: r.title,
            year: r.year,
            runtime: r.runtime,
            genres: r.genres,
            version: r.version,
        }
    }
}

/// Fields a caller supplies when creating a movie.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MovieInput {
    pub title: String,
    pub year: i32,
    pub runtime: i32,
    pub genres: Vec<String>,
}

impl MovieInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        validate_movie(&self.title, self.year, self.runtime, &self.genres)
    }
}

pub fn validate_movie(
    title: &str,
    year: i32,
    runtime: i32,
    genres: &[String],
) -> Result<(), ValidationErrors> {
    let mut v = ValidationErrors::new();

    v.check(!title.trim().is_empty(), "title", "must be provided");
    v.check(
        title.len() <= MAX_TITLE_BYTES,
        "title",
        "must not be more than 500 bytes long",
    );

    v.check(year != 0, "year", "must be provided");
    v.check(year >= MIN_YEAR, "year", "must be 1888 or later");
    v.check(
        year <= OffsetDateTime::now_utc().year(),
        "year",
        "must not be in the future",
    );

    v.check(runtime != 0, "runtime", "must be provided");
    v.check(runtime > 0, "runtime", "must be a positive integer");

    v.check(!genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(
        genres.len() <= MAX_GENRES,
        "genres",
        "must not contain more than 5 genres",
    );
    v.check(
        genres.iter().all(|g| !g.trim().is_empty()),
        "genres",
        "must not contain blank entries",
    );
    v.check(unique(genres.iter()), "genres", "must not contain duplicate values");

    v.finish()
}

/// Catalog record store.
#[async_trait]
pub trait Movies: Send + Sync {
    async fn insert(&self, ctx: &QueryCtx, input: MovieInput) -> ModelResult<Movie>;

    async fn get(&self, ctx: &QueryCtx, id: i64) -> ModelResult<Movie>;

    /// Persists `movie` only if its version still matches the stored one.
    ///
    /// On success `movie` reflects the stored row, including the bumped
    /// version. A stale version yields `EditConflict` and writes nothing.
    async fn update(&self, ctx: &QueryCtx, movie: &mut Movie) -> ModelResult<()>;

    async fn delete(&self, ctx: &QueryCtx, id: i64) -> ModelResult<()>;

    /// Filtered, sorted page of movies plus metadata from the same query.
    async fn get_all(
        &self,
        ctx: &QueryCtx,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> ModelResult<(Vec<Movie>, Metadata)>;
}

/// PostgreSQL-backed [`Movies`].
#[derive(Clone)]
pub struct MovieModel {
    pool: PgPool,
}

impl MovieModel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Movies for MovieModel {
    async fn insert(&self, ctx: &QueryCtx, input: MovieInput) -> ModelResult<Movie> {
        input.validate()?;

        let sql = format!(
            "INSERT INTO movies (title, year, runtime, genres) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {MOVIE_COLUMNS}"
        );
        let row = ctx
            .run(
                sqlx::query_as::<_, MovieRow>(&sql)
                    .bind(&input.title)
                    .bind(input.year)
                    .bind(input.runtime)
                    .bind(&input.genres)
                    .fetch_one(&self.pool),
            )
            .await?;

        debug!(movie_id = row.id, "movie inserted");
        Ok(row.into())
    }

    async fn get(&self, ctx: &QueryCtx, id: i64) -> ModelResult<Movie> {
        if id < 1 {
            return Err(ModelError::NotFound);
        }

        let sql = format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1");
        let row = ctx
            .run(
                sqlx::query_as::<_, MovieRow>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool),
            )
            .await?;

        row.map(Movie::from).ok_or(ModelError::NotFound)
    }

    async fn update(&self, ctx: &QueryCtx, movie: &mut Movie) -> ModelResult<()> {
        movie.validate()?;

        // check-and-bump happens inside the single statement
        let sql = format!(
            "UPDATE movies \
             SET title = $1, year = $2, runtime = $3, genres = $4, version = version + 1 \
             WHERE id = $5 AND version = $6 \
             RETURNING {MOVIE_COLUMNS}"
        );
        let row = ctx
            .run(
                sqlx::query_as::<_, MovieRow>(&sql)
                    .bind(&movie.title)
                    .bind(movie.year)
                    .bind(movie.runtime)
                    .bind(&movie.genres)
                    .bind(movie.id)
                    .bind(movie.version)
                    .fetch_optional(&self.pool),
            )
            .await?;

        match row {
            Some(row) => {
                debug!(movie_id = row.id, version = row.version, "movie updated");
                *movie = row.into();
                Ok(())
            }
            None => {
                debug!(movie_id = movie.id, version = movie.version, "movie edit conflict");
                Err(ModelError::EditConflict)
            }
        }
    }

    async fn delete(&self, ctx: &QueryCtx, id: i64) -> ModelResult<()> {
        if id < 1 {
            return Err(ModelError::NotFound);
        }

        let result = ctx
            .run(
                sqlx::query("DELETE FROM movies WHERE id = $1")
                    .bind(id)
                    .execute(&self.pool),
            )
            .await?;

        if result.rows_affected() == 0 {
            return Err(ModelError::NotFound);
        }
        debug!(movie_id = id, "movie deleted");
        Ok(())
    }

    async fn get_all(
        &self,
        ctx: &QueryCtx,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> ModelResult<(Vec<Movie>, Metadata)> {
        if !filters.sorts_within(MOVIE_SORT_SAFELIST) {
            let mut v = ValidationErrors::new();
            v.add("sort", "invalid sort value");
            return Err(v.into());
        }

        let mut qb = search_query(title, genres, filters);
        let rows = ctx
            .run(qb.build_query_as::<MovieListRow>().fetch_all(&self.pool))
            .await?;

        let total_records = rows.first().map(|r| r.total_records).unwrap_or(0);
        let metadata = calculate_metadata(total_records, filters.page(), filters.page_size());
        let movies = rows.into_iter().map(|r| Movie::from(r.movie)).collect();

        Ok((movies, metadata))
    }
}

/// Builds the single search statement. The sort column comes from `filters`,
/// which only holds safelisted names; all caller text is bound.
fn search_query(title: &str, genres: &[String], filters: &Filters) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        "SELECT count(*) OVER() AS total_records, {MOVIE_COLUMNS} FROM movies WHERE TRUE"
    ));

    if !title.is_empty() {
        qb.push(" AND title ILIKE ").push_bind(like_pattern(title));
    }
    if !genres.is_empty() {
        qb.push(" AND genres @> ").push_bind(genres.to_vec());
    }

    qb.push(" ORDER BY ")
        .push(filters.sort_column())
        .push(" ")
        .push(filters.sort_direction().as_sql());
    if filters.sort_column() != "id" {
        qb.push(", id ASC");
    }

    qb.push(" LIMIT ")
        .push_bind(filters.limit())
        .push(" OFFSET ")
        .push_bind(filters.offset());
    qb
}

/// Case-insensitive substring pattern with LIKE metacharacters escaped.
pub(crate) fn like_pattern(title: &str) -> String {
    let mut out = String::with_capacity(title.len() + 2);
    out.push('%');
    for c in title.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('%');
    out
}
