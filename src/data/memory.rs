//! In-memory doubles of the model stores, mirroring the PostgreSQL semantics.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::context::QueryCtx;
use super::errors::{ModelError, ModelResult};
use super::filters::{calculate_metadata, Filters, Metadata, SortDirection, MOVIE_SORT_SAFELIST};
use super::movies::{Movie, MovieInput, MovieRow, Movies};
use super::users::{normalize_email, NewUser, User, UserRow, Users};
use super::validator::ValidationErrors;

/// Like BIGSERIAL, ids are never handed out twice, even after a delete.
fn next_id(last_id: &AtomicI64) -> i64 {
    last_id.fetch_add(1, AtomicOrdering::Relaxed) + 1
}

fn check_ctx(ctx: &QueryCtx) -> ModelResult<()> {
    if ctx.is_done() {
        Err(ModelError::Timeout)
    } else {
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMovies {
    rows: Mutex<BTreeMap<i64, MovieRow>>,
    last_id: AtomicI64,
}

impl MemoryMovies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored row, for asserting on what a write left behind.
    pub fn row(&self, id: i64) -> Option<MovieRow> {
        self.rows.lock().unwrap().get(&id).cloned()
    }
}

fn compare(a: &MovieRow, b: &MovieRow, column: &str) -> Ordering {
    match column {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    }
}

#[async_trait]
impl Movies for MemoryMovies {
    async fn insert(&self, ctx: &QueryCtx, input: MovieInput) -> ModelResult<Movie> {
        input.validate()?;
        check_ctx(ctx)?;

        let mut rows = self.rows.lock().unwrap();
        let id = next_id(&self.last_id);
        let row = MovieRow {
            id,
            created_at: OffsetDateTime::now_utc(),
            title: input.title,
            year: input.year,
            runtime: input.runtime,
            genres: input.genres,
            version: 1,
        };
        rows.insert(id, row.clone());
        Ok(row.into())
    }

    async fn get(&self, ctx: &QueryCtx, id: i64) -> ModelResult<Movie> {
        check_ctx(ctx)?;
        self.row(id).map(Movie::from).ok_or(ModelError::NotFound)
    }

    async fn update(&self, ctx: &QueryCtx, movie: &mut Movie) -> ModelResult<()> {
        movie.validate()?;
        check_ctx(ctx)?;

        let mut rows = self.rows.lock().unwrap();
        let row = match rows.get_mut(&movie.id()) {
            Some(row) if row.version == movie.version() => row,
            _ => return Err(ModelError::EditConflict),
        };
        row.title = movie.title.clone();
        row.year = movie.year;
        row.runtime = movie.runtime;
        row.genres = movie.genres.clone();
        row.version += 1;
        *movie = row.clone().into();
        Ok(())
    }

    async fn delete(&self, ctx: &QueryCtx, id: i64) -> ModelResult<()> {
        check_ctx(ctx)?;
        match self.rows.lock().unwrap().remove(&id) {
            Some(_) => Ok(()),
            None => Err(ModelError::NotFound),
        }
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
        check_ctx(ctx)?;

        let needle = title.to_lowercase();
        let mut matched: Vec<MovieRow> = self
            .rows
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.title.to_lowercase().contains(&needle))
            .filter(|r| genres.iter().all(|g| r.genres.contains(g)))
            .cloned()
            .collect();

        let column = filters.sort_column();
        matched.sort_by(|a, b| {
            let primary = match filters.sort_direction() {
                SortDirection::Asc => compare(a, b, column),
                SortDirection::Desc => compare(b, a, column),
            };
            primary.then(a.id.cmp(&b.id))
        });

        let total = matched.len() as i64;
        let page: Vec<Movie> = matched
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .map(Movie::from)
            .collect();

        // the window count disappears with the rows when the page is empty
        let metadata = if page.is_empty() {
            Metadata::default()
        } else {
            calculate_metadata(total, filters.page(), filters.page_size())
        };
        Ok((page, metadata))
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    rows: Mutex<BTreeMap<i64, UserRow>>,
    last_id: AtomicI64,
}

impl MemoryUsers {
    pub fn new() -> Self {
        Self::default()
    }

    fn email_taken(rows: &BTreeMap<i64, UserRow>, email: &str, except: Option<i64>) -> bool {
        rows.values()
            .any(|r| Some(r.id) != except && r.email.to_lowercase() == email)
    }
}

#[async_trait]
impl Users for MemoryUsers {
    async fn insert(&self, ctx: &QueryCtx, user: NewUser) -> ModelResult<User> {
        user.validate()?;
        check_ctx(ctx)?;

        let email = normalize_email(&user.email);
        let mut rows = self.rows.lock().unwrap();
        if Self::email_taken(&rows, &email, None) {
            return Err(ModelError::DuplicateEmail);
        }
        let id = next_id(&self.last_id);
        let row = UserRow {
            id,
            created_at: OffsetDateTime::now_utc(),
            name: user.name,
            email,
            password_hash: user.password.hash().to_vec(),
            activated: false,
            version: 1,
        };
        rows.insert(id, row.clone());
        Ok(row.into())
    }

    async fn get_by_email(&self, ctx: &QueryCtx, email: &str) -> ModelResult<User> {
        check_ctx(ctx)?;
        let email = normalize_email(email);
        self.rows
            .lock()
            .unwrap()
            .values()
            .find(|r| r.email.to_lowercase() == email)
            .cloned()
            .map(User::from)
            .ok_or(ModelError::NotFound)
    }

    async fn update(&self, ctx: &QueryCtx, user: &mut User) -> ModelResult<()> {
        user.validate()?;
        check_ctx(ctx)?;

        let email = normalize_email(&user.email);
        let mut rows = self.rows.lock().unwrap();
        match rows.get(&user.id()) {
            Some(row) if row.version == user.version() => {}
            _ => return Err(ModelError::EditConflict),
        }
        if Self::email_taken(&rows, &email, Some(user.id())) {
            return Err(ModelError::DuplicateEmail);
        }

        let row = rows
            .get_mut(&user.id())
            .ok_or(ModelError::EditConflict)?;
        row.name = user.name.clone();
        row.email = email;
        row.password_hash = user.password.hash().to_vec();
        row.activated = user.activated;
        row.version += 1;
        *user = row.clone().into();
        Ok(())
    }
}
