//! Data-access layer: the movie and user stores and the registry that
//! composes them.

use std::sync::Arc;

use sqlx::PgPool;

pub mod context;
pub mod errors;
pub mod filters;
pub mod movies;
pub mod password;
pub mod users;
pub mod validator;

#[cfg(test)]
pub(crate) mod memory;

pub use context::QueryCtx;
pub use errors::{ModelError, ModelResult};
pub use filters::{Filters, ListParams, Metadata, MovieSearch};
pub use movies::{Movie, MovieInput, MovieModel, Movies};
pub use password::Password;
pub use users::{NewUser, User, UserModel, Users};
pub use validator::ValidationErrors;

/// The stores callers depend on, behind their capability traits.
///
/// Holds a clone of the pool handle only; the pool itself belongs to the
/// process and is closed there.
#[derive(Clone)]
pub struct Models {
    pub movies: Arc<dyn Movies>,
    pub users: Arc<dyn Users>,
}

impl Models {
    pub fn new(pool: PgPool) -> Self {
        Self {
            movies: Arc::new(MovieModel::new(pool.clone())),
            users: Arc::new(UserModel::new(pool)),
        }
    }

    pub fn from_parts(movies: Arc<dyn Movies>, users: Arc<dyn Users>) -> Self {
        Self { movies, users }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::filters::{parse_filters, MOVIE_SORT_SAFELIST};
    use super::memory::{MemoryMovies, MemoryUsers};
    use super::*;

    fn ctx() -> QueryCtx {
        QueryCtx::with_timeout(Duration::from_secs(5))
    }

    fn models() -> (Models, Arc<MemoryMovies>) {
        let movies = Arc::new(MemoryMovies::new());
        let models = Models::from_parts(movies.clone(), Arc::new(MemoryUsers::new()));
        (models, movies)
    }

    fn input(title: &str, year: i32, runtime: i32, genres: &[&str]) -> MovieInput {
        MovieInput {
            title: title.into(),
            year,
            runtime,
            genres: genres.iter().map(|g| g.to_string()).collect(),
        }
    }

    fn filters(page: i64, page_size: i64, sort: &str) -> Filters {
        parse_filters(
            &ListParams {
                page: Some(page.to_string()),
                page_size: Some(page_size.to_string()),
                sort: Some(sort.into()),
                ..Default::default()
            },
            MOVIE_SORT_SAFELIST,
        )
        .unwrap()
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            name: "Alice".into(),
            email: email.into(),
            password: Password::from_hash(b"$argon2id$stub".to_vec()),
        }
    }

    #[tokio::test]
    async fn insert_assigns_id_and_first_version() {
        let (m, _) = models();
        let movie = m
            .movies
            .insert(&ctx(), input("Inception", 2010, 148, &["scifi", "thriller"]))
            .await
            .unwrap();
        assert!(movie.id() > 0);
        assert_eq!(movie.version(), 1);
        assert_eq!(m.movies.get(&ctx(), movie.id()).await.unwrap(), movie);
    }

    #[tokio::test]
    async fn invalid_insert_never_reaches_storage() {
        let (m, store) = models();
        let err = m
            .movies
            .insert(&ctx(), input("Nothing", 2010, 0, &[]))
            .await
            .unwrap_err();
        match err {
            ModelError::Validation(errs) => {
                assert!(errs.get("runtime").is_some());
                assert!(errs.get("genres").is_some());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.row(1).is_none());
    }

    #[tokio::test]
    async fn stale_version_is_an_edit_conflict() {
        let (m, store) = models();
        let original = m
            .movies
            .insert(&ctx(), input("Inception", 2010, 148, &["scifi", "thriller"]))
            .await
            .unwrap();

        let mut first = original.clone();
        let mut second = original.clone();

        first.runtime = 150;
        m.movies.update(&ctx(), &mut first).await.unwrap();
        assert_eq!(first.version(), 2);
        let after_first = store.row(original.id()).unwrap();

        second.title = "Inception (Director's Cut)".into();
        let err = m.movies.update(&ctx(), &mut second).await.unwrap_err();
        assert!(matches!(err, ModelError::EditConflict));
        assert_eq!(second.version(), 1);
        assert_eq!(store.row(original.id()).unwrap(), after_first);
    }

    #[tokio::test]
    async fn every_update_bumps_version_by_one() {
        let (m, _) = models();
        let mut movie = m
            .movies
            .insert(&ctx(), input("Heat", 1995, 170, &["crime"]))
            .await
            .unwrap();
        for expected in 2..=4 {
            movie.runtime += 1;
            m.movies.update(&ctx(), &mut movie).await.unwrap();
            assert_eq!(movie.version(), expected);
        }
        assert_eq!(m.movies.get(&ctx(), movie.id()).await.unwrap().version(), 4);
    }

    #[tokio::test]
    async fn delete_is_terminal() {
        let (m, _) = models();
        let movie = m
            .movies
            .insert(&ctx(), input("Heat", 1995, 170, &["crime"]))
            .await
            .unwrap();
        m.movies.delete(&ctx(), movie.id()).await.unwrap();
        assert!(matches!(
            m.movies.get(&ctx(), movie.id()).await,
            Err(ModelError::NotFound)
        ));
        assert!(matches!(
            m.movies.delete(&ctx(), movie.id()).await,
            Err(ModelError::NotFound)
        ));
    }

    #[tokio::test]
    async fn deleted_ids_are_not_reused() {
        let (m, _) = models();
        let first = m
            .movies
            .insert(&ctx(), input("Heat", 1995, 170, &["crime"]))
            .await
            .unwrap();
        m.movies.delete(&ctx(), first.id()).await.unwrap();
        let second = m
            .movies
            .insert(&ctx(), input("Ronin", 1998, 122, &["crime"]))
            .await
            .unwrap();
        assert_ne!(first.id(), second.id());
        assert!(second.id() > first.id());
    }

    #[tokio::test]
    async fn get_all_paginates_matching_genres() {
        let (m, _) = models();
        for (i, title) in ["Alien", "Arrival", "Dune", "Gattaca", "Moon"].iter().enumerate() {
            m.movies
                .insert(&ctx(), input(title, 1980 + i as i32, 100, &["scifi"]))
                .await
                .unwrap();
        }
        m.movies
            .insert(&ctx(), input("Heat", 1995, 170, &["crime"]))
            .await
            .unwrap();

        let scifi = vec!["scifi".to_string()];
        let (page, meta) = m
            .movies
            .get_all(&ctx(), "", &scifi, &filters(1, 2, "id"))
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(
            meta,
            Metadata {
                current_page: 1,
                page_size: 2,
                first_page: 1,
                last_page: 3,
                total_records: 5,
            }
        );

        let (last, meta) = m
            .movies
            .get_all(&ctx(), "", &scifi, &filters(3, 2, "id"))
            .await
            .unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(meta.current_page, 3);
        assert_eq!(last[0].title, "Moon");
    }

    #[tokio::test]
    async fn get_all_sorts_with_id_tie_breaker() {
        let (m, _) = models();
        let a = m.movies.insert(&ctx(), input("B", 2000, 90, &["drama"])).await.unwrap();
        let b = m.movies.insert(&ctx(), input("A", 2000, 95, &["drama"])).await.unwrap();
        let c = m.movies.insert(&ctx(), input("C", 1999, 80, &["drama"])).await.unwrap();

        let (all, _) = m
            .movies
            .get_all(&ctx(), "", &[], &filters(1, 20, "-year"))
            .await
            .unwrap();
        let ids: Vec<i64> = all.iter().map(Movie::id).collect();
        assert_eq!(ids, vec![a.id(), b.id(), c.id()]);

        let (all, _) = m
            .movies
            .get_all(&ctx(), "", &[], &filters(1, 20, "title"))
            .await
            .unwrap();
        let titles: Vec<&str> = all.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn get_all_matches_title_case_insensitively() {
        let (m, _) = models();
        m.movies
            .insert(&ctx(), input("The Breakfast Club", 1985, 97, &["comedy"]))
            .await
            .unwrap();
        m.movies
            .insert(&ctx(), input("Black Panther", 2018, 134, &["action"]))
            .await
            .unwrap();

        let (found, meta) = m
            .movies
            .get_all(&ctx(), "BREAKFAST", &[], &filters(1, 20, "id"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(meta.total_records, 1);
    }

    #[tokio::test]
    async fn get_all_without_matches_returns_zero_metadata() {
        let (m, _) = models();
        m.movies
            .insert(&ctx(), input("Heat", 1995, 170, &["crime"]))
            .await
            .unwrap();
        let (found, meta) = m
            .movies
            .get_all(&ctx(), "", &["musical".to_string()], &filters(1, 20, "id"))
            .await
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(meta, Metadata::default());
    }

    #[tokio::test]
    async fn expired_context_times_out() {
        let (m, _) = models();
        let ctx = QueryCtx::with_timeout(Duration::from_secs(5));
        ctx.cancel();
        assert!(matches!(
            m.movies.get(&ctx, 1).await,
            Err(ModelError::Timeout)
        ));
    }

    #[tokio::test]
    async fn emails_differing_by_case_are_duplicates() {
        let (m, _) = models();
        let user = m.users.insert(&ctx(), new_user("alice@example.com")).await.unwrap();
        assert_eq!(user.version(), 1);
        assert!(!user.activated);

        let err = m
            .users
            .insert(&ctx(), new_user("ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::DuplicateEmail));

        let found = m.users.get_by_email(&ctx(), "Alice@Example.com").await.unwrap();
        assert_eq!(found.id(), user.id());
    }

    #[tokio::test]
    async fn user_update_follows_version_and_email_rules() {
        let (m, _) = models();
        let mut alice = m.users.insert(&ctx(), new_user("alice@example.com")).await.unwrap();
        m.users.insert(&ctx(), new_user("bob@example.com")).await.unwrap();

        let stale = alice.clone();
        alice.activated = true;
        m.users.update(&ctx(), &mut alice).await.unwrap();
        assert_eq!(alice.version(), 2);

        let mut stale = stale;
        stale.name = "Old".into();
        assert!(matches!(
            m.users.update(&ctx(), &mut stale).await,
            Err(ModelError::EditConflict)
        ));

        alice.email = "Bob@Example.com".into();
        assert!(matches!(
            m.users.update(&ctx(), &mut alice).await,
            Err(ModelError::DuplicateEmail)
        ));
    }

    #[tokio::test]
    async fn unknown_email_is_not_found() {
        let (m, _) = models();
        assert!(matches!(
            m.users.get_by_email(&ctx(), "nobody@example.com").await,
            Err(ModelError::NotFound)
        ));
    }
}
