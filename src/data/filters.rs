//! Pagination, sorting and search parameter handling.
//!
//! Everything here is pure: raw query-string values go in, either validated
//! [`Filters`] or field-level [`ValidationErrors`] come out. Nothing touches
//! storage, so malformed requests are rejected before any round trip.

use serde::{Deserialize, Serialize};

use super::validator::{unique, ValidationErrors};

pub const MAX_PAGE: i64 = 10_000_000;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Sortable movie fields; a leading `-` means descending.
pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Raw list parameters as they arrive in the query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub title: Option<String>,
    pub genres: Option<String>,
    pub page: Option<String>,
    pub page_size: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Validated pagination and sort settings.
///
/// Only constructible through [`Filters::new`], so the sort column is always
/// a `'static` entry of the resource's safelist and never caller input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filters {
    page: i64,
    page_size: i64,
    sort_column: &'static str,
    direction: SortDirection,
}

impl Filters {
    pub fn new(
        page: i64,
        page_size: i64,
        sort: &str,
        safelist: &'static [&'static str],
    ) -> Result<Self, ValidationErrors> {
        let mut v = ValidationErrors::new();
        v.check(page > 0, "page", "must be greater than zero");
        v.check(page <= MAX_PAGE, "page", "must be a maximum of 10 million");
        v.check(page_size > 0, "page_size", "must be greater than zero");
        v.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

        let entry = safelist.iter().copied().find(|s| *s == sort);
        v.check(entry.is_some(), "sort", "invalid sort value");
        v.finish()?;

        let entry = entry.unwrap_or("id");
        let (sort_column, direction) = match entry.strip_prefix('-') {
            Some(column) => (column, SortDirection::Desc),
            None => (entry, SortDirection::Asc),
        };

        Ok(Self {
            page,
            page_size,
            sort_column,
            direction,
        })
    }

    pub fn page(&self) -> i64 {
        self.page
    }

    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    pub fn sort_column(&self) -> &'static str {
        self.sort_column
    }

    pub fn sort_direction(&self) -> SortDirection {
        self.direction
    }

    pub fn limit(&self) -> i64 {
        self.page_size
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.page_size
    }

    /// Whether the resolved column belongs to `safelist`.
    pub fn sorts_within(&self, safelist: &[&str]) -> bool {
        safelist
            .iter()
            .any(|s| s.trim_start_matches('-') == self.sort_column)
    }
}

/// A validated movie search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieSearch {
    pub title: String,
    pub genres: Vec<String>,
    pub filters: Filters,
}

impl ListParams {
    pub fn into_movie_search(self) -> Result<MovieSearch, ValidationErrors> {
        let mut v = ValidationErrors::new();

        let genres = parse_genres(self.genres.as_deref(), &mut v);
        match parse_filters(&self, MOVIE_SORT_SAFELIST) {
            Ok(filters) => {
                v.finish()?;
                Ok(MovieSearch {
                    title: self.title.unwrap_or_default().trim().to_string(),
                    genres,
                    filters,
                })
            }
            Err(errs) => {
                v.merge(errs);
                Err(v)
            }
        }
    }
}

/// Validates `page`, `page_size` and `sort` against `safelist`.
pub fn parse_filters(
    params: &ListParams,
    safelist: &'static [&'static str],
) -> Result<Filters, ValidationErrors> {
    let mut v = ValidationErrors::new();
    let page = read_int(params.page.as_deref(), "page", 1, &mut v);
    let page_size = read_int(params.page_size.as_deref(), "page_size", DEFAULT_PAGE_SIZE, &mut v);
    let sort = params.sort.as_deref().map(str::trim).unwrap_or("id");

    match Filters::new(page, page_size, sort, safelist) {
        Ok(filters) => {
            v.finish()?;
            Ok(filters)
        }
        Err(errs) => {
            v.merge(errs);
            Err(v)
        }
    }
}

fn read_int(raw: Option<&str>, field: &str, default: i64, v: &mut ValidationErrors) -> i64 {
    match raw.map(str::trim) {
        None | Some("") => default,
        Some(s) => match s.parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                v.add(field, "must be an integer value");
                default
            }
        },
    }
}

fn parse_genres(raw: Option<&str>, v: &mut ValidationErrors) -> Vec<String> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Vec::new(),
        Some(s) => s,
    };
    let genres: Vec<String> = raw.split(',').map(|g| g.trim().to_string()).collect();
    v.check(
        genres.iter().all(|g| !g.is_empty()),
        "genres",
        "must not contain blank entries",
    );
    v.check(unique(genres.iter()), "genres", "must not contain duplicate values");
    genres
}

/// Pagination metadata derived from a single filtered query.
///
/// The zero value means there is nothing to paginate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub current_page: i64,
    pub page_size: i64,
    pub first_page: i64,
    pub last_page: i64,
    pub total_records: i64,
}

pub fn calculate_metadata(total_records: i64, page: i64, page_size: i64) -> Metadata {
    if total_records <= 0 || page_size <= 0 {
        return Metadata::default();
    }
    Metadata {
        current_page: page,
        page_size,
        first_page: 1,
        last_page: (total_records + page_size - 1) / page_size,
        total_records,
    }
}
