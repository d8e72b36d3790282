//! Cursor-based keyset pagination.
//!
//! Every listing is ordered by `(created_at DESC, id DESC)`. The timestamp
//! alone is not unique, so the id breaks ties and the order stays total even
//! when rows share a creation instant. A cursor is the id of the last item of
//! the previous page; it is resolved back into its `(created_at, id)` key and
//! the next page starts strictly after that key.
//!
//! A cursor that does not resolve produces an empty page rather than an
//! error, so callers cannot probe for the existence of arbitrary ids.

use std::cmp::Ordering;
use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use serde::{Deserialize, Serialize};
use tokio_postgres::{types::ToSql, Row};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Page size used when the caller asks for none.
pub const DEFAULT_PAGE_SIZE: usize = 10;
/// Largest page a caller may request.
pub const MAX_PAGE_SIZE: usize = 50;

/// An entity that can be listed with keyset pagination.
pub trait Paginatable {
    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
}

/// The sort key of one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyset {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Keyset {
    pub fn of<T: Paginatable + ?Sized>(item: &T) -> Self {
        Self {
            created_at: item.created_at(),
            id: item.id(),
        }
    }

    /// Position in listing order: `Less` means `self` is listed first.
    pub fn listing_cmp(&self, other: &Self) -> Ordering {
        other
            .created_at
            .cmp(&self.created_at)
            .then_with(|| other.id.cmp(&self.id))
    }

    /// Whether `self` is listed strictly after `cursor`, i.e.
    /// `created_at < c.created_at OR (created_at = c.created_at AND id < c.id)`.
    pub fn is_after(&self, cursor: &Keyset) -> bool {
        self.listing_cmp(cursor) == Ordering::Greater
    }
}

/// A page request as received from a list endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageRequest {
    /// Id of the last item of the previous page; empty for the first page.
    #[serde(default)]
    pub cursor: String,
    /// Requested page size.
    #[serde(default)]
    pub limit: i64,
}

impl PageRequest {
    pub fn first(limit: i64) -> Self {
        Self { cursor: String::new(), limit }
    }

    pub fn after(cursor: impl Into<String>, limit: i64) -> Self {
        Self { cursor: cursor.into(), limit }
    }

    /// The page size actually served.
    pub fn effective_limit(&self) -> usize {
        match self.limit {
            l if l <= 0 => DEFAULT_PAGE_SIZE,
            l => l.min(MAX_PAGE_SIZE as i64) as usize,
        }
    }
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Id of the last returned item when more remain, otherwise empty.
    pub next_cursor: String,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: String::new(),
            has_more: false,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

/// A filtered, unordered set of rows the engine can page through.
#[async_trait]
pub trait KeysetSource: Send + Sync {
    type Item: Paginatable + Send;

    /// Loads the sort key of the row with `id`, if it exists.
    async fn resolve_cursor(&self, id: Uuid) -> Result<Option<Keyset>>;

    /// Returns up to `limit` matching rows in listing order, starting strictly
    /// after `after` when given.
    async fn fetch(&self, after: Option<Keyset>, limit: usize) -> Result<Vec<Self::Item>>;
}

/// Serves one page of `source`.
///
/// # Arguments
///
/// * `source` - The filtered rows to page through.
/// * `request` - The caller's cursor and requested page size.
///
/// # Returns
///
/// A `Result<Page<_>>` with at most `request.effective_limit()` items. An
/// unparsable or unknown cursor yields an empty page.
pub async fn paginate<S>(source: &S, request: &PageRequest) -> Result<Page<S::Item>>
where
    S: KeysetSource + ?Sized,
{
    let limit = request.effective_limit();

    let after = if request.cursor.is_empty() {
        None
    } else {
        let Ok(id) = Uuid::parse_str(&request.cursor) else {
            tracing::debug!(cursor = %request.cursor, "cursor is not an id, serving empty page");
            return Ok(Page::empty());
        };
        match source.resolve_cursor(id).await? {
            Some(keyset) => Some(keyset),
            None => {
                tracing::debug!(cursor = %id, "cursor does not resolve, serving empty page");
                return Ok(Page::empty());
            }
        }
    };

    let mut items = source.fetch(after, limit + 1).await?;
    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = match items.last() {
        Some(last) if has_more => last.id().to_string(),
        _ => String::new(),
    };

    Ok(Page { items, next_cursor, has_more })
}

/// An in-memory snapshot paged with the same ordering rules as the database.
pub struct MemoryKeyset<T, F> {
    rows: Vec<T>,
    filter: F,
}

impl<T, F> MemoryKeyset<T, F>
where
    T: Paginatable + Clone + Send + Sync,
    F: Fn(&T) -> bool + Send + Sync,
{
    /// `rows` is the whole table; `filter` selects the listed subset.
    /// Cursors resolve against the whole table.
    pub fn new(rows: Vec<T>, filter: F) -> Self {
        Self { rows, filter }
    }
}

#[async_trait]
impl<T, F> KeysetSource for MemoryKeyset<T, F>
where
    T: Paginatable + Clone + Send + Sync,
    F: Fn(&T) -> bool + Send + Sync,
{
    type Item = T;

    async fn resolve_cursor(&self, id: Uuid) -> Result<Option<Keyset>> {
        Ok(self.rows.iter().find(|row| row.id() == id).map(Keyset::of))
    }

    async fn fetch(&self, after: Option<Keyset>, limit: usize) -> Result<Vec<T>> {
        let mut matching: Vec<&T> = self
            .rows
            .iter()
            .filter(|row| (self.filter)(*row))
            .filter(|row| after.is_none_or(|cursor| Keyset::of(*row).is_after(&cursor)))
            .collect();
        matching.sort_by(|a, b| Keyset::of(*a).listing_cmp(&Keyset::of(*b)));

        Ok(matching.into_iter().take(limit).cloned().collect())
    }
}

/// Maps one database row onto an entity.
pub type RowMapper<T> = fn(&Row) -> Result<T>;

/// A PostgreSQL table paged with a keyset predicate.
///
/// `filter` is a SQL boolean expression over the table using placeholders
/// `$1..$n` bound to `params`; the keyset and limit placeholders are
/// appended after them.
pub struct PgKeyset<'a, T> {
    pool: &'a Pool,
    table: &'static str,
    columns: &'static str,
    filter: String,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
    map_row: RowMapper<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> PgKeyset<'a, T> {
    pub fn new(pool: &'a Pool, table: &'static str, columns: &'static str, map_row: RowMapper<T>) -> Self {
        Self {
            pool,
            table,
            columns,
            filter: "TRUE".to_string(),
            params: Vec::new(),
            map_row,
            _marker: PhantomData,
        }
    }

    /// Restricts the listing to rows matching `filter`.
    pub fn filter(mut self, filter: impl Into<String>, params: Vec<Box<dyn ToSql + Sync + Send>>) -> Self {
        self.filter = filter.into();
        self.params = params;
        self
    }
}

/// Builds the page query. Filter placeholders come first, then the keyset
/// pair when a cursor is present, then the limit.
fn keyset_sql(columns: &str, table: &str, filter: &str, filter_params: usize, with_cursor: bool) -> String {
    let next = filter_params + 1;
    let (keyset, limit_at) = if with_cursor {
        (
            format!(
                " AND (created_at < ${a} OR (created_at = ${a} AND id < ${b}))",
                a = next,
                b = next + 1
            ),
            next + 2,
        )
    } else {
        (String::new(), next)
    };

    format!(
        "SELECT {columns} FROM {table} WHERE ({filter}){keyset} \
         ORDER BY created_at DESC, id DESC LIMIT ${limit_at}"
    )
}

#[async_trait]
impl<T> KeysetSource for PgKeyset<'_, T>
where
    T: Paginatable + Send,
{
    type Item = T;

    async fn resolve_cursor(&self, id: Uuid) -> Result<Option<Keyset>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                &format!("SELECT created_at, id FROM {} WHERE id = $1", self.table),
                &[&id],
            )
            .await?;

        row.map(|row| {
            Ok(Keyset {
                created_at: row
                    .try_get("created_at")
                    .map_err(|_| AppError::MissingData("created_at".to_string()))?,
                id: row
                    .try_get("id")
                    .map_err(|_| AppError::MissingData("id".to_string()))?,
            })
        })
        .transpose()
    }

    async fn fetch(&self, after: Option<Keyset>, limit: usize) -> Result<Vec<T>> {
        let sql = keyset_sql(self.columns, self.table, &self.filter, self.params.len(), after.is_some());
        let limit = limit as i64;

        let mut params: Vec<&(dyn ToSql + Sync)> = self
            .params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();
        if let Some(cursor) = after.as_ref() {
            params.push(&cursor.created_at);
            params.push(&cursor.id);
        }
        params.push(&limit);

        let client = self.pool.get().await?;
        let rows = client.query(&sql, &params).await?;
        rows.iter().map(self.map_row).collect()
    }
}
