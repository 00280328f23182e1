//! Read-side selectors for POI records.
//!
//! Soft-deleted rows are invisible here: a lookup by id of a deleted row fails
//! exactly like a lookup of a missing one.

use crate::models::{Offense, Poi, PoiChild, Record, VeteranStatus};
use crate::pool::DbPool;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::str::FromStr;
use tracing::debug;

/// Error type for record lookups.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("{0} Not Found")]
    NotFound(&'static str),
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl LookupError {
    /// HTTP-style status the web layer reports for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            LookupError::NotFound(_) => 404,
            LookupError::Internal(_) | LookupError::Database(_) => 500,
        }
    }
}

/// Result type for record lookups.
pub type LookupResult<T> = Result<T, LookupError>;

/// Sort direction on the primary key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    fn sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = std::convert::Infallible;

    /// Only `asc` sorts ascending; any other value sorts descending.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("asc") {
            SortOrder::Asc
        } else {
            SortOrder::Desc
        })
    }
}

/// Paging and search parameters for list endpoints.
#[derive(Debug, Clone)]
pub struct PageParams {
    /// 1-based page number.
    pub page: u32,
    pub size: u32,
    pub q: Option<String>,
    pub order: SortOrder,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            size: 10,
            q: None,
            order: SortOrder::Desc,
        }
    }
}

impl PageParams {
    pub fn limit(&self) -> i64 {
        i64::from(self.size)
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * i64::from(self.size)
    }

    /// Search term as an ILIKE pattern; blank terms mean no search.
    fn pattern(&self) -> Option<String> {
        like_pattern(self.q.as_deref())
    }
}

/// Extra POI list filters.
#[derive(Debug, Clone, Default)]
pub struct PoiFilter {
    /// Substring of a live GSM number belonging to the POI.
    pub gsm: Option<String>,
    /// Restrict to pinned (`Some(true)`) or unpinned (`Some(false)`) POIs.
    pub is_pinned: Option<bool>,
}

/// One page of results plus the total number of matching rows.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

fn like_pattern(term: Option<&str>) -> Option<String> {
    term.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| format!("%{t}%"))
}

/// Look a record up by id. Missing and soft-deleted rows both yield `None`.
pub async fn find_by_id<T>(db: &DbPool, id: i64) -> LookupResult<Option<T>>
where
    T: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = format!("SELECT * FROM {} WHERE id = $1", T::TABLE);
    let record = sqlx::query_as::<_, T>(&sql)
        .bind(id)
        .fetch_optional(db.pool())
        .await?;

    Ok(record.filter(|r| !r.is_deleted()))
}

/// Look a record up by id, failing with the record's not-found error.
pub async fn get_by_id<T>(db: &DbPool, id: i64) -> LookupResult<T>
where
    T: Record + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    find_by_id::<T>(db, id)
        .await?
        .ok_or(LookupError::NotFound(T::LABEL))
}

/// Live child records of a POI, oldest first.
pub async fn list_for_poi<T>(db: &DbPool, poi_id: i64) -> LookupResult<Vec<T>>
where
    T: PoiChild + for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let sql = format!(
        "SELECT * FROM {} WHERE poi_id = $1 AND is_deleted = FALSE ORDER BY id",
        T::TABLE
    );
    let records = sqlx::query_as::<_, T>(&sql)
        .bind(poi_id)
        .fetch_all(db.pool())
        .await?;

    debug!("Loaded {} {} rows for poi {}", records.len(), T::TABLE, poi_id);
    Ok(records)
}

/// Veteran status of a POI. Every POI has one, so absence is an internal error.
pub async fn get_veteran_status_by_poi(db: &DbPool, poi_id: i64) -> LookupResult<VeteranStatus> {
    sqlx::query_as::<_, VeteranStatus>("SELECT * FROM veteran_status WHERE poi_id = $1")
        .bind(poi_id)
        .fetch_optional(db.pool())
        .await?
        .ok_or_else(|| LookupError::Internal(format!("Veteran status for poi {poi_id} not found")))
}

fn push_offense_filters(qb: &mut QueryBuilder<'_, Postgres>, params: &PageParams) {
    if let Some(pattern) = params.pattern() {
        qb.push(" WHERE name ILIKE ").push_bind(pattern);
    }
}

/// Offense catalogue, searched by name.
pub async fn paginated_offenses(db: &DbPool, params: &PageParams) -> LookupResult<Page<Offense>> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM offense");
    push_offense_filters(&mut count, params);
    let total = count.build_query_scalar::<i64>().fetch_one(db.pool()).await?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM offense");
    push_offense_filters(&mut select, params);
    select
        .push(" ORDER BY id ")
        .push(params.order.sql())
        .push(" LIMIT ")
        .push_bind(params.limit())
        .push(" OFFSET ")
        .push_bind(params.offset());
    let items = select.build_query_as::<Offense>().fetch_all(db.pool()).await?;

    Ok(Page { items, total })
}

fn push_poi_filters(qb: &mut QueryBuilder<'_, Postgres>, params: &PageParams, filter: &PoiFilter) {
    qb.push(" WHERE is_deleted = FALSE");

    if let Some(gsm) = like_pattern(filter.gsm.as_deref()) {
        qb.push(" AND id IN (SELECT poi_id FROM gsm_number WHERE is_deleted = FALSE AND number ILIKE ")
            .push_bind(gsm)
            .push(")");
    }

    if let Some(pattern) = params.pattern() {
        qb.push(" AND (full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR alias ILIKE ")
            .push_bind(pattern)
            .push(")");
    }

    if let Some(pinned) = filter.is_pinned {
        qb.push(" AND is_pinned = ").push_bind(pinned);
    }
}

/// Live POIs matching the search term and filters.
pub async fn paginated_pois(
    db: &DbPool,
    params: &PageParams,
    filter: &PoiFilter,
) -> LookupResult<Page<Poi>> {
    let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM poi");
    push_poi_filters(&mut count, params, filter);
    let total = count.build_query_scalar::<i64>().fetch_one(db.pool()).await?;

    let mut select = QueryBuilder::<Postgres>::new("SELECT * FROM poi");
    push_poi_filters(&mut select, params, filter);
    select
        .push(" ORDER BY id ")
        .push(params.order.sql())
        .push(" LIMIT ")
        .push_bind(params.limit())
        .push(" OFFSET ")
        .push_bind(params.offset());
    let items = select.build_query_as::<Poi>().fetch_all(db.pool()).await?;

    Ok(Page { items, total })
}

/// Live pinned POIs.
pub async fn pinned_pois(db: &DbPool) -> LookupResult<Vec<Poi>> {
    let pois = sqlx::query_as::<_, Poi>(
        "SELECT * FROM poi WHERE is_pinned = TRUE AND is_deleted = FALSE ORDER BY id",
    )
    .fetch_all(db.pool())
    .await?;
    Ok(pois)
}

/// Live POIs, newest first.
pub async fn recently_added_pois(db: &DbPool) -> LookupResult<Vec<Poi>> {
    let pois = sqlx::query_as::<_, Poi>("SELECT * FROM poi WHERE is_deleted = FALSE ORDER BY id DESC")
        .fetch_all(db.pool())
        .await?;
    Ok(pois)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GsmNumber, FrequentedSpot};

    #[test]
    fn only_asc_sorts_ascending() {
        assert_eq!("asc".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("ASC".parse::<SortOrder>().unwrap(), SortOrder::Asc);
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("sideways".parse::<SortOrder>().unwrap(), SortOrder::Desc);
    }

    #[test]
    fn offset_treats_page_zero_as_first_page() {
        let mut params = PageParams {
            page: 3,
            size: 20,
            ..PageParams::default()
        };
        assert_eq!(params.offset(), 40);
        assert_eq!(params.limit(), 20);

        params.page = 0;
        assert_eq!(params.offset(), 0);
    }

    #[test]
    fn blank_search_terms_are_ignored() {
        assert_eq!(like_pattern(Some("  ")), None);
        assert_eq!(like_pattern(None), None);
        assert_eq!(like_pattern(Some(" ade ")), Some("%ade%".to_string()));
    }

    #[test]
    fn not_found_messages_name_the_record() {
        let err = LookupError::NotFound(GsmNumber::LABEL);
        assert_eq!(err.to_string(), "GSM Number Not Found");
        assert_eq!(err.status_code(), 404);

        let err = LookupError::NotFound(FrequentedSpot::LABEL);
        assert_eq!(err.to_string(), "Frequented Spot Not Found");
    }

    #[test]
    fn missing_veteran_status_is_internal() {
        let err = LookupError::Internal("Veteran status for poi 9 not found".into());
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn poi_filters_render_in_order() {
        let params = PageParams {
            q: Some("ade".into()),
            ..PageParams::default()
        };
        let filter = PoiFilter {
            gsm: Some("0803".into()),
            is_pinned: Some(true),
        };

        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM poi");
        push_poi_filters(&mut qb, &params, &filter);

        assert_eq!(
            qb.sql(),
            "SELECT COUNT(*) FROM poi WHERE is_deleted = FALSE \
             AND id IN (SELECT poi_id FROM gsm_number WHERE is_deleted = FALSE AND number ILIKE $1) \
             AND (full_name ILIKE $2 OR alias ILIKE $3) AND is_pinned = $4"
        );
    }
}
