//! Dashboard statistics over live POIs.

use crate::pool::DbPool;
use crate::selectors::LookupResult;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use poi_registry_common::utils::last_day_of_month;
use serde::Serialize;
use sqlx::FromRow;

/// How many offenses and age ranges the report keeps.
const TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct ConvictionCount {
    pub offense: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgeRangeCount {
    pub range: &'static str,
    pub value: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoiStatistics {
    /// Live POIs only; soft-deleted rows are not counted.
    pub tno_pois: i64,
    pub tno_pois_last_month: i64,
    pub tno_pois_curr_month: i64,
    pub poi_report_conviction: Vec<ConvictionCount>,
    pub poi_report_age: Vec<AgeRangeCount>,
}

/// Age buckets, youngest first: label and inclusive upper bound.
const AGE_RANGES: [(&str, u32); 7] = [
    ("Under 18", 17),
    ("18-24", 24),
    ("25-34", 34),
    ("35-44", 44),
    ("45-54", 54),
    ("55-64", 64),
    ("65+", u32::MAX),
];

/// `[start, end)` of the month containing `day`, in UTC.
pub fn month_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = day.with_day(1).unwrap_or(day);
    let end = last_day_of_month(day.year(), day.month())
        .and_then(|last| day.with_day(last))
        .and_then(|last| last.succ_opt())
        .unwrap_or(start);

    (midnight_utc(start), midnight_utc(end))
}

/// `[start, end)` of the calendar month before the one containing `day`.
/// January rolls back to December of the previous year.
pub fn previous_month_window(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let (current_start, _) = month_window(day);
    let last_of_previous = current_start
        .date_naive()
        .pred_opt()
        .unwrap_or(current_start.date_naive());
    let (previous_start, _) = month_window(last_of_previous);
    (previous_start, current_start)
}

fn midnight_utc(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap_or_default())
}

/// Whole years between `dob` and `today`; `None` for a future birth date.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

/// Most common age ranges among `dobs`, largest first, ties youngest first.
pub fn top_age_ranges(dobs: &[NaiveDate], today: NaiveDate) -> Vec<AgeRangeCount> {
    let mut counts = [0i64; AGE_RANGES.len()];
    for age in dobs.iter().filter_map(|dob| age_on(*dob, today)) {
        if let Some(idx) = AGE_RANGES.iter().position(|(_, upper)| age <= *upper) {
            counts[idx] += 1;
        }
    }

    let mut ranked: Vec<AgeRangeCount> = AGE_RANGES
        .iter()
        .zip(counts)
        .filter(|(_, value)| *value > 0)
        .map(|(&(range, _), value)| AgeRangeCount { range, value })
        .collect();
    // Stable sort keeps bucket order among equal counts.
    ranked.sort_by(|a, b| b.value.cmp(&a.value));
    ranked.truncate(TOP_N);
    ranked
}

async fn count_created_between(
    db: &DbPool,
    (start, end): (DateTime<Utc>, DateTime<Utc>),
) -> LookupResult<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM poi WHERE is_deleted = FALSE AND created_at >= $1 AND created_at < $2",
    )
    .bind(start)
    .bind(end)
    .fetch_one(db.pool())
    .await?;
    Ok(count)
}

/// Offenses with the most live convictions against live POIs.
pub async fn top_offenses(db: &DbPool) -> LookupResult<Vec<ConvictionCount>> {
    let rows = sqlx::query_as::<_, ConvictionCount>(
        r#"
        SELECT o.name AS offense, COUNT(*) AS value
        FROM poi_offense po
        JOIN offense o ON o.id = po.offense_id
        JOIN poi p ON p.id = po.poi_id
        WHERE po.is_deleted = FALSE AND p.is_deleted = FALSE
        GROUP BY o.name
        ORDER BY value DESC, o.name ASC
        LIMIT $1
        "#,
    )
    .bind(TOP_N as i64)
    .fetch_all(db.pool())
    .await?;
    Ok(rows)
}

/// Compute the dashboard statistics as of `today`.
pub async fn poi_statistics(db: &DbPool, today: NaiveDate) -> LookupResult<PoiStatistics> {
    let tno_pois = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM poi WHERE is_deleted = FALSE")
        .fetch_one(db.pool())
        .await?;

    let tno_pois_last_month = count_created_between(db, previous_month_window(today)).await?;
    let tno_pois_curr_month = count_created_between(db, month_window(today)).await?;
    let poi_report_conviction = top_offenses(db).await?;

    let dobs: Vec<NaiveDate> = sqlx::query_scalar::<_, NaiveDate>(
        "SELECT dob FROM poi WHERE is_deleted = FALSE AND dob IS NOT NULL",
    )
    .fetch_all(db.pool())
    .await?;

    Ok(PoiStatistics {
        tno_pois,
        tno_pois_last_month,
        tno_pois_curr_month,
        poi_report_conviction,
        poi_report_age: top_age_ranges(&dobs, today),
    })
}
