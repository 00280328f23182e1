//! Database models and types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Person of interest.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Poi {
    pub id: i64,
    pub full_name: String,
    pub alias: Option<String>,
    pub dob: Option<NaiveDate>,
    pub is_pinned: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Catalogue entry for an offense. Offenses are never soft-deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Offense {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Conviction linking a POI to an offense.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PoiOffense {
    pub id: i64,
    pub poi_id: i64,
    pub offense_id: i64,
    pub case_id: Option<String>,
    pub sentence: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct IdDocument {
    pub id: i64,
    pub poi_id: i64,
    pub id_number: String,
    pub country: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GsmNumber {
    pub id: i64,
    pub poi_id: i64,
    pub service_provider: Option<String>,
    pub number: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResidentialAddress {
    pub id: i64,
    pub poi_id: i64,
    pub country: Option<String>,
    pub state: Option<String>,
    pub city: Option<String>,
    pub address: String,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct KnownAssociate {
    pub id: i64,
    pub poi_id: i64,
    pub full_name: String,
    pub relationship: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmploymentHistory {
    pub id: i64,
    pub poi_id: i64,
    pub employer: String,
    pub job_title: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EducationalBackground {
    pub id: i64,
    pub poi_id: i64,
    pub institution: String,
    pub qualification: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FrequentedSpot {
    pub id: i64,
    pub poi_id: i64,
    pub address: String,
    pub frequency: Option<String>,
    pub purpose: Option<String>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// One row per POI, created alongside it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VeteranStatus {
    pub id: i64,
    pub poi_id: i64,
    pub is_veteran: bool,
    pub details: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A table the read layer can look records up in by primary key.
pub trait Record {
    const TABLE: &'static str;
    /// Human-readable name used in not-found errors.
    const LABEL: &'static str;

    fn is_deleted(&self) -> bool {
        false
    }
}

/// A record owned by a POI through `poi_id` and soft-deleted in place.
pub trait PoiChild: Record {}

macro_rules! soft_deleted_record {
    ($ty:ty, $table:literal, $label:literal) => {
        impl Record for $ty {
            const TABLE: &'static str = $table;
            const LABEL: &'static str = $label;

            fn is_deleted(&self) -> bool {
                self.is_deleted
            }
        }
    };
}

macro_rules! poi_child {
    ($($ty:ty => ($table:literal, $label:literal)),+ $(,)?) => {
        $(
            soft_deleted_record!($ty, $table, $label);
            impl PoiChild for $ty {}
        )+
    };
}

soft_deleted_record!(Poi, "poi", "POI");

impl Record for Offense {
    const TABLE: &'static str = "offense";
    const LABEL: &'static str = "Offense";
}

poi_child! {
    PoiOffense => ("poi_offense", "POI Offense"),
    IdDocument => ("id_document", "ID Document"),
    GsmNumber => ("gsm_number", "GSM Number"),
    ResidentialAddress => ("residential_address", "Residential Address"),
    KnownAssociate => ("known_associate", "Known Associate"),
    EmploymentHistory => ("employment_history", "Employment History"),
    EducationalBackground => ("educational_background", "Educational Background"),
    FrequentedSpot => ("frequented_spot", "Frequented Spot"),
}
