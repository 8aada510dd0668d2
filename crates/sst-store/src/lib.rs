//! Opportunity record stores: in-memory scan and Postgres pushdown.
//!
//! Both backends implement [`OpportunityStore`] and must be observably
//! equivalent for any query: same filter semantics, same filtered total,
//! same row order. The in-memory backend delegates to the pure functions in
//! `sst-core`; the Postgres backend pushes the same semantics into SQL.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use sst_core::{scan_page, Opportunity, OpportunityQuery, SortKey, SortOrder};
use thiserror::Error;
use tracing::{info_span, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "sst-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("opportunity store unavailable: {0}")]
    Unavailable(String),
    #[error("opportunity query failed: {0}")]
    Database(#[from] sqlx::Error),
}

/// Read-only access to the opportunity collection.
///
/// `fetch_page` returns the page rows plus the filtered total, with
/// filtering, sorting, and windowing already applied — in memory for
/// [`MemoryStore`], inside the database for [`PgStore`].
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    async fn fetch_all(&self) -> Result<Vec<Opportunity>, StoreError>;

    async fn fetch_page(
        &self,
        query: &OpportunityQuery,
    ) -> Result<(Vec<Opportunity>, u64), StoreError>;

    async fn fetch_one(&self, notice_id: &str) -> Result<Option<Opportunity>, StoreError>;
}

/// Materialized store backed by a `Vec`, loaded from a JSON snapshot or the
/// built-in demo records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Vec<Opportunity>,
}

impl MemoryStore {
    pub fn new(records: Vec<Opportunity>) -> Self {
        Self { records }
    }

    /// Load a JSON array of opportunity records. Sparse records are fine;
    /// only `notice_id` is required per record.
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let records: Vec<Opportunity> =
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Self::new(records))
    }

    /// Fixed fallback record set served when no real data source is
    /// reachable.
    pub fn demo() -> Self {
        Self::new(vec![
            Opportunity {
                notice_id: "DEMO001".into(),
                title: Some("IT Services and Support".into()),
                description: Some(
                    "Comprehensive IT services including software development, maintenance, \
                     and support for government systems."
                        .into(),
                ),
                agency: Some("Department of Defense".into()),
                naics_code: Some("541511".into()),
                solicitation_number: Some("IT-2024-001".into()),
                notice_type: Some("Solicitation".into()),
                posted_date: Some("2024-01-15T10:00:00Z".into()),
                response_deadline: Some("2024-02-15T17:00:00Z".into()),
                active: Some("Yes".into()),
                point_of_contact: Some("John Smith, john.smith@dod.mil".into()),
                ui_link: Some("https://sam.gov/opp/DEMO001".into()),
                ..Opportunity::default()
            },
            Opportunity {
                notice_id: "DEMO002".into(),
                title: Some("Construction Services".into()),
                description: Some(
                    "Construction and renovation services for federal buildings and facilities."
                        .into(),
                ),
                agency: Some("General Services Administration".into()),
                naics_code: Some("236220".into()),
                solicitation_number: Some("CONST-2024-002".into()),
                notice_type: Some("Solicitation".into()),
                posted_date: Some("2024-01-20T14:30:00Z".into()),
                response_deadline: Some("2024-02-20T16:00:00Z".into()),
                active: Some("Yes".into()),
                point_of_contact: Some("Jane Doe, jane.doe@gsa.gov".into()),
                ui_link: Some("https://sam.gov/opp/DEMO002".into()),
                ..Opportunity::default()
            },
        ])
    }

    pub fn records(&self) -> &[Opportunity] {
        &self.records
    }
}

#[async_trait]
impl OpportunityStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<Opportunity>, StoreError> {
        Ok(self.records.clone())
    }

    async fn fetch_page(
        &self,
        query: &OpportunityQuery,
    ) -> Result<(Vec<Opportunity>, u64), StoreError> {
        Ok(scan_page(&self.records, query))
    }

    async fn fetch_one(&self, notice_id: &str) -> Result<Option<Opportunity>, StoreError> {
        Ok(self
            .records
            .iter()
            .find(|record| record.notice_id == notice_id)
            .cloned())
    }
}

/// Columns selected for every record read, in `Opportunity` field order.
const SELECT_COLUMNS: &str = "notice_id, title, description, agency, naics_code, psc, \
     solicitation_number, notice_type, posted_date, response_deadline, active, set_aside, \
     point_of_contact, ui_link";

/// Escape LIKE wildcards so the pattern matches the literal term, making
/// LIKE/ILIKE containment identical to the in-memory substring check.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    format!("%{escaped}%")
}

/// WHERE clause plus positional binds for a query's filter conjunction.
fn build_filter_sql(query: &OpportunityQuery) -> (String, Vec<String>) {
    let mut clauses = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if !query.search.is_empty() {
        binds.push(like_pattern(&query.search));
        clauses.push(format!(
            "(COALESCE(title,'') || ' ' || COALESCE(description,'')) ILIKE ${} ESCAPE '\\'",
            binds.len()
        ));
    }
    if !query.agency.is_empty() {
        binds.push(like_pattern(&query.agency));
        clauses.push(format!("COALESCE(agency,'') ILIKE ${} ESCAPE '\\'", binds.len()));
    }
    if !query.naics.is_empty() {
        binds.push(like_pattern(&query.naics));
        clauses.push(format!(
            "COALESCE(naics_code,'') LIKE ${} ESCAPE '\\'",
            binds.len()
        ));
    }
    if !query.active.is_empty() {
        binds.push(query.active.clone());
        clauses.push(format!("LOWER(COALESCE(active,'')) = LOWER(${})", binds.len()));
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    (where_sql, binds)
}

fn order_column(sort_by: SortKey) -> &'static str {
    match sort_by {
        SortKey::NoticeId => "notice_id",
        SortKey::Title => "title",
        SortKey::Agency => "agency",
        SortKey::Naics => "naics_code",
        SortKey::Psc => "psc",
        SortKey::NoticeType => "notice_type",
        SortKey::PostedDate => "posted_date",
        SortKey::ResponseDeadline => "response_deadline",
        SortKey::SetAside => "set_aside",
    }
}

/// ORDER BY matching the in-memory sort: NULLs compare as the empty string,
/// the "C" collation forces byte order like `str::cmp`, and the insertion id
/// breaks ties so equal keys keep load order in both directions.
fn build_order_sql(sort_by: SortKey, sort_order: SortOrder) -> String {
    let direction = match sort_order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    format!(
        " ORDER BY COALESCE({},'') COLLATE \"C\" {}, id ASC",
        order_column(sort_by),
        direction
    )
}

fn row_to_opportunity(row: &PgRow) -> Result<Opportunity, sqlx::Error> {
    Ok(Opportunity {
        notice_id: row.try_get("notice_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        agency: row.try_get("agency")?,
        naics_code: row.try_get("naics_code")?,
        psc: row.try_get("psc")?,
        solicitation_number: row.try_get("solicitation_number")?,
        notice_type: row.try_get("notice_type")?,
        posted_date: row.try_get("posted_date")?,
        response_deadline: row.try_get("response_deadline")?,
        active: row.try_get("active")?,
        set_aside: row.try_get("set_aside")?,
        point_of_contact: row.try_get("point_of_contact")?,
        ui_link: row.try_get("ui_link")?,
    })
}

/// Pushdown store over Postgres.
///
/// Expected table, managed outside this workspace:
///
/// ```sql
/// CREATE TABLE opportunities (
///     id                  BIGSERIAL PRIMARY KEY,
///     notice_id           TEXT UNIQUE NOT NULL,
///     title               TEXT,
///     description         TEXT,
///     agency              TEXT,
///     naics_code          TEXT,
///     psc                 TEXT,
///     solicitation_number TEXT,
///     notice_type         TEXT,
///     posted_date         TEXT,
///     response_deadline   TEXT,
///     active              TEXT,
///     set_aside           TEXT,
///     point_of_contact    TEXT,
///     ui_link             TEXT
/// );
/// ```
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|err| StoreError::Unavailable(err.to_string()))?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl OpportunityStore for PgStore {
    async fn fetch_all(&self) -> Result<Vec<Opportunity>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM opportunities ORDER BY id ASC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let records = rows
            .iter()
            .map(row_to_opportunity)
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok(records)
    }

    async fn fetch_page(
        &self,
        query: &OpportunityQuery,
    ) -> Result<(Vec<Opportunity>, u64), StoreError> {
        let query_id = Uuid::new_v4();
        let span = info_span!("opportunity_query", %query_id);

        async move {
            let (where_sql, binds) = build_filter_sql(query);

            let count_sql = format!("SELECT COUNT(1) AS cnt FROM opportunities{where_sql}");
            let mut count_query = sqlx::query(&count_sql);
            for bind in &binds {
                count_query = count_query.bind(bind);
            }
            let count: i64 = count_query.fetch_one(&self.pool).await?.try_get("cnt")?;
            let total = u64::try_from(count).unwrap_or(0);

            if query.per_page <= 0 || query.page < 1 {
                return Ok((Vec::new(), total));
            }

            let order_sql = build_order_sql(query.sort_by, query.sort_order);
            let offset = (query.page - 1).saturating_mul(query.per_page);
            let data_sql = format!(
                "SELECT {SELECT_COLUMNS} FROM opportunities{where_sql}{order_sql} LIMIT ${} OFFSET ${}",
                binds.len() + 1,
                binds.len() + 2
            );
            let mut data_query = sqlx::query(&data_sql);
            for bind in &binds {
                data_query = data_query.bind(bind);
            }
            let rows = data_query
                .bind(query.per_page)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;
            let records = rows
                .iter()
                .map(row_to_opportunity)
                .collect::<Result<Vec<_>, sqlx::Error>>()?;
            Ok((records, total))
        }
        .instrument(span)
        .await
    }

    async fn fetch_one(&self, notice_id: &str) -> Result<Option<Opportunity>, StoreError> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM opportunities WHERE notice_id = $1");
        let row = sqlx::query(&sql)
            .bind(notice_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_opportunity).transpose().map_err(StoreError::from)
    }
}
