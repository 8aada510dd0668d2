//! Core domain model and query semantics for SST.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "sst-core";

/// A government contracting solicitation record.
///
/// Upstream feeds are sparse: every field except `notice_id` may be absent,
/// and absence is always represented as `None` / empty string, never as an
/// error. The serde aliases accept the two upstream field spellings
/// (`full_parent_path_name` vs `agency`, `naics` vs `naics_code`,
/// `response_due_date` vs `response_deadline`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Opportunity {
    pub notice_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "full_parent_path_name")]
    pub agency: Option<String>,
    #[serde(default, alias = "naics")]
    pub naics_code: Option<String>,
    #[serde(default)]
    pub psc: Option<String>,
    #[serde(default)]
    pub solicitation_number: Option<String>,
    #[serde(default, alias = "type")]
    pub notice_type: Option<String>,
    #[serde(default)]
    pub posted_date: Option<String>,
    #[serde(default, alias = "response_due_date")]
    pub response_deadline: Option<String>,
    #[serde(default)]
    pub active: Option<String>,
    #[serde(default, alias = "type_of_set_aside_description", alias = "setaside")]
    pub set_aside: Option<String>,
    #[serde(default)]
    pub point_of_contact: Option<String>,
    #[serde(default)]
    pub ui_link: Option<String>,
}

impl Opportunity {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or_default()
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn agency(&self) -> &str {
        self.agency.as_deref().unwrap_or_default()
    }

    pub fn naics_code(&self) -> &str {
        self.naics_code.as_deref().unwrap_or_default()
    }

    pub fn psc(&self) -> &str {
        self.psc.as_deref().unwrap_or_default()
    }

    pub fn solicitation_number(&self) -> &str {
        self.solicitation_number.as_deref().unwrap_or_default()
    }

    pub fn notice_type(&self) -> &str {
        self.notice_type.as_deref().unwrap_or_default()
    }

    pub fn posted_date(&self) -> &str {
        self.posted_date.as_deref().unwrap_or_default()
    }

    pub fn response_deadline(&self) -> &str {
        self.response_deadline.as_deref().unwrap_or_default()
    }

    pub fn active(&self) -> &str {
        self.active.as_deref().unwrap_or_default()
    }

    pub fn set_aside(&self) -> &str {
        self.set_aside.as_deref().unwrap_or_default()
    }

    pub fn point_of_contact(&self) -> &str {
        self.point_of_contact.as_deref().unwrap_or_default()
    }

    pub fn ui_link(&self) -> &str {
        self.ui_link.as_deref().unwrap_or_default()
    }
}

/// Sortable columns. The named tokens are the baseline allow-list; the
/// numeric tokens are the wire column map used by the offset/length list
/// endpoint. Anything else falls back to `PostedDate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    NoticeId,
    Title,
    Agency,
    Naics,
    Psc,
    NoticeType,
    PostedDate,
    ResponseDeadline,
    SetAside,
}

impl SortKey {
    pub fn parse(token: &str) -> Self {
        match token {
            "posted_date" | "8" => Self::PostedDate,
            "title" | "2" => Self::Title,
            "response_deadline" | "response_due_date" | "9" => Self::ResponseDeadline,
            "1" => Self::NoticeId,
            "3" => Self::Agency,
            "5" => Self::Naics,
            "6" => Self::Psc,
            "7" => Self::NoticeType,
            "10" => Self::SetAside,
            _ => Self::PostedDate,
        }
    }

    /// Raw sort-key value for a record; missing fields sort as the empty
    /// string. Comparison is plain lexicographic, never date-aware.
    pub fn value_of<'a>(&self, opportunity: &'a Opportunity) -> &'a str {
        match self {
            Self::NoticeId => &opportunity.notice_id,
            Self::Title => opportunity.title(),
            Self::Agency => opportunity.agency(),
            Self::Naics => opportunity.naics_code(),
            Self::Psc => opportunity.psc(),
            Self::NoticeType => opportunity.notice_type(),
            Self::PostedDate => opportunity.posted_date(),
            Self::ResponseDeadline => opportunity.response_deadline(),
            Self::SetAside => opportunity.set_aside(),
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::PostedDate
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `desc` (any casing) sorts descending; every other explicit token
    /// sorts ascending.
    pub fn parse(token: &str) -> Self {
        if token.eq_ignore_ascii_case("desc") {
            Self::Desc
        } else {
            Self::Asc
        }
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::Desc
    }
}

/// Immutable parameters for one query invocation. Empty filter strings
/// disable the corresponding check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpportunityQuery {
    pub page: i64,
    pub per_page: i64,
    pub search: String,
    pub agency: String,
    pub naics: String,
    pub active: String,
    pub sort_by: SortKey,
    pub sort_order: SortOrder,
}

impl Default for OpportunityQuery {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            search: String::new(),
            agency: String::new(),
            naics: String::new(),
            active: String::new(),
            sort_by: SortKey::default(),
            sort_order: SortOrder::default(),
        }
    }
}

/// Filter conjunction: a record passes only if every active filter matches.
///
/// `search` and `agency` are case-insensitive substring checks, `naics` is a
/// plain substring check (prefix searches on partial codes work), and
/// `active` is a case-insensitive exact match. The exact-vs-substring split
/// mirrors the upstream behavior and is pinned by tests.
pub fn matches(opportunity: &Opportunity, query: &OpportunityQuery) -> bool {
    if !query.search.is_empty() {
        let haystack =
            format!("{} {}", opportunity.title(), opportunity.description()).to_lowercase();
        if !haystack.contains(&query.search.to_lowercase()) {
            return false;
        }
    }

    if !query.agency.is_empty()
        && !opportunity
            .agency()
            .to_lowercase()
            .contains(&query.agency.to_lowercase())
    {
        return false;
    }

    if !query.naics.is_empty() && !opportunity.naics_code().contains(&query.naics) {
        return false;
    }

    if !query.active.is_empty() && !query.active.eq_ignore_ascii_case(opportunity.active()) {
        return false;
    }

    true
}

/// Stable sort on the raw field value; ties keep their input order in both
/// directions.
pub fn sort_rows(rows: &mut [Opportunity], sort_by: SortKey, sort_order: SortOrder) {
    rows.sort_by(|a, b| {
        let (ka, kb) = (sort_by.value_of(a), sort_by.value_of(b));
        match sort_order {
            SortOrder::Asc => ka.cmp(kb),
            SortOrder::Desc => kb.cmp(ka),
        }
    });
}

/// Page window over an already filtered-and-sorted sequence. A non-positive
/// `per_page` or `page`, or a page past the end, yields an empty window
/// rather than an error.
pub fn page_window(rows: Vec<Opportunity>, page: i64, per_page: i64) -> Vec<Opportunity> {
    if per_page <= 0 || page < 1 {
        return Vec::new();
    }
    let start = usize::try_from((page - 1).saturating_mul(per_page)).unwrap_or(usize::MAX);
    rows.into_iter()
        .skip(start)
        .take(per_page as usize)
        .collect()
}

/// Pulled-mode scan: filter, sort, window. Returns the page rows and the
/// filtered total (not the unfiltered store size).
pub fn scan_page(records: &[Opportunity], query: &OpportunityQuery) -> (Vec<Opportunity>, u64) {
    let mut filtered: Vec<Opportunity> = records
        .iter()
        .filter(|opportunity| matches(opportunity, query))
        .cloned()
        .collect();
    sort_rows(&mut filtered, query.sort_by, query.sort_order);
    let total = filtered.len() as u64;
    (page_window(filtered, query.page, query.per_page), total)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl Pagination {
    pub fn compute(page: i64, per_page: i64, total: u64) -> Self {
        let total_pages = if per_page > 0 {
            total.div_ceil(per_page as u64)
        } else {
            0
        };
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_next: page >= 0 && (page as u64) < total_pages,
            has_prev: page > 1,
        }
    }
}

/// One page of results, constructed fresh per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub opportunities: Vec<Opportunity>,
    pub pagination: Pagination,
}
