//! Query orchestration, evaluation signals, and description mining for SST.
//!
//! Everything here is stateless and request-scoped: each call reads from the
//! store (or a single record) and recomputes its result from scratch. The
//! clock is injected so urgency and recency classifications are
//! deterministic under test.

use std::path::Path;

use anyhow::Context as _;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use sst_core::{Opportunity, OpportunityQuery, Page, Pagination};
use sst_store::{OpportunityStore, StoreError};
use thiserror::Error;

pub const CRATE_NAME: &str = "sst-engine";

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("opportunity {0} not found")]
    NotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Injectable time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Run one list query against the store and assemble the page contract.
/// Backend-independent: both store modes return the same rows and total.
pub async fn list_opportunities(
    store: &dyn OpportunityStore,
    query: &OpportunityQuery,
) -> Result<Page, EngineError> {
    let (opportunities, total) = store.fetch_page(query).await?;
    Ok(Page {
        opportunities,
        pagination: Pagination::compute(query.page, query.per_page, total),
    })
}

/// Fetch a single record, mapping absence to a distinct error.
pub async fn load_opportunity(
    store: &dyn OpportunityStore,
    notice_id: &str,
) -> Result<Opportunity, EngineError> {
    store
        .fetch_one(notice_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(notice_id.to_string()))
}

/// Accepts RFC 3339 (including the `Z` suffix), naive ISO date-times, and
/// bare dates. Anything else is `None`; upstream date fields are too messy
/// to treat a bad value as fatal.
pub fn parse_flexible_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

const DESCRIPTION_PREVIEW_CHARS: usize = 500;

fn truncate_description(description: &str) -> String {
    if description.chars().count() > DESCRIPTION_PREVIEW_CHARS {
        let head: String = description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}

/// Evaluation payload: metadata passthrough, truncated description, and the
/// ordered advisory list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub notice_id: String,
    pub title: String,
    pub agency: String,
    pub posted_date: String,
    pub response_deadline: String,
    pub notice_type: String,
    pub set_aside_type: String,
    pub naics_code: String,
    pub active: String,
    pub description: String,
    pub point_of_contact: String,
    pub ui_link: String,
    pub recommendations: Vec<String>,
}

pub fn evaluate(opportunity: &Opportunity, clock: &dyn Clock) -> Evaluation {
    Evaluation {
        notice_id: opportunity.notice_id.clone(),
        title: opportunity.title().to_string(),
        agency: opportunity.agency().to_string(),
        posted_date: opportunity.posted_date().to_string(),
        response_deadline: opportunity.response_deadline().to_string(),
        notice_type: opportunity.notice_type().to_string(),
        set_aside_type: opportunity.set_aside().to_string(),
        naics_code: opportunity.naics_code().to_string(),
        active: opportunity.active().to_string(),
        description: truncate_description(opportunity.description()),
        point_of_contact: opportunity.point_of_contact().to_string(),
        ui_link: opportunity.ui_link().to_string(),
        recommendations: recommendations_for(opportunity, clock),
    }
}

/// Advisory checks in fixed order: deadline urgency, set-aside class, NAICS
/// passthrough, active status. Each check degrades independently; a bad
/// record never fails the evaluation.
pub fn recommendations_for(opportunity: &Opportunity, clock: &dyn Clock) -> Vec<String> {
    let mut recommendations = Vec::new();

    let deadline = opportunity.response_deadline();
    if !deadline.is_empty() {
        match parse_flexible_datetime(deadline) {
            Some(when) => {
                let days = (when - clock.now()).num_days();
                if days < 7 {
                    recommendations.push(format!("URGENT: response deadline is in {days} days"));
                } else if days < 14 {
                    recommendations
                        .push(format!("Response deadline is in {days} days - plan accordingly"));
                } else {
                    recommendations
                        .push(format!("Response deadline is in {days} days - good planning time"));
                }
            }
            None => {
                tracing::debug!(notice_id = %opportunity.notice_id, "unparseable response deadline");
                recommendations
                    .push("Response deadline is present but the format is unclear".to_string());
            }
        }
    }

    let set_aside = opportunity.set_aside().to_lowercase();
    if !set_aside.is_empty() {
        if set_aside.contains("small business") {
            recommendations.push("Small business set-aside opportunity".to_string());
        } else if set_aside.contains("women") {
            recommendations.push("Women-owned business set-aside opportunity".to_string());
        } else if set_aside.contains("veteran") {
            recommendations.push("Veteran-owned business set-aside opportunity".to_string());
        }
    }

    let naics = opportunity.naics_code();
    if !naics.is_empty() {
        recommendations.push(format!("NAICS code: {naics}"));
    }

    let active = opportunity.active();
    if active.eq_ignore_ascii_case("yes") {
        recommendations.push("Opportunity is currently active".to_string());
    } else if active.eq_ignore_ascii_case("no") {
        recommendations.push("Opportunity is no longer active".to_string());
    }

    recommendations
}

/// Context window for keyword extraction, in characters around the match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextWindow {
    pub before: usize,
    pub after: usize,
    pub max_results: usize,
}

pub const DELIVERABLE_WINDOW: ContextWindow = ContextWindow {
    before: 50,
    after: 50,
    max_results: 10,
};

pub const REQUIREMENT_WINDOW: ContextWindow = ContextWindow {
    before: 100,
    after: 100,
    max_results: 15,
};

/// Output-oriented keywords scanned for the deliverables view, in fixed
/// scan order.
pub const DELIVERABLE_KEYWORDS: &[&str] = &[
    "deliverable",
    "deliverables",
    "report",
    "reports",
    "document",
    "documents",
    "analysis",
    "analyses",
    "study",
    "studies",
    "assessment",
    "assessments",
    "plan",
    "plans",
    "strategy",
    "strategies",
    "proposal",
    "proposals",
    "presentation",
    "presentations",
    "training",
    "workshop",
    "workshops",
    "software",
    "application",
    "applications",
    "system",
    "systems",
    "database",
    "databases",
    "website",
    "websites",
    "platform",
    "platforms",
];

/// Obligation-oriented keywords scanned for the proposal-requirements view,
/// in fixed scan order.
pub const REQUIREMENT_KEYWORDS: &[&str] = &[
    "requirement",
    "requirements",
    "must",
    "shall",
    "should",
    "need",
    "needs",
    "experience",
    "qualification",
    "qualifications",
    "certification",
    "certifications",
    "license",
    "licenses",
    "clearance",
    "clearances",
    "security",
    "compliance",
    "timeline",
    "schedule",
    "deadline",
    "deadlines",
    "milestone",
    "milestones",
    "budget",
    "cost",
    "pricing",
    "price",
    "funding",
    "payment",
    "terms",
    "scope",
    "work",
    "tasks",
    "activities",
    "responsibilities",
    "duties",
];

/// Per-character lowercase that keeps a 1:1 index mapping with the input,
/// so window offsets computed on the lowered text stay valid on the
/// original.
fn lowered_chars(text: &str) -> Vec<char> {
    text.chars()
        .map(|ch| ch.to_lowercase().next().unwrap_or(ch))
        .collect()
}

fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Scan keywords in their given order; each keyword contributes at most one
/// context (its first occurrence), and the cap truncates the tail of the
/// keyword order rather than an arbitrary subset.
pub fn extract_contexts<S: AsRef<str>>(
    description: &str,
    keywords: &[S],
    window: ContextWindow,
) -> Vec<String> {
    let mut contexts = Vec::new();
    if description.is_empty() {
        return contexts;
    }

    let chars: Vec<char> = description.chars().collect();
    let lowered = lowered_chars(description);

    for keyword in keywords {
        if contexts.len() >= window.max_results {
            break;
        }
        let needle = lowered_chars(keyword.as_ref());
        let Some(start) = find_chars(&lowered, &needle) else {
            continue;
        };
        let context_start = start.saturating_sub(window.before);
        let context_end = (start + needle.len() + window.after).min(chars.len());
        let context: String = chars[context_start..context_end].iter().collect();
        contexts.push(context.trim().to_string());
    }

    contexts
}

pub fn extract_deliverables(description: &str) -> Vec<String> {
    extract_contexts(description, DELIVERABLE_KEYWORDS, DELIVERABLE_WINDOW)
}

pub fn extract_proposal_requirements(description: &str) -> Vec<String> {
    extract_contexts(description, REQUIREMENT_KEYWORDS, REQUIREMENT_WINDOW)
}

#[derive(Debug, Clone, Deserialize)]
struct ExtractionRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    deliverable_keywords: Vec<String>,
    #[serde(default)]
    requirement_keywords: Vec<String>,
}

/// Keyword sets for the two extraction views. The built-in defaults cover
/// normal operation; a rules file can override either list.
#[derive(Debug, Clone)]
pub struct ExtractionRules {
    deliverable_keywords: Vec<String>,
    requirement_keywords: Vec<String>,
}

impl Default for ExtractionRules {
    fn default() -> Self {
        Self {
            deliverable_keywords: DELIVERABLE_KEYWORDS.iter().map(ToString::to_string).collect(),
            requirement_keywords: REQUIREMENT_KEYWORDS.iter().map(ToString::to_string).collect(),
        }
    }
}

impl ExtractionRules {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    fn from_yaml_str(text: &str) -> anyhow::Result<Self> {
        let file: ExtractionRulesFile = serde_yaml::from_str(text)?;
        let defaults = Self::default();
        Ok(Self {
            deliverable_keywords: if file.deliverable_keywords.is_empty() {
                defaults.deliverable_keywords
            } else {
                file.deliverable_keywords
            },
            requirement_keywords: if file.requirement_keywords.is_empty() {
                defaults.requirement_keywords
            } else {
                file.requirement_keywords
            },
        })
    }

    pub fn deliverables(&self, description: &str) -> Vec<String> {
        extract_contexts(description, &self.deliverable_keywords, DELIVERABLE_WINDOW)
    }

    pub fn proposal_requirements(&self, description: &str) -> Vec<String> {
        extract_contexts(description, &self.requirement_keywords, REQUIREMENT_WINDOW)
    }
}

/// Deliverables view: metadata passthrough plus extracted output contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliverablesReport {
    pub notice_id: String,
    pub title: String,
    pub solicitation_number: String,
    pub agency: String,
    pub response_deadline: String,
    pub notice_type: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub ui_link: String,
}

pub fn deliverables_report(opportunity: &Opportunity, rules: &ExtractionRules) -> DeliverablesReport {
    DeliverablesReport {
        notice_id: opportunity.notice_id.clone(),
        title: opportunity.title().to_string(),
        solicitation_number: opportunity.solicitation_number().to_string(),
        agency: opportunity.agency().to_string(),
        response_deadline: opportunity.response_deadline().to_string(),
        notice_type: opportunity.notice_type().to_string(),
        description: opportunity.description().to_string(),
        requirements: rules.deliverables(opportunity.description()),
        ui_link: opportunity.ui_link().to_string(),
    }
}

/// Proposal-requirements view: metadata passthrough plus extracted
/// obligation contexts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalRequirementsReport {
    pub notice_id: String,
    pub title: String,
    pub solicitation_number: String,
    pub agency: String,
    pub response_deadline: String,
    pub notice_type: String,
    pub set_aside_type: String,
    pub naics_code: String,
    pub description: String,
    pub requirements: Vec<String>,
    pub point_of_contact: String,
    pub ui_link: String,
}

pub fn proposal_requirements_report(
    opportunity: &Opportunity,
    rules: &ExtractionRules,
) -> ProposalRequirementsReport {
    ProposalRequirementsReport {
        notice_id: opportunity.notice_id.clone(),
        title: opportunity.title().to_string(),
        solicitation_number: opportunity.solicitation_number().to_string(),
        agency: opportunity.agency().to_string(),
        response_deadline: opportunity.response_deadline().to_string(),
        notice_type: opportunity.notice_type().to_string(),
        set_aside_type: opportunity.set_aside().to_string(),
        naics_code: opportunity.naics_code().to_string(),
        description: opportunity.description().to_string(),
        requirements: rules.proposal_requirements(opportunity.description()),
        point_of_contact: opportunity.point_of_contact().to_string(),
        ui_link: opportunity.ui_link().to_string(),
    }
}

/// Aggregate counters over the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsReport {
    pub total_opportunities: u64,
    pub active_opportunities: u64,
    pub recent_opportunities: u64,
    pub top_agencies: Vec<(String, u64)>,
    pub top_naics: Vec<(String, u64)>,
}

/// Descending frequency table; ties keep first-encounter order (stable
/// sort over the encounter sequence).
fn top_counts<I: IntoIterator<Item = String>>(labels: I, limit: usize) -> Vec<(String, u64)> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for label in labels {
        if !counts.contains_key(&label) {
            order.push(label.clone());
        }
        *counts.entry(label).or_insert(0) += 1;
    }
    let mut table: Vec<(String, u64)> = order
        .into_iter()
        .map(|label| {
            let count = counts[&label];
            (label, count)
        })
        .collect();
    table.sort_by(|a, b| b.1.cmp(&a.1));
    table.truncate(limit);
    table
}

pub fn compute_stats(opportunities: &[Opportunity], clock: &dyn Clock) -> StatsReport {
    let total_opportunities = opportunities.len() as u64;
    let active_opportunities = opportunities
        .iter()
        .filter(|o| o.active().eq_ignore_ascii_case("yes"))
        .count() as u64;

    let week_ago = clock.now() - Duration::days(7);
    let recent_opportunities = opportunities
        .iter()
        .filter(|o| {
            let posted = o.posted_date();
            !posted.is_empty()
                && parse_flexible_datetime(posted).is_some_and(|when| when >= week_ago)
        })
        .count() as u64;

    let top_agencies = top_counts(
        opportunities
            .iter()
            .map(|o| o.agency.clone().unwrap_or_else(|| "Unknown".to_string())),
        10,
    );
    let top_naics = top_counts(
        opportunities.iter().filter_map(|o| match &o.naics_code {
            Some(code) if code.is_empty() => None,
            Some(code) => Some(code.clone()),
            None => Some("Unknown".to_string()),
        }),
        10,
    );

    StatsReport {
        total_opportunities,
        active_opportunities,
        recent_opportunities,
        top_agencies,
        top_naics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sst_store::MemoryStore;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn fixed_clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).single().unwrap())
    }

    fn record_with_deadline(deadline: &str) -> Opportunity {
        Opportunity {
            notice_id: "T1".into(),
            response_deadline: Some(deadline.to_string()),
            ..Opportunity::default()
        }
    }

    #[test]
    fn flexible_datetime_accepts_common_upstream_shapes() {
        assert!(parse_flexible_datetime("2024-01-15T10:00:00Z").is_some());
        assert!(parse_flexible_datetime("2024-01-15T10:00:00+00:00").is_some());
        assert!(parse_flexible_datetime("2024-01-15T10:00:00").is_some());
        assert!(parse_flexible_datetime("2024-01-15 10:00:00").is_some());
        assert!(parse_flexible_datetime("2024-01-15").is_some());
        assert!(parse_flexible_datetime("not-a-date").is_none());
        assert!(parse_flexible_datetime("").is_none());
    }

    #[test]
    fn deadline_urgency_tiers() {
        let clock = fixed_clock();

        let urgent = recommendations_for(&record_with_deadline("2024-03-04T00:00:00Z"), &clock);
        assert_eq!(urgent, vec!["URGENT: response deadline is in 3 days"]);

        let plan = recommendations_for(&record_with_deadline("2024-03-11T00:00:00Z"), &clock);
        assert_eq!(plan, vec!["Response deadline is in 10 days - plan accordingly"]);

        let comfortable =
            recommendations_for(&record_with_deadline("2024-03-21T00:00:00Z"), &clock);
        assert_eq!(
            comfortable,
            vec!["Response deadline is in 20 days - good planning time"]
        );

        let unclear = recommendations_for(&record_with_deadline("not-a-date"), &clock);
        assert_eq!(
            unclear,
            vec!["Response deadline is present but the format is unclear"]
        );

        let silent = recommendations_for(&Opportunity::default(), &clock);
        assert!(silent.is_empty());
    }

    #[test]
    fn set_aside_first_match_wins() {
        let clock = fixed_clock();
        let mut record = Opportunity {
            notice_id: "T2".into(),
            set_aside: Some("Women-Owned Small Business (WOSB) Set-Aside".into()),
            ..Opportunity::default()
        };
        // "small business" is checked before "women".
        assert_eq!(
            recommendations_for(&record, &clock),
            vec!["Small business set-aside opportunity"]
        );

        record.set_aside = Some("Service-Disabled Veteran-Owned Set-Aside".into());
        assert_eq!(
            recommendations_for(&record, &clock),
            vec!["Veteran-owned business set-aside opportunity"]
        );

        record.set_aside = Some("8(a) Competitive".into());
        assert!(recommendations_for(&record, &clock).is_empty());
    }

    #[test]
    fn recommendations_keep_check_order() {
        let clock = fixed_clock();
        let record = Opportunity {
            notice_id: "T3".into(),
            response_deadline: Some("2024-03-04T00:00:00Z".into()),
            set_aside: Some("Total Small Business Set-Aside".into()),
            naics_code: Some("541511".into()),
            active: Some("Yes".into()),
            ..Opportunity::default()
        };
        let recommendations = recommendations_for(&record, &clock);
        assert_eq!(
            recommendations,
            vec![
                "URGENT: response deadline is in 3 days",
                "Small business set-aside opportunity",
                "NAICS code: 541511",
                "Opportunity is currently active",
            ]
        );

        let inactive = Opportunity {
            active: Some("No".into()),
            ..record
        };
        assert_eq!(
            recommendations_for(&inactive, &clock).last().unwrap(),
            "Opportunity is no longer active"
        );
    }

    #[test]
    fn evaluation_truncates_long_descriptions() {
        let clock = fixed_clock();
        let long = "x".repeat(620);
        let record = Opportunity {
            notice_id: "T4".into(),
            description: Some(long),
            ..Opportunity::default()
        };
        let evaluation = evaluate(&record, &clock);
        assert_eq!(evaluation.description.chars().count(), 503);
        assert!(evaluation.description.ends_with("..."));

        let short = Opportunity {
            description: Some("brief".into()),
            ..record
        };
        assert_eq!(evaluate(&short, &clock).description, "brief");
    }

    #[test]
    fn empty_description_extracts_nothing() {
        assert!(extract_deliverables("").is_empty());
        assert!(extract_proposal_requirements("").is_empty());
    }

    #[test]
    fn extracted_context_contains_its_keyword() {
        let description = "The contractor will deliver a final report to the program office.";
        let contexts = extract_deliverables(description);
        assert!(contexts.iter().any(|c| c.contains("report")));
    }

    #[test]
    fn proposal_requirement_contexts_are_bounded() {
        let description = "All offerors must comply with security clearance requirements \
                           before award.";
        let contexts = extract_proposal_requirements(description);
        assert!(contexts.iter().any(|c| c.contains("must")));
        assert!(contexts.iter().any(|c| c.contains("clearance")));
        for context in &contexts {
            assert!(context.chars().count() <= 100 + "requirements".len() + 100);
        }
    }

    #[test]
    fn cap_truncates_the_tail_of_the_keyword_order() {
        let description = "alpha beta gamma delta";
        let keywords = ["gamma", "delta", "alpha", "beta"];
        let window = ContextWindow {
            before: 2,
            after: 2,
            max_results: 2,
        };
        let contexts = extract_contexts(description, &keywords, window);
        // First two keywords in scan order win, not first occurrences in the
        // text and not an alphabetical pick.
        assert_eq!(contexts.len(), 2);
        assert!(contexts[0].contains("gamma"));
        assert!(contexts[1].contains("delta"));
    }

    #[test]
    fn each_keyword_contributes_at_most_one_context() {
        let description = "plan early, plan often, plan always";
        let contexts = extract_contexts(
            description,
            &["plan"],
            ContextWindow {
                before: 5,
                after: 5,
                max_results: 10,
            },
        );
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].contains("plan"));
    }

    #[test]
    fn windows_clamp_to_description_bounds() {
        let description = "report";
        let contexts = extract_contexts(
            description,
            &["report"],
            ContextWindow {
                before: 50,
                after: 50,
                max_results: 10,
            },
        );
        assert_eq!(contexts, vec!["report"]);
    }

    #[test]
    fn extraction_search_is_case_insensitive() {
        let contexts = extract_contexts(
            "FINAL REPORT due quarterly",
            &["report"],
            DELIVERABLE_WINDOW,
        );
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].contains("REPORT"));
    }

    #[test]
    fn rules_file_overrides_keyword_sets() {
        let yaml = "version: 1\ndeliverable_keywords:\n  - prototype\n";
        let rules = ExtractionRules::from_yaml_str(yaml).unwrap();
        let contexts = rules.deliverables("a working prototype is expected");
        assert_eq!(contexts.len(), 1);
        assert!(contexts[0].contains("prototype"));
        // Unspecified lists keep the defaults.
        assert!(!rules
            .proposal_requirements("offerors must respond")
            .is_empty());
    }

    #[test]
    fn stats_counts_and_recency() {
        let clock = fixed_clock();
        let records = vec![
            Opportunity {
                notice_id: "S1".into(),
                agency: Some("Department of Defense".into()),
                naics_code: Some("541511".into()),
                active: Some("Yes".into()),
                posted_date: Some("2024-02-28T00:00:00Z".into()),
                ..Opportunity::default()
            },
            Opportunity {
                notice_id: "S2".into(),
                agency: Some("Department of Defense".into()),
                naics_code: Some("".into()),
                active: Some("no".into()),
                posted_date: Some("2024-01-01".into()),
                ..Opportunity::default()
            },
            Opportunity {
                notice_id: "S3".into(),
                posted_date: Some("garbage".into()),
                ..Opportunity::default()
            },
        ];
        let stats = compute_stats(&records, &clock);
        assert_eq!(stats.total_opportunities, 3);
        assert_eq!(stats.active_opportunities, 1);
        assert_eq!(stats.recent_opportunities, 1);
        assert_eq!(stats.top_agencies[0], ("Department of Defense".into(), 2));
        assert_eq!(stats.top_agencies[1], ("Unknown".into(), 1));
        // Empty NAICS is skipped, missing NAICS counts as Unknown.
        assert_eq!(
            stats.top_naics,
            vec![("541511".into(), 1), ("Unknown".into(), 1)]
        );
    }

    #[test]
    fn frequency_ties_keep_first_encounter_order() {
        let table = top_counts(
            ["b", "a", "c", "a"].into_iter().map(ToString::to_string),
            10,
        );
        assert_eq!(
            table,
            vec![("a".into(), 2), ("b".into(), 1), ("c".into(), 1)]
        );
    }

    #[tokio::test]
    async fn list_builds_page_metadata_from_filtered_total() {
        let store = MemoryStore::demo();
        let query = OpportunityQuery {
            per_page: 1,
            page: 2,
            ..OpportunityQuery::default()
        };
        let page = list_opportunities(&store, &query).await.unwrap();
        assert_eq!(page.opportunities.len(), 1);
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.total_pages, 2);
        assert!(!page.pagination.has_next);
        assert!(page.pagination.has_prev);
    }

    #[tokio::test]
    async fn load_opportunity_maps_absence_to_not_found() {
        let store = MemoryStore::demo();
        assert!(load_opportunity(&store, "DEMO001").await.is_ok());
        let err = load_opportunity(&store, "MISSING").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound(_)));
    }
}
