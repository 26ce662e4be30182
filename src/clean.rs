//! Per-table cleaning: all-string extract frames → typed frames.
//!
//! Mirrors the load contract of the serving schema: rows with a missing or
//! duplicate primary key are skipped (and counted), malformed scalar values
//! are coerced to null, and the remaining columns are selected in schema
//! order. A skipped row never fails the load of its table.

use chrono::{NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::warn;

use crate::error::Result;
use crate::schema::{deliverable, legal_basis, organization, participation, project,
                    project_legal_basis, project_sci_voc, project_topic, publication, sci_voc,
                    topic};

/// Counters a cleaner reports back to the load step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanCounts {
    pub rows_in: usize,
    pub rows_kept: usize,
    pub skipped: usize,
}

impl CleanCounts {
    fn new(rows_in: usize, rows_kept: usize) -> Self {
        Self {
            rows_in,
            rows_kept,
            skipped: rows_in - rows_kept,
        }
    }
}

// ── Scalar coercion ─────────────────────────────────────────────────────────

/// Treat empty strings and common NA markers as missing.
pub(crate) fn non_empty(raw: Option<&str>) -> Option<&str> {
    let s = raw?.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("na") || s.eq_ignore_ascii_case("nan") {
        None
    } else {
        Some(s)
    }
}

/// Parse a money/number cell, tolerating currency symbols, spaces and
/// thousands separators. Negative amounts are treated as malformed.
pub(crate) fn clean_number(raw: Option<&str>) -> Option<f64> {
    let s = non_empty(raw)?;
    let filtered: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let value: f64 = filtered.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Parse a date cell to a microsecond timestamp. Tries the formats seen in
/// the extracts; unparseable values coerce to null.
pub(crate) fn clean_date(raw: Option<&str>) -> Option<i64> {
    let s = non_empty(raw)?;
    let datetime = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(datetime.and_utc().timestamp_micros())
}

/// Parse a boolean flag cell; anything unrecognized is false.
pub(crate) fn clean_flag(raw: Option<&str>) -> bool {
    matches!(
        non_empty(raw).map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

// ── Column access helpers ───────────────────────────────────────────────────

/// Optional string-column view; absent columns read as all-null.
pub(crate) struct StrCol<'a>(Option<&'a StringChunked>);

impl<'a> StrCol<'a> {
    pub(crate) fn new(df: &'a DataFrame, name: &str) -> Self {
        Self(df.column(name).ok().and_then(|c| c.str().ok()))
    }

    pub(crate) fn get(&self, i: usize) -> Option<&'a str> {
        non_empty(self.0.and_then(|c| c.get(i)))
    }
}

fn string_column(name: &str, values: Vec<Option<String>>) -> Column {
    Column::new(name.into(), values)
}

fn float_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Column::new(name.into(), values)
}

fn datetime_column(name: &str, values: Vec<Option<i64>>) -> Result<Column> {
    let series = Series::new(name.into(), values)
        .cast(&DataType::Datetime(TimeUnit::Microseconds, None))?;
    Ok(series.into())
}

fn bool_column(name: &str, values: Vec<bool>) -> Column {
    Column::new(name.into(), values)
}

// ── Projects ────────────────────────────────────────────────────────────────

const PROJECT_STRING_COLS: [&str; 11] = [
    project::ACRONYM,
    project::STATUS,
    project::TITLE,
    project::FRAMEWORK_PROGRAMME,
    project::MASTER_CALL,
    project::SUB_CALL,
    project::FUNDING_SCHEME,
    project::NATURE,
    project::OBJECTIVE,
    project::RCN,
    project::GRANT_DOI,
];

/// Clean the project extract: skip rows without an id, dedup by id
/// (first occurrence wins), coerce dates and money columns.
pub fn clean_projects(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    let n = raw.height();
    let id_col = StrCol::new(raw, project::ID);
    let string_cols: Vec<StrCol> = PROJECT_STRING_COLS
        .iter()
        .map(|c| StrCol::new(raw, c))
        .collect();
    let start_col = StrCol::new(raw, project::START_DATE);
    let end_col = StrCol::new(raw, project::END_DATE);
    let signature_col = StrCol::new(raw, project::EC_SIGNATURE_DATE);
    let total_cost_col = StrCol::new(raw, project::TOTAL_COST);
    let ec_max_col = StrCol::new(raw, project::EC_MAX_CONTRIBUTION);

    let mut seen = std::collections::HashSet::new();
    let mut ids: Vec<String> = Vec::with_capacity(n);
    let mut strings: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(n); PROJECT_STRING_COLS.len()];
    let mut starts = Vec::with_capacity(n);
    let mut ends = Vec::with_capacity(n);
    let mut signatures = Vec::with_capacity(n);
    let mut total_costs = Vec::with_capacity(n);
    let mut ec_maxes = Vec::with_capacity(n);

    for i in 0..n {
        let Some(id) = id_col.get(i) else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }
        ids.push(id.to_string());
        for (j, c) in string_cols.iter().enumerate() {
            strings[j].push(c.get(i).map(str::to_string));
        }
        starts.push(clean_date(start_col.get(i)));
        ends.push(clean_date(end_col.get(i)));
        signatures.push(clean_date(signature_col.get(i)));
        total_costs.push(clean_number(total_cost_col.get(i)));
        ec_maxes.push(clean_number(ec_max_col.get(i)));
    }

    let counts = CleanCounts::new(n, ids.len());
    if counts.skipped > 0 {
        warn!(table = "projects", skipped = counts.skipped, "rows without a usable id");
    }

    let mut columns = vec![Column::new(project::ID.into(), ids)];
    for (name, values) in PROJECT_STRING_COLS.iter().zip(strings) {
        columns.push(string_column(name, values));
    }
    columns.push(datetime_column(project::START_DATE, starts)?);
    columns.push(datetime_column(project::END_DATE, ends)?);
    columns.push(datetime_column(project::EC_SIGNATURE_DATE, signatures)?);
    columns.push(float_column(project::TOTAL_COST, total_costs));
    columns.push(float_column(project::EC_MAX_CONTRIBUTION, ec_maxes));

    Ok((DataFrame::new(columns)?, counts))
}

// ── Organizations / participations ──────────────────────────────────────────

const ORG_STRING_COLS: [&str; 11] = [
    organization::NAME,
    organization::SHORT_NAME,
    organization::VAT_NUMBER,
    organization::ACTIVITY_TYPE,
    organization::STREET,
    organization::POST_CODE,
    organization::CITY,
    organization::COUNTRY,
    organization::NUTS_CODE,
    organization::GEOLOCATION,
    organization::ORGANIZATION_URL,
];

/// Clean the organization extract, which carries one row per project
/// participation. Returns the typed participation-level frame; the store
/// splits it into the organization dimension and the join table.
/// Rows missing either key are skipped.
pub fn clean_organizations(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    let n = raw.height();
    let org_id_col = StrCol::new(raw, participation::ORGANIZATION_ID);
    let project_id_col = StrCol::new(raw, participation::PROJECT_ID);
    let string_cols: Vec<StrCol> = ORG_STRING_COLS.iter().map(|c| StrCol::new(raw, c)).collect();
    let sme_col = StrCol::new(raw, organization::SME);
    let role_col = StrCol::new(raw, participation::ROLE);
    let order_col = StrCol::new(raw, participation::ORDER_INDEX);
    let ec_col = StrCol::new(raw, participation::EC_CONTRIBUTION);
    let net_ec_col = StrCol::new(raw, participation::NET_EC_CONTRIBUTION);
    let cost_col = StrCol::new(raw, participation::TOTAL_COST);
    let active_col = StrCol::new(raw, participation::ACTIVE);
    let eop_col = StrCol::new(raw, participation::END_OF_PARTICIPATION);

    let mut org_ids = Vec::with_capacity(n);
    let mut project_ids = Vec::with_capacity(n);
    let mut strings: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(n); ORG_STRING_COLS.len()];
    let mut smes = Vec::with_capacity(n);
    let mut roles: Vec<Option<String>> = Vec::with_capacity(n);
    let mut orders = Vec::with_capacity(n);
    let mut ecs = Vec::with_capacity(n);
    let mut net_ecs = Vec::with_capacity(n);
    let mut costs = Vec::with_capacity(n);
    let mut actives = Vec::with_capacity(n);
    let mut eops = Vec::with_capacity(n);

    for i in 0..n {
        let (Some(org_id), Some(project_id)) = (org_id_col.get(i), project_id_col.get(i)) else {
            continue;
        };
        org_ids.push(org_id.to_string());
        project_ids.push(project_id.to_string());
        for (j, c) in string_cols.iter().enumerate() {
            strings[j].push(c.get(i).map(str::to_string));
        }
        smes.push(clean_flag(sme_col.get(i)));
        roles.push(role_col.get(i).map(str::to_lowercase));
        orders.push(clean_number(order_col.get(i)));
        ecs.push(clean_number(ec_col.get(i)));
        net_ecs.push(clean_number(net_ec_col.get(i)));
        costs.push(clean_number(cost_col.get(i)));
        actives.push(clean_flag(active_col.get(i)));
        eops.push(clean_flag(eop_col.get(i)));
    }

    let counts = CleanCounts::new(n, org_ids.len());
    if counts.skipped > 0 {
        warn!(table = "organizations", skipped = counts.skipped, "rows without both ids");
    }

    let mut columns = vec![
        Column::new(participation::ORGANIZATION_ID.into(), org_ids),
        Column::new(participation::PROJECT_ID.into(), project_ids),
    ];
    for (name, values) in ORG_STRING_COLS.iter().zip(strings) {
        columns.push(string_column(name, values));
    }
    columns.push(bool_column(organization::SME, smes));
    columns.push(string_column(participation::ROLE, roles));
    columns.push(float_column(participation::ORDER_INDEX, orders));
    columns.push(float_column(participation::EC_CONTRIBUTION, ecs));
    columns.push(float_column(participation::NET_EC_CONTRIBUTION, net_ecs));
    columns.push(float_column(participation::TOTAL_COST, costs));
    columns.push(bool_column(participation::ACTIVE, actives));
    columns.push(bool_column(participation::END_OF_PARTICIPATION, eops));

    Ok((DataFrame::new(columns)?, counts))
}

// ── Vocabulary extracts ─────────────────────────────────────────────────────

/// Clean the topics extract: one row per project↔topic link, topic codes
/// upper-cased. Rows missing either key are skipped.
pub fn clean_topics(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    clean_vocabulary_links(
        raw,
        "topics",
        project_topic::TOPIC_CODE,
        true,
        &[topic::TITLE],
    )
}

/// Clean the legal-basis extract (code links + programme-part flag).
pub fn clean_legal_basis(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    let (mut df, counts) = clean_vocabulary_links(
        raw,
        "legal_basis",
        project_legal_basis::LEGAL_BASIS_CODE,
        false,
        &[legal_basis::TITLE],
    )?;
    // flag column rides along for the dimension table
    let raw_flags = StrCol::new(raw, legal_basis::UNIQUE_PROGRAMME_PART);
    let kept_codes = StrCol::new(raw, project_legal_basis::LEGAL_BASIS_CODE);
    let kept_projects = StrCol::new(raw, project_legal_basis::PROJECT_ID);
    let mut flags = Vec::with_capacity(df.height());
    for i in 0..raw.height() {
        if kept_codes.get(i).is_some() && kept_projects.get(i).is_some() {
            flags.push(clean_flag(raw_flags.get(i)));
        }
    }
    df.with_column(bool_column(legal_basis::UNIQUE_PROGRAMME_PART, flags))?;
    Ok((df, counts))
}

/// Clean the scientific-vocabulary extract (code links + path/title text).
pub fn clean_sci_voc(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    clean_vocabulary_links(
        raw,
        "sci_voc",
        project_sci_voc::SCI_VOC_CODE,
        false,
        &[sci_voc::PATH, sci_voc::TITLE, sci_voc::DESCRIPTION],
    )
}

/// Shared shape of the three vocabulary extracts: project_id + code +
/// free-text columns. Skips rows missing either key.
fn clean_vocabulary_links(
    raw: &DataFrame,
    table: &str,
    code_name: &str,
    uppercase_code: bool,
    text_cols: &[&str],
) -> Result<(DataFrame, CleanCounts)> {
    let n = raw.height();
    let project_col = StrCol::new(raw, participation::PROJECT_ID);
    let code_col = StrCol::new(raw, code_name);
    let texts: Vec<StrCol> = text_cols.iter().map(|c| StrCol::new(raw, c)).collect();

    let mut project_ids = Vec::with_capacity(n);
    let mut codes = Vec::with_capacity(n);
    let mut text_values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(n); text_cols.len()];

    for i in 0..n {
        let (Some(project_id), Some(code)) = (project_col.get(i), code_col.get(i)) else {
            continue;
        };
        project_ids.push(project_id.to_string());
        codes.push(if uppercase_code {
            code.to_uppercase()
        } else {
            code.to_string()
        });
        for (j, c) in texts.iter().enumerate() {
            text_values[j].push(c.get(i).map(str::to_string));
        }
    }

    let counts = CleanCounts::new(n, project_ids.len());
    if counts.skipped > 0 {
        warn!(table, skipped = counts.skipped, "rows without both keys");
    }

    let mut columns = vec![
        Column::new(participation::PROJECT_ID.into(), project_ids),
        Column::new(code_name.into(), codes),
    ];
    for (name, values) in text_cols.iter().zip(text_values) {
        columns.push(string_column(name, values));
    }
    Ok((DataFrame::new(columns)?, counts))
}

// ── Child records ───────────────────────────────────────────────────────────

/// Clean the deliverables extract: dedup by id, keep the metadata as text.
pub fn clean_deliverables(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    clean_child_records(
        raw,
        "deliverables",
        &[
            deliverable::TITLE,
            deliverable::DELIVERABLE_TYPE,
            deliverable::DESCRIPTION,
            deliverable::URL,
            deliverable::COLLECTION,
        ],
        &[],
    )
}

/// Clean the publications extract: dedup by id, published_year as number.
pub fn clean_publications(raw: &DataFrame) -> Result<(DataFrame, CleanCounts)> {
    clean_child_records(
        raw,
        "publications",
        &[
            publication::TITLE,
            publication::IS_PUBLISHED_AS,
            publication::AUTHORS,
            publication::JOURNAL_TITLE,
            publication::JOURNAL_NUMBER,
            publication::PUBLISHED_PAGES,
            publication::ISSN,
            publication::ISBN,
            publication::DOI,
            publication::COLLECTION,
        ],
        &[publication::PUBLISHED_YEAR],
    )
}

/// Shared shape of the child-record extracts: id PK + project_id owner +
/// free-text metadata. Skips rows missing either key, dedups by id.
fn clean_child_records(
    raw: &DataFrame,
    table: &str,
    text_cols: &[&str],
    numeric_cols: &[&str],
) -> Result<(DataFrame, CleanCounts)> {
    let n = raw.height();
    let id_col = StrCol::new(raw, deliverable::ID);
    let project_col = StrCol::new(raw, deliverable::PROJECT_ID);
    let texts: Vec<StrCol> = text_cols.iter().map(|c| StrCol::new(raw, c)).collect();
    let numerics: Vec<StrCol> = numeric_cols.iter().map(|c| StrCol::new(raw, c)).collect();

    let mut seen = std::collections::HashSet::new();
    let mut ids = Vec::with_capacity(n);
    let mut project_ids = Vec::with_capacity(n);
    let mut text_values: Vec<Vec<Option<String>>> = vec![Vec::with_capacity(n); text_cols.len()];
    let mut numeric_values: Vec<Vec<Option<f64>>> = vec![Vec::with_capacity(n); numeric_cols.len()];

    for i in 0..n {
        let (Some(id), Some(project_id)) = (id_col.get(i), project_col.get(i)) else {
            continue;
        };
        if !seen.insert(id.to_string()) {
            continue;
        }
        ids.push(id.to_string());
        project_ids.push(project_id.to_string());
        for (j, c) in texts.iter().enumerate() {
            text_values[j].push(c.get(i).map(str::to_string));
        }
        for (j, c) in numerics.iter().enumerate() {
            numeric_values[j].push(clean_number(c.get(i)));
        }
    }

    let counts = CleanCounts::new(n, ids.len());
    if counts.skipped > 0 {
        warn!(table, skipped = counts.skipped, "rows skipped (missing keys or duplicate id)");
    }

    let mut columns = vec![
        Column::new(deliverable::ID.into(), ids),
        Column::new(deliverable::PROJECT_ID.into(), project_ids),
    ];
    for (name, values) in text_cols.iter().zip(text_values) {
        columns.push(string_column(name, values));
    }
    for (name, values) in numeric_cols.iter().zip(numeric_values) {
        columns.push(float_column(name, values));
    }
    Ok((DataFrame::new(columns)?, counts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_cleaning_strips_noise_and_rejects_negatives() {
        assert_eq!(clean_number(Some("1,500,000.50")), Some(1500000.50));
        assert_eq!(clean_number(Some(" 42 ")), Some(42.0));
        assert_eq!(clean_number(Some("EUR 7")), Some(7.0));
        assert_eq!(clean_number(Some("-3")), None);
        assert_eq!(clean_number(Some("")), None);
        assert_eq!(clean_number(None), None);
    }

    #[test]
    fn date_cleaning_accepts_extract_formats() {
        let plain = clean_date(Some("2021-06-01")).unwrap();
        let timed = clean_date(Some("2021-06-01 00:00:00")).unwrap();
        assert_eq!(plain, timed);
        assert!(clean_date(Some("01/06/2021")).is_some());
        assert_eq!(clean_date(Some("not a date")), None);
        assert_eq!(clean_date(Some("")), None);
    }

    #[test]
    fn flags_parse_loosely() {
        assert!(clean_flag(Some("true")));
        assert!(clean_flag(Some("TRUE")));
        assert!(clean_flag(Some("1")));
        assert!(!clean_flag(Some("false")));
        assert!(!clean_flag(None));
    }

    #[test]
    fn projects_skip_missing_and_duplicate_ids() {
        let raw = df![
            project::ID => ["1", "", "2", "1"],
            project::ACRONYM => ["A", "B", "C", "D"],
            project::START_DATE => ["2020-01-01", "2020-01-01", "bogus", "2020-01-01"],
            project::EC_MAX_CONTRIBUTION => ["100", "100", "200", "100"],
        ]
        .unwrap();

        let (clean, counts) = clean_projects(&raw).unwrap();
        assert_eq!(counts.rows_in, 4);
        assert_eq!(counts.rows_kept, 2);
        assert_eq!(counts.skipped, 2);
        assert_eq!(clean.height(), 2);

        // malformed date coerced to null, not a skipped row
        let starts = clean.column(project::START_DATE).unwrap();
        assert_eq!(starts.null_count(), 1);
        let ec = clean.column(project::EC_MAX_CONTRIBUTION).unwrap().f64().unwrap();
        assert_eq!(ec.get(1), Some(200.0));
    }

    #[test]
    fn organizations_type_roles_and_flags() {
        let raw = df![
            participation::ORGANIZATION_ID => ["O1", "O2", ""],
            participation::PROJECT_ID => ["1", "1", "1"],
            organization::NAME => ["Alpha Uni", "Beta Labs", "Ghost"],
            organization::SME => ["false", "true", "true"],
            participation::ROLE => ["Coordinator", "participant", "participant"],
            participation::EC_CONTRIBUTION => ["1000", "500.5", "1"],
        ]
        .unwrap();

        let (clean, counts) = clean_organizations(&raw).unwrap();
        assert_eq!(counts.rows_kept, 2);
        assert_eq!(counts.skipped, 1);

        let roles = clean.column(participation::ROLE).unwrap().str().unwrap();
        assert_eq!(roles.get(0), Some("coordinator"));
        let sme = clean.column(organization::SME).unwrap().bool().unwrap();
        assert_eq!(sme.get(1), Some(true));
    }

    #[test]
    fn topic_codes_are_uppercased() {
        let raw = df![
            participation::PROJECT_ID => ["1", "2"],
            project_topic::TOPIC_CODE => ["horizon-cl5", "HORIZON-CL4"],
            topic::TITLE => ["Climate", "Digital"],
        ]
        .unwrap();
        let (clean, counts) = clean_topics(&raw).unwrap();
        assert_eq!(counts.skipped, 0);
        let codes = clean.column(project_topic::TOPIC_CODE).unwrap().str().unwrap();
        assert_eq!(codes.get(0), Some("HORIZON-CL5"));
    }

    #[test]
    fn child_records_dedup_by_id() {
        let raw = df![
            deliverable::ID => ["D1", "D1", "D2"],
            deliverable::PROJECT_ID => ["1", "1", "2"],
            deliverable::TITLE => ["first", "dup", "second"],
        ]
        .unwrap();
        let (clean, counts) = clean_deliverables(&raw).unwrap();
        assert_eq!(clean.height(), 2);
        assert_eq!(counts.skipped, 1);
    }
}
