//! Enrichment pass: derived project columns and the classification relation.
//!
//! Runs once per load, after the store is built; every derived value is a
//! pure function of the base tables, so a refreshed extract set simply
//! recomputes everything.

use polars::prelude::*;

use crate::clean::StrCol;
use crate::error::Result;
use crate::schema::{classification, organization, participation, project, project_sci_voc, sci_voc};
use crate::store::HorizonStore;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;
const DAYS_PER_MONTH: f64 = 30.44;
const DAYS_PER_YEAR: f64 = 365.25;

/// Projects frame with the derived columns of the serving view:
/// durations, per-year money, participant count, coordinator name.
pub fn enrich_projects(store: &HorizonStore) -> Result<DataFrame> {
    let participant_counts = store
        .participations
        .clone()
        .lazy()
        .group_by([col(participation::PROJECT_ID)])
        .agg([col(participation::ORGANIZATION_ID)
            .n_unique()
            .cast(DataType::Int64)
            .alias(project::N_PARTICIPANTS)]);

    let coordinators = store
        .participations
        .clone()
        .lazy()
        .filter(col(participation::ROLE).eq(lit(participation::ROLE_COORDINATOR)))
        .join(
            store.organizations.clone().lazy().select([
                col(organization::ID).alias(participation::ORGANIZATION_ID),
                col(organization::NAME),
            ]),
            [col(participation::ORGANIZATION_ID)],
            [col(participation::ORGANIZATION_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .group_by([col(participation::PROJECT_ID)])
        .agg([col(organization::NAME).first().alias(project::COORDINATOR_NAME)]);

    let start_us = col(project::START_DATE).cast(DataType::Int64);
    let end_us = col(project::END_DATE).cast(DataType::Int64);
    let duration_days = ((end_us - start_us).cast(DataType::Float64) / lit(MICROS_PER_DAY))
        .cast(DataType::Int64);

    let enriched = store
        .projects
        .clone()
        .lazy()
        .join(
            participant_counts,
            [col(project::ID)],
            [col(participation::PROJECT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            coordinators,
            [col(project::ID)],
            [col(participation::PROJECT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_columns([
            duration_days.alias(project::DURATION_DAYS),
            col(project::N_PARTICIPANTS).fill_null(lit(0i64)),
        ])
        .with_columns([
            (col(project::DURATION_DAYS).cast(DataType::Float64) / lit(DAYS_PER_MONTH))
                .cast(DataType::Int64)
                .alias(project::DURATION_MONTHS),
            (col(project::DURATION_DAYS).cast(DataType::Float64) / lit(DAYS_PER_YEAR))
                .cast(DataType::Int64)
                .alias(project::DURATION_YEARS),
        ])
        .with_columns([
            per_year(project::EC_MAX_CONTRIBUTION, project::EC_CONTRIBUTION_PER_YEAR),
            per_year(project::TOTAL_COST, project::TOTAL_COST_PER_YEAR),
        ])
        // join output order is not guaranteed; ascending id is the order the
        // serving layer (and the max-projects cap) relies on
        .sort([project::ID], SortMultipleOptions::default())
        .collect()?;

    Ok(enriched)
}

/// Annualized money column; null when the duration is unknown or under a
/// whole year.
fn per_year(amount_col: &str, alias: &str) -> Expr {
    when(col(project::DURATION_YEARS).gt(lit(0i64)))
        .then(col(amount_col) / col(project::DURATION_YEARS).cast(DataType::Float64))
        .otherwise(lit(NULL).cast(DataType::Float64))
        .alias(alias)
}

/// One row per project vocabulary tag, with the path split into its
/// hierarchy levels. Projects without any tag get a single sentinel row so
/// they still group under the `other` field.
pub fn classification_relation(store: &HorizonStore) -> Result<DataFrame> {
    // path/title lookup by code, avoiding a join so row order follows the
    // link table deterministically
    let mut by_code: std::collections::HashMap<String, (Option<String>, Option<String>)> =
        std::collections::HashMap::new();
    {
        let codes = StrCol::new(&store.sci_voc, sci_voc::CODE);
        let paths = StrCol::new(&store.sci_voc, sci_voc::PATH);
        let titles = StrCol::new(&store.sci_voc, sci_voc::TITLE);
        for i in 0..store.sci_voc.height() {
            if let Some(code) = codes.get(i) {
                by_code.insert(
                    code.to_string(),
                    (
                        paths.get(i).map(str::to_string),
                        titles.get(i).map(str::to_string),
                    ),
                );
            }
        }
    }

    let links = &store.project_sci_voc;
    let n = links.height();
    let project_ids = StrCol::new(links, classification::PROJECT_ID);
    let codes = StrCol::new(links, project_sci_voc::SCI_VOC_CODE);

    let mut out_projects: Vec<String> = Vec::with_capacity(n);
    let mut out_codes: Vec<Option<String>> = Vec::with_capacity(n);
    let mut out_paths: Vec<Option<String>> = Vec::with_capacity(n);
    let mut out_titles: Vec<Option<String>> = Vec::with_capacity(n);
    let mut out_levels: [Vec<Option<String>>; 4] = Default::default();

    let mut tagged_projects = std::collections::HashSet::new();
    for i in 0..n {
        let (Some(project_id), Some(code)) = (project_ids.get(i), codes.get(i)) else {
            continue;
        };
        let (path, title) = by_code.get(code).cloned().unwrap_or((None, None));
        tagged_projects.insert(project_id.to_string());
        out_projects.push(project_id.to_string());
        out_codes.push(Some(code.to_string()));
        out_titles.push(title);
        let levels = split_path_levels(path.as_deref().unwrap_or(""));
        out_paths.push(path);
        for (j, level) in levels.into_iter().enumerate() {
            out_levels[j].push(level);
        }
    }

    // sentinel rows for projects absent from the vocabulary extract
    let all_ids = store.projects.column(project::ID)?.str()?;
    for id in all_ids.into_iter().flatten() {
        if tagged_projects.contains(id) {
            continue;
        }
        out_projects.push(id.to_string());
        out_codes.push(None);
        out_paths.push(None);
        out_titles.push(None);
        out_levels[0].push(Some(classification::OTHER.to_string()));
        out_levels[1].push(Some(classification::OTHER.to_string()));
        out_levels[2].push(None);
        out_levels[3].push(None);
    }

    let [field_classes, fields, sub_fields, niches] = out_levels;
    let df = DataFrame::new(vec![
        Column::new(classification::PROJECT_ID.into(), out_projects),
        Column::new(classification::SCI_VOC_CODE.into(), out_codes),
        Column::new(classification::PATH.into(), out_paths),
        Column::new(classification::TITLE.into(), out_titles),
        Column::new(classification::FIELD_CLASS.into(), field_classes),
        Column::new(classification::FIELD.into(), fields),
        Column::new(classification::SUB_FIELD.into(), sub_fields),
        Column::new(classification::NICHE.into(), niches),
    ])?;
    Ok(df)
}

/// Split `/<field_class>/<field>/<sub_field>/<niche>` into its four levels;
/// missing depths are None.
fn split_path_levels(path: &str) -> [Option<String>; 4] {
    let mut parts = path.trim_matches('/').split('/').filter(|p| !p.is_empty());
    [
        parts.next().map(str::to_string),
        parts.next().map(str::to_string),
        parts.next().map(str::to_string),
        parts.next().map(str::to_string),
    ]
}

/// Sorted distinct top-level fields over all vocabulary paths.
pub fn scientific_fields(sci_voc_dim: &DataFrame) -> Result<Vec<String>> {
    let paths = sci_voc_dim.column(sci_voc::PATH)?.str()?;
    let fields: Vec<String> = paths
        .into_iter()
        .flatten()
        .filter(|p| p.contains('/'))
        .filter_map(|p| {
            p.trim_matches('/')
                .split('/')
                .next()
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        })
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    Ok(fields)
}
