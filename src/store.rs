//! Normalized relational store for one dataset snapshot.
//!
//! Loading is staged like the serving schema: core tables first, then the
//! join tables (validated against their parents), then child records. A
//! foreign-key violation rejects the offending link row only; the parent
//! tables and every other row load normally. Refreshing replaces tables
//! wholesale; combined with copy-on-reload snapshots this gives
//! upsert-or-replace semantics at the dataset level.

use std::collections::HashSet;
use std::fmt;

use polars::prelude::*;
use tracing::{info, warn};

use crate::clean::{self, CleanCounts};
use crate::config::DataConfig;
use crate::error::{HorizonError, Result};
use crate::ingest;
use crate::schema::{legal_basis, organization, participation, project, project_legal_basis,
                    project_sci_voc, project_topic, sci_voc, topic};

/// Per-table load counters.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableCounts {
    pub loaded: usize,
    pub skipped: usize,
    pub rejected_links: usize,
}

impl TableCounts {
    fn from_clean(counts: CleanCounts) -> Self {
        Self {
            loaded: counts.rows_kept,
            skipped: counts.skipped,
            rejected_links: 0,
        }
    }
}

/// Counters for every table of one load run.
#[derive(Debug, Default, Clone)]
pub struct LoadReport {
    pub projects: TableCounts,
    pub organizations: TableCounts,
    pub participations: TableCounts,
    pub topics: TableCounts,
    pub legal_basis: TableCounts,
    pub sci_voc: TableCounts,
    pub project_topics: TableCounts,
    pub project_legal_basis: TableCounts,
    pub project_sci_voc: TableCounts,
    pub deliverables: TableCounts,
    pub publications: TableCounts,
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: [(&str, &TableCounts); 11] = [
            ("projects", &self.projects),
            ("organizations", &self.organizations),
            ("participations", &self.participations),
            ("topics", &self.topics),
            ("legal_basis", &self.legal_basis),
            ("sci_voc", &self.sci_voc),
            ("project_topics", &self.project_topics),
            ("project_legal_basis", &self.project_legal_basis),
            ("project_sci_voc", &self.project_sci_voc),
            ("deliverables", &self.deliverables),
            ("publications", &self.publications),
        ];
        writeln!(f, "{:<22} {:>8} {:>8} {:>10}", "table", "loaded", "skipped", "rejected")?;
        for (name, counts) in rows {
            writeln!(
                f,
                "{:<22} {:>8} {:>8} {:>10}",
                name, counts.loaded, counts.skipped, counts.rejected_links
            )?;
        }
        Ok(())
    }
}

/// Raw extract frames, as read by `ingest`. Optional extracts default to
/// empty tables so a partial drop still loads.
#[derive(Debug, Default)]
pub struct Extracts {
    pub project: DataFrame,
    pub organization: DataFrame,
    pub topics: Option<DataFrame>,
    pub legal_basis: Option<DataFrame>,
    pub sci_voc: Option<DataFrame>,
    pub deliverables: Option<DataFrame>,
    pub publications: Option<DataFrame>,
}

/// The normalized tables of one dataset snapshot.
#[derive(Debug, Clone)]
pub struct HorizonStore {
    pub projects: DataFrame,
    pub organizations: DataFrame,
    pub participations: DataFrame,
    pub topics: DataFrame,
    pub legal_basis: DataFrame,
    pub sci_voc: DataFrame,
    pub project_topics: DataFrame,
    pub project_legal_basis: DataFrame,
    pub project_sci_voc: DataFrame,
    pub deliverables: DataFrame,
    pub publications: DataFrame,
}

impl HorizonStore {
    /// Read the raw extract files under `cfg` and build the store.
    pub fn load(cfg: &DataConfig) -> Result<(Self, LoadReport)> {
        let required = |key: &str| -> Result<DataFrame> {
            let path = cfg.raw_file(key).expect("known table key");
            if !path.exists() {
                return Err(HorizonError::MissingTable(path.display().to_string()));
            }
            ingest::read_extract(&path)
        };
        let optional = |key: &str| -> Result<Option<DataFrame>> {
            let path = cfg.raw_file(key).expect("known table key");
            if path.exists() {
                Ok(Some(ingest::read_extract(&path)?))
            } else {
                info!(table = key, "extract not present, loading empty table");
                Ok(None)
            }
        };

        let extracts = Extracts {
            project: required("project")?,
            organization: required("organization")?,
            topics: optional("topics")?,
            legal_basis: optional("legal_basis")?,
            sci_voc: optional("sci_voc")?,
            deliverables: optional("deliverables")?,
            publications: optional("publications")?,
        };
        Self::from_extracts(extracts)
    }

    /// Build the store from already-read extract frames.
    pub fn from_extracts(extracts: Extracts) -> Result<(Self, LoadReport)> {
        let mut report = LoadReport::default();
        let empty = DataFrame::empty();

        // Stage 1: core tables
        let (projects, project_counts) = clean::clean_projects(&extracts.project)?;
        report.projects = TableCounts::from_clean(project_counts);
        let project_ids = id_set(&projects, project::ID)?;

        let (participation_rows, org_counts) =
            clean::clean_organizations(&extracts.organization)?;
        let organizations = organization_dimension(&participation_rows)?;
        report.organizations = TableCounts {
            loaded: organizations.height(),
            skipped: org_counts.skipped,
            rejected_links: 0,
        };

        // Stage 2: relationship tables
        let participations = {
            let selected = participation_rows.lazy().select([
                col(participation::PROJECT_ID),
                col(participation::ORGANIZATION_ID),
                col(participation::ROLE),
                col(participation::ORDER_INDEX),
                col(participation::EC_CONTRIBUTION),
                col(participation::NET_EC_CONTRIBUTION),
                col(participation::TOTAL_COST),
                col(participation::ACTIVE),
                col(participation::END_OF_PARTICIPATION),
            ]).collect()?;
            let (kept, rejected) =
                filter_by_parent(&selected, participation::PROJECT_ID, &project_ids, "participations")?;
            let (deduped, duplicates) = dedup_by_keys(
                &kept,
                &[participation::PROJECT_ID, participation::ORGANIZATION_ID],
            )?;
            report.participations = TableCounts {
                loaded: deduped.height(),
                skipped: duplicates,
                rejected_links: rejected,
            };
            deduped
        };

        let (topics, project_topics) = {
            let (links, counts) =
                clean::clean_topics(extracts.topics.as_ref().unwrap_or(&empty))?;
            let dim = vocabulary_dimension(
                &links,
                project_topic::TOPIC_CODE,
                topic::CODE,
                &[topic::TITLE],
            )?;
            let (join, rejected, duplicates) = vocabulary_join(
                &links,
                project_topic::TOPIC_CODE,
                &project_ids,
                "project_topics",
            )?;
            report.topics = TableCounts {
                loaded: dim.height(),
                skipped: counts.skipped,
                rejected_links: 0,
            };
            report.project_topics = TableCounts {
                loaded: join.height(),
                skipped: duplicates,
                rejected_links: rejected,
            };
            (dim, join)
        };

        let (legal_basis_dim, project_legal_basis_join) = {
            let (links, counts) =
                clean::clean_legal_basis(extracts.legal_basis.as_ref().unwrap_or(&empty))?;
            let dim = vocabulary_dimension(
                &links,
                project_legal_basis::LEGAL_BASIS_CODE,
                legal_basis::CODE,
                &[legal_basis::TITLE, legal_basis::UNIQUE_PROGRAMME_PART],
            )?;
            let (join, rejected, duplicates) = vocabulary_join(
                &links,
                project_legal_basis::LEGAL_BASIS_CODE,
                &project_ids,
                "project_legal_basis",
            )?;
            report.legal_basis = TableCounts {
                loaded: dim.height(),
                skipped: counts.skipped,
                rejected_links: 0,
            };
            report.project_legal_basis = TableCounts {
                loaded: join.height(),
                skipped: duplicates,
                rejected_links: rejected,
            };
            (dim, join)
        };

        let (sci_voc_dim, project_sci_voc_join) = {
            let (links, counts) =
                clean::clean_sci_voc(extracts.sci_voc.as_ref().unwrap_or(&empty))?;
            let dim = vocabulary_dimension(
                &links,
                project_sci_voc::SCI_VOC_CODE,
                sci_voc::CODE,
                &[sci_voc::PATH, sci_voc::TITLE, sci_voc::DESCRIPTION],
            )?;
            let (join, rejected, duplicates) = vocabulary_join(
                &links,
                project_sci_voc::SCI_VOC_CODE,
                &project_ids,
                "project_sci_voc",
            )?;
            report.sci_voc = TableCounts {
                loaded: dim.height(),
                skipped: counts.skipped,
                rejected_links: 0,
            };
            report.project_sci_voc = TableCounts {
                loaded: join.height(),
                skipped: duplicates,
                rejected_links: rejected,
            };
            (dim, join)
        };

        // Stage 3: child records
        let deliverables = {
            let (rows, counts) =
                clean::clean_deliverables(extracts.deliverables.as_ref().unwrap_or(&empty))?;
            let (kept, rejected) =
                filter_by_parent(&rows, participation::PROJECT_ID, &project_ids, "deliverables")?;
            report.deliverables = TableCounts {
                loaded: kept.height(),
                skipped: counts.skipped,
                rejected_links: rejected,
            };
            kept
        };
        let publications = {
            let (rows, counts) =
                clean::clean_publications(extracts.publications.as_ref().unwrap_or(&empty))?;
            let (kept, rejected) =
                filter_by_parent(&rows, participation::PROJECT_ID, &project_ids, "publications")?;
            report.publications = TableCounts {
                loaded: kept.height(),
                skipped: counts.skipped,
                rejected_links: rejected,
            };
            kept
        };

        Ok((
            Self {
                projects,
                organizations,
                participations,
                topics,
                legal_basis: legal_basis_dim,
                sci_voc: sci_voc_dim,
                project_topics,
                project_legal_basis: project_legal_basis_join,
                project_sci_voc: project_sci_voc_join,
                deliverables,
                publications,
            },
            report,
        ))
    }

    /// Write every normalized table as parquet under the processed
    /// directory, one file per table.
    pub fn write_processed(&self, cfg: &DataConfig) -> Result<()> {
        let dir = cfg.processed_dir();
        std::fs::create_dir_all(&dir)?;
        let tables: [(&str, &DataFrame); 11] = [
            ("projects", &self.projects),
            ("organizations", &self.organizations),
            ("project_organizations", &self.participations),
            ("topics", &self.topics),
            ("legal_basis", &self.legal_basis),
            ("sci_voc", &self.sci_voc),
            ("project_topics", &self.project_topics),
            ("project_legal_basis", &self.project_legal_basis),
            ("project_sci_voc", &self.project_sci_voc),
            ("deliverables", &self.deliverables),
            ("publications", &self.publications),
        ];
        for (name, df) in tables {
            let file = std::fs::File::create(dir.join(format!("{name}.parquet")))?;
            ParquetWriter::new(file).finish(&mut df.clone())?;
        }
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn id_set(df: &DataFrame, column: &str) -> Result<HashSet<String>> {
    let ids = df.column(column)?.str()?;
    Ok(ids
        .into_iter()
        .flatten()
        .map(|s| s.to_string())
        .collect())
}

/// Keep only rows whose `key` value names an existing parent; rejected rows
/// are counted and logged, never fatal.
fn filter_by_parent(
    df: &DataFrame,
    key: &str,
    parents: &HashSet<String>,
    table: &str,
) -> Result<(DataFrame, usize)> {
    if df.height() == 0 {
        return Ok((df.clone(), 0));
    }
    let keys = df.column(key)?.str()?;
    let mask: BooleanChunked = keys
        .into_iter()
        .map(|v| v.is_some_and(|id| parents.contains(id)))
        .collect();
    let kept = df.filter(&mask)?;
    let rejected = df.height() - kept.height();
    if rejected > 0 {
        warn!(table, rejected, "link rows referencing missing parents");
    }
    Ok((kept, rejected))
}

/// Drop duplicate composite keys, first occurrence wins.
fn dedup_by_keys(df: &DataFrame, keys: &[&str]) -> Result<(DataFrame, usize)> {
    if df.height() == 0 {
        return Ok((df.clone(), 0));
    }
    let key_cols: Vec<&StringChunked> = keys
        .iter()
        .map(|k| df.column(k).and_then(|c| Ok(c.str()?)))
        .collect::<std::result::Result<_, _>>()?;
    let mut seen = HashSet::new();
    let mask: BooleanChunked = (0..df.height())
        .map(|i| {
            let composite: Vec<&str> = key_cols.iter().map(|c| c.get(i).unwrap_or("")).collect();
            seen.insert(composite.join("\u{1f}"))
        })
        .collect();
    let kept = df.filter(&mask)?;
    let duplicates = df.height() - kept.height();
    Ok((kept, duplicates))
}

/// Organization dimension from the participation-level frame: one row per
/// organization id, renamed to the dimension's primary key.
fn organization_dimension(participation_rows: &DataFrame) -> Result<DataFrame> {
    let selected = participation_rows.clone().lazy().select([
        col(participation::ORGANIZATION_ID).alias(organization::ID),
        col(organization::NAME),
        col(organization::SHORT_NAME),
        col(organization::VAT_NUMBER),
        col(organization::SME),
        col(organization::ACTIVITY_TYPE),
        col(organization::STREET),
        col(organization::POST_CODE),
        col(organization::CITY),
        col(organization::COUNTRY),
        col(organization::NUTS_CODE),
        col(organization::GEOLOCATION),
        col(organization::ORGANIZATION_URL),
    ]).collect()?;
    let (deduped, _) = dedup_by_keys(&selected, &[organization::ID])?;
    Ok(deduped)
}

/// Vocabulary dimension from a link-level frame: one row per code.
fn vocabulary_dimension(
    links: &DataFrame,
    code_col: &str,
    dim_key: &str,
    extra_cols: &[&str],
) -> Result<DataFrame> {
    let mut selection = vec![col(code_col).alias(dim_key)];
    selection.extend(extra_cols.iter().map(|c| col(*c)));
    let selected = links.clone().lazy().select(selection).collect()?;
    let (deduped, _) = dedup_by_keys(&selected, &[dim_key])?;
    Ok(deduped)
}

/// Vocabulary join table: (project_id, code), FK-checked and deduped.
fn vocabulary_join(
    links: &DataFrame,
    code_col: &str,
    project_ids: &HashSet<String>,
    table: &str,
) -> Result<(DataFrame, usize, usize)> {
    let selected = links.clone().lazy().select([
        col(participation::PROJECT_ID),
        col(code_col),
    ]).collect()?;
    let (kept, rejected) = filter_by_parent(&selected, participation::PROJECT_ID, project_ids, table)?;
    let (deduped, duplicates) = dedup_by_keys(&kept, &[participation::PROJECT_ID, code_col])?;
    Ok((deduped, rejected, duplicates))
}
