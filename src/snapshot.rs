//! Immutable dataset snapshot and the copy-on-reload cell the serving
//! layer reads through.
//!
//! A `Snapshot` is built once from a loaded store and never mutated; a
//! refresh builds the next snapshot completely before swapping it in, so
//! requests already running keep the `Arc` they started with.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use polars::prelude::*;

use crate::clean::StrCol;
use crate::config::DataConfig;
use crate::enrich;
use crate::error::Result;
use crate::schema::{classification, deliverable, organization, participation, project};
use crate::store::{HorizonStore, LoadReport};

/// Point-in-time read-only view of the dataset.
#[derive(Debug, Clone)]
pub struct Snapshot {
    projects: DataFrame,
    organizations: DataFrame,
    participations: DataFrame,
    classification: DataFrame,
    topics: DataFrame,
    legal_basis: DataFrame,
    sci_voc: DataFrame,
    deliverables: DataFrame,
    publications: DataFrame,
    scientific_fields: Vec<String>,
}

impl Snapshot {
    /// Run the enrichment pass over a loaded store.
    pub fn build(store: HorizonStore) -> Result<Self> {
        let projects = enrich::enrich_projects(&store)?;
        let classification = enrich::classification_relation(&store)?;
        let scientific_fields = enrich::scientific_fields(&store.sci_voc)?;
        Ok(Self {
            projects,
            organizations: store.organizations,
            participations: store.participations,
            classification,
            topics: store.topics,
            legal_basis: store.legal_basis,
            sci_voc: store.sci_voc,
            deliverables: store.deliverables,
            publications: store.publications,
            scientific_fields,
        })
    }

    /// Load extracts and build in one step.
    pub fn load(cfg: &DataConfig) -> Result<(Self, LoadReport)> {
        let (store, report) = HorizonStore::load(cfg)?;
        Ok((Self::build(store)?, report))
    }

    // ── Read-only accessors ─────────────────────────────────────────────

    /// Enriched project view, ascending by project id.
    pub fn projects(&self) -> &DataFrame {
        &self.projects
    }

    pub fn organizations(&self) -> &DataFrame {
        &self.organizations
    }

    pub fn participations(&self) -> &DataFrame {
        &self.participations
    }

    /// Classification relation: one row per project vocabulary tag.
    pub fn classification(&self) -> &DataFrame {
        &self.classification
    }

    pub fn topics(&self) -> &DataFrame {
        &self.topics
    }

    pub fn legal_basis(&self) -> &DataFrame {
        &self.legal_basis
    }

    pub fn sci_voc(&self) -> &DataFrame {
        &self.sci_voc
    }

    pub fn deliverables(&self) -> &DataFrame {
        &self.deliverables
    }

    pub fn publications(&self) -> &DataFrame {
        &self.publications
    }

    /// Sorted distinct top-level scientific fields.
    pub fn scientific_fields(&self) -> &[String] {
        &self.scientific_fields
    }

    /// Acronyms of projects with a participating organization whose name
    /// contains `keyword` (case-insensitive), in project-id order.
    pub fn projects_by_institution(&self, keyword: &str) -> Result<Vec<String>> {
        let needle = keyword.to_lowercase();

        let org_ids = StrCol::new(&self.organizations, organization::ID);
        let org_names = StrCol::new(&self.organizations, organization::NAME);
        let mut matched_orgs = HashSet::new();
        for i in 0..self.organizations.height() {
            if let (Some(id), Some(name)) = (org_ids.get(i), org_names.get(i)) {
                if name.to_lowercase().contains(&needle) {
                    matched_orgs.insert(id);
                }
            }
        }

        let part_projects = StrCol::new(&self.participations, participation::PROJECT_ID);
        let part_orgs = StrCol::new(&self.participations, participation::ORGANIZATION_ID);
        let mut matched_projects = HashSet::new();
        for i in 0..self.participations.height() {
            if let (Some(project_id), Some(org_id)) = (part_projects.get(i), part_orgs.get(i)) {
                if matched_orgs.contains(org_id) {
                    matched_projects.insert(project_id);
                }
            }
        }

        Ok(self.acronyms_for(&matched_projects))
    }

    /// Project acronyms grouped by top-level field class.
    pub fn projects_by_field(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let acronym_by_id = self.acronym_index();
        let class_projects = StrCol::new(&self.classification, classification::PROJECT_ID);
        let class_fields = StrCol::new(&self.classification, classification::FIELD_CLASS);

        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        for i in 0..self.classification.height() {
            let (Some(project_id), Some(field_class)) = (class_projects.get(i), class_fields.get(i))
            else {
                continue;
            };
            let Some(acronym) = acronym_by_id.get(project_id) else {
                continue;
            };
            if seen.insert((field_class.to_string(), project_id.to_string())) {
                grouped
                    .entry(field_class.to_string())
                    .or_default()
                    .push(acronym.clone());
            }
        }
        Ok(grouped)
    }

    /// Deliverables owned by one project.
    pub fn deliverables_for(&self, project_id: &str) -> Result<DataFrame> {
        filter_by_project(&self.deliverables, project_id)
    }

    /// Publications owned by one project.
    pub fn publications_for(&self, project_id: &str) -> Result<DataFrame> {
        filter_by_project(&self.publications, project_id)
    }

    fn acronym_index(&self) -> HashMap<String, String> {
        let ids = StrCol::new(&self.projects, project::ID);
        let acronyms = StrCol::new(&self.projects, project::ACRONYM);
        let mut index = HashMap::new();
        for i in 0..self.projects.height() {
            if let (Some(id), Some(acronym)) = (ids.get(i), acronyms.get(i)) {
                index.insert(id.to_string(), acronym.to_string());
            }
        }
        index
    }

    fn acronyms_for(&self, project_ids: &HashSet<&str>) -> Vec<String> {
        let ids = StrCol::new(&self.projects, project::ID);
        let acronyms = StrCol::new(&self.projects, project::ACRONYM);
        let mut out = Vec::new();
        for i in 0..self.projects.height() {
            if let (Some(id), Some(acronym)) = (ids.get(i), acronyms.get(i)) {
                if project_ids.contains(id) {
                    out.push(acronym.to_string());
                }
            }
        }
        out
    }
}

fn filter_by_project(df: &DataFrame, project_id: &str) -> Result<DataFrame> {
    if df.height() == 0 {
        return Ok(df.clone());
    }
    let owners = df.column(deliverable::PROJECT_ID)?.str()?;
    let mask: BooleanChunked = owners
        .into_iter()
        .map(|v| v == Some(project_id))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Shared cell holding the snapshot currently served. Reload is
/// copy-on-reload: the replacement is built fully before the swap.
pub struct SnapshotCell {
    inner: RwLock<Arc<Snapshot>>,
}

impl SnapshotCell {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            inner: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot to serve this request from. Callers keep the `Arc` for
    /// the whole request, so a concurrent reload never changes their view.
    pub fn current(&self) -> Arc<Snapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap in an already-built snapshot.
    pub fn install(&self, snapshot: Snapshot) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }

    /// Rebuild from refreshed extracts and swap atomically on success; on
    /// failure the previous snapshot keeps serving.
    pub fn reload(&self, cfg: &DataConfig) -> Result<LoadReport> {
        let (snapshot, report) = Snapshot::load(cfg)?;
        self.install(snapshot);
        Ok(report)
    }
}
