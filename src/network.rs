//! Collaboration-network builder.
//!
//! Pure function from (snapshot, filters, layout options) to a renderable
//! graph: organizations are nodes, an edge links every pair of organizations
//! that co-participate in a surviving project, and repeated co-participation
//! accumulates as edge weight instead of duplicate edges.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Datelike};
use petgraph::graph::{Graph, NodeIndex};
use petgraph::Undirected;
use serde::Serialize;

use crate::clean::StrCol;
use crate::error::{HorizonError, Result};
use crate::layout::{spring_layout, LayoutOptions};
use crate::schema::{classification, organization, participation, project};
use crate::snapshot::Snapshot;

/// Scientific-field filter, matched against a project's vocabulary tags.
/// A project passes if any of its tags matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldFilter {
    /// Exact match on the second path level (the `field` column).
    Field(String),
    /// Exact match on the tag title.
    Title(String),
    /// Prefix match on the full vocabulary path.
    PathPrefix(String),
}

impl FieldFilter {
    /// Label used in the figure title.
    pub fn label(&self) -> &str {
        match self {
            Self::Field(v) | Self::Title(v) | Self::PathPrefix(v) => v,
        }
    }
}

/// Conjunctive filter set for the builder. All fields are optional except
/// `min_participants`, which defaults to 2, the smallest collaboration.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkFilter {
    pub field: Option<FieldFilter>,
    /// Restrict to organizations of these activity types.
    pub activity_types: Option<Vec<String>>,
    /// Restrict to organizations in these ISO-2 country codes.
    pub countries: Option<Vec<String>>,
    /// Exclude projects with fewer filtered participants than this.
    pub min_participants: usize,
    /// Keep at most this many surviving projects, in ascending project-id
    /// order (lexicographic on the id string).
    pub max_projects: Option<usize>,
    /// Keep projects starting in this calendar year.
    pub start_year: Option<i32>,
    /// Keep projects with one of these funding schemes.
    pub funding_schemes: Option<Vec<String>>,
    /// Keep projects with at least this EC contribution.
    pub min_contribution: Option<f64>,
}

impl Default for NetworkFilter {
    fn default() -> Self {
        Self {
            field: None,
            activity_types: None,
            countries: None,
            min_participants: 2,
            max_projects: None,
            start_year: None,
            funding_schemes: None,
            min_contribution: None,
        }
    }
}

/// A positioned organization node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkNode {
    pub organization_id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
}

/// A weighted co-participation edge between two organizations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkEdge {
    pub source: String,
    pub target: String,
    /// Number of surviving projects the two organizations share.
    pub weight: u32,
}

/// Renderable collaboration graph. `edge_path_x`/`edge_path_y` concatenate
/// every edge's endpoints into one drawable polyline, with a null sentinel
/// separating consecutive edges.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkLayout {
    pub nodes: Vec<NetworkNode>,
    pub edges: Vec<NetworkEdge>,
    pub edge_path_x: Vec<Option<f64>>,
    pub edge_path_y: Vec<Option<f64>>,
    pub title: String,
}

impl NetworkLayout {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn empty(title: String) -> Self {
        Self {
            nodes: Vec::new(),
            edges: Vec::new(),
            edge_path_x: Vec::new(),
            edge_path_y: Vec::new(),
            title,
        }
    }
}

struct OrgNode {
    id: String,
    name: String,
}

/// Build the collaboration graph for the filtered project subset.
///
/// An empty filtered set yields an empty graph; only a `min_participants`
/// below 2 is a caller error.
pub fn build_collaboration_network(
    snapshot: &Snapshot,
    filter: &NetworkFilter,
    layout_opts: &LayoutOptions,
) -> Result<NetworkLayout> {
    if filter.min_participants < 2 {
        return Err(HorizonError::InvalidFilter(format!(
            "min_participants is {}, but a collaboration needs at least 2 organizations",
            filter.min_participants
        )));
    }

    let title = match &filter.field {
        Some(field) => format!("Collaboration Network for \"{}\"", field.label()),
        None => "Organization Collaboration Network".to_string(),
    };

    let candidates = candidate_projects(snapshot, filter)?;
    if candidates.is_empty() {
        return Ok(NetworkLayout::empty(title));
    }

    let (allowed_orgs, org_names) = allowed_organizations(snapshot, filter)?;

    // distinct filtered participants per candidate project; BTree keeps the
    // ascending-id order the max-projects cap is defined over
    let mut participants: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    {
        let parts = snapshot.participations();
        let project_ids = StrCol::new(parts, participation::PROJECT_ID);
        let org_ids = StrCol::new(parts, participation::ORGANIZATION_ID);
        for i in 0..parts.height() {
            let (Some(project_id), Some(org_id)) = (project_ids.get(i), org_ids.get(i)) else {
                continue;
            };
            if !candidates.contains(project_id) || !allowed_orgs.contains(org_id) {
                continue;
            }
            participants
                .entry(project_id.to_string())
                .or_default()
                .insert(org_id.to_string());
        }
    }

    // clique edges per surviving project, keyed on the unordered pair
    let mut edge_weights: BTreeMap<(String, String), u32> = BTreeMap::new();
    let mut taken = 0usize;
    for (_, orgs) in participants.iter() {
        if orgs.len() < filter.min_participants {
            continue;
        }
        if let Some(cap) = filter.max_projects {
            if taken >= cap {
                break;
            }
        }
        taken += 1;
        let orgs: Vec<&String> = orgs.iter().collect();
        for (i, a) in orgs.iter().enumerate() {
            for b in orgs.iter().skip(i + 1) {
                // BTreeSet iteration is ascending, so (a, b) is ordered
                *edge_weights
                    .entry(((*a).clone(), (*b).clone()))
                    .or_insert(0) += 1;
            }
        }
    }

    if edge_weights.is_empty() {
        return Ok(NetworkLayout::empty(title));
    }

    // assemble the petgraph; nodes appear in first-edge order
    let mut graph: Graph<OrgNode, u32, Undirected> = Graph::new_undirected();
    let mut node_map: HashMap<String, NodeIndex> = HashMap::new();
    let get_or_insert = |map: &mut HashMap<String, NodeIndex>,
                             g: &mut Graph<OrgNode, u32, Undirected>,
                             id: &str|
     -> NodeIndex {
        *map.entry(id.to_string()).or_insert_with(|| {
            g.add_node(OrgNode {
                id: id.to_string(),
                name: org_names.get(id).cloned().unwrap_or_else(|| id.to_string()),
            })
        })
    };
    for ((a, b), weight) in edge_weights.iter() {
        let a_idx = get_or_insert(&mut node_map, &mut graph, a);
        let b_idx = get_or_insert(&mut node_map, &mut graph, b);
        graph.add_edge(a_idx, b_idx, *weight);
    }

    let positions = spring_layout(&graph, layout_opts);

    let nodes: Vec<NetworkNode> = graph
        .node_indices()
        .map(|idx| {
            let org = &graph[idx];
            let [x, y] = positions[idx.index()];
            NetworkNode {
                organization_id: org.id.clone(),
                name: org.name.clone(),
                x,
                y,
            }
        })
        .collect();

    let mut edges = Vec::with_capacity(edge_weights.len());
    let mut edge_path_x = Vec::with_capacity(edge_weights.len() * 3);
    let mut edge_path_y = Vec::with_capacity(edge_weights.len() * 3);
    for ((a, b), weight) in edge_weights.iter() {
        let [ax, ay] = positions[node_map[a].index()];
        let [bx, by] = positions[node_map[b].index()];
        edges.push(NetworkEdge {
            source: a.clone(),
            target: b.clone(),
            weight: *weight,
        });
        edge_path_x.extend([Some(ax), Some(bx), None]);
        edge_path_y.extend([Some(ay), Some(by), None]);
    }

    Ok(NetworkLayout {
        nodes,
        edges,
        edge_path_x,
        edge_path_y,
        title,
    })
}

/// Project ids passing the project-level filters (scheme, year,
/// contribution, field).
fn candidate_projects(snapshot: &Snapshot, filter: &NetworkFilter) -> Result<HashSet<String>> {
    let field_matches = filter
        .field
        .as_ref()
        .map(|f| projects_matching_field(snapshot, f))
        .transpose()?;

    let projects = snapshot.projects();
    let ids = StrCol::new(projects, project::ID);
    let schemes = StrCol::new(projects, project::FUNDING_SCHEME);
    let starts = projects
        .column(project::START_DATE)?
        .as_materialized_series()
        .datetime()?;
    let contributions = projects.column(project::EC_MAX_CONTRIBUTION)?.f64()?;

    let mut candidates = HashSet::new();
    for i in 0..projects.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        if let Some(allowed) = &filter.funding_schemes {
            match schemes.get(i) {
                Some(scheme) if allowed.iter().any(|s| s == scheme) => {}
                _ => continue,
            }
        }
        if let Some(year) = filter.start_year {
            match starts.phys.get(i).and_then(start_year) {
                Some(y) if y == year => {}
                _ => continue,
            }
        }
        if let Some(min) = filter.min_contribution {
            match contributions.get(i) {
                Some(ec) if ec >= min => {}
                _ => continue,
            }
        }
        if let Some(matches) = &field_matches {
            if !matches.contains(id) {
                continue;
            }
        }
        candidates.insert(id.to_string());
    }
    Ok(candidates)
}

fn start_year(timestamp_us: i64) -> Option<i32> {
    DateTime::from_timestamp_micros(timestamp_us).map(|dt| dt.year())
}

/// Project ids with at least one vocabulary tag matching the field filter.
fn projects_matching_field(snapshot: &Snapshot, field: &FieldFilter) -> Result<HashSet<String>> {
    let relation = snapshot.classification();
    let project_ids = StrCol::new(relation, classification::PROJECT_ID);
    let fields = StrCol::new(relation, classification::FIELD);
    let titles = StrCol::new(relation, classification::TITLE);
    let paths = StrCol::new(relation, classification::PATH);

    let mut matches = HashSet::new();
    for i in 0..relation.height() {
        let Some(project_id) = project_ids.get(i) else {
            continue;
        };
        let hit = match field {
            FieldFilter::Field(v) => fields.get(i) == Some(v.as_str()),
            FieldFilter::Title(v) => titles.get(i) == Some(v.as_str()),
            FieldFilter::PathPrefix(v) => {
                paths.get(i).is_some_and(|p| p.starts_with(v.as_str()))
            }
        };
        if hit {
            matches.insert(project_id.to_string());
        }
    }
    Ok(matches)
}

/// Organization ids passing the country / activity-type filters, plus the
/// display-name lookup.
fn allowed_organizations(
    snapshot: &Snapshot,
    filter: &NetworkFilter,
) -> Result<(HashSet<String>, HashMap<String, String>)> {
    let orgs = snapshot.organizations();
    let ids = StrCol::new(orgs, organization::ID);
    let names = StrCol::new(orgs, organization::NAME);
    let countries = StrCol::new(orgs, organization::COUNTRY);
    let activity_types = StrCol::new(orgs, organization::ACTIVITY_TYPE);

    let mut allowed = HashSet::new();
    let mut name_index = HashMap::new();
    for i in 0..orgs.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        if let Some(name) = names.get(i) {
            name_index.insert(id.to_string(), name.to_string());
        }
        if let Some(wanted) = &filter.countries {
            match countries.get(i) {
                Some(country) if wanted.iter().any(|c| c == country) => {}
                _ => continue,
            }
        }
        if let Some(wanted) = &filter.activity_types {
            match activity_types.get(i) {
                Some(activity) if wanted.iter().any(|a| a == activity) => {}
                _ => continue,
            }
        }
        allowed.insert(id.to_string());
    }
    Ok((allowed, name_index))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Extracts, HorizonStore};
    use polars::prelude::*;

    /// Three projects: "1" is an A–B–C clique, "2" links A–B again,
    /// "3" links B–D. Project 1 is astronomy, 2 and 3 are energy.
    fn fixture_snapshot() -> Snapshot {
        let project = df![
            "id" => ["1", "2", "3"],
            "acronym" => ["ALPHA", "BETA", "GAMMA"],
            "start_date" => ["2020-01-01", "2021-06-01", "2021-09-01"],
            "end_date" => ["2022-01-01", "2023-06-01", "2023-09-01"],
            "ec_max_contribution" => ["1000000", "500000", "250000"],
            "total_cost" => ["1200000", "600000", "250000"],
            "funding_scheme" => ["RIA", "CSA", "RIA"],
        ]
        .unwrap();
        let organization = df![
            "organization_id" => ["A", "B", "C", "A", "B", "B", "D"],
            "project_id" => ["1", "1", "1", "2", "2", "3", "3"],
            "name" => [
                "Alpha University", "Beta Institute", "Gamma Labs",
                "Alpha University", "Beta Institute", "Beta Institute", "Delta Agency",
            ],
            "country" => ["DE", "FR", "IT", "DE", "FR", "FR", "ES"],
            "activity_type" => ["HES", "REC", "PRC", "HES", "REC", "REC", "PUB"],
            "role" => [
                "coordinator", "participant", "participant",
                "coordinator", "participant", "coordinator", "participant",
            ],
            "ec_contribution" => ["1", "1", "1", "1", "1", "1", "1"],
        ]
        .unwrap();
        let sci_voc = df![
            "project_id" => ["1", "2", "3"],
            "sci_voc_code" => ["/23", "/31", "/31"],
            "path" => [
                "/natural sciences/physical sciences/astronomy",
                "/engineering and technology/energy",
                "/engineering and technology/energy",
            ],
            "title" => ["astronomy", "energy", "energy"],
        ]
        .unwrap();
        let (store, _) = HorizonStore::from_extracts(Extracts {
            project,
            organization,
            sci_voc: Some(sci_voc),
            ..Default::default()
        })
        .unwrap();
        Snapshot::build(store).unwrap()
    }

    fn build(filter: &NetworkFilter) -> NetworkLayout {
        build_collaboration_network(&fixture_snapshot(), filter, &LayoutOptions::default()).unwrap()
    }

    fn edge_set(layout: &NetworkLayout) -> Vec<(String, String, u32)> {
        layout
            .edges
            .iter()
            .map(|e| (e.source.clone(), e.target.clone(), e.weight))
            .collect()
    }

    #[test]
    fn clique_of_three_has_three_nodes_and_edges() {
        let layout = build(&NetworkFilter {
            field: Some(FieldFilter::Title("astronomy".into())),
            ..Default::default()
        });
        assert_eq!(layout.nodes.len(), 3);
        assert_eq!(layout.edges.len(), 3);
        assert_eq!(
            edge_set(&layout),
            vec![
                ("A".into(), "B".into(), 1),
                ("A".into(), "C".into(), 1),
                ("B".into(), "C".into(), 1),
            ]
        );
    }

    #[test]
    fn min_participants_above_clique_size_empties_the_graph() {
        let layout = build(&NetworkFilter {
            field: Some(FieldFilter::Title("astronomy".into())),
            min_participants: 4,
            ..Default::default()
        });
        assert!(layout.is_empty());
        assert_eq!(layout.edges.len(), 0);
    }

    #[test]
    fn repeated_co_participation_accumulates_weight() {
        let layout = build(&NetworkFilter::default());
        // A–B appears in projects 1 and 2
        let ab = layout
            .edges
            .iter()
            .find(|e| e.source == "A" && e.target == "B")
            .unwrap();
        assert_eq!(ab.weight, 2);
        // no duplicate edges for the pair
        let ab_count = layout
            .edges
            .iter()
            .filter(|e| e.source == "A" && e.target == "B")
            .count();
        assert_eq!(ab_count, 1);
    }

    #[test]
    fn two_participant_project_yields_exactly_one_edge() {
        let layout = build(&NetworkFilter {
            start_year: Some(2021),
            funding_schemes: Some(vec!["RIA".into()]),
            ..Default::default()
        });
        // only project 3 (B–D) survives
        assert_eq!(edge_set(&layout), vec![("B".into(), "D".into(), 1)]);
        assert_eq!(layout.nodes.len(), 2);
    }

    #[test]
    fn max_projects_caps_in_ascending_id_order() {
        let layout = build(&NetworkFilter {
            max_projects: Some(1),
            ..Default::default()
        });
        // project "1" is the lowest id: the A–B–C clique only
        assert_eq!(layout.edges.len(), 3);
        assert!(layout.nodes.iter().all(|n| n.organization_id != "D"));
    }

    #[test]
    fn min_participants_of_three_excludes_pair_projects() {
        let layout = build(&NetworkFilter {
            min_participants: 3,
            ..Default::default()
        });
        // projects 2 and 3 have exactly two participants each
        assert_eq!(layout.nodes.len(), 3);
        assert_eq!(
            edge_set(&layout),
            vec![
                ("A".into(), "B".into(), 1),
                ("A".into(), "C".into(), 1),
                ("B".into(), "C".into(), 1),
            ]
        );
    }

    #[test]
    fn no_orphan_nodes() {
        let layout = build(&NetworkFilter::default());
        for node in &layout.nodes {
            let in_an_edge = layout
                .edges
                .iter()
                .any(|e| e.source == node.organization_id || e.target == node.organization_id);
            assert!(in_an_edge, "orphan node {}", node.organization_id);
        }
    }

    #[test]
    fn country_filter_can_drop_a_project_below_minimum() {
        let layout = build(&NetworkFilter {
            countries: Some(vec!["FR".into(), "ES".into()]),
            ..Default::default()
        });
        // project 1 keeps only B, project 2 only B; project 3 keeps B and D
        assert_eq!(edge_set(&layout), vec![("B".into(), "D".into(), 1)]);
    }

    #[test]
    fn activity_type_filter_restricts_organizations() {
        let layout = build(&NetworkFilter {
            activity_types: Some(vec!["HES".into(), "REC".into(), "PRC".into()]),
            ..Default::default()
        });
        // D (PUB) disappears; project 3 falls below two participants
        assert!(layout.nodes.iter().all(|n| n.organization_id != "D"));
    }

    #[test]
    fn min_contribution_filters_projects() {
        let layout = build(&NetworkFilter {
            min_contribution: Some(600000.0),
            ..Default::default()
        });
        // only project 1 (1,000,000) passes
        assert_eq!(layout.edges.len(), 3);
        assert!(layout.nodes.iter().all(|n| n.organization_id != "D"));
    }

    #[test]
    fn field_filters_match_field_title_and_prefix() {
        let by_field = build(&NetworkFilter {
            field: Some(FieldFilter::Field("energy".into())),
            ..Default::default()
        });
        assert_eq!(edge_set(&by_field), vec![
            ("A".into(), "B".into(), 1),
            ("B".into(), "D".into(), 1),
        ]);

        let by_prefix = build(&NetworkFilter {
            field: Some(FieldFilter::PathPrefix("/natural sciences".into())),
            ..Default::default()
        });
        assert_eq!(by_prefix.nodes.len(), 3);
    }

    #[test]
    fn empty_filtered_set_is_a_valid_empty_graph() {
        let layout = build(&NetworkFilter {
            field: Some(FieldFilter::Title("no such field".into())),
            ..Default::default()
        });
        assert!(layout.is_empty());
        assert_eq!(layout.edges.len(), 0);
        assert_eq!(layout.edge_path_x.len(), 0);
    }

    #[test]
    fn min_participants_below_two_is_a_configuration_error() {
        let err = build_collaboration_network(
            &fixture_snapshot(),
            &NetworkFilter {
                min_participants: 1,
                ..Default::default()
            },
            &LayoutOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HorizonError::InvalidFilter(_)));
    }

    #[test]
    fn identical_calls_are_idempotent() {
        let filter = NetworkFilter::default();
        let first = build(&filter);
        let second = build(&filter);
        assert_eq!(first, second);
    }

    #[test]
    fn edge_path_uses_null_sentinels() {
        let layout = build(&NetworkFilter::default());
        assert_eq!(layout.edge_path_x.len(), layout.edges.len() * 3);
        for chunk in layout.edge_path_x.chunks(3) {
            assert!(chunk[0].is_some());
            assert!(chunk[1].is_some());
            assert!(chunk[2].is_none());
        }
    }

    #[test]
    fn titles_reflect_the_field_filter() {
        let filtered = build(&NetworkFilter {
            field: Some(FieldFilter::Title("astronomy".into())),
            ..Default::default()
        });
        assert_eq!(filtered.title, "Collaboration Network for \"astronomy\"");

        let unfiltered = build(&NetworkFilter::default());
        assert_eq!(unfiltered.title, "Organization Collaboration Network");
    }
}
