//! Chart aggregations over a snapshot, emitted as serializable figure
//! specs for whatever presentation layer sits on top.
//!
//! Every function treats an empty result as a valid, renderable figure
//! with no data, never as an error.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Datelike};
use serde::Serialize;

use crate::clean::StrCol;
use crate::error::Result;
use crate::schema::{classification, organization, participation, project};
use crate::snapshot::Snapshot;

// ── Figure specs ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FigureSpec {
    Bar(BarChart),
    Histogram(HistogramChart),
    Line(LineChart),
    Choropleth(ChoroplethMap),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BarChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub categories: Vec<String>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramChart {
    pub title: String,
    pub x_label: String,
    /// `counts.len() + 1` edges; empty when there is no data.
    pub bin_edges: Vec<f64>,
    pub counts: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSeries {
    pub name: String,
    pub years: Vec<i32>,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub series: Vec<LineSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoroplethMap {
    pub title: String,
    pub value_label: String,
    /// ISO-3 country codes.
    pub locations: Vec<String>,
    pub values: Vec<f64>,
}

// ── Aggregations ────────────────────────────────────────────────────────────

/// Total EC contribution per organization country, descending.
pub fn ec_contribution_by_country(snapshot: &Snapshot) -> Result<FigureSpec> {
    let sums = contribution_by_country(snapshot)?;
    let (categories, values) = sorted_descending(sums);
    Ok(FigureSpec::Bar(BarChart {
        title: "Total EC Contribution by Country".into(),
        x_label: "Country".into(),
        y_label: "EC Contribution (EUR)".into(),
        categories,
        values,
    }))
}

/// Number of distinct projects with a participant per country, descending.
pub fn projects_per_country(snapshot: &Snapshot) -> Result<FigureSpec> {
    let country_by_org = organization_attribute(snapshot, organization::COUNTRY);

    let parts = snapshot.participations();
    let project_ids = StrCol::new(parts, participation::PROJECT_ID);
    let org_ids = StrCol::new(parts, participation::ORGANIZATION_ID);
    let mut projects: HashMap<String, HashSet<String>> = HashMap::new();
    for i in 0..parts.height() {
        let (Some(project_id), Some(org_id)) = (project_ids.get(i), org_ids.get(i)) else {
            continue;
        };
        if let Some(country) = country_by_org.get(org_id) {
            projects
                .entry(country.clone())
                .or_default()
                .insert(project_id.to_string());
        }
    }

    let counts: HashMap<String, f64> = projects
        .into_iter()
        .map(|(country, ids)| (country, ids.len() as f64))
        .collect();
    let (categories, values) = sorted_descending(counts);
    Ok(FigureSpec::Bar(BarChart {
        title: "Number of Projects per Country".into(),
        x_label: "Country".into(),
        y_label: "Projects".into(),
        categories,
        values,
    }))
}

/// The `top_n` organizations by summed EC contribution, descending.
pub fn top_institutions_by_funding(snapshot: &Snapshot, top_n: usize) -> Result<FigureSpec> {
    let name_by_org = organization_attribute(snapshot, organization::NAME);

    let parts = snapshot.participations();
    let org_ids = StrCol::new(parts, participation::ORGANIZATION_ID);
    let contributions = parts.column(participation::EC_CONTRIBUTION)?.f64()?;
    let mut sums: HashMap<String, f64> = HashMap::new();
    for i in 0..parts.height() {
        let Some(org_id) = org_ids.get(i) else {
            continue;
        };
        let Some(name) = name_by_org.get(org_id) else {
            continue;
        };
        *sums.entry(name.clone()).or_insert(0.0) += contributions.get(i).unwrap_or(0.0);
    }

    let (mut categories, mut values) = sorted_descending(sums);
    categories.truncate(top_n);
    values.truncate(top_n);
    Ok(FigureSpec::Bar(BarChart {
        title: format!("Top {top_n} Institutions by EC Contribution"),
        x_label: "Institution".into(),
        y_label: "EC Contribution (EUR)".into(),
        categories,
        values,
    }))
}

/// Histogram of per-project EC funding.
pub fn funding_distribution_per_project(snapshot: &Snapshot, bins: usize) -> Result<FigureSpec> {
    let contributions = snapshot
        .projects()
        .column(project::EC_MAX_CONTRIBUTION)?
        .f64()?;
    let values: Vec<f64> = contributions.into_iter().flatten().collect();

    let title = "Distribution of EC Funding per Project".to_string();
    let x_label = "EC Funding (EUR)".to_string();
    if values.is_empty() || bins == 0 {
        return Ok(FigureSpec::Histogram(HistogramChart {
            title,
            x_label,
            bin_edges: Vec::new(),
            counts: Vec::new(),
        }));
    }

    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if min == max {
        return Ok(FigureSpec::Histogram(HistogramChart {
            title,
            x_label,
            bin_edges: vec![min, max],
            counts: vec![values.len() as u32],
        }));
    }

    let width = (max - min) / bins as f64;
    let bin_edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
    let mut counts = vec![0u32; bins];
    for v in values {
        let index = (((v - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }
    Ok(FigureSpec::Histogram(HistogramChart {
        title,
        x_label,
        bin_edges,
        counts,
    }))
}

/// Yearly EC funding totals, one series per top-level field class. A
/// project with several field classes counts fully in each of them.
pub fn funding_over_time_by_field(snapshot: &Snapshot) -> Result<FigureSpec> {
    let projects = snapshot.projects();
    let ids = StrCol::new(projects, project::ID);
    let starts = projects
        .column(project::START_DATE)?
        .as_materialized_series()
        .datetime()?;
    let contributions = projects.column(project::EC_MAX_CONTRIBUTION)?.f64()?;

    let mut funding_by_project: HashMap<String, (i32, f64)> = HashMap::new();
    for i in 0..projects.height() {
        let Some(id) = ids.get(i) else {
            continue;
        };
        let Some(year) = starts
            .phys
            .get(i)
            .and_then(DateTime::from_timestamp_micros)
            .map(|dt| dt.year())
        else {
            continue; // projects without a start date have no year to plot
        };
        funding_by_project.insert(
            id.to_string(),
            (year, contributions.get(i).unwrap_or(0.0)),
        );
    }

    let relation = snapshot.classification();
    let rel_projects = StrCol::new(relation, classification::PROJECT_ID);
    let rel_classes = StrCol::new(relation, classification::FIELD_CLASS);
    let mut totals: BTreeMap<String, BTreeMap<i32, f64>> = BTreeMap::new();
    let mut seen: HashSet<(String, String)> = HashSet::new();
    for i in 0..relation.height() {
        let (Some(project_id), Some(field_class)) = (rel_projects.get(i), rel_classes.get(i))
        else {
            continue;
        };
        let Some(&(year, funding)) = funding_by_project.get(project_id) else {
            continue;
        };
        // a multi-tag project contributes once per field class
        if !seen.insert((project_id.to_string(), field_class.to_string())) {
            continue;
        }
        *totals
            .entry(field_class.to_string())
            .or_default()
            .entry(year)
            .or_insert(0.0) += funding;
    }

    let series = totals
        .into_iter()
        .map(|(name, by_year)| {
            let (years, values) = by_year.into_iter().unzip();
            LineSeries {
                name,
                years,
                values,
            }
        })
        .collect();
    Ok(FigureSpec::Line(LineChart {
        title: "Funding Over Time per Scientific Field".into(),
        x_label: "Year".into(),
        y_label: "Funding (EUR)".into(),
        series,
    }))
}

/// Country funding totals keyed by ISO-3 code for choropleth rendering.
/// Countries without a known ISO-3 mapping are dropped.
pub fn funding_per_country_choropleth(snapshot: &Snapshot) -> Result<FigureSpec> {
    let sums = contribution_by_country(snapshot)?;
    let mut mapped: Vec<(String, f64)> = sums
        .into_iter()
        .filter_map(|(iso2, total)| iso3(&iso2).map(|code| (code.to_string(), total)))
        .collect();
    mapped.sort_by(|a, b| a.0.cmp(&b.0));

    let (locations, values) = mapped.into_iter().unzip();
    Ok(FigureSpec::Choropleth(ChoroplethMap {
        title: "Total EU Funding by Country".into(),
        value_label: "Funding (EUR)".into(),
        locations,
        values,
    }))
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Summed participation EC contribution per organization country.
fn contribution_by_country(snapshot: &Snapshot) -> Result<HashMap<String, f64>> {
    let country_by_org = organization_attribute(snapshot, organization::COUNTRY);

    let parts = snapshot.participations();
    let org_ids = StrCol::new(parts, participation::ORGANIZATION_ID);
    let contributions = parts.column(participation::EC_CONTRIBUTION)?.f64()?;
    let mut sums: HashMap<String, f64> = HashMap::new();
    for i in 0..parts.height() {
        let Some(org_id) = org_ids.get(i) else {
            continue;
        };
        if let Some(country) = country_by_org.get(org_id) {
            *sums.entry(country.clone()).or_insert(0.0) += contributions.get(i).unwrap_or(0.0);
        }
    }
    Ok(sums)
}

/// Lookup of one organization column by organization id.
fn organization_attribute(snapshot: &Snapshot, column: &str) -> HashMap<String, String> {
    let orgs = snapshot.organizations();
    let ids = StrCol::new(orgs, organization::ID);
    let attributes = StrCol::new(orgs, column);
    let mut index = HashMap::new();
    for i in 0..orgs.height() {
        if let (Some(id), Some(value)) = (ids.get(i), attributes.get(i)) {
            index.insert(id.to_string(), value.to_string());
        }
    }
    index
}

/// Categories sorted by value descending, ties broken by name so output is
/// stable across runs.
fn sorted_descending(sums: HashMap<String, f64>) -> (Vec<String>, Vec<f64>) {
    let mut rows: Vec<(String, f64)> = sums.into_iter().collect();
    rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    rows.into_iter().unzip()
}

/// ISO-2 → ISO-3 for the countries appearing in Horizon participations,
/// including the EU's own EL/UK variants.
fn iso3(iso2: &str) -> Option<&'static str> {
    const TABLE: &[(&str, &str)] = &[
        ("AL", "ALB"), ("AM", "ARM"), ("AT", "AUT"), ("BA", "BIH"), ("BE", "BEL"),
        ("BG", "BGR"), ("CH", "CHE"), ("CY", "CYP"), ("CZ", "CZE"), ("DE", "DEU"),
        ("DK", "DNK"), ("EE", "EST"), ("EL", "GRC"), ("ES", "ESP"), ("FI", "FIN"),
        ("FO", "FRO"), ("FR", "FRA"), ("GB", "GBR"), ("GE", "GEO"), ("GR", "GRC"),
        ("HR", "HRV"), ("HU", "HUN"), ("IE", "IRL"), ("IL", "ISR"), ("IS", "ISL"),
        ("IT", "ITA"), ("LI", "LIE"), ("LT", "LTU"), ("LU", "LUX"), ("LV", "LVA"),
        ("MD", "MDA"), ("ME", "MNE"), ("MK", "MKD"), ("MT", "MLT"), ("NL", "NLD"),
        ("NO", "NOR"), ("PL", "POL"), ("PT", "PRT"), ("RO", "ROU"), ("RS", "SRB"),
        ("SE", "SWE"), ("SI", "SVN"), ("SK", "SVK"), ("TN", "TUN"), ("TR", "TUR"),
        ("UA", "UKR"), ("UK", "GBR"), ("XK", "XKX"),
    ];
    TABLE
        .iter()
        .find(|(from, _)| *from == iso2)
        .map(|(_, to)| *to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Extracts, HorizonStore};
    use polars::prelude::*;

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
            "organization_id" => ["A", "B", "A", "C"],
            "project_id" => ["1", "1", "2", "3"],
            "name" => ["Alpha University", "Beta Institute", "Alpha University", "Gamma Labs"],
            "country" => ["DE", "FR", "DE", "ZZ"],
            "activity_type" => ["HES", "REC", "HES", "PRC"],
            "role" => ["coordinator", "participant", "coordinator", "coordinator"],
            "ec_contribution" => ["600000", "400000", "500000", "250000"],
        ]
        .unwrap();
        let sci_voc = df![
            "project_id" => ["1", "1", "2"],
            "sci_voc_code" => ["/23", "/24", "/31"],
            "path" => [
                "/natural sciences/physical sciences",
                "/natural sciences/earth sciences",
                "/engineering and technology/energy",
            ],
            "title" => ["physical sciences", "earth sciences", "energy"],
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

    fn as_bar(spec: FigureSpec) -> BarChart {
        match spec {
            FigureSpec::Bar(bar) => bar,
            other => panic!("expected a bar chart, got {other:?}"),
        }
    }

    #[test]
    fn country_contributions_sum_and_sort_descending() {
        let bar = as_bar(ec_contribution_by_country(&fixture_snapshot()).unwrap());
        assert_eq!(bar.categories, vec!["DE", "FR", "ZZ"]);
        assert_eq!(bar.values, vec![1100000.0, 400000.0, 250000.0]);
    }

    #[test]
    fn project_counts_are_distinct_per_country() {
        let bar = as_bar(projects_per_country(&fixture_snapshot()).unwrap());
        // DE participates in projects 1 and 2
        assert_eq!(bar.categories[0], "DE");
        assert_eq!(bar.values[0], 2.0);
    }

    #[test]
    fn top_institutions_truncate_to_n() {
        let bar = as_bar(top_institutions_by_funding(&fixture_snapshot(), 2).unwrap());
        assert_eq!(bar.categories, vec!["Alpha University", "Beta Institute"]);
        assert_eq!(bar.values, vec![1100000.0, 400000.0]);
    }

    #[test]
    fn histogram_covers_the_value_range() {
        let spec = funding_distribution_per_project(&fixture_snapshot(), 3).unwrap();
        let FigureSpec::Histogram(hist) = spec else {
            panic!("expected a histogram");
        };
        assert_eq!(hist.bin_edges.len(), 4);
        assert_eq!(hist.counts.iter().sum::<u32>(), 3);
        assert_eq!(hist.bin_edges[0], 250000.0);
        assert_eq!(hist.bin_edges[3], 1000000.0);
    }

    #[test]
    fn funding_over_time_counts_multi_tag_projects_once_per_class() {
        let spec = funding_over_time_by_field(&fixture_snapshot()).unwrap();
        let FigureSpec::Line(line) = spec else {
            panic!("expected a line chart");
        };
        // project 1 has two tags in the same class; project 3 is untagged
        let names: Vec<&str> = line.series.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["engineering and technology", "natural sciences", "other"]);
        let natural = &line.series[1];
        assert_eq!(natural.years, vec![2020]);
        assert_eq!(natural.values, vec![1000000.0]);
        let other = &line.series[2];
        assert_eq!(other.years, vec![2021]);
        assert_eq!(other.values, vec![250000.0]);
    }

    #[test]
    fn choropleth_maps_iso2_and_drops_unknown_codes() {
        let spec = funding_per_country_choropleth(&fixture_snapshot()).unwrap();
        let FigureSpec::Choropleth(map) = spec else {
            panic!("expected a choropleth");
        };
        // ZZ has no ISO-3 mapping and is dropped
        assert_eq!(map.locations, vec!["DEU", "FRA"]);
        assert_eq!(map.values, vec![1100000.0, 400000.0]);
    }

    #[test]
    fn empty_snapshot_renders_empty_figures() {
        let (store, _) = HorizonStore::from_extracts(Extracts {
            project: df!["id" => Vec::<String>::new()].unwrap(),
            organization: DataFrame::empty(),
            ..Default::default()
        })
        .unwrap();
        let snapshot = Snapshot::build(store).unwrap();

        let bar = as_bar(ec_contribution_by_country(&snapshot).unwrap());
        assert!(bar.categories.is_empty());

        let FigureSpec::Histogram(hist) =
            funding_distribution_per_project(&snapshot, 20).unwrap()
        else {
            panic!("expected a histogram");
        };
        assert!(hist.counts.is_empty());

        let FigureSpec::Line(line) = funding_over_time_by_field(&snapshot).unwrap() else {
            panic!("expected a line chart");
        };
        assert!(line.series.is_empty());
    }
}
