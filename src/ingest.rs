//! Raw extract ingestion: CSV → all-string DataFrames with normalized,
//! aliased column names. Casting and validation happen in `clean`/`store`.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use polars::prelude::*;

use crate::error::{HorizonError, Result};

/// Map of normalized source column names to canonical snake_case names.
/// Sources mix camelCase exports with already-converted columns.
const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("startdate", "start_date"),
    ("enddate", "end_date"),
    ("ecsignaturedate", "ec_signature_date"),
    ("contentupdatedate", "content_update_date"),
    ("grantdoi", "grant_doi"),
    ("ecmaxcontribution", "ec_max_contribution"),
    ("totalcost", "total_cost"),
    ("frameworkprogramme", "framework_programme"),
    ("mastercall", "master_call"),
    ("subcall", "sub_call"),
    ("fundingscheme", "funding_scheme"),
    ("uniqueprogrammepart", "unique_programme_part"),
    ("deliverabletype", "deliverable_type"),
    ("ispublishedas", "is_published_as"),
    ("journaltitle", "journal_title"),
    ("journalnumber", "journal_number"),
    ("publishedyear", "published_year"),
    ("publishedpages", "published_pages"),
    ("projectid", "project_id"),
    ("projectacronym", "project_acronym"),
    ("organisationid", "organization_id"),
    ("organizationid", "organization_id"),
    ("eccontribution", "ec_contribution"),
    ("neteccontribution", "net_ec_contribution"),
    ("endofparticipation", "end_of_participation"),
    ("order", "order_index"),
    ("vatnumber", "vat_number"),
    ("shortname", "short_name"),
    ("activitytype", "activity_type"),
    ("postcode", "post_code"),
    ("nutscode", "nuts_code"),
    ("organizationurl", "organization_url"),
    ("contactform", "contact_form"),
    // controlled vocabularies: the code column carries the extract's name
    ("topic", "topic_code"),
    ("legalbasis", "legal_basis_code"),
    ("euroscivoccode", "sci_voc_code"),
    ("euroscivocpath", "path"),
    ("euroscivoctitle", "title"),
    ("euroscivocdescription", "description"),
];

/// Trim, lowercase and snake_case a raw header name.
fn normalize_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_sep && !out.is_empty() {
                out.push('_');
            }
            last_was_sep = true;
        } else if ch.is_alphanumeric() || ch == '_' {
            out.extend(ch.to_lowercase());
            last_was_sep = false;
        }
        // other punctuation is dropped
    }
    out
}

fn apply_alias(name: &str) -> &str {
    COLUMN_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// Sample the head of the file and pick whichever of `;`, `,` or tab
/// occurs most in the header line.
pub fn sniff_delimiter(path: &Path) -> Result<u8> {
    let mut file = File::open(path)?;
    let mut buf = [0u8; 2048];
    let n = file.read(&mut buf)?;
    let sample = &buf[..n];
    let header = sample.split(|&b| b == b'\n').next().unwrap_or(sample);

    let mut best = (b',', 0usize);
    for cand in [b';', b',', b'\t'] {
        let count = header.iter().filter(|&&b| b == cand).count();
        if count > best.1 {
            best = (cand, count);
        }
    }
    Ok(best.0)
}

/// Read a CSV extract with all columns as String dtype, normalizing and
/// aliasing column names.
pub fn read_extract(path: &Path) -> Result<DataFrame> {
    let separator = sniff_delimiter(path)?;
    let mut df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0)) // all columns as String
        .with_parse_options(CsvParseOptions::default().with_separator(separator))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    let renamed: Vec<String> = df
        .get_column_names_str()
        .iter()
        .map(|c| apply_alias(&normalize_name(c)).to_string())
        .collect();
    df.set_column_names(renamed.as_slice())?;

    Ok(df)
}

/// Fail with `MissingColumn` unless every required column is present.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    for &col_name in required {
        if df.column(col_name).is_err() {
            return Err(HorizonError::MissingColumn(col_name.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn normalizes_and_aliases_headers() {
        assert_eq!(normalize_name("  ecMaxContribution "), "ecmaxcontribution");
        assert_eq!(normalize_name("nuts code"), "nuts_code");
        assert_eq!(apply_alias("ecmaxcontribution"), "ec_max_contribution");
        assert_eq!(apply_alias("already_fine"), "already_fine");
    }

    #[test]
    fn sniffs_semicolon_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "p.csv", "id;acronym;totalCost\n1;ABC;100\n");
        assert_eq!(sniff_delimiter(&path).unwrap(), b';');
    }

    #[test]
    fn sniffs_comma_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "p.csv", "id,acronym\n1,ABC\n");
        assert_eq!(sniff_delimiter(&path).unwrap(), b',');
    }

    #[test]
    fn reads_extract_as_strings_with_canonical_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(
            &dir,
            "project.csv",
            "id;acronym;startDate;ecMaxContribution\n101;ALPHA;2021-01-01;1500000.5\n",
        );
        let df = read_extract(&path).unwrap();
        assert_eq!(
            df.get_column_names_str(),
            &["id", "acronym", "start_date", "ec_max_contribution"]
        );
        // everything stays a string until the cleaning pass
        assert_eq!(df.column("ec_max_contribution").unwrap().dtype(), &DataType::String);
        assert_eq!(df.height(), 1);
    }

    #[test]
    fn require_columns_reports_the_missing_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "t.csv", "id,title\n1,x\n");
        let df = read_extract(&path).unwrap();
        assert!(require_columns(&df, &["id", "title"]).is_ok());
        let err = require_columns(&df, &["id", "status"]).unwrap_err();
        assert!(matches!(err, HorizonError::MissingColumn(c) if c == "status"));
    }
}
