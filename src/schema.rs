/// Column-name constants for the Horizon extract tables.
/// Single source of truth for every DataFrame in the crate.

// ── Project columns ─────────────────────────────────────────────────────────
pub mod project {
    pub const ID: &str = "id";
    pub const ACRONYM: &str = "acronym";
    pub const STATUS: &str = "status";
    pub const TITLE: &str = "title";
    pub const START_DATE: &str = "start_date";
    pub const END_DATE: &str = "end_date";
    pub const TOTAL_COST: &str = "total_cost";
    pub const EC_MAX_CONTRIBUTION: &str = "ec_max_contribution";
    pub const EC_SIGNATURE_DATE: &str = "ec_signature_date";
    pub const FRAMEWORK_PROGRAMME: &str = "framework_programme";
    pub const MASTER_CALL: &str = "master_call";
    pub const SUB_CALL: &str = "sub_call";
    pub const FUNDING_SCHEME: &str = "funding_scheme";
    pub const NATURE: &str = "nature";
    pub const OBJECTIVE: &str = "objective";
    pub const RCN: &str = "rcn";
    pub const GRANT_DOI: &str = "grant_doi";

    // derived by the enrichment pass
    pub const DURATION_DAYS: &str = "duration_days";
    pub const DURATION_MONTHS: &str = "duration_months";
    pub const DURATION_YEARS: &str = "duration_years";
    pub const EC_CONTRIBUTION_PER_YEAR: &str = "ec_contribution_per_year";
    pub const TOTAL_COST_PER_YEAR: &str = "total_cost_per_year";
    pub const N_PARTICIPANTS: &str = "n_participants";
    pub const COORDINATOR_NAME: &str = "coordinator_name";
}

// ── Organization columns ────────────────────────────────────────────────────
pub mod organization {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const SHORT_NAME: &str = "short_name";
    pub const VAT_NUMBER: &str = "vat_number";
    pub const SME: &str = "sme";
    pub const ACTIVITY_TYPE: &str = "activity_type";
    pub const STREET: &str = "street";
    pub const POST_CODE: &str = "post_code";
    pub const CITY: &str = "city";
    pub const COUNTRY: &str = "country";
    pub const NUTS_CODE: &str = "nuts_code";
    pub const GEOLOCATION: &str = "geolocation";
    pub const ORGANIZATION_URL: &str = "organization_url";
}

// ── Project ↔ organization participation columns ────────────────────────────
pub mod participation {
    pub const PROJECT_ID: &str = "project_id";
    pub const ORGANIZATION_ID: &str = "organization_id";
    pub const ROLE: &str = "role";
    pub const ORDER_INDEX: &str = "order_index";
    pub const EC_CONTRIBUTION: &str = "ec_contribution";
    pub const NET_EC_CONTRIBUTION: &str = "net_ec_contribution";
    pub const TOTAL_COST: &str = "total_cost";
    pub const ACTIVE: &str = "active";
    pub const END_OF_PARTICIPATION: &str = "end_of_participation";

    /// Role value marking the coordinating organization.
    pub const ROLE_COORDINATOR: &str = "coordinator";
}

// ── Controlled vocabularies ─────────────────────────────────────────────────
pub mod topic {
    pub const CODE: &str = "code";
    pub const TITLE: &str = "title";
}

pub mod legal_basis {
    pub const CODE: &str = "code";
    pub const TITLE: &str = "title";
    pub const UNIQUE_PROGRAMME_PART: &str = "unique_programme_part";
}

pub mod sci_voc {
    pub const CODE: &str = "code";
    pub const PATH: &str = "path";
    pub const TITLE: &str = "title";
    pub const DESCRIPTION: &str = "description";
}

// ── Vocabulary join-table columns ───────────────────────────────────────────
pub mod project_topic {
    pub const PROJECT_ID: &str = "project_id";
    pub const TOPIC_CODE: &str = "topic_code";
}

pub mod project_legal_basis {
    pub const PROJECT_ID: &str = "project_id";
    pub const LEGAL_BASIS_CODE: &str = "legal_basis_code";
}

pub mod project_sci_voc {
    pub const PROJECT_ID: &str = "project_id";
    pub const SCI_VOC_CODE: &str = "sci_voc_code";
}

// ── Child records ───────────────────────────────────────────────────────────
pub mod deliverable {
    pub const ID: &str = "id";
    pub const PROJECT_ID: &str = "project_id";
    pub const TITLE: &str = "title";
    pub const DELIVERABLE_TYPE: &str = "deliverable_type";
    pub const DESCRIPTION: &str = "description";
    pub const URL: &str = "url";
    pub const COLLECTION: &str = "collection";
}

pub mod publication {
    pub const ID: &str = "id";
    pub const PROJECT_ID: &str = "project_id";
    pub const TITLE: &str = "title";
    pub const IS_PUBLISHED_AS: &str = "is_published_as";
    pub const AUTHORS: &str = "authors";
    pub const JOURNAL_TITLE: &str = "journal_title";
    pub const JOURNAL_NUMBER: &str = "journal_number";
    pub const PUBLISHED_YEAR: &str = "published_year";
    pub const PUBLISHED_PAGES: &str = "published_pages";
    pub const ISSN: &str = "issn";
    pub const ISBN: &str = "isbn";
    pub const DOI: &str = "doi";
    pub const COLLECTION: &str = "collection";
}

// ── Derived classification relation ─────────────────────────────────────────
//
// One row per vocabulary tag on a project. Levels come from splitting the
// tag path `/<field_class>/<field>/<sub_field>/<niche>`; missing depths are
// null. Untagged projects carry a single sentinel row with OTHER values.
pub mod classification {
    pub const PROJECT_ID: &str = "project_id";
    pub const SCI_VOC_CODE: &str = "sci_voc_code";
    pub const PATH: &str = "path";
    pub const TITLE: &str = "title";
    pub const FIELD_CLASS: &str = "field_class";
    pub const FIELD: &str = "field";
    pub const SUB_FIELD: &str = "sub_field";
    pub const NICHE: &str = "niche";

    /// Sentinel for projects absent from the vocabulary extract.
    pub const OTHER: &str = "other";
}
