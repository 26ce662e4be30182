use std::path::{Path, PathBuf};

/// Environment variable naming the extract root directory.
pub const DATA_DIR_ENV: &str = "HORIZON_DATA_DIR";

/// Raw extract file names, keyed by table. The organization extract also
/// carries the per-project participation rows; the sci-voc extract also
/// carries the project↔code links.
pub const RAW_FILES: [(&str, &str); 7] = [
    ("project", "project.csv"),
    ("organization", "organization.csv"),
    ("topics", "topics.csv"),
    ("legal_basis", "legalBasis.csv"),
    ("sci_voc", "euroSciVoc.csv"),
    ("deliverables", "projectDeliverables.csv"),
    ("publications", "projectPublications.csv"),
];

/// Resolved data-directory layout for a load run.
#[derive(Debug, Clone)]
pub struct DataConfig {
    pub base_dir: PathBuf,
}

impl DataConfig {
    /// Resolve the data directory: explicit flag beats `HORIZON_DATA_DIR`
    /// (read from the environment after a best-effort `.env` load), which
    /// beats `./data`.
    pub fn resolve(explicit: Option<&Path>) -> Self {
        let _ = dotenv::dotenv();
        let base_dir = explicit
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(DATA_DIR_ENV).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("data"));
        Self { base_dir }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.base_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.base_dir.join("processed")
    }

    /// Path of a raw extract file by table key, if the key is known.
    pub fn raw_file(&self, table: &str) -> Option<PathBuf> {
        RAW_FILES
            .iter()
            .find(|(key, _)| *key == table)
            .map(|(_, name)| self.raw_dir().join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_wins() {
        let cfg = DataConfig::resolve(Some(Path::new("/tmp/extracts")));
        assert_eq!(cfg.base_dir, PathBuf::from("/tmp/extracts"));
        assert_eq!(cfg.raw_dir(), PathBuf::from("/tmp/extracts/raw"));
    }

    #[test]
    fn known_raw_files_resolve() {
        let cfg = DataConfig::resolve(Some(Path::new("d")));
        assert_eq!(
            cfg.raw_file("sci_voc").unwrap(),
            PathBuf::from("d/raw/euroSciVoc.csv")
        );
        assert!(cfg.raw_file("nonsense").is_none());
    }
}
