// clickvault/src/backup/manifest.rs
use std::path::PathBuf;

use chrono::NaiveDateTime;

/// How a database's data travelled into the artifact. The strategy is an
/// explicit tag so the manifest is self-describing; it is never inferred
/// from which files happen to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Whole-database engine-native snapshot (`BACKUP DATABASE ... TO File`).
    BulkNative,
    /// Table-by-table schema + data extraction.
    PerTable,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::BulkNative => write!(f, "bulk-native"),
            Strategy::PerTable => write!(f, "per-table"),
        }
    }
}

/// Outcome of one table's extraction. Schema and data are independent;
/// a failed data pull leaves `data_ok` false with the reason in `errors`.
#[derive(Debug, Clone)]
pub struct TableArtifact {
    pub database: String,
    pub table: String,
    pub schema_ok: bool,
    /// None when data extraction was not attempted (bulk-native strategy).
    pub data_ok: Option<bool>,
    pub errors: Vec<String>,
}

impl TableArtifact {
    pub fn failed(&self) -> bool {
        !self.schema_ok || self.data_ok == Some(false)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSnapshot {
    pub name: String,
    pub strategy: Strategy,
    /// True when the database had zero tables and was left out of the artifact.
    pub skipped: bool,
    pub tables: Vec<TableArtifact>,
    pub errors: Vec<String>,
}

impl DatabaseSnapshot {
    pub fn skipped(name: &str) -> Self {
        DatabaseSnapshot {
            name: name.to_string(),
            strategy: Strategy::PerTable,
            skipped: true,
            tables: Vec::new(),
            errors: Vec::new(),
        }
    }
}

/// What one backup run produced: the artifact identity plus the per-database
/// outcomes. A run with recoverable failures still yields a manifest; only
/// infrastructure failures abort without one.
#[derive(Debug)]
pub struct BackupManifest {
    pub environment: String,
    pub timestamp: NaiveDateTime,
    pub archive_path: Option<PathBuf>,
    pub uploaded: bool,
    pub databases: Vec<DatabaseSnapshot>,
}

impl BackupManifest {
    pub fn skipped_count(&self) -> usize {
        self.databases.iter().filter(|d| d.skipped).count()
    }

    pub fn failed_tables(&self) -> Vec<&TableArtifact> {
        self.databases
            .iter()
            .flat_map(|d| d.tables.iter())
            .filter(|t| t.failed())
            .collect()
    }

    /// Recoverable-failure predicate backing the `--strict` exit-code policy.
    pub fn has_recoverable_failures(&self) -> bool {
        !self.failed_tables().is_empty() || self.databases.iter().any(|d| !d.errors.is_empty())
    }

    pub fn print_summary(&self) {
        let attempted = self.databases.len();
        let skipped = self.skipped_count();
        let table_count: usize = self.databases.iter().map(|d| d.tables.len()).sum();
        let failed = self.failed_tables();

        println!("\n===== Backup summary =====");
        println!(
            "Databases attempted: {} ({} skipped, empty)",
            attempted, skipped
        );
        println!("Tables processed: {} ({} with failures)", table_count, failed.len());
        for db in &self.databases {
            if db.skipped {
                println!("  - {}: skipped (no tables)", db.name);
            } else {
                println!(
                    "  - {}: strategy {}, {} tables",
                    db.name,
                    db.strategy,
                    db.tables.len()
                );
            }
            for err in &db.errors {
                println!("      ❌ {}", err);
            }
        }
        for t in &failed {
            println!(
                "  ❌ {}.{}: {}",
                t.database,
                t.table,
                t.errors.join("; ")
            );
        }
        match &self.archive_path {
            Some(path) => println!("Artifact: {}", path.display()),
            None => println!("Artifact: none produced"),
        }
        if self.uploaded {
            println!("Remote tier: uploaded");
        }
        println!("==========================");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn table(db: &str, name: &str, schema_ok: bool, data_ok: Option<bool>) -> TableArtifact {
        TableArtifact {
            database: db.to_string(),
            table: name.to_string(),
            schema_ok,
            data_ok,
            errors: Vec::new(),
        }
    }

    fn manifest(databases: Vec<DatabaseSnapshot>) -> BackupManifest {
        BackupManifest {
            environment: "test".to_string(),
            timestamp: NaiveDate::from_ymd_opt(2025, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            archive_path: None,
            uploaded: false,
            databases,
        }
    }

    #[test]
    fn test_clean_run_has_no_recoverable_failures() {
        let m = manifest(vec![DatabaseSnapshot {
            name: "db1".to_string(),
            strategy: Strategy::PerTable,
            skipped: false,
            tables: vec![
                table("db1", "a", true, Some(true)),
                table("db1", "b", true, Some(true)),
            ],
            errors: Vec::new(),
        }]);
        assert!(!m.has_recoverable_failures());
        assert_eq!(m.skipped_count(), 0);
    }

    #[test]
    fn test_data_failure_is_recoverable_failure() {
        let m = manifest(vec![DatabaseSnapshot {
            name: "db1".to_string(),
            strategy: Strategy::PerTable,
            skipped: false,
            tables: vec![table("db1", "a", true, Some(false))],
            errors: Vec::new(),
        }]);
        assert!(m.has_recoverable_failures());
        assert_eq!(m.failed_tables().len(), 1);
    }

    #[test]
    fn test_bulk_native_tables_have_no_data_verdict() {
        // Under bulk-native, data travels in the snapshot; schema-only table
        // records must not count as failures.
        let m = manifest(vec![DatabaseSnapshot {
            name: "db1".to_string(),
            strategy: Strategy::BulkNative,
            skipped: false,
            tables: vec![table("db1", "a", true, None)],
            errors: Vec::new(),
        }]);
        assert!(!m.has_recoverable_failures());
    }

    #[test]
    fn test_skipped_database_counts() {
        let m = manifest(vec![DatabaseSnapshot::skipped("empty_db")]);
        assert_eq!(m.skipped_count(), 1);
        assert!(!m.has_recoverable_failures());
    }
}
