use std::collections::HashSet;

use census_store::{CensusConfig, CensusError, CensusResult, CensusStore};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use tempfile::tempdir;

async fn list_names(store: &CensusStore, kind: &str) -> CensusResult<HashSet<String>> {
    let rows = store
        .connection()
        .query_all(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT name FROM sqlite_master WHERE type = '{kind}'"),
        ))
        .await
        .map_err(CensusError::from)?;
    let mut names = HashSet::new();
    for row in rows {
        let name: String = row.try_get("", "name").map_err(CensusError::from)?;
        names.insert(name);
    }
    Ok(names)
}

#[tokio::test]
async fn sqlite_migrations_create_tables_and_indexes() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = CensusConfig::default_sqlite(base.join("census.sqlite").to_string_lossy());
    let store = CensusStore::connect(&config, base).await?;

    let tables = list_names(&store, "table").await?;
    for table in ["imports", "citizens", "relatives"] {
        assert!(tables.contains(table), "missing table {table}");
    }
    let indexes = list_names(&store, "index").await?;
    for index in [
        "uk_citizens_import_citizen",
        "idx_citizens_import_town",
        "idx_relatives_id2",
    ] {
        assert!(indexes.contains(index), "missing index {index}");
    }
    Ok(())
}

#[tokio::test]
async fn migrations_are_idempotent_across_reconnects() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let base = dir.path();
    let config = CensusConfig::default_sqlite(base.join("census.sqlite").to_string_lossy());
    let first = CensusStore::connect(&config, base).await?;
    drop(first);
    let second = CensusStore::connect_sqlite(&base.join("census.sqlite")).await?;
    let tables = list_names(&second, "table").await?;
    assert!(tables.contains("citizens"));
    Ok(())
}
