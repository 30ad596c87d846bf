use census_store::{
    CensusConfig, CensusError, CensusResult, CensusStore, CitizenId, CitizenPatchApi,
    CitizenReadApi, ImportApi, ImportId,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::{Value, json};
use tempfile::tempdir;

fn batch() -> Value {
    let citizen = |id: i64, relatives: &[i64]| {
        json!({
            "citizen_id": id,
            "town": "Tver",
            "street": "Mira",
            "building": "4",
            "apartment": 12,
            "name": format!("Tenant {id}"),
            "birth_date": "12.12.1960",
            "gender": "female",
            "relatives": relatives,
        })
    };
    json!({ "citizens": [citizen(1, &[2]), citizen(2, &[1]), citizen(3, &[])] })
}

async fn count_rows(store: &CensusStore, table: &str) -> CensusResult<i64> {
    let row = store
        .connection()
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT COUNT(*) AS n FROM {table}"),
        ))
        .await
        .map_err(CensusError::from)?
        .ok_or_else(|| CensusError::storage("count returned no row"))?;
    Ok(row.try_get("", "n").map_err(CensusError::from)?)
}

async fn store_with_failpoint(
    base: &std::path::Path,
    failpoint: &str,
) -> CensusResult<CensusStore> {
    let mut config = CensusConfig::default_sqlite(base.join("census.sqlite").to_string_lossy());
    config.failpoints = Some(vec![failpoint.to_string()]);
    CensusStore::connect(&config, base).await
}

#[tokio::test]
async fn import_rolls_back_at_every_failpoint() -> CensusResult<()> {
    for failpoint in [
        "after_import_insert",
        "after_citizens_insert",
        "after_relatives_insert",
    ] {
        let dir = tempdir().expect("tempdir");
        let store = store_with_failpoint(dir.path(), failpoint).await?;
        let err = store.import_citizens(batch()).await.expect_err(failpoint);
        assert!(matches!(err, CensusError::Storage { .. }), "{failpoint}");
        assert!(err.to_string().contains(failpoint));
        for table in ["imports", "citizens", "relatives"] {
            assert_eq!(count_rows(&store, table).await?, 0, "{failpoint} {table}");
        }
        assert!(!store.import_exists(ImportId(1)).await?);
    }
    Ok(())
}

#[tokio::test]
async fn patch_rolls_back_field_and_edge_changes() -> CensusResult<()> {
    for failpoint in ["after_citizen_update", "after_relatives_delete"] {
        let dir = tempdir().expect("tempdir");
        let base = dir.path();
        let clean = CensusConfig::default_sqlite(base.join("census.sqlite").to_string_lossy());
        let import_id = {
            let store = CensusStore::connect(&clean, base).await?;
            store.import_citizens(batch()).await?
        };

        let store = store_with_failpoint(base, failpoint).await?;
        let err = store
            .patch_citizen(
                import_id,
                CitizenId(1),
                json!({ "name": "Renamed", "relatives": [3] }),
            )
            .await
            .expect_err(failpoint);
        assert!(matches!(err, CensusError::Storage { .. }), "{failpoint}");

        let citizen = store.get_citizen(import_id, CitizenId(1)).await?;
        assert_eq!(citizen.name, "Tenant 1", "{failpoint}");
        assert_eq!(citizen.relatives, vec![CitizenId(2)], "{failpoint}");
        assert_eq!(count_rows(&store, "relatives").await?, 1);
    }
    Ok(())
}
