use std::collections::BTreeSet;

use census_store::{
    CensusConfig, CensusError, CensusResult, CensusStore, CitizenId, CitizenReadApi, ImportApi,
    ImportId,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, Statement};
use serde_json::{Value, json};
use tempfile::tempdir;
use time::OffsetDateTime;

fn citizen(id: i64, town: &str, birth_date: &str, relatives: &[i64]) -> Value {
    json!({
        "citizen_id": id,
        "town": town,
        "street": "Iosifa Brodskogo",
        "building": "2",
        "apartment": 11,
        "name": format!("Citizen {id}"),
        "birth_date": birth_date,
        "gender": "female",
        "relatives": relatives,
    })
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

async fn open(dir: &std::path::Path) -> CensusResult<CensusStore> {
    let config = CensusConfig::default_sqlite(dir.join("census.sqlite").to_string_lossy());
    CensusStore::connect(&config, dir).await
}

#[tokio::test]
async fn import_then_read_preserves_relatives_as_sets() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let payload = json!({
        "citizens": [
            citizen(3, "Moscow", "26.12.1986", &[1, 2]),
            citizen(1, "Moscow", "1.3.1990", &[3]),
            citizen(2, "Kazan", "15.07.1985", &[3]),
            citizen(4, "Kazan", "01.01.2000", &[]),
        ]
    });
    let import_id = store.import_citizens(payload).await?;
    assert!(store.import_exists(import_id).await?);
    assert_eq!(count_rows(&store, "relatives").await?, 2);

    let citizens = store.list_citizens(import_id).await?;
    let ids: Vec<i64> = citizens.iter().map(|c| c.citizen_id.get()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);

    let relatives_of = |id: i64| -> BTreeSet<i64> {
        citizens
            .iter()
            .find(|c| c.citizen_id.get() == id)
            .map(|c| c.relatives.iter().map(|r| r.get()).collect())
            .unwrap_or_default()
    };
    assert_eq!(relatives_of(3), BTreeSet::from([1, 2]));
    assert_eq!(relatives_of(1), BTreeSet::from([3]));
    assert_eq!(relatives_of(2), BTreeSet::from([3]));
    assert!(relatives_of(4).is_empty());

    let first = store.get_citizen(import_id, CitizenId(1)).await?;
    assert_eq!(first.birth_date.to_string(), "01.03.1990");
    assert_eq!(first.town, "Moscow");
    let encoded = serde_json::to_value(&first).expect("encode");
    assert_eq!(encoded["birth_date"], "01.03.1990");
    assert_eq!(encoded["gender"], "female");
    Ok(())
}

fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[tokio::test]
async fn import_records_creation_time_in_millis() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let before = now_millis();
    let import_id = store.import_citizens(json!({ "citizens": [] })).await?;
    let after = now_millis();

    let row = store
        .connection()
        .query_one(Statement::from_string(
            DatabaseBackend::Sqlite,
            format!("SELECT created_at FROM imports WHERE import_id = {import_id}"),
        ))
        .await
        .map_err(CensusError::from)?
        .ok_or_else(|| CensusError::storage("import row missing"))?;
    let created_at: i64 = row.try_get("", "created_at").map_err(CensusError::from)?;
    assert!(
        (before..=after).contains(&created_at),
        "{before} <= {created_at} <= {after}"
    );
    Ok(())
}

#[tokio::test]
async fn citizen_ids_are_scoped_to_their_import() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let batch = json!({
        "citizens": [
            citizen(1, "Omsk", "10.10.1970", &[2]),
            citizen(2, "Omsk", "11.11.1971", &[1]),
        ]
    });
    let first = store.import_citizens(batch.clone()).await?;
    let second = store.import_citizens(batch).await?;
    assert_ne!(first, second);
    assert_eq!(count_rows(&store, "citizens").await?, 4);
    assert_eq!(
        store.get_citizen(second, CitizenId(2)).await?.relatives,
        vec![CitizenId(1)]
    );
    Ok(())
}

#[tokio::test]
async fn asymmetric_import_persists_nothing() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let payload = json!({
        "citizens": [
            citizen(1, "Omsk", "10.10.1970", &[2]),
            citizen(2, "Omsk", "11.11.1971", &[]),
        ]
    });
    let err = store.import_citizens(payload).await.expect_err("asymmetric");
    assert!(matches!(err, CensusError::Relation { .. }), "{err}");

    let unknown = json!({ "citizens": [citizen(1, "Omsk", "10.10.1970", &[7])] });
    let err = store.import_citizens(unknown).await.expect_err("unknown relative");
    assert!(matches!(err, CensusError::Relation { .. }), "{err}");

    assert_eq!(count_rows(&store, "imports").await?, 0);
    assert_eq!(count_rows(&store, "citizens").await?, 0);
    Ok(())
}

#[tokio::test]
async fn structural_errors_win_over_relation_errors() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let mut broken = citizen(1, "Omsk", "10.10.1970", &[9]);
    broken["gender"] = json!("unknown");
    let err = store
        .import_citizens(json!({ "citizens": [broken] }))
        .await
        .expect_err("invalid gender");
    assert_eq!(err.kind(), "validation");

    let err = store
        .import_citizens(json!({ "people": [] }))
        .await
        .expect_err("wrong envelope");
    assert_eq!(err.kind(), "validation");
    assert_eq!(count_rows(&store, "imports").await?, 0);
    Ok(())
}

#[tokio::test]
async fn empty_import_is_accepted() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let import_id = store.import_citizens(json!({ "citizens": [] })).await?;
    assert!(store.list_citizens(import_id).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn unknown_ids_are_not_found() -> CensusResult<()> {
    let dir = tempdir().expect("tempdir");
    let store = open(dir.path()).await?;
    let missing = ImportId(42);
    assert!(!store.import_exists(missing).await?);
    let err = store.list_citizens(missing).await.expect_err("no import");
    assert!(matches!(err, CensusError::NotFound { .. }));

    let import_id = store
        .import_citizens(json!({ "citizens": [citizen(1, "Omsk", "10.10.1970", &[])] }))
        .await?;
    assert!(store.citizen_exists(import_id, CitizenId(1)).await?);
    assert!(!store.citizen_exists(import_id, CitizenId(2)).await?);
    let err = store
        .get_citizen(import_id, CitizenId(2))
        .await
        .expect_err("no citizen");
    assert!(matches!(err, CensusError::NotFound { .. }));
    Ok(())
}
