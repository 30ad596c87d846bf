use census_store::{
    AnalyticsApi, CensusConfig, CensusError, CensusResult, CensusStore, CitizenId, CitizenPatchApi,
    ImportApi, ImportId, PresentsCount,
};
use serde_json::{Value, json};
use tempfile::tempdir;
use time::{Date, Month};

fn citizen(id: i64, town: &str, birth_date: &str, relatives: &[i64]) -> Value {
    json!({
        "citizen_id": id,
        "town": town,
        "street": "Sadovaya",
        "building": "1a",
        "apartment": 3,
        "name": format!("Person {id}"),
        "birth_date": birth_date,
        "gender": "male",
        "relatives": relatives,
    })
}

async fn open() -> CensusResult<(tempfile::TempDir, CensusStore)> {
    let dir = tempdir().expect("tempdir");
    let config = CensusConfig::default_sqlite(dir.path().join("census.sqlite").to_string_lossy());
    let store = CensusStore::connect(&config, dir.path()).await?;
    Ok((dir, store))
}

#[tokio::test]
async fn birthdays_count_presents_per_month() -> CensusResult<()> {
    let (_dir, store) = open().await?;
    let import_id = store
        .import_citizens(json!({
            "citizens": [
                citizen(1, "Moscow", "01.03.1990", &[2]),
                citizen(2, "Moscow", "15.07.1985", &[1]),
                citizen(3, "Moscow", "20.07.2001", &[]),
            ]
        }))
        .await?;
    let presents = store.birthdays(import_id).await?;
    assert_eq!(presents.months.len(), 12);
    assert_eq!(
        presents.month(7),
        &[PresentsCount {
            citizen_id: CitizenId(1),
            presents: 1
        }]
    );
    assert_eq!(
        presents.month(3),
        &[PresentsCount {
            citizen_id: CitizenId(2),
            presents: 1
        }]
    );
    for month in [1, 2, 4, 5, 6, 8, 9, 10, 11, 12] {
        assert!(presents.month(month).is_empty(), "month {month}");
    }

    store
        .patch_citizen(import_id, CitizenId(1), json!({ "relatives": [2, 3] }))
        .await?;
    let presents = store.birthdays(import_id).await?;
    assert_eq!(
        presents.month(7),
        &[PresentsCount {
            citizen_id: CitizenId(1),
            presents: 2
        }]
    );
    assert_eq!(presents.month(3).len(), 2);
    Ok(())
}

#[tokio::test]
async fn town_stats_use_interpolated_ceiling() -> CensusResult<()> {
    let (_dir, store) = open().await?;
    let import_id = store
        .import_citizens(json!({
            "citizens": [
                citizen(1, "Kazan", "01.01.2014", &[]),
                citizen(2, "Kazan", "01.01.2004", &[]),
                citizen(3, "Kazan", "01.01.1994", &[]),
                citizen(4, "Kazan", "01.01.1984", &[]),
                citizen(5, "Amsterdam", "01.01.1982", &[]),
            ]
        }))
        .await?;
    let today = Date::from_calendar_date(2024, Month::June, 1).expect("date");
    let stats = store.town_age_stats_on(import_id, today).await?;
    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].town, "Amsterdam");
    assert_eq!((stats[0].p50, stats[0].p75, stats[0].p99), (42, 42, 42));
    assert_eq!(stats[1].town, "Kazan");
    assert_eq!((stats[1].p50, stats[1].p75, stats[1].p99), (25, 33, 40));

    let current = store.town_age_stats(import_id).await?;
    assert_eq!(current.len(), 2);
    Ok(())
}

#[tokio::test]
async fn aggregates_of_unknown_import_are_not_found() -> CensusResult<()> {
    let (_dir, store) = open().await?;
    let missing = ImportId(7);
    let err = store.birthdays(missing).await.expect_err("birthdays");
    assert!(matches!(err, CensusError::NotFound { .. }));
    let err = store.town_age_stats(missing).await.expect_err("town stats");
    assert!(matches!(err, CensusError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn empty_import_has_empty_aggregates() -> CensusResult<()> {
    let (_dir, store) = open().await?;
    let import_id = store.import_citizens(json!({ "citizens": [] })).await?;
    let presents = store.birthdays(import_id).await?;
    assert_eq!(presents.months.len(), 12);
    assert!(presents.months.values().all(Vec::is_empty));
    assert!(store.town_age_stats(import_id).await?.is_empty());
    Ok(())
}
