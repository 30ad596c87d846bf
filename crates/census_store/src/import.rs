use std::collections::BTreeMap;

use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde_json::Value as JsonValue;
use time::OffsetDateTime;

use crate::db::{Citizens, Imports};
use crate::store::{
    CensusStore, INSERT_CHUNK_ROWS, exec, finish, import_exists_in, query_all, query_one,
    read_citizen_id, read_row_id, today,
};
use census_core::graph::{Adjacency, normalize_edge, unique_pairs, validate_symmetry};
use census_core::{
    CensusError, CensusResult, CitizenId, CitizenRecord, ImportApi, ImportId, RowId,
    parse_import_payload,
};

/// Citizen rows per multi-row insert; each row binds nine values.
const CITIZEN_CHUNK_ROWS: usize = INSERT_CHUNK_ROWS / 2;

#[async_trait]
impl ImportApi for CensusStore {
    async fn import_citizens(&self, payload: JsonValue) -> CensusResult<ImportId> {
        let records = parse_import_payload(payload, &self.limits, today())?;
        let adjacency: Adjacency = records
            .iter()
            .map(|record| (record.citizen_id, record.relatives.clone()))
            .collect();
        validate_symmetry(&adjacency)?;

        let tx = self.conn.begin().await?;
        let result = self.write_import(&tx, &records, &adjacency).await;
        let import_id = finish(tx, result, "import").await?;
        log::info!(
            "census: import {import_id} stored citizens={}",
            records.len()
        );
        Ok(import_id)
    }

    async fn import_exists(&self, import_id: ImportId) -> CensusResult<bool> {
        import_exists_in(&self.conn, import_id).await
    }
}

impl CensusStore {
    async fn write_import<C: ConnectionTrait>(
        &self,
        conn: &C,
        records: &[CitizenRecord],
        adjacency: &Adjacency,
    ) -> CensusResult<ImportId> {
        let import_id = insert_import(conn).await?;
        self.maybe_failpoint("after_import_insert")?;

        for chunk in records.chunks(CITIZEN_CHUNK_ROWS) {
            let mut insert = Query::insert()
                .into_table(Citizens::Table)
                .columns([
                    Citizens::ImportId,
                    Citizens::CitizenId,
                    Citizens::Town,
                    Citizens::Street,
                    Citizens::Building,
                    Citizens::Apartment,
                    Citizens::Name,
                    Citizens::BirthDate,
                    Citizens::Gender,
                ])
                .to_owned();
            for record in chunk {
                insert.values_panic(citizen_values(import_id, record));
            }
            exec(conn, &insert).await?;
        }
        self.maybe_failpoint("after_citizens_insert")?;

        let rows = row_ids_of_import(conn, import_id).await?;
        let edges = unique_pairs(adjacency)
            .into_iter()
            .map(|(a, b)| {
                let lookup = |id: CitizenId| {
                    rows.get(&id).copied().ok_or_else(|| {
                        CensusError::storage(format!("citizen {id} missing after insert"))
                    })
                };
                Ok(normalize_edge(lookup(a)?, lookup(b)?))
            })
            .collect::<CensusResult<Vec<_>>>()?;
        self.insert_edges(conn, &edges).await?;
        self.maybe_failpoint("after_relatives_insert")?;
        log::debug!(
            "census: import {import_id} wrote citizens={} edges={}",
            records.len(),
            edges.len()
        );
        Ok(import_id)
    }
}

async fn insert_import<C: ConnectionTrait>(conn: &C) -> CensusResult<ImportId> {
    let insert = Query::insert()
        .into_table(Imports::Table)
        .columns([Imports::CreatedAt])
        .values_panic([unix_millis()?.into()])
        .returning_col(Imports::ImportId)
        .to_owned();
    let row = query_one(conn, &insert)
        .await?
        .ok_or_else(|| CensusError::storage("import insert returned no id"))?;
    Ok(ImportId(read_row_id(&row, Imports::ImportId)?.get()))
}

fn unix_millis() -> CensusResult<i64> {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    i64::try_from(millis).map_err(|_| CensusError::storage("clock out of range"))
}

fn citizen_values(import_id: ImportId, record: &CitizenRecord) -> [SimpleExpr; 9] {
    [
        import_id.get().into(),
        record.citizen_id.get().into(),
        record.town.clone().into(),
        record.street.clone().into(),
        record.building.clone().into(),
        i64::from(record.apartment).into(),
        record.name.clone().into(),
        record.birth_date.date().into(),
        record.gender.as_str().into(),
    ]
}

async fn row_ids_of_import<C: ConnectionTrait>(
    conn: &C,
    import_id: ImportId,
) -> CensusResult<BTreeMap<CitizenId, RowId>> {
    let select = Query::select()
        .from(Citizens::Table)
        .columns([Citizens::Id, Citizens::CitizenId])
        .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
        .to_owned();
    query_all(conn, &select)
        .await?
        .iter()
        .map(|row| Ok((read_citizen_id(row)?, read_row_id(row, Citizens::Id)?)))
        .collect()
}
