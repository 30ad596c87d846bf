use std::collections::BTreeSet;

use async_trait::async_trait;
use sea_orm::sea_query::{Cond, Expr, Query, SimpleExpr};
use sea_orm::{ConnectionTrait, TransactionTrait};
use serde_json::Value as JsonValue;

use crate::db::{Citizens, Relatives};
use crate::store::{CensusStore, INSERT_CHUNK_ROWS, citizen_not_found, exec, finish, today};
use census_core::graph::{EdgeDiff, check_relatives_list, diff_neighbors, normalize_edge};
use census_core::{
    CensusError, CensusResult, CitizenId, CitizenPatch, CitizenPatchApi, CitizenRecord, ImportId,
    RowId,
};

#[async_trait]
impl CitizenPatchApi for CensusStore {
    async fn patch_citizen(
        &self,
        import_id: ImportId,
        citizen_id: CitizenId,
        patch: JsonValue,
    ) -> CensusResult<CitizenRecord> {
        let tx = self.conn.begin().await?;
        let result = self.apply_patch(&tx, import_id, citizen_id, patch).await;
        let row_id = finish(tx, result, "patch").await?;
        self.read_citizen(&self.conn, row_id).await
    }
}

impl CensusStore {
    async fn apply_patch<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
        citizen_id: CitizenId,
        payload: JsonValue,
    ) -> CensusResult<RowId> {
        let row_id = self
            .find_citizen_row(conn, import_id, citizen_id, true)
            .await?
            .ok_or_else(|| citizen_not_found(import_id, citizen_id))?;
        let patch = CitizenPatch::parse(payload, &self.limits, today())?;

        let diff = match &patch.relatives {
            Some(relatives) => {
                let wanted = check_relatives_list(citizen_id, relatives)?;
                let resolved = self.resolve_citizen_rows(conn, import_id, &wanted).await?;
                if let Some(missing) = wanted.iter().find(|id| !resolved.contains_key(id)) {
                    return Err(CensusError::relation(format!(
                        "relative {missing} does not exist in import {import_id}"
                    )));
                }
                let new_neighbors: BTreeSet<RowId> = resolved.into_values().collect();
                let old_neighbors = self.fetch_neighbor_rows(conn, row_id).await?;
                diff_neighbors(&old_neighbors, &new_neighbors)
            }
            None => EdgeDiff::default(),
        };

        if patch.has_field_updates() {
            update_fields(conn, row_id, &patch).await?;
        }
        self.maybe_failpoint("after_citizen_update")?;

        delete_edges(conn, row_id, &diff.to_delete).await?;
        self.maybe_failpoint("after_relatives_delete")?;

        let inserted: Vec<(RowId, RowId)> = diff
            .to_insert
            .iter()
            .map(|&neighbor| normalize_edge(row_id, neighbor))
            .collect();
        self.insert_edges(conn, &inserted).await?;

        log::debug!(
            "census: patched citizen {citizen_id} in import {import_id} fields={} edges -{} +{}",
            patch.has_field_updates(),
            diff.to_delete.len(),
            diff.to_insert.len()
        );
        Ok(row_id)
    }
}

async fn update_fields<C: ConnectionTrait>(
    conn: &C,
    row_id: RowId,
    patch: &CitizenPatch,
) -> CensusResult<()> {
    let mut values: Vec<(Citizens, SimpleExpr)> = Vec::new();
    if let Some(town) = &patch.town {
        values.push((Citizens::Town, town.clone().into()));
    }
    if let Some(street) = &patch.street {
        values.push((Citizens::Street, street.clone().into()));
    }
    if let Some(building) = &patch.building {
        values.push((Citizens::Building, building.clone().into()));
    }
    if let Some(apartment) = patch.apartment {
        values.push((Citizens::Apartment, i64::from(apartment).into()));
    }
    if let Some(name) = &patch.name {
        values.push((Citizens::Name, name.clone().into()));
    }
    if let Some(birth_date) = patch.birth_date {
        values.push((Citizens::BirthDate, birth_date.date().into()));
    }
    if let Some(gender) = patch.gender {
        values.push((Citizens::Gender, gender.as_str().into()));
    }
    let update = Query::update()
        .table(Citizens::Table)
        .values(values)
        .and_where(Expr::col(Citizens::Id).eq(row_id.get()))
        .to_owned();
    exec(conn, &update).await?;
    Ok(())
}

async fn delete_edges<C: ConnectionTrait>(
    conn: &C,
    row_id: RowId,
    neighbors: &BTreeSet<RowId>,
) -> CensusResult<()> {
    let edges: Vec<(RowId, RowId)> = neighbors
        .iter()
        .map(|&neighbor| normalize_edge(row_id, neighbor))
        .collect();
    for chunk in edges.chunks(INSERT_CHUNK_ROWS / 2) {
        let cond = chunk.iter().fold(Cond::any(), |cond, &(id1, id2)| {
            cond.add(
                Cond::all()
                    .add(Expr::col(Relatives::Id1).eq(id1.get()))
                    .add(Expr::col(Relatives::Id2).eq(id2.get())),
            )
        });
        let delete = Query::delete()
            .from_table(Relatives::Table)
            .cond_where(cond)
            .to_owned();
        exec(conn, &delete).await?;
    }
    Ok(())
}
