use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Query};
use time::Date;

use crate::db::Citizens;
use crate::store::{CensusStore, col_name, query_all, read_citizen_id, read_row_id, today};
use census_core::stats::{BirthdayRow, count_presents, town_age_stats};
use census_core::{AnalyticsApi, BirthdayPresents, CensusResult, ImportId, TownAgeStats};

#[async_trait]
impl AnalyticsApi for CensusStore {
    async fn birthdays(&self, import_id: ImportId) -> CensusResult<BirthdayPresents> {
        self.require_import(&self.conn, import_id).await?;
        let select = Query::select()
            .from(Citizens::Table)
            .columns([Citizens::Id, Citizens::CitizenId, Citizens::BirthDate])
            .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
            .to_owned();
        let citizens = query_all(&self.conn, &select)
            .await?
            .iter()
            .map(|row| {
                Ok(BirthdayRow {
                    row_id: read_row_id(row, Citizens::Id)?,
                    citizen_id: read_citizen_id(row)?,
                    birth_date: row.try_get("", &col_name(Citizens::BirthDate))?,
                })
            })
            .collect::<CensusResult<Vec<_>>>()?;
        let edges = self.fetch_import_edges(&self.conn, import_id).await?;
        log::debug!(
            "census: birthdays import {import_id} citizens={} edges={}",
            citizens.len(),
            edges.len()
        );
        Ok(count_presents(&citizens, &edges))
    }

    async fn town_age_stats(&self, import_id: ImportId) -> CensusResult<Vec<TownAgeStats>> {
        self.town_age_stats_on(import_id, today()).await
    }

    async fn town_age_stats_on(
        &self,
        import_id: ImportId,
        today: Date,
    ) -> CensusResult<Vec<TownAgeStats>> {
        self.require_import(&self.conn, import_id).await?;
        let select = Query::select()
            .from(Citizens::Table)
            .columns([Citizens::Town, Citizens::BirthDate])
            .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
            .to_owned();
        let residents = query_all(&self.conn, &select)
            .await?
            .iter()
            .map(|row| {
                let town: String = row.try_get("", &col_name(Citizens::Town))?;
                let birth_date: Date = row.try_get("", &col_name(Citizens::BirthDate))?;
                Ok((town, birth_date))
            })
            .collect::<CensusResult<Vec<_>>>()?;
        Ok(town_age_stats(
            residents
                .iter()
                .map(|(town, birth_date)| (town.as_str(), *birth_date)),
            today,
        ))
    }
}
