use async_trait::async_trait;
use serde_json::Value as JsonValue;
use time::Date;

use crate::{BirthdayPresents, CensusResult, CitizenId, CitizenRecord, ImportId, TownAgeStats};

#[async_trait]
pub trait ImportApi {
    /// Validates and stores one `{ "citizens": [...] }` batch atomically.
    async fn import_citizens(&self, payload: JsonValue) -> CensusResult<ImportId>;

    async fn import_exists(&self, import_id: ImportId) -> CensusResult<bool>;
}

#[async_trait]
pub trait CitizenReadApi {
    async fn list_citizens(&self, import_id: ImportId) -> CensusResult<Vec<CitizenRecord>>;

    async fn get_citizen(
        &self,
        import_id: ImportId,
        citizen_id: CitizenId,
    ) -> CensusResult<CitizenRecord>;

    async fn citizen_exists(&self, import_id: ImportId, citizen_id: CitizenId)
    -> CensusResult<bool>;
}

#[async_trait]
pub trait CitizenPatchApi {
    /// Applies a partial update and returns the citizen as persisted afterwards.
    async fn patch_citizen(
        &self,
        import_id: ImportId,
        citizen_id: CitizenId,
        patch: JsonValue,
    ) -> CensusResult<CitizenRecord>;
}

#[async_trait]
pub trait AnalyticsApi {
    async fn birthdays(&self, import_id: ImportId) -> CensusResult<BirthdayPresents>;

    async fn town_age_stats(&self, import_id: ImportId) -> CensusResult<Vec<TownAgeStats>>;

    /// Same as [`AnalyticsApi::town_age_stats`] with ages taken as of `today`.
    async fn town_age_stats_on(
        &self,
        import_id: ImportId,
        today: Date,
    ) -> CensusResult<Vec<TownAgeStats>>;
}
