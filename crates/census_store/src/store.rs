use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use sea_orm::sea_query::{
    Cond, Expr, Iden, Order, PostgresQueryBuilder, Query, QueryStatementWriter, SelectStatement,
    SqliteQueryBuilder, Values,
};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection,
    DatabaseTransaction, QueryResult, Statement,
};
use sea_orm_migration::MigratorTrait;
use time::{Date, OffsetDateTime};

use crate::config::{CensusConfig, load_or_init_config};
use crate::db::{Citizens, Imports, Relatives};
use crate::migration::Migrator;
use census_core::graph::neighbor_map;
use census_core::{
    CensusError, CensusResult, CitizenId, CitizenReadApi, CitizenRecord, Gender, ImportId, RowId,
    ValidationLimits,
};

/// Rows per multi-row insert; keeps bind parameters well below backend limits.
pub(crate) const INSERT_CHUNK_ROWS: usize = 1_000;

#[derive(Clone)]
pub struct CensusStore {
    pub(crate) conn: DatabaseConnection,
    pub(crate) backend: DatabaseBackend,
    pub(crate) limits: ValidationLimits,
    failpoints: HashSet<String>,
}

/// A persisted citizen together with its surrogate row id.
#[derive(Clone, Debug)]
pub(crate) struct CitizenRow {
    pub row_id: RowId,
    pub record: CitizenRecord,
}

impl CensusStore {
    pub async fn connect(config: &CensusConfig, base_dir: &Path) -> CensusResult<Self> {
        let url = config.connection_url(base_dir)?;
        let mut options = ConnectOptions::new(url);
        options.sqlx_logging(false);
        if let Some(pool) = &config.pool {
            if let Some(max) = pool.max_connections {
                options.max_connections(max);
            }
            if let Some(min) = pool.min_connections {
                options.min_connections(min);
            }
            if let Some(timeout_ms) = pool.connect_timeout_ms {
                options.connect_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.acquire_timeout_ms {
                options.acquire_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(timeout_ms) = pool.idle_timeout_ms {
                options.idle_timeout(Duration::from_millis(timeout_ms));
            }
        }
        let conn = Database::connect(options).await.map_err(CensusError::from)?;
        let backend = conn.get_database_backend();
        let failpoints = config
            .failpoints
            .clone()
            .unwrap_or_default()
            .into_iter()
            .collect::<HashSet<_>>();
        let store = Self {
            conn,
            backend,
            limits: config.validation_limits(),
            failpoints,
        };
        Migrator::up(&store.conn, None)
            .await
            .map_err(CensusError::from)?;
        log::info!(
            "census: store connected backend={} failpoints={}",
            config.backend_name(),
            store.failpoints.len()
        );
        Ok(store)
    }

    pub async fn connect_sqlite(path: &Path) -> CensusResult<Self> {
        let config = CensusConfig::default_sqlite(path.to_string_lossy());
        Self::connect(&config, path.parent().unwrap_or_else(|| Path::new("."))).await
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    pub fn limits(&self) -> ValidationLimits {
        self.limits
    }

    pub(crate) fn maybe_failpoint(&self, key: &str) -> CensusResult<()> {
        if self.failpoints.contains(key) {
            Err(CensusError::storage(format!("failpoint {key}")))
        } else {
            Ok(())
        }
    }

    pub(crate) async fn require_import<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
    ) -> CensusResult<()> {
        if import_exists_in(conn, import_id).await? {
            Ok(())
        } else {
            Err(CensusError::not_found(format!("import {import_id}")))
        }
    }

    /// Resolves `(import_id, citizen_id)` to its row. With `lock_row` the row stays
    /// locked until the surrounding transaction ends on backends with row locks.
    pub(crate) async fn find_citizen_row<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
        citizen_id: CitizenId,
        lock_row: bool,
    ) -> CensusResult<Option<RowId>> {
        let mut select = Query::select()
            .from(Citizens::Table)
            .column(Citizens::Id)
            .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
            .and_where(Expr::col(Citizens::CitizenId).eq(citizen_id.get()))
            .limit(1)
            .to_owned();
        if lock_row && self.backend == DatabaseBackend::Postgres {
            select.lock_exclusive();
        }
        let row = query_one(conn, &select).await?;
        row.map(|row| read_row_id(&row, Citizens::Id)).transpose()
    }

    /// Maps the given citizen ids of one import to their rows; ids that do not exist
    /// are absent from the result.
    pub(crate) async fn resolve_citizen_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
        citizen_ids: &BTreeSet<CitizenId>,
    ) -> CensusResult<BTreeMap<CitizenId, RowId>> {
        let mut resolved = BTreeMap::new();
        let ids: Vec<i64> = citizen_ids.iter().map(|id| id.get()).collect();
        for chunk in ids.chunks(INSERT_CHUNK_ROWS) {
            let select = Query::select()
                .from(Citizens::Table)
                .columns([Citizens::Id, Citizens::CitizenId])
                .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
                .and_where(Expr::col(Citizens::CitizenId).is_in(chunk.iter().copied()))
                .to_owned();
            for row in query_all(conn, &select).await? {
                resolved.insert(
                    read_citizen_id(&row)?,
                    read_row_id(&row, Citizens::Id)?,
                );
            }
        }
        Ok(resolved)
    }

    /// Every citizen row of an import, ordered by citizen_id, relatives left empty.
    pub(crate) async fn fetch_citizen_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
    ) -> CensusResult<Vec<CitizenRow>> {
        let select = citizen_select()
            .and_where(Expr::col(Citizens::ImportId).eq(import_id.get()))
            .order_by(Citizens::CitizenId, Order::Asc)
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_citizen_row)
            .collect()
    }

    /// All edges of an import in one query.
    pub(crate) async fn fetch_import_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        import_id: ImportId,
    ) -> CensusResult<Vec<(RowId, RowId)>> {
        let select = Query::select()
            .columns([
                (Relatives::Table, Relatives::Id1),
                (Relatives::Table, Relatives::Id2),
            ])
            .from(Relatives::Table)
            .inner_join(
                Citizens::Table,
                Expr::col((Citizens::Table, Citizens::Id))
                    .equals((Relatives::Table, Relatives::Id1)),
            )
            .and_where(Expr::col((Citizens::Table, Citizens::ImportId)).eq(import_id.get()))
            .to_owned();
        query_all(conn, &select)
            .await?
            .iter()
            .map(read_edge)
            .collect()
    }

    pub(crate) async fn fetch_neighbor_rows<C: ConnectionTrait>(
        &self,
        conn: &C,
        row_id: RowId,
    ) -> CensusResult<BTreeSet<RowId>> {
        let select = Query::select()
            .from(Relatives::Table)
            .columns([Relatives::Id1, Relatives::Id2])
            .cond_where(
                Cond::any()
                    .add(Expr::col(Relatives::Id1).eq(row_id.get()))
                    .add(Expr::col(Relatives::Id2).eq(row_id.get())),
            )
            .to_owned();
        let mut neighbors = BTreeSet::new();
        for row in query_all(conn, &select).await? {
            let (a, b) = read_edge(&row)?;
            neighbors.insert(if a == row_id { b } else { a });
        }
        Ok(neighbors)
    }

    /// Inserts already-normalized edges.
    pub(crate) async fn insert_edges<C: ConnectionTrait>(
        &self,
        conn: &C,
        edges: &[(RowId, RowId)],
    ) -> CensusResult<()> {
        for chunk in edges.chunks(INSERT_CHUNK_ROWS) {
            let mut insert = Query::insert()
                .into_table(Relatives::Table)
                .columns([Relatives::Id1, Relatives::Id2])
                .to_owned();
            for &(id1, id2) in chunk {
                insert.values_panic([id1.get().into(), id2.get().into()]);
            }
            exec(conn, &insert).await?;
        }
        Ok(())
    }

    /// Reads one citizen and its relatives straight from storage.
    pub(crate) async fn read_citizen<C: ConnectionTrait>(
        &self,
        conn: &C,
        row_id: RowId,
    ) -> CensusResult<CitizenRecord> {
        let select = citizen_select()
            .and_where(Expr::col(Citizens::Id).eq(row_id.get()))
            .to_owned();
        let row = query_one(conn, &select)
            .await?
            .ok_or_else(|| CensusError::not_found(format!("citizen row {row_id}")))?;
        let CitizenRow { mut record, .. } = read_citizen_row(&row)?;

        let neighbors = self.fetch_neighbor_rows(conn, row_id).await?;
        if !neighbors.is_empty() {
            let select = Query::select()
                .from(Citizens::Table)
                .column(Citizens::CitizenId)
                .and_where(Expr::col(Citizens::Id).is_in(neighbors.iter().map(|id| id.get())))
                .order_by(Citizens::CitizenId, Order::Asc)
                .to_owned();
            record.relatives = query_all(conn, &select)
                .await?
                .iter()
                .map(read_citizen_id)
                .collect::<CensusResult<_>>()?;
        }
        Ok(record)
    }
}

#[async_trait]
impl CitizenReadApi for CensusStore {
    async fn list_citizens(&self, import_id: ImportId) -> CensusResult<Vec<CitizenRecord>> {
        self.require_import(&self.conn, import_id).await?;
        let rows = self.fetch_citizen_rows(&self.conn, import_id).await?;
        let edges = self.fetch_import_edges(&self.conn, import_id).await?;
        let citizen_ids: BTreeMap<RowId, CitizenId> = rows
            .iter()
            .map(|row| (row.row_id, row.record.citizen_id))
            .collect();
        let neighbors = neighbor_map(&edges);
        let citizens = rows
            .into_iter()
            .map(|CitizenRow { row_id, mut record }| {
                let mut relatives: Vec<CitizenId> = neighbors
                    .get(&row_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|neighbor| citizen_ids.get(neighbor).copied())
                    .collect();
                relatives.sort_unstable();
                record.relatives = relatives;
                record
            })
            .collect::<Vec<_>>();
        log::debug!(
            "census: listed import {import_id} citizens={} edges={}",
            citizens.len(),
            edges.len()
        );
        Ok(citizens)
    }

    async fn get_citizen(
        &self,
        import_id: ImportId,
        citizen_id: CitizenId,
    ) -> CensusResult<CitizenRecord> {
        let row_id = self
            .find_citizen_row(&self.conn, import_id, citizen_id, false)
            .await?
            .ok_or_else(|| citizen_not_found(import_id, citizen_id))?;
        self.read_citizen(&self.conn, row_id).await
    }

    async fn citizen_exists(
        &self,
        import_id: ImportId,
        citizen_id: CitizenId,
    ) -> CensusResult<bool> {
        Ok(self
            .find_citizen_row(&self.conn, import_id, citizen_id, false)
            .await?
            .is_some())
    }
}

/// Loads or initialises the config under `base` and connects with it.
pub async fn open_store(base: &Path) -> CensusResult<CensusStore> {
    let config = load_or_init_config(base)?;
    CensusStore::connect(&config, base).await
}

pub(crate) fn citizen_not_found(import_id: ImportId, citizen_id: CitizenId) -> CensusError {
    CensusError::not_found(format!("citizen {citizen_id} in import {import_id}"))
}

/// Local calendar date, falling back to UTC when the offset is unknown.
pub(crate) fn today() -> Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Commits on success; on failure rolls back first and then surfaces the original
/// error.
pub(crate) async fn finish<T>(
    tx: DatabaseTransaction,
    result: CensusResult<T>,
    operation: &str,
) -> CensusResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            log::warn!("census: {operation} rolled back: {err}");
            if let Err(rollback_err) = tx.rollback().await {
                log::error!("census: {operation} rollback failed: {rollback_err}");
            }
            Err(err)
        }
    }
}

pub(crate) async fn import_exists_in<C: ConnectionTrait>(
    conn: &C,
    import_id: ImportId,
) -> CensusResult<bool> {
    let select = Query::select()
        .from(Imports::Table)
        .column(Imports::ImportId)
        .and_where(Expr::col(Imports::ImportId).eq(import_id.get()))
        .limit(1)
        .to_owned();
    Ok(query_one(conn, &select).await?.is_some())
}

fn citizen_select() -> SelectStatement {
    Query::select()
        .from(Citizens::Table)
        .columns([
            Citizens::Id,
            Citizens::CitizenId,
            Citizens::Town,
            Citizens::Street,
            Citizens::Building,
            Citizens::Apartment,
            Citizens::Name,
            Citizens::BirthDate,
            Citizens::Gender,
        ])
        .to_owned()
}

fn read_citizen_row(row: &QueryResult) -> CensusResult<CitizenRow> {
    let apartment: i64 = row.try_get("", &col_name(Citizens::Apartment))?;
    let apartment = u32::try_from(apartment)
        .map_err(|_| CensusError::storage(format!("apartment {apartment} out of range")))?;
    let gender: String = row.try_get("", &col_name(Citizens::Gender))?;
    let gender = Gender::from_db(&gender)
        .ok_or_else(|| CensusError::storage(format!("invalid gender '{gender}'")))?;
    let birth_date: Date = row.try_get("", &col_name(Citizens::BirthDate))?;
    Ok(CitizenRow {
        row_id: read_row_id(row, Citizens::Id)?,
        record: CitizenRecord {
            citizen_id: read_citizen_id(row)?,
            town: row.try_get("", &col_name(Citizens::Town))?,
            street: row.try_get("", &col_name(Citizens::Street))?,
            building: row.try_get("", &col_name(Citizens::Building))?,
            apartment,
            name: row.try_get("", &col_name(Citizens::Name))?,
            birth_date: birth_date.into(),
            gender,
            relatives: Vec::new(),
        },
    })
}

pub(crate) fn read_row_id(row: &QueryResult, column: impl Iden) -> CensusResult<RowId> {
    let value: i32 = row.try_get("", &col_name(column))?;
    Ok(RowId(value))
}

pub(crate) fn read_citizen_id(row: &QueryResult) -> CensusResult<CitizenId> {
    let value: i64 = row.try_get("", &col_name(Citizens::CitizenId))?;
    Ok(CitizenId(value))
}

fn read_edge(row: &QueryResult) -> CensusResult<(RowId, RowId)> {
    Ok((
        read_row_id(row, Relatives::Id1)?,
        read_row_id(row, Relatives::Id2)?,
    ))
}

pub(crate) fn col_name(column: impl Iden) -> String {
    column.to_string()
}

fn build_stmt<S: QueryStatementWriter>(
    backend: DatabaseBackend,
    stmt: &S,
) -> (String, Values) {
    match backend {
        DatabaseBackend::Postgres => stmt.build(PostgresQueryBuilder),
        _ => stmt.build(SqliteQueryBuilder),
    }
}

pub(crate) async fn exec<C, S>(conn: &C, stmt: &S) -> CensusResult<u64>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let result = conn
        .execute(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(result.rows_affected())
}

pub(crate) async fn query_all<C, S>(conn: &C, stmt: &S) -> CensusResult<Vec<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let rows = conn
        .query_all(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(rows)
}

pub(crate) async fn query_one<C, S>(conn: &C, stmt: &S) -> CensusResult<Option<QueryResult>>
where
    C: ConnectionTrait,
    S: QueryStatementWriter,
{
    let backend = conn.get_database_backend();
    let (sql, values) = build_stmt(backend, stmt);
    let row = conn
        .query_one(Statement::from_sql_and_values(backend, sql, values))
        .await?;
    Ok(row)
}
