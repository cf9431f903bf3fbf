#![deny(warnings)]

//! Persistence layer: SQLite schema and the [`PointStore`] implementation.

use points_core::{
    non_negative, parse_work_date, ContractId, ContractRecord, ContractStatus, ExcellenceTier,
    GameId, PointPool, PointStore, Points, StoreError, TierGrant,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use tracing::{debug, info};

/// Returns the default SQLite URL used for the local ledger.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./data/game_points.db"
}

/// Create the parent directory of a file-backed SQLite URL.
pub fn prepare_sqlite_path(url: &str) -> std::io::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|p| p.split('?').next().unwrap_or(p));
    if let Some(path) = path.filter(|p| !p.is_empty() && !p.starts_with(":memory:")) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn to_db(p: Points) -> Result<i64, StoreError> {
    i64::try_from(p).map_err(|_| StoreError::Backend(format!("{p} points exceed column range")))
}

/// SQLite-backed store. Cheap to clone; clones share the pool.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

/// Open (creating if missing) the database at `url` and apply migrations.
pub async fn init_db(url: &str) -> Result<SqliteStore, StoreError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(backend)?
        .create_if_missing(true);
    // An in-memory database lives and dies with its connection.
    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let pool = SqlitePoolOptions::new()
        .max_connections(if in_memory { 1 } else { 4 })
        .connect_with(options)
        .await
        .map_err(backend)?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;
    info!(url, "database ready");
    Ok(SqliteStore { pool })
}

impl SqliteStore {
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

const GAME_COLUMNS: &str = "id, game_name, company_name, base_points, self_points, total_points, \
     excellent_1st_points, excellent_2nd_points, excellent_3rd_points, \
     is_excellent_1st, is_excellent_2nd, is_excellent_3rd";

const CONTRACT_COLUMNS: &str = "contract_id, company_name, assigned_game_id, selected_vendor, \
     contract_amount, status, use_self_points, service_category, work_end_date, \
     base_points_used, self_points_used";

fn points(row: &SqliteRow, column: &'static str) -> Result<Points, StoreError> {
    let v: i64 = row.try_get(column).map_err(backend)?;
    Ok(non_negative(column, v)?)
}

fn flag(row: &SqliteRow, column: &str) -> Result<bool, StoreError> {
    let v: i64 = row.try_get(column).map_err(backend)?;
    Ok(v != 0)
}

fn row_to_pool(row: &SqliteRow) -> Result<PointPool, StoreError> {
    let tier = |points_col: &'static str, flag_col: &str| -> Result<TierGrant, StoreError> {
        Ok(TierGrant {
            enabled: flag(row, flag_col)?,
            points: points(row, points_col)?,
        })
    };
    Ok(PointPool {
        game_id: GameId(row.try_get("id").map_err(backend)?),
        game_name: row.try_get("game_name").map_err(backend)?,
        company_name: row.try_get("company_name").map_err(backend)?,
        base_points: points(row, "base_points")?,
        self_points: points(row, "self_points")?,
        excellence: [
            tier("excellent_1st_points", "is_excellent_1st")?,
            tier("excellent_2nd_points", "is_excellent_2nd")?,
            tier("excellent_3rd_points", "is_excellent_3rd")?,
        ],
        total_points: points(row, "total_points")?,
    })
}

fn row_to_contract(row: &SqliteRow) -> Result<ContractRecord, StoreError> {
    let status: String = row.try_get("status").map_err(backend)?;
    let work_end: Option<String> = row.try_get("work_end_date").map_err(backend)?;
    let work_end_date = match work_end.as_deref() {
        Some(raw) => parse_work_date(raw)?,
        None => None,
    };
    let assigned: Option<i64> = row.try_get("assigned_game_id").map_err(backend)?;
    Ok(ContractRecord {
        contract_id: ContractId(row.try_get("contract_id").map_err(backend)?),
        company_name: row.try_get("company_name").map_err(backend)?,
        assigned_game: assigned.map(GameId),
        amount_raw: row.try_get("contract_amount").map_err(backend)?,
        selected_vendor: row.try_get("selected_vendor").map_err(backend)?,
        status: ContractStatus::from_label(&status),
        use_self_points_first: flag(row, "use_self_points")?,
        service_category: row.try_get("service_category").map_err(backend)?,
        work_end_date,
        base_points_used: points(row, "base_points_used")?,
        self_points_used: points(row, "self_points_used")?,
    })
}

impl PointStore for SqliteStore {
    async fn point_pool(&self, game: GameId) -> Result<Option<PointPool>, StoreError> {
        let sql = format!("SELECT {GAME_COLUMNS} FROM games WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(game.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_pool).transpose()
    }

    async fn point_pools(&self) -> Result<Vec<PointPool>, StoreError> {
        let sql = format!("SELECT {GAME_COLUMNS} FROM games ORDER BY company_name, id");
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_pool).collect()
    }

    async fn contracts_for_game(&self, game: GameId) -> Result<Vec<ContractRecord>, StoreError> {
        let sql = format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE assigned_game_id = ? ORDER BY id"
        );
        let rows = sqlx::query(&sql)
            .bind(game.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_contract).collect()
    }

    async fn contracts_for_company(&self, company: &str) -> Result<Vec<ContractRecord>, StoreError> {
        let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE company_name = ? ORDER BY id");
        let rows = sqlx::query(&sql)
            .bind(company)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(row_to_contract).collect()
    }

    async fn contract(&self, id: &ContractId) -> Result<Option<ContractRecord>, StoreError> {
        let sql = format!("SELECT {CONTRACT_COLUMNS} FROM contracts WHERE contract_id = ?");
        let row = sqlx::query(&sql)
            .bind(id.0.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(row_to_contract).transpose()
    }

    async fn set_contract_points_used(
        &self,
        id: &ContractId,
        base_points_used: Points,
        self_points_used: Points,
    ) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE contracts SET base_points_used = ?, self_points_used = ?, \
             updated_at = CURRENT_TIMESTAMP WHERE contract_id = ?",
        )
        .bind(to_db(base_points_used)?)
        .bind(to_db(self_points_used)?)
        .bind(id.0.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("contract {id}")));
        }
        debug!(contract = %id, base_points_used, self_points_used, "points used written");
        Ok(())
    }

    async fn set_self_points_first(&self, id: &ContractId, enabled: bool) -> Result<(), StoreError> {
        let done = sqlx::query(
            "UPDATE contracts SET use_self_points = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE contract_id = ?",
        )
        .bind(i64::from(enabled))
        .bind(id.0.as_str())
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("contract {id}")));
        }
        Ok(())
    }

    async fn save_point_pool(&self, pool: &PointPool) -> Result<(), StoreError> {
        let [first, second, third] = ExcellenceTier::ALL.map(|t| pool.grant(t));
        sqlx::query(
            "INSERT INTO games (id, game_name, company_name, base_points, self_points, total_points, \
               excellent_1st_points, excellent_2nd_points, excellent_3rd_points, \
               is_excellent_1st, is_excellent_2nd, is_excellent_3rd) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
               game_name = excluded.game_name, company_name = excluded.company_name, \
               base_points = excluded.base_points, self_points = excluded.self_points, \
               total_points = excluded.total_points, \
               excellent_1st_points = excluded.excellent_1st_points, \
               excellent_2nd_points = excluded.excellent_2nd_points, \
               excellent_3rd_points = excluded.excellent_3rd_points, \
               is_excellent_1st = excluded.is_excellent_1st, \
               is_excellent_2nd = excluded.is_excellent_2nd, \
               is_excellent_3rd = excluded.is_excellent_3rd, \
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(pool.game_id.0)
        .bind(pool.game_name.as_str())
        .bind(pool.company_name.as_str())
        .bind(to_db(pool.base_points)?)
        .bind(to_db(pool.self_points)?)
        .bind(to_db(pool.total_points)?)
        .bind(to_db(first.points)?)
        .bind(to_db(second.points)?)
        .bind(to_db(third.points)?)
        .bind(i64::from(first.enabled))
        .bind(i64::from(second.enabled))
        .bind(i64::from(third.enabled))
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn save_contract(&self, c: &ContractRecord) -> Result<(), StoreError> {
        let work_end = c.work_end_date.map(|d| d.format("%Y-%m-%d").to_string());
        sqlx::query(
            "INSERT INTO contracts (contract_id, company_name, assigned_game_id, selected_vendor, \
               contract_amount, status, use_self_points, service_category, work_end_date) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(contract_id) DO UPDATE SET \
               company_name = excluded.company_name, \
               assigned_game_id = excluded.assigned_game_id, \
               selected_vendor = excluded.selected_vendor, \
               contract_amount = excluded.contract_amount, \
               status = excluded.status, \
               use_self_points = excluded.use_self_points, \
               service_category = excluded.service_category, \
               work_end_date = excluded.work_end_date, \
               updated_at = CURRENT_TIMESTAMP",
        )
        .bind(c.contract_id.0.as_str())
        .bind(c.company_name.as_str())
        .bind(c.assigned_game.map(|g| g.0))
        .bind(c.selected_vendor.as_deref())
        .bind(c.amount_raw.as_deref())
        .bind(c.status.label())
        .bind(i64::from(c.use_self_points_first))
        .bind(c.service_category.as_deref())
        .bind(work_end)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
