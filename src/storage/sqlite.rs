//! SQLite Persistent Storage
//!
//! Durable storage for races, deposits, bets, payouts and refunds that
//! survives service restarts. Uses connection pooling via r2d2 for
//! concurrent access.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;
use std::str::FromStr;

use super::traits::{
    BetStore, ConfigStore, DepositStore, PayoutStore, RaceStore, RefundStore, StorageError,
    StorageResult,
};
use crate::types::{Bet, DepositAddress, DepositStatus, Payout, PayoutStatus, Race, Refund, Runner};

/// SQLite-backed store with connection pooling
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database file and runs migrations if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StorageError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;

        Ok(store)
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StorageError> {
        self.pool
            .get()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<(), StorageError> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS races (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                winner INTEGER,
                scheduled_start INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS runners (
                race_id TEXT NOT NULL,
                number INTEGER NOT NULL,
                name TEXT NOT NULL,
                pool_lamports INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (race_id, number)
            );

            CREATE TABLE IF NOT EXISTS deposit_addresses (
                id TEXT PRIMARY KEY,
                address TEXT NOT NULL UNIQUE,
                secret_enc TEXT NOT NULL,
                race_id TEXT NOT NULL,
                runner_number INTEGER NOT NULL,
                claimed_by TEXT,
                status TEXT NOT NULL DEFAULT 'waiting',
                observed_lamports INTEGER,
                observed_signature TEXT,
                swept_signature TEXT,
                expires_at INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_deposits_status ON deposit_addresses(status);
            CREATE INDEX IF NOT EXISTS idx_deposits_race ON deposit_addresses(race_id);

            CREATE TABLE IF NOT EXISTS bets (
                id TEXT PRIMARY KEY,
                race_id TEXT NOT NULL,
                runner_number INTEGER NOT NULL,
                deposit_id TEXT NOT NULL UNIQUE,
                bettor TEXT NOT NULL,
                amount_lamports INTEGER NOT NULL,
                signature TEXT NOT NULL UNIQUE,
                odds_at_placement REAL NOT NULL,
                winnings_lamports INTEGER,
                payout_status TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_bets_race ON bets(race_id);

            CREATE TABLE IF NOT EXISTS payouts (
                id TEXT PRIMARY KEY,
                bet_id TEXT NOT NULL,
                recipient TEXT NOT NULL,
                amount_lamports INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                tx_signature TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_payouts_status ON payouts(status);

            CREATE TABLE IF NOT EXISTS refunds (
                id TEXT PRIMARY KEY,
                deposit_id TEXT NOT NULL,
                recipient TEXT NOT NULL,
                amount_lamports INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                tx_signature TEXT,
                error TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_refunds_status ON refunds(status);

            CREATE TABLE IF NOT EXISTS config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;

        Ok(())
    }
}

/// Map a stored status string into its enum, surfacing corruption instead of
/// guessing a fallback
fn parse_status<T>(raw: String) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    raw.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        )
    })
}

fn row_to_deposit(row: &rusqlite::Row) -> rusqlite::Result<DepositAddress> {
    let status: String = row.get("status")?;

    Ok(DepositAddress {
        id: row.get("id")?,
        address: row.get("address")?,
        secret_enc: row.get("secret_enc")?,
        race_id: row.get("race_id")?,
        runner_number: row.get::<_, i64>("runner_number")? as u8,
        claimed_by: row.get("claimed_by")?,
        status: parse_status(status)?,
        observed_lamports: row
            .get::<_, Option<i64>>("observed_lamports")?
            .map(|v| v as u64),
        observed_signature: row.get("observed_signature")?,
        swept_signature: row.get("swept_signature")?,
        expires_at: row.get("expires_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_bet(row: &rusqlite::Row) -> rusqlite::Result<Bet> {
    let payout_status: Option<String> = row.get("payout_status")?;
    let payout_status = match payout_status {
        Some(raw) => Some(parse_status(raw)?),
        None => None,
    };

    Ok(Bet {
        id: row.get("id")?,
        race_id: row.get("race_id")?,
        runner_number: row.get::<_, i64>("runner_number")? as u8,
        deposit_id: row.get("deposit_id")?,
        bettor: row.get("bettor")?,
        amount_lamports: row.get::<_, i64>("amount_lamports")? as u64,
        signature: row.get("signature")?,
        odds_at_placement: row.get("odds_at_placement")?,
        winnings_lamports: row
            .get::<_, Option<i64>>("winnings_lamports")?
            .map(|v| v as u64),
        payout_status,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_payout(row: &rusqlite::Row) -> rusqlite::Result<Payout> {
    let status: String = row.get("status")?;

    Ok(Payout {
        id: row.get("id")?,
        bet_id: row.get("bet_id")?,
        recipient: row.get("recipient")?,
        amount_lamports: row.get::<_, i64>("amount_lamports")? as u64,
        status: parse_status(status)?,
        tx_signature: row.get("tx_signature")?,
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn row_to_refund(row: &rusqlite::Row) -> rusqlite::Result<Refund> {
    let status: String = row.get("status")?;

    Ok(Refund {
        id: row.get("id")?,
        deposit_id: row.get("deposit_id")?,
        recipient: row.get("recipient")?,
        amount_lamports: row.get::<_, i64>("amount_lamports")? as u64,
        status: parse_status(status)?,
        tx_signature: row.get("tx_signature")?,
        error: row.get("error")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

impl SqliteStore {
    fn load_race_sync(
        &self,
        conn: &rusqlite::Connection,
        id: &str,
    ) -> Result<Option<Race>, StorageError> {
        let race = conn
            .query_row(
                "SELECT id, title, status, winner, scheduled_start, created_at, updated_at
                 FROM races WHERE id = ?1",
                params![id],
                |row| {
                    let status: String = row.get("status")?;
                    Ok(Race {
                        id: row.get("id")?,
                        title: row.get("title")?,
                        status: parse_status(status)?,
                        winner: row.get::<_, Option<i64>>("winner")?.map(|v| v as u8),
                        scheduled_start: row.get("scheduled_start")?,
                        runners: Vec::new(),
                        created_at: row.get("created_at")?,
                        updated_at: row.get("updated_at")?,
                    })
                },
            )
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let Some(mut race) = race else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT number, name, pool_lamports FROM runners
                 WHERE race_id = ?1 ORDER BY number",
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let runners = stmt
            .query_map(params![id], |row| {
                Ok(Runner {
                    number: row.get::<_, i64>("number")? as u8,
                    name: row.get("name")?,
                    pool_lamports: row.get::<_, i64>("pool_lamports")? as u64,
                })
            })
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        race.runners = runners;
        Ok(Some(race))
    }
}

#[async_trait]
impl RaceStore for SqliteStore {
    async fn insert_race(&self, race: &Race) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        tx.execute(
            "INSERT INTO races (id, title, status, winner, scheduled_start, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                race.id,
                race.title,
                race.status.to_string(),
                race.winner.map(|w| w as i64),
                race.scheduled_start,
                race.created_at,
                race.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Duplicate(race.id.clone())
            }
            other => StorageError::Database(other.to_string()),
        })?;

        for runner in &race.runners {
            tx.execute(
                "INSERT INTO runners (race_id, number, name, pool_lamports)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    race.id,
                    runner.number as i64,
                    runner.name,
                    runner.pool_lamports as i64
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn update_race(&self, race: &Race) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let changed = tx
            .execute(
                "UPDATE races SET title = ?2, status = ?3, winner = ?4,
                 scheduled_start = ?5, updated_at = ?6 WHERE id = ?1",
                params![
                    race.id,
                    race.title,
                    race.status.to_string(),
                    race.winner.map(|w| w as i64),
                    race.scheduled_start,
                    race.updated_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StorageError::NotFound(race.id.clone()));
        }

        for runner in &race.runners {
            tx.execute(
                "UPDATE runners SET name = ?3, pool_lamports = ?4
                 WHERE race_id = ?1 AND number = ?2",
                params![
                    race.id,
                    runner.number as i64,
                    runner.name,
                    runner.pool_lamports as i64
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        tx.commit().map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn get_race(&self, id: &str) -> StorageResult<Option<Race>> {
        let conn = self.conn()?;
        self.load_race_sync(&conn, id)
    }

    async fn all_races(&self) -> StorageResult<Vec<Race>> {
        let conn = self.conn()?;

        let ids: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT id FROM races ORDER BY created_at")
                .map_err(|e| StorageError::Database(e.to_string()))?;
            let result = stmt
                .query_map([], |row| row.get(0))
                .map_err(|e| StorageError::Database(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| StorageError::Database(e.to_string()))?;
            result
        };

        let mut races = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(race) = self.load_race_sync(&conn, &id)? {
                races.push(race);
            }
        }
        Ok(races)
    }
}

#[async_trait]
impl DepositStore for SqliteStore {
    async fn insert_deposit(&self, record: &DepositAddress) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO deposit_addresses (
                id, address, secret_enc, race_id, runner_number, claimed_by,
                status, observed_lamports, observed_signature, swept_signature,
                expires_at, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.address,
                record.secret_enc,
                record.race_id,
                record.runner_number as i64,
                record.claimed_by,
                record.status.to_string(),
                record.observed_lamports.map(|v| v as i64),
                record.observed_signature,
                record.swept_signature,
                record.expires_at,
                record.created_at,
                record.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Duplicate(record.id.clone())
            }
            other => StorageError::Database(other.to_string()),
        })?;

        Ok(())
    }

    async fn update_deposit(&self, record: &DepositAddress) -> StorageResult<()> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE deposit_addresses SET
                    status = ?2, observed_lamports = ?3, observed_signature = ?4,
                    swept_signature = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    record.id,
                    record.status.to_string(),
                    record.observed_lamports.map(|v| v as i64),
                    record.observed_signature,
                    record.swept_signature,
                    record.updated_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StorageError::NotFound(record.id.clone()));
        }
        Ok(())
    }

    async fn get_deposit(&self, id: &str) -> StorageResult<Option<DepositAddress>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM deposit_addresses WHERE id = ?1",
            params![id],
            row_to_deposit,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn get_deposit_by_address(
        &self,
        address: &str,
    ) -> StorageResult<Option<DepositAddress>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM deposit_addresses WHERE address = ?1",
            params![address],
            row_to_deposit,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn deposits_by_status(
        &self,
        status: DepositStatus,
    ) -> StorageResult<Vec<DepositAddress>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM deposit_addresses WHERE status = ?1 ORDER BY created_at")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let result = stmt
            .query_map(params![status.to_string()], row_to_deposit)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()));
        result
    }
}

#[async_trait]
impl BetStore for SqliteStore {
    async fn insert_bet(&self, bet: &Bet) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO bets (
                id, race_id, runner_number, deposit_id, bettor, amount_lamports,
                signature, odds_at_placement, winnings_lamports, payout_status,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                bet.id,
                bet.race_id,
                bet.runner_number as i64,
                bet.deposit_id,
                bet.bettor,
                bet.amount_lamports as i64,
                bet.signature,
                bet.odds_at_placement,
                bet.winnings_lamports.map(|v| v as i64),
                bet.payout_status.map(|s| s.to_string()),
                bet.created_at,
                bet.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Duplicate(bet.id.clone())
            }
            other => StorageError::Database(other.to_string()),
        })?;

        Ok(())
    }

    async fn update_bet(&self, bet: &Bet) -> StorageResult<()> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE bets SET winnings_lamports = ?2, payout_status = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![
                    bet.id,
                    bet.winnings_lamports.map(|v| v as i64),
                    bet.payout_status.map(|s| s.to_string()),
                    bet.updated_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StorageError::NotFound(bet.id.clone()));
        }
        Ok(())
    }

    async fn get_bet(&self, id: &str) -> StorageResult<Option<Bet>> {
        let conn = self.conn()?;
        conn.query_row("SELECT * FROM bets WHERE id = ?1", params![id], row_to_bet)
            .optional()
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn bet_for_deposit(&self, deposit_id: &str) -> StorageResult<Option<Bet>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM bets WHERE deposit_id = ?1",
            params![deposit_id],
            row_to_bet,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn bets_for_race(&self, race_id: &str) -> StorageResult<Vec<Bet>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM bets WHERE race_id = ?1 ORDER BY created_at")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let result = stmt
            .query_map(params![race_id], row_to_bet)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()));
        result
    }
}

#[async_trait]
impl PayoutStore for SqliteStore {
    async fn insert_payout(&self, payout: &Payout) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO payouts (
                id, bet_id, recipient, amount_lamports, status, tx_signature,
                error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                payout.id,
                payout.bet_id,
                payout.recipient,
                payout.amount_lamports as i64,
                payout.status.to_string(),
                payout.tx_signature,
                payout.error,
                payout.created_at,
                payout.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Duplicate(payout.id.clone())
            }
            other => StorageError::Database(other.to_string()),
        })?;

        Ok(())
    }

    async fn update_payout(&self, payout: &Payout) -> StorageResult<()> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE payouts SET status = ?2, tx_signature = ?3, error = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    payout.id,
                    payout.status.to_string(),
                    payout.tx_signature,
                    payout.error,
                    payout.updated_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StorageError::NotFound(payout.id.clone()));
        }
        Ok(())
    }

    async fn get_payout(&self, id: &str) -> StorageResult<Option<Payout>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM payouts WHERE id = ?1",
            params![id],
            row_to_payout,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn payouts_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Payout>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM payouts WHERE status = ?1 ORDER BY created_at")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let result = stmt
            .query_map(params![status.to_string()], row_to_payout)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()));
        result
    }
}

#[async_trait]
impl RefundStore for SqliteStore {
    async fn insert_refund(&self, refund: &Refund) -> StorageResult<()> {
        let conn = self.conn()?;

        conn.execute(
            "INSERT INTO refunds (
                id, deposit_id, recipient, amount_lamports, status, tx_signature,
                error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                refund.id,
                refund.deposit_id,
                refund.recipient,
                refund.amount_lamports as i64,
                refund.status.to_string(),
                refund.tx_signature,
                refund.error,
                refund.created_at,
                refund.updated_at,
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StorageError::Duplicate(refund.id.clone())
            }
            other => StorageError::Database(other.to_string()),
        })?;

        Ok(())
    }

    async fn update_refund(&self, refund: &Refund) -> StorageResult<()> {
        let conn = self.conn()?;

        let changed = conn
            .execute(
                "UPDATE refunds SET status = ?2, tx_signature = ?3, error = ?4, updated_at = ?5
                 WHERE id = ?1",
                params![
                    refund.id,
                    refund.status.to_string(),
                    refund.tx_signature,
                    refund.error,
                    refund.updated_at,
                ],
            )
            .map_err(|e| StorageError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StorageError::NotFound(refund.id.clone()));
        }
        Ok(())
    }

    async fn get_refund(&self, id: &str) -> StorageResult<Option<Refund>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM refunds WHERE id = ?1",
            params![id],
            row_to_refund,
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }

    async fn refunds_by_status(&self, status: PayoutStatus) -> StorageResult<Vec<Refund>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM refunds WHERE status = ?1 ORDER BY created_at")
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let result = stmt
            .query_map(params![status.to_string()], row_to_refund)
            .map_err(|e| StorageError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::Database(e.to_string()));
        result
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn upsert_config(&self, key: &str, value: &str) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> StorageResult<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| StorageError::Database(e.to_string()))
    }
}
