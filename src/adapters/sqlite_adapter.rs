//! SQLite store for bars, transactions and indicator snapshots.

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::position::{Transaction, TransactionKind};
use crate::domain::snapshot::IndicatorSnapshot;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{BarStore, IndicatorStore, TransactionStore};
use chrono::NaiveDateTime;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StochtraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StochtraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| StochtraderError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, StochtraderError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| StochtraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StochtraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| StochtraderError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), StochtraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                asset TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                PRIMARY KEY (asset, timestamp)
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                asset TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                action INTEGER NOT NULL,
                comment TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_transactions_asset ON transactions(asset);
            CREATE TABLE IF NOT EXISTS stochastic (
                asset TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                enter_k REAL NOT NULL,
                enter_d REAL NOT NULL,
                exit_k REAL NOT NULL,
                exit_d REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_stochastic_asset ON stochastic(asset, timestamp);",
        )
        .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
            reason: e.to_string(),
        })?;

        Ok(())
    }

    pub fn snapshot_count(&self, asset: &str) -> Result<usize, StochtraderError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM stochastic WHERE asset = ?1",
                params![asset],
                |row| row.get(0),
            )
            .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        Ok(count as usize)
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, rusqlite::Error> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(raw.len(), rusqlite::types::Type::Text, Box::new(e))
    })
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl BarStore for SqliteStore {
    fn insert_bar(&self, bar: &Bar, asset: &str) -> Result<(), StochtraderError> {
        self.insert_bars(std::slice::from_ref(bar), asset)
    }

    /// One transaction for the whole slice.
    fn insert_bars(&self, bars: &[Bar], asset: &str) -> Result<(), StochtraderError> {
        let mut conn = self.conn()?;

        let tx =
            conn.transaction()
                .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (asset, timestamp, open, high, low, close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    asset,
                    bar.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close
                ],
            )
            .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        }

        tx.commit()
            .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        Ok(())
    }

    fn get_last_n_bars(&self, n: usize, asset: &str) -> Result<Vec<Bar>, StochtraderError> {
        let conn = self.conn()?;

        let query = "SELECT timestamp, open, high, low, close
                     FROM bars
                     WHERE asset = ?1
                     ORDER BY timestamp DESC
                     LIMIT ?2";

        let mut stmt =
            conn.prepare(query)
                .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        let rows = stmt
            .query_map(params![asset, limit(n)], |row| {
                let raw: String = row.get(0)?;
                Ok(Bar::new(
                    parse_timestamp(&raw)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })
            .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(
                row.map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                    reason: e.to_string(),
                })?,
            );
        }

        if bars.is_empty() {
            return Err(StochtraderError::NoRecords {
                asset: asset.to_string(),
            });
        }

        bars.reverse();
        Ok(bars)
    }
}

impl TransactionStore for SqliteStore {
    fn log(&self, transaction: &Transaction) -> Result<(), StochtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO transactions (asset, timestamp, action, comment) VALUES (?1, ?2, ?3, ?4)",
            params![
                transaction.asset,
                transaction.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                transaction.action(),
                transaction.comment()
            ],
        )
        .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
            reason: e.to_string(),
        })?;
        Ok(())
    }

    fn get_last_n(&self, n: usize, asset: &str) -> Result<Vec<Transaction>, StochtraderError> {
        let conn = self.conn()?;

        let query = "SELECT timestamp, comment FROM transactions
                     WHERE asset = ?1
                     ORDER BY id DESC
                     LIMIT ?2";

        let mut stmt =
            conn.prepare(query)
                .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                    reason: e.to_string(),
                })?;

        let rows = stmt
            .query_map(params![asset, limit(n)], |row| {
                let raw: String = row.get(0)?;
                let comment: String = row.get(1)?;
                Ok((parse_timestamp(&raw)?, comment))
            })
            .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut transactions = Vec::new();
        for row in rows {
            let (timestamp, comment) =
                row.map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
                    reason: e.to_string(),
                })?;
            let kind = TransactionKind::from_comment(&comment).ok_or_else(|| {
                StochtraderError::DatabaseQuery {
                    reason: format!("unknown transaction comment '{comment}'"),
                }
            })?;
            transactions.push(Transaction {
                timestamp,
                asset: asset.to_string(),
                kind,
            });
        }

        transactions.reverse();
        Ok(transactions)
    }
}

impl IndicatorStore for SqliteStore {
    fn log(&self, snapshot: &IndicatorSnapshot) -> Result<(), StochtraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO stochastic (asset, timestamp, enter_k, enter_d, exit_k, exit_d)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.asset,
                snapshot.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                snapshot.enter_k,
                snapshot.enter_d,
                snapshot.exit_k,
                snapshot.exit_d
            ],
        )
        .map_err(|e: rusqlite::Error| StochtraderError::DatabaseQuery {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
