//! PostgreSQL store for bars, transactions and indicator snapshots.

use crate::domain::bar::Bar;
use crate::domain::error::StochtraderError;
use crate::domain::position::{Transaction, TransactionKind};
use crate::domain::snapshot::IndicatorSnapshot;
use crate::ports::config_port::ConfigPort;
use crate::ports::store_port::{BarStore, IndicatorStore, TransactionStore};
use chrono::NaiveDateTime;
use postgres::NoTls;
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;

type Manager = PostgresConnectionManager<NoTls>;

pub struct PostgresStore {
    pool: Pool<Manager>,
}

impl PostgresStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StochtraderError> {
        // [postgres] connection_string, falling back to [database] conninfo
        let connection_string = config
            .get_string("postgres", "connection_string")
            .or_else(|| config.get_string("database", "conninfo"))
            .ok_or_else(|| StochtraderError::ConfigMissing {
                section: "database".into(),
                key: "conninfo".into(),
            })?;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| StochtraderError::ConfigInvalid {
                section: "database".into(),
                key: "conninfo".into(),
                reason: e.to_string(),
            })?;

        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(PostgresConnectionManager::new(pg_config, NoTls))
            .map_err(|e: r2d2::Error| StochtraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<Manager>, StochtraderError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| StochtraderError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), StochtraderError> {
        self.conn()?
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS bars (
                    asset TEXT NOT NULL,
                    timestamp TIMESTAMP NOT NULL,
                    open DOUBLE PRECISION NOT NULL,
                    high DOUBLE PRECISION NOT NULL,
                    low DOUBLE PRECISION NOT NULL,
                    close DOUBLE PRECISION NOT NULL,
                    PRIMARY KEY (asset, timestamp)
                );
                CREATE TABLE IF NOT EXISTS transactions (
                    id BIGSERIAL PRIMARY KEY,
                    asset TEXT NOT NULL,
                    timestamp TIMESTAMP NOT NULL,
                    action SMALLINT NOT NULL,
                    comment TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS stochastic (
                    asset TEXT NOT NULL,
                    timestamp TIMESTAMP NOT NULL,
                    enter_k DOUBLE PRECISION NOT NULL,
                    enter_d DOUBLE PRECISION NOT NULL,
                    exit_k DOUBLE PRECISION NOT NULL,
                    exit_d DOUBLE PRECISION NOT NULL
                );",
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })
    }
}

fn limit(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl BarStore for PostgresStore {
    fn insert_bar(&self, bar: &Bar, asset: &str) -> Result<(), StochtraderError> {
        self.conn()?
            .execute(
                "INSERT INTO bars (asset, timestamp, open, high, low, close)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (asset, timestamp) DO UPDATE
                 SET open = EXCLUDED.open, high = EXCLUDED.high,
                     low = EXCLUDED.low, close = EXCLUDED.close",
                &[&asset, &bar.timestamp, &bar.open, &bar.high, &bar.low, &bar.close],
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn get_last_n_bars(&self, n: usize, asset: &str) -> Result<Vec<Bar>, StochtraderError> {
        let rows = self
            .conn()?
            .query(
                "SELECT timestamp, open, high, low, close FROM bars
                 WHERE asset = $1 ORDER BY timestamp DESC LIMIT $2",
                &[&asset, &limit(n)],
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        if rows.is_empty() {
            return Err(StochtraderError::NoRecords {
                asset: asset.to_string(),
            });
        }

        let mut bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| {
                let ts: NaiveDateTime = row.get(0);
                Bar::new(ts, row.get(1), row.get(2), row.get(3), row.get(4))
            })
            .collect();
        bars.reverse();
        Ok(bars)
    }
}

impl TransactionStore for PostgresStore {
    fn log(&self, transaction: &Transaction) -> Result<(), StochtraderError> {
        self.conn()?
            .execute(
                "INSERT INTO transactions (asset, timestamp, action, comment) VALUES ($1, $2, $3, $4)",
                &[
                    &transaction.asset,
                    &transaction.timestamp,
                    &i16::from(transaction.action()),
                    &transaction.comment(),
                ],
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn get_last_n(&self, n: usize, asset: &str) -> Result<Vec<Transaction>, StochtraderError> {
        let rows = self
            .conn()?
            .query(
                "SELECT timestamp, comment FROM transactions
                 WHERE asset = $1 ORDER BY id DESC LIMIT $2",
                &[&asset, &limit(n)],
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;

        let mut transactions = Vec::with_capacity(rows.len());
        for row in rows.into_iter().rev() {
            let comment: String = row.get(1);
            let kind = TransactionKind::from_comment(&comment).ok_or_else(|| {
                StochtraderError::DatabaseQuery {
                    reason: format!("unknown transaction comment '{comment}'"),
                }
            })?;
            transactions.push(Transaction {
                timestamp: row.get(0),
                asset: asset.to_string(),
                kind,
            });
        }
        Ok(transactions)
    }
}

impl IndicatorStore for PostgresStore {
    fn log(&self, snapshot: &IndicatorSnapshot) -> Result<(), StochtraderError> {
        self.conn()?
            .execute(
                "INSERT INTO stochastic (asset, timestamp, enter_k, enter_d, exit_k, exit_d)
                 VALUES ($1, $2, $3, $4, $5, $6)",
                &[
                    &snapshot.asset,
                    &snapshot.timestamp,
                    &snapshot.enter_k,
                    &snapshot.enter_d,
                    &snapshot.exit_k,
                    &snapshot.exit_d,
                ],
            )
            .map_err(|e| StochtraderError::DatabaseQuery {
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
