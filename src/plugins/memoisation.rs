//! Memoisation cache: computed results keyed by caller-chosen strings.
//!
//! Items remember when they were last read. A ticker reaps anything unread
//! for longer than the configured window unless the item is pinned. Maps
//! saved by client libraries (keys prefixed `client-map-`) are always pinned.

use crate::core::broker::CatalogBroker;
use crate::core::cancel::RequestContext;
use crate::core::config::MemoisationConfig;
use crate::core::error::CatalogError;
use crate::core::store::Store;
use crate::core::time::Clock;
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const CLIENT_MAP_KEY_PREFIX: &str = "client-map-";
pub const MAX_KEY_LEN: usize = 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoisedItem {
    pub key: String,
    pub memo_time_unix_sec: i64,
    pub data: Vec<u8>,
    pub scan_id: String,
    pub quant_id: String,
    pub expr_id: String,
    pub data_size: u64,
    pub last_read_time_unix_sec: i64,
    pub memo_writer_user_id: String,
    #[serde(rename = "noGC")]
    pub no_gc: bool,
}

/// What a writer supplies. `key` may be left empty, otherwise it must match
/// the key being written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MemoisedItemInput {
    pub key: String,
    pub data: Vec<u8>,
    pub scan_id: String,
    pub quant_id: String,
    pub expr_id: String,
}

fn check_key(key: &str) -> Result<(), CatalogError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(CatalogError::InvalidInput(format!(
            "Key must be between 1 and {} characters",
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<MemoisedItem> {
    Ok(MemoisedItem {
        key: row.get(0)?,
        memo_time_unix_sec: row.get(1)?,
        data: row.get(2)?,
        scan_id: row.get(3)?,
        quant_id: row.get(4)?,
        expr_id: row.get(5)?,
        data_size: row.get::<_, i64>(6)?.max(0) as u64,
        last_read_time_unix_sec: row.get(7)?,
        memo_writer_user_id: row.get(8)?,
        no_gc: row.get(9)?,
    })
}

#[derive(Clone)]
pub struct MemoisationStore {
    broker: CatalogBroker,
    clock: Arc<dyn Clock>,
}

impl MemoisationStore {
    pub fn new(store: &Store, clock: Arc<dyn Clock>) -> Self {
        Self {
            broker: store.broker(),
            clock,
        }
    }

    /// Writes (or overwrites) an item. Returns the stored record.
    pub fn put(
        &self,
        ctx: &RequestContext,
        key: &str,
        input: MemoisedItemInput,
        writer_user_id: &str,
    ) -> Result<MemoisedItem, CatalogError> {
        check_key(key)?;
        if !input.key.is_empty() && input.key != key {
            return Err(CatalogError::InvalidInput(
                "Memoisation item key doesn't match query parameter".to_string(),
            ));
        }
        if input.data.is_empty() {
            return Err(CatalogError::InvalidInput("Missing data field".to_string()));
        }

        let now = self.clock.now_unix_sec();
        let item = MemoisedItem {
            key: key.to_string(),
            memo_time_unix_sec: now,
            data_size: input.data.len() as u64,
            data: input.data,
            scan_id: input.scan_id,
            quant_id: input.quant_id,
            expr_id: input.expr_id,
            last_read_time_unix_sec: now,
            memo_writer_user_id: writer_user_id.to_string(),
            no_gc: key.starts_with(CLIENT_MAP_KEY_PREFIX),
        };

        self.broker.write(ctx, "memoisation.put", |conn| {
            conn.execute(
                "INSERT INTO memoised_items(key, memo_time_unix_sec, data, scan_id, quant_id, expr_id,
                    data_size, last_read_time_unix_sec, memo_writer_user_id, no_gc)
                 VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(key) DO UPDATE SET
                    memo_time_unix_sec = excluded.memo_time_unix_sec,
                    data = excluded.data,
                    scan_id = excluded.scan_id,
                    quant_id = excluded.quant_id,
                    expr_id = excluded.expr_id,
                    data_size = excluded.data_size,
                    last_read_time_unix_sec = excluded.last_read_time_unix_sec,
                    memo_writer_user_id = excluded.memo_writer_user_id,
                    no_gc = excluded.no_gc",
                params![
                    item.key,
                    item.memo_time_unix_sec,
                    item.data,
                    item.scan_id,
                    item.quant_id,
                    item.expr_id,
                    item.data_size as i64,
                    item.last_read_time_unix_sec,
                    item.memo_writer_user_id,
                    item.no_gc,
                ],
            )?;
            Ok(())
        })?;

        if item.no_gc {
            tracing::info!(key, "client map saved");
        }
        Ok(item)
    }

    /// Reads an item and marks it as read now. An item unread for longer than
    /// `max_age_sec` is deleted and reported as not found.
    pub fn get(
        &self,
        ctx: &RequestContext,
        key: &str,
        max_age_sec: i64,
    ) -> Result<MemoisedItem, CatalogError> {
        check_key(key)?;
        let now = self.clock.now_unix_sec();

        let found = self.broker.write(ctx, "memoisation.get", |conn| {
            let item = conn
                .query_row(
                    "SELECT key, memo_time_unix_sec, data, scan_id, quant_id, expr_id, data_size,
                        last_read_time_unix_sec, memo_writer_user_id, no_gc
                     FROM memoised_items WHERE key = ?1",
                    params![key],
                    item_from_row,
                )
                .optional()?;
            let Some(mut item) = item else {
                return Ok(None);
            };

            if item.last_read_time_unix_sec < now - max_age_sec {
                tracing::info!(
                    key,
                    unread_sec = now - item.last_read_time_unix_sec,
                    "memoised item expired, deleting"
                );
                conn.execute("DELETE FROM memoised_items WHERE key = ?1", params![key])?;
                return Ok(None);
            }

            if item.last_read_time_unix_sec != now {
                conn.execute(
                    "UPDATE memoised_items SET last_read_time_unix_sec = ?2 WHERE key = ?1",
                    params![key, now],
                )?;
                item.last_read_time_unix_sec = now;
            }
            Ok(Some(item))
        })?;

        found.ok_or_else(|| CatalogError::NotFound(key.to_string()))
    }

    /// Deletes every unpinned item last read before `now - max_age_sec`.
    pub fn collect_garbage(
        &self,
        ctx: &RequestContext,
        now: i64,
        max_age_sec: i64,
    ) -> Result<usize, CatalogError> {
        let cutoff = now - max_age_sec;
        self.broker.write(ctx, "memoisation.gc", |conn| {
            Ok(conn.execute(
                "DELETE FROM memoised_items WHERE last_read_time_unix_sec < ?1 AND no_gc = 0",
                params![cutoff],
            )?)
        })
    }
}

/// Periodic collector.
pub struct MemoisationGc {
    store: MemoisationStore,
    max_age_sec: i64,
    interval: Duration,
}

impl MemoisationGc {
    pub fn new(store: MemoisationStore, max_age_sec: i64, interval: Duration) -> Self {
        Self {
            store,
            max_age_sec,
            interval,
        }
    }

    /// One collection pass at the store clock's current time.
    pub fn tick(&self, ctx: &RequestContext) -> Result<usize, CatalogError> {
        let now = self.store.clock.now_unix_sec();
        let deleted = self.store.collect_garbage(ctx, now, self.max_age_sec)?;
        tracing::info!(deleted, max_age_sec = self.max_age_sec, "memoisation gc pass");
        Ok(deleted)
    }

    /// Ticks until `ctx` is cancelled. Failed passes are logged and the
    /// next tick tries again.
    pub fn run(&self, ctx: &RequestContext) -> usize {
        let mut total = 0;
        loop {
            match self.tick(ctx) {
                Ok(n) => total += n,
                Err(e) if e.is_cancelled() => break,
                Err(e) => tracing::error!(error = %e, "memoisation gc pass failed"),
            }
            if !ctx.sleep(self.interval) {
                break;
            }
        }
        total
    }

    pub fn spawn(self, ctx: RequestContext) -> thread::JoinHandle<usize> {
        thread::spawn(move || self.run(&ctx))
    }
}

#[derive(clap::Args, Debug)]
pub struct MemoCli {
    #[clap(subcommand)]
    pub command: MemoCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum MemoCommand {
    /// Store the contents of a file under a key
    Put {
        key: String,
        #[clap(long = "data-file")]
        data_file: std::path::PathBuf,
        #[clap(long, default_value = "")]
        scan_id: String,
        #[clap(long, default_value = "")]
        quant_id: String,
        #[clap(long, default_value = "")]
        expr_id: String,
        #[clap(long = "user-id", default_value = "")]
        user_id: String,
    },
    Get { key: String },
    /// Delete items unread for longer than the configured window
    Gc {
        /// Keep collecting every gc_interval_sec until interrupted
        #[clap(long)]
        watch: bool,
        #[clap(long)]
        max_age_sec: Option<i64>,
    },
}

pub fn run_memo_cli(
    memo: &MemoisationStore,
    config: &MemoisationConfig,
    ctx: &RequestContext,
    cli: MemoCli,
) -> Result<(), CatalogError> {
    use crate::core::output::print_json;

    match cli.command {
        MemoCommand::Put {
            key,
            data_file,
            scan_id,
            quant_id,
            expr_id,
            user_id,
        } => {
            let input = MemoisedItemInput {
                key: String::new(),
                data: std::fs::read(&data_file)?,
                scan_id,
                quant_id,
                expr_id,
            };
            let item = memo.put(ctx, &key, input, &user_id)?;
            print_json(&serde_json::json!({"timestamp": item.memo_time_unix_sec}))
        }
        MemoCommand::Get { key } => print_json(&memo.get(ctx, &key, config.max_age_sec)?),
        MemoCommand::Gc { watch, max_age_sec } => {
            let gc = MemoisationGc::new(
                memo.clone(),
                max_age_sec.unwrap_or(config.max_age_sec),
                Duration::from_secs(config.gc_interval_sec),
            );
            let deleted = if watch { gc.run(ctx) } else { gc.tick(ctx)? };
            print_json(&serde_json::json!({"deleted": deleted}))
        }
    }
}
