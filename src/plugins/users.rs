//! User directory: the authoritative `{name, email}` for a user id.
//!
//! Catalog records embed a creator snapshot; readers may ask for it to be
//! refreshed from here. The SQLite directory keeps a small time-bounded cache
//! so listing many records by the same author costs one lookup.

use crate::core::broker::CatalogBroker;
use crate::core::cancel::RequestContext;
use crate::core::error::CatalogError;
use crate::core::store::Store;
use crate::core::time::Clock;
use rusqlite::{OptionalExtension, params};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDetails {
    pub name: String,
    pub email: String,
}

pub trait UserDirectory: Send + Sync {
    fn lookup(&self, ctx: &RequestContext, user_id: &str) -> Result<UserDetails, CatalogError>;
}

struct CachedUser {
    details: UserDetails,
    fetched_unix_sec: i64,
}

pub struct SqliteUserDirectory {
    broker: CatalogBroker,
    clock: Arc<dyn Clock>,
    max_age_sec: i64,
    cache: Mutex<FxHashMap<String, CachedUser>>,
}

impl SqliteUserDirectory {
    pub fn new(store: &Store, clock: Arc<dyn Clock>, max_age_sec: i64) -> Self {
        Self {
            broker: store.broker(),
            clock,
            max_age_sec,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    /// Drops any cached entry so the next lookup re-reads the row.
    pub fn notify_changed(&self, user_id: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(user_id);
        }
    }

    pub fn upsert_user(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        details: &UserDetails,
    ) -> Result<(), CatalogError> {
        if user_id.is_empty() {
            return Err(CatalogError::InvalidInput("user id must not be empty".to_string()));
        }
        let now = self.clock.now_unix_sec();
        self.broker.write(ctx, "users.upsert", |conn| {
            conn.execute(
                "INSERT INTO users(user_id, name, email, updated_unix_sec) VALUES(?1, ?2, ?3, ?4)
                 ON CONFLICT(user_id) DO UPDATE SET
                    name = excluded.name,
                    email = excluded.email,
                    updated_unix_sec = excluded.updated_unix_sec",
                params![user_id, details.name, details.email, now],
            )?;
            Ok(())
        })?;
        self.notify_changed(user_id);
        Ok(())
    }

    fn cached(&self, user_id: &str, now: i64) -> Option<UserDetails> {
        let cache = self.cache.lock().ok()?;
        cache
            .get(user_id)
            .filter(|c| now - c.fetched_unix_sec <= self.max_age_sec)
            .map(|c| c.details.clone())
    }
}

impl UserDirectory for SqliteUserDirectory {
    fn lookup(&self, ctx: &RequestContext, user_id: &str) -> Result<UserDetails, CatalogError> {
        let now = self.clock.now_unix_sec();
        if let Some(hit) = self.cached(user_id, now) {
            return Ok(hit);
        }

        let found = self.broker.read(ctx, "users.lookup", |conn| {
            Ok(conn
                .query_row(
                    "SELECT name, email FROM users WHERE user_id = ?1",
                    params![user_id],
                    |row| {
                        Ok(UserDetails {
                            name: row.get(0)?,
                            email: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })?;
        let details = found.ok_or_else(|| CatalogError::NotFound(format!("user {}", user_id)))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(
                user_id.to_string(),
                CachedUser {
                    details: details.clone(),
                    fetched_unix_sec: now,
                },
            );
        }
        Ok(details)
    }
}

/// Fixed in-memory directory.
#[derive(Debug, Clone, Default)]
pub struct StaticUserDirectory {
    users: FxHashMap<String, UserDetails>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user_id: &str, name: &str, email: &str) -> Self {
        self.users.insert(
            user_id.to_string(),
            UserDetails {
                name: name.to_string(),
                email: email.to_string(),
            },
        );
        self
    }
}

impl UserDirectory for StaticUserDirectory {
    fn lookup(&self, ctx: &RequestContext, user_id: &str) -> Result<UserDetails, CatalogError> {
        ctx.check("users.lookup")?;
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("user {}", user_id)))
    }
}

#[derive(clap::Args, Debug)]
pub struct UserCli {
    #[clap(subcommand)]
    pub command: UserCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum UserCommand {
    /// Create or update a directory entry
    Set {
        user_id: String,
        #[clap(long)]
        name: String,
        #[clap(long, default_value = "")]
        email: String,
    },
    Get { user_id: String },
}

pub fn run_user_cli(
    users: &SqliteUserDirectory,
    ctx: &RequestContext,
    cli: UserCli,
) -> Result<(), CatalogError> {
    match cli.command {
        UserCommand::Set {
            user_id,
            name,
            email,
        } => {
            let details = UserDetails { name, email };
            users.upsert_user(ctx, &user_id, &details)?;
            crate::core::output::print_json(&details)
        }
        UserCommand::Get { user_id } => {
            crate::core::output::print_json(&users.lookup(ctx, &user_id)?)
        }
    }
}
