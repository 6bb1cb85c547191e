//! Centralized schema definitions for the catalog database.
//!
//! Everything lives in one SQLite file (`catalog.db`) under the store root:
//! 1. expressions: user-authored programs, mutable body, stable id.
//! 2. modules + module_versions: append-only version chains.
//! 3. dois: publication records returned by Zenodo.
//! 4. users: the user directory read when refreshing creator snapshots.
//! 5. memoised_items: cached computation results, reaped by the GC.
//!
//! List-valued fields are stored as JSON text columns.

pub const CATALOG_DB_NAME: &str = "catalog.db";
pub const CATALOG_SCHEMA_VERSION: u32 = 1;

pub const META_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
";

pub const EXPRESSIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS expressions (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        source_code TEXT NOT NULL CHECK (length(source_code) > 0),
        source_language TEXT NOT NULL,
        comments TEXT NOT NULL DEFAULT '',
        tags TEXT NOT NULL DEFAULT '[]', -- JSON array of strings
        module_references TEXT NOT NULL DEFAULT '[]', -- JSON array of {moduleID, version}
        shared INTEGER NOT NULL DEFAULT 0,
        creator_name TEXT NOT NULL,
        creator_user_id TEXT NOT NULL,
        creator_email TEXT NOT NULL,
        created_unix_time_sec INTEGER NOT NULL,
        modified_unix_time_sec INTEGER NOT NULL,
        recent_exec_stats TEXT, -- JSON object, cleared on edit
        doi_metadata TEXT -- JSON object, set on publication
    )
";
pub const EXPRESSIONS_INDEX_CREATOR: &str =
    "CREATE INDEX IF NOT EXISTS idx_expressions_creator ON expressions(creator_user_id)";
pub const EXPRESSIONS_INDEX_SHARED: &str =
    "CREATE INDEX IF NOT EXISTS idx_expressions_shared ON expressions(shared)";

pub const MODULES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        comments TEXT NOT NULL DEFAULT '',
        shared INTEGER NOT NULL DEFAULT 1,
        creator_name TEXT NOT NULL,
        creator_user_id TEXT NOT NULL,
        creator_email TEXT NOT NULL,
        created_unix_time_sec INTEGER NOT NULL,
        modified_unix_time_sec INTEGER NOT NULL
    )
";

pub const MODULE_VERSIONS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS module_versions (
        id TEXT PRIMARY KEY, -- <module_id>-v<major>.<minor>.<patch>
        module_id TEXT NOT NULL,
        major INTEGER NOT NULL CHECK (major >= 0),
        minor INTEGER NOT NULL CHECK (minor >= 0),
        patch INTEGER NOT NULL CHECK (patch >= 0),
        source_code TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]', -- JSON array of strings
        comments TEXT NOT NULL DEFAULT '',
        time_stamp_unix_sec INTEGER NOT NULL,
        UNIQUE(module_id, major, minor, patch),
        FOREIGN KEY(module_id) REFERENCES modules(id)
    )
";
pub const MODULE_VERSIONS_INDEX_MODULE: &str =
    "CREATE INDEX IF NOT EXISTS idx_module_versions_module ON module_versions(module_id)";

pub const DOIS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS dois (
        id TEXT PRIMARY KEY, -- expression id or module version id
        metadata TEXT NOT NULL, -- JSON DoiMetadata
        recorded_unix_sec INTEGER NOT NULL
    )
";

pub const USERS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL DEFAULT '',
        updated_unix_sec INTEGER NOT NULL
    )
";

pub const MEMOISED_ITEMS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS memoised_items (
        key TEXT PRIMARY KEY,
        memo_time_unix_sec INTEGER NOT NULL,
        data BLOB NOT NULL,
        scan_id TEXT NOT NULL DEFAULT '',
        quant_id TEXT NOT NULL DEFAULT '',
        expr_id TEXT NOT NULL DEFAULT '',
        data_size INTEGER NOT NULL,
        last_read_time_unix_sec INTEGER NOT NULL,
        memo_writer_user_id TEXT NOT NULL DEFAULT '',
        no_gc INTEGER NOT NULL DEFAULT 0
    )
";
pub const MEMOISED_ITEMS_INDEX_LAST_READ: &str = "CREATE INDEX IF NOT EXISTS idx_memoised_items_last_read ON memoised_items(last_read_time_unix_sec)";

/// Statements run, in order, by `db::initialize_catalog_db`.
pub const CATALOG_SCHEMA_STATEMENTS: &[&str] = &[
    META_SCHEMA,
    EXPRESSIONS_SCHEMA,
    EXPRESSIONS_INDEX_CREATOR,
    EXPRESSIONS_INDEX_SHARED,
    MODULES_SCHEMA,
    MODULE_VERSIONS_SCHEMA,
    MODULE_VERSIONS_INDEX_MODULE,
    DOIS_SCHEMA,
    USERS_SCHEMA,
    MEMOISED_ITEMS_SCHEMA,
    MEMOISED_ITEMS_INDEX_LAST_READ,
];
