//! redb table definitions for the tootwatch registry.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Latest upstream release, a single row under [`RELEASE_KEY`].
pub const RELEASE: TableDefinition<&str, &[u8]> = TableDefinition::new("release");

/// Tracked servers keyed by `{domain}`.
pub const SERVERS: TableDefinition<&str, &[u8]> = TableDefinition::new("servers");

/// Registered admins keyed by `{user}@{domain}`.
pub const ADMINS: TableDefinition<&str, &[u8]> = TableDefinition::new("admins");

/// Key of the only row in [`RELEASE`].
pub const RELEASE_KEY: &str = "latest";
