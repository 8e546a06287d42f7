//! StateStore - redb-backed registry persistence for tootwatch.
//!
//! Provides typed CRUD operations over the release singleton, servers,
//! and admins. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Outcome of [`StateStore::remove_admin`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminRemoval {
    /// No admin with that account was registered.
    NotFound,
    /// The admin was removed; its server still has other admins.
    Removed,
    /// The admin was the last one of its server, which was removed too.
    RemovedWithServer,
}

/// Thread-safe registry store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RELEASE).map_err(map_err!(Table))?;
        txn.open_table(SERVERS).map_err(map_err!(Table))?;
        txn.open_table(ADMINS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Release ────────────────────────────────────────────────────

    /// Get the latest recorded upstream release, if any.
    pub fn get_release(&self) -> StateResult<Option<ReleaseInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(RELEASE).map_err(map_err!(Table))?;
        match table.get(RELEASE_KEY).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Insert or overwrite the release singleton.
    pub fn put_release(&self, release: &ReleaseInfo) -> StateResult<()> {
        let value = serde_json::to_vec(release).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RELEASE).map_err(map_err!(Table))?;
            table
                .insert(RELEASE_KEY, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(label = %release.label, "release stored");
        Ok(())
    }

    // ── Servers ────────────────────────────────────────────────────

    /// Insert or update a server record.
    pub fn put_server(&self, server: &ServerRecord) -> StateResult<()> {
        let value = serde_json::to_vec(server).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
            table
                .insert(server.domain.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(domain = %server.domain, "server stored");
        Ok(())
    }

    /// Get a server by domain.
    pub fn get_server(&self, domain: &str) -> StateResult<Option<ServerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
        match table.get(domain).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all tracked servers.
    pub fn list_servers(&self) -> StateResult<Vec<ServerRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// Apply `f` to a server record and persist the result in one write
    /// transaction.
    ///
    /// Returns `None` without writing if the server does not exist. If
    /// anything fails before commit the transaction is dropped and nothing
    /// is persisted.
    pub fn update_server<T>(
        &self,
        domain: &str,
        f: impl FnOnce(&mut ServerRecord) -> T,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let result;
        {
            let mut table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
            let current: Option<ServerRecord> = match table.get(domain).map_err(map_err!(Read))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let Some(mut server) = current else {
                return Ok(None);
            };

            result = f(&mut server);

            let value = serde_json::to_vec(&server).map_err(map_err!(Serialize))?;
            table
                .insert(domain, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(Some(result))
    }

    /// Delete a server by domain. Returns true if it existed.
    pub fn delete_server(&self, domain: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(SERVERS).map_err(map_err!(Table))?;
            existed = table.remove(domain).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%domain, existed, "server deleted");
        Ok(existed)
    }

    // ── Admins ─────────────────────────────────────────────────────

    /// Insert or update an admin record.
    pub fn put_admin(&self, admin: &AdminRecord) -> StateResult<()> {
        let value = serde_json::to_vec(admin).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ADMINS).map_err(map_err!(Table))?;
            table
                .insert(admin.account.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an admin by account.
    pub fn get_admin(&self, account: &str) -> StateResult<Option<AdminRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ADMINS).map_err(map_err!(Table))?;
        match table.get(account).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// List all admins.
    pub fn list_admins(&self) -> StateResult<Vec<AdminRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ADMINS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    /// List the admins registered for one server.
    pub fn list_admins_for_server(&self, domain: &str) -> StateResult<Vec<AdminRecord>> {
        Ok(self
            .list_admins()?
            .into_iter()
            .filter(|admin| admin.domain == domain)
            .collect())
    }

    /// Register (or re-register) an admin, creating its server if needed.
    ///
    /// The server domain is taken from the account. `web_domain` defaults
    /// to that domain for new servers; when given for an existing server it
    /// replaces the stored one. Returns the stored admin and whether a new
    /// server was created.
    pub fn register_admin(
        &self,
        account: &str,
        web_domain: Option<&str>,
        update_type: UpdateType,
    ) -> StateResult<(AdminRecord, bool)> {
        let account = account.strip_prefix('@').unwrap_or(account);
        let domain = account_domain(account)
            .ok_or_else(|| StateError::InvalidAccount(account.to_string()))?
            .to_string();

        let admin = AdminRecord {
            account: account.to_string(),
            update_type,
            domain: domain.clone(),
        };

        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let created;
        {
            let mut servers = txn.open_table(SERVERS).map_err(map_err!(Table))?;
            let existing: Option<ServerRecord> =
                match servers.get(domain.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(decode(guard.value())?),
                    None => None,
                };
            created = existing.is_none();

            let server = match existing {
                Some(mut server) => {
                    if let Some(web) = web_domain {
                        server.web_domain = web.to_string();
                    }
                    server
                }
                None => ServerRecord::new(domain.as_str(), web_domain.unwrap_or(domain.as_str())),
            };
            let value = serde_json::to_vec(&server).map_err(map_err!(Serialize))?;
            servers
                .insert(domain.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut admins = txn.open_table(ADMINS).map_err(map_err!(Table))?;
            let value = serde_json::to_vec(&admin).map_err(map_err!(Serialize))?;
            admins
                .insert(admin.account.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(account = %admin.account, %domain, created, "admin registered");
        Ok((admin, created))
    }

    /// Change an admin's update type. Returns false if the admin is unknown.
    pub fn set_update_type(&self, account: &str, update_type: UpdateType) -> StateResult<bool> {
        let Some(mut admin) = self.get_admin(account)? else {
            return Ok(false);
        };
        admin.update_type = update_type;
        self.put_admin(&admin)?;
        Ok(true)
    }

    /// Remove an admin, deleting its server when no other admin remains.
    pub fn remove_admin(&self, account: &str) -> StateResult<AdminRemoval> {
        let account = account.strip_prefix('@').unwrap_or(account);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removal;
        {
            let mut admins = txn.open_table(ADMINS).map_err(map_err!(Table))?;
            let removed: Option<AdminRecord> = match admins.remove(account).map_err(map_err!(Write))? {
                Some(guard) => Some(decode(guard.value())?),
                None => None,
            };
            let Some(removed) = removed else {
                return Ok(AdminRemoval::NotFound);
            };

            let mut orphaned = true;
            for entry in admins.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let other: AdminRecord = decode(value.value())?;
                if other.domain == removed.domain {
                    orphaned = false;
                    break;
                }
            }

            if orphaned {
                let mut servers = txn.open_table(SERVERS).map_err(map_err!(Table))?;
                servers
                    .remove(removed.domain.as_str())
                    .map_err(map_err!(Write))?;
                removal = AdminRemoval::RemovedWithServer;
            } else {
                removal = AdminRemoval::Removed;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%account, ?removal, "admin removed");
        Ok(removal)
    }
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}
