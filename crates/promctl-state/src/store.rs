//! StateStore — redb-backed persistence of promctl unit state.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::de::DeserializeOwned;
use tracing::debug;

use promctl_core::PeerRegistry;

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(StateError::open)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(StateError::open)?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(StateError::transaction)?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(REGISTRY).map_err(StateError::storage(REGISTRY_KEY))?;
        txn.open_table(APPLIED).map_err(StateError::storage(APPLIED_KEY))?;
        txn.open_table(FLAGS).map_err(StateError::storage(READY_KEY))?;
        txn.commit().map_err(StateError::transaction)?;
        Ok(())
    }

    // ── Whole-unit lifecycle ───────────────────────────────────────

    /// Load the unit state. An empty store yields the default state.
    pub fn load_unit_state(&self) -> StateResult<UnitState> {
        let txn = self.db.begin_read().map_err(StateError::transaction)?;

        let registry: PeerRegistry = {
            let table = txn.open_table(REGISTRY).map_err(StateError::storage(REGISTRY_KEY))?;
            read_value(&table, REGISTRY_KEY)?.unwrap_or_default()
        };
        let applied: AppliedState = {
            let table = txn.open_table(APPLIED).map_err(StateError::storage(APPLIED_KEY))?;
            read_value(&table, APPLIED_KEY)?.unwrap_or_default()
        };
        let ready: bool = {
            let table = txn.open_table(FLAGS).map_err(StateError::storage(READY_KEY))?;
            read_value(&table, READY_KEY)?.unwrap_or(false)
        };

        Ok(UnitState {
            registry,
            applied,
            ready,
        })
    }

    /// Persist the whole unit state in one write transaction.
    ///
    /// A stored readiness latch that is already set is never cleared.
    pub fn save_unit_state(&self, state: &UnitState) -> StateResult<()> {
        let registry = serde_json::to_vec(&state.registry).map_err(StateError::encode(REGISTRY_KEY))?;
        let applied = serde_json::to_vec(&state.applied).map_err(StateError::encode(APPLIED_KEY))?;

        let txn = self.db.begin_write().map_err(StateError::transaction)?;
        {
            let mut table = txn.open_table(REGISTRY).map_err(StateError::storage(REGISTRY_KEY))?;
            table
                .insert(REGISTRY_KEY, registry.as_slice())
                .map_err(StateError::storage(REGISTRY_KEY))?;
        }
        {
            let mut table = txn.open_table(APPLIED).map_err(StateError::storage(APPLIED_KEY))?;
            table
                .insert(APPLIED_KEY, applied.as_slice())
                .map_err(StateError::storage(APPLIED_KEY))?;
        }
        {
            let mut table = txn.open_table(FLAGS).map_err(StateError::storage(READY_KEY))?;
            let stored: bool = read_value(&table, READY_KEY)?.unwrap_or(false);
            let ready = serde_json::to_vec(&(stored || state.ready)).map_err(StateError::encode(READY_KEY))?;
            table
                .insert(READY_KEY, ready.as_slice())
                .map_err(StateError::storage(READY_KEY))?;
        }
        txn.commit().map_err(StateError::transaction)?;
        debug!(
            peers = state.registry.peers().len(),
            fingerprint = ?state.applied.fingerprint.as_ref().map(|f| f.short().to_string()),
            ready = state.ready,
            "unit state persisted"
        );
        Ok(())
    }

    // ── Individual readers ─────────────────────────────────────────

    /// Last applied configuration.
    pub fn get_applied(&self) -> StateResult<AppliedState> {
        self.read_single(APPLIED, APPLIED_KEY)
            .map(Option::unwrap_or_default)
    }

    /// Persisted peer registry.
    pub fn get_registry(&self) -> StateResult<PeerRegistry> {
        self.read_single(REGISTRY, REGISTRY_KEY)
            .map(Option::unwrap_or_default)
    }

    fn read_single<T: DeserializeOwned>(
        &self,
        def: TableDefinition<'static, &'static str, &'static [u8]>,
        key: &'static str,
    ) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(StateError::transaction)?;
        let table = txn.open_table(def).map_err(StateError::storage(key))?;
        read_value(&table, key)
    }
}

fn read_value<T, Tbl>(table: &Tbl, key: &'static str) -> StateResult<Option<T>>
where
    T: DeserializeOwned,
    Tbl: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key).map_err(StateError::storage(key))? {
        Some(guard) => {
            let value: T = serde_json::from_slice(guard.value()).map_err(StateError::decode(key))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promctl_core::{Fingerprint, NotificationEndpoint, PeerId, ScrapeJob};

    fn populated_state() -> UnitState {
        let mut registry = PeerRegistry::new();
        registry.record_scrape_job(&PeerId::from("api/0"), ScrapeJob::new("api"));
        registry.record_notification_endpoints(
            &PeerId::from("alertmanager"),
            vec![NotificationEndpoint::new("10.0.0.5:9093")],
        );
        UnitState {
            registry,
            applied: AppliedState {
                fingerprint: Some(Fingerprint::from_hex("abc123")),
                command: Some("/bin/prometheus --log.level=info".to_string()),
            },
            ready: true,
        }
    }

    #[test]
    fn empty_store_yields_default_state() {
        let store = StateStore::open_in_memory().unwrap();
        let state = store.load_unit_state().unwrap();
        assert_eq!(state, UnitState::default());
        assert!(state.applied.is_empty());
        assert!(!state.ready);
    }

    #[test]
    fn unit_state_roundtrip() {
        let store = StateStore::open_in_memory().unwrap();
        let state = populated_state();
        store.save_unit_state(&state).unwrap();

        assert_eq!(store.load_unit_state().unwrap(), state);
        assert_eq!(store.get_applied().unwrap(), state.applied);
        assert_eq!(store.get_registry().unwrap(), state.registry);
        assert!(store.load_unit_state().unwrap().ready);
    }

    #[test]
    fn ready_latch_never_cleared() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_unit_state(&populated_state()).unwrap();

        let mut state = store.load_unit_state().unwrap();
        state.ready = false;
        store.save_unit_state(&state).unwrap();

        assert!(store.load_unit_state().unwrap().ready);
    }

    #[test]
    fn overwrite_replaces_applied_state() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_unit_state(&populated_state()).unwrap();

        let mut state = store.load_unit_state().unwrap();
        state.applied = AppliedState {
            fingerprint: Some(Fingerprint::from_hex("def456")),
            command: None,
        };
        store.save_unit_state(&state).unwrap();

        let applied = store.get_applied().unwrap();
        assert_eq!(applied.fingerprint, Some(Fingerprint::from_hex("def456")));
        assert_eq!(applied.command, None);
    }

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");

        {
            let store = StateStore::open(&path).unwrap();
            store.save_unit_state(&populated_state()).unwrap();
        }

        let store = StateStore::open(&path).unwrap();
        assert_eq!(store.load_unit_state().unwrap(), populated_state());
    }

    #[test]
    fn corrupt_value_names_the_key() {
        let store = StateStore::open_in_memory().unwrap();
        store.save_unit_state(&populated_state()).unwrap();

        let txn = store.db.begin_write().unwrap();
        {
            let mut table = txn.open_table(APPLIED).unwrap();
            table.insert(APPLIED_KEY, b"{not json".as_slice()).unwrap();
        }
        txn.commit().unwrap();

        let err = store.load_unit_state().unwrap_err();
        assert!(matches!(err, StateError::Decode { key: APPLIED_KEY, .. }));
        assert!(err.to_string().contains("stored current is unreadable"));

        // The other pieces are still readable on their own.
        assert_eq!(store.get_registry().unwrap(), populated_state().registry);
        assert!(matches!(store.get_applied(), Err(StateError::Decode { .. })));
    }

    #[test]
    fn open_on_a_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(StateStore::open(dir.path()), Err(StateError::Open(_))));
    }
}
