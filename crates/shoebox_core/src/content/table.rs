//! Content table, cached entity handles and save/delete paths.

use super::{Content, Identity, TableSpec};
use crate::error::{CoreError, CoreResult};
use crate::kv::DbHandle;
use crate::metadata;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};
use shoebox_codec::{from_message, TypedValue};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// A table of entities of type `T`.
///
/// Cloning a table shares its cache.
pub struct ContentTable<T: Content> {
    inner: Arc<TableInner<T>>,
}

pub(super) struct TableInner<T: Content> {
    pub(super) spec: Arc<TableSpec>,
    cache: Mutex<Cache<T>>,
    /// Next local id to hand out; seeded from storage on first use.
    next_id: Mutex<Option<i64>>,
}

struct Cache<T: Content> {
    live: HashMap<i64, Weak<ContentCell<T>>>,
    deleted: HashSet<i64>,
}

pub(super) struct ContentCell<T: Content> {
    local_id: i64,
    deleted: AtomicBool,
    spec: Arc<TableSpec>,
    /// Owning table; empty for instances that are not cached.
    table: Weak<TableInner<T>>,
    state: Arc<Mutex<ContentState<T>>>,
}

struct ContentState<T> {
    entity: T,
}

impl<T: Content> Drop for ContentCell<T> {
    fn drop(&mut self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let mut cache = table.cache.lock();
        let dying = cache
            .live
            .get(&self.local_id)
            .map_or(false, |weak| weak.strong_count() == 0);
        if dying {
            cache.live.remove(&self.local_id);
        }
    }
}

impl<T: Content> ContentCell<T> {
    fn new(entity: T, spec: Arc<TableSpec>, table: Weak<TableInner<T>>) -> Self {
        Self {
            local_id: entity.identity().local_id(),
            deleted: AtomicBool::new(false),
            spec,
            table,
            state: Arc::new(Mutex::new(ContentState { entity })),
        }
    }
}

impl<T: Content> ContentTable<T> {
    /// Creates a table with the given layout.
    #[must_use]
    pub fn new(spec: TableSpec) -> Self {
        Self {
            inner: Arc::new(TableInner {
                spec: Arc::new(spec),
                cache: Mutex::new(Cache {
                    live: HashMap::new(),
                    deleted: HashSet::new(),
                }),
                next_id: Mutex::new(None),
            }),
        }
    }

    /// Returns the table layout.
    #[must_use]
    pub fn spec(&self) -> &TableSpec {
        &self.inner.spec
    }

    /// Number of entities currently held in memory.
    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.inner
            .cache
            .lock()
            .live
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Creates a new entity with a fresh local id, locked for the caller.
    ///
    /// The advanced id counter is written to `updates`.
    pub fn new_content(&self, updates: &DbHandle) -> CoreResult<ContentGuard<T>> {
        let local_id = self.allocate_id(updates)?;
        let cell = Arc::new(ContentCell::new(
            T::with_local_id(local_id),
            Arc::clone(&self.inner.spec),
            Arc::downgrade(&self.inner),
        ));
        let guard = ContentGuard::acquire(Arc::clone(&cell));
        self.inner
            .cache
            .lock()
            .live
            .insert(local_id, Arc::downgrade(&cell));
        debug!(table = self.inner.spec.name, local_id, "created entity");
        Ok(guard)
    }

    fn allocate_id(&self, updates: &DbHandle) -> CoreResult<i64> {
        let spec = &self.inner.spec;
        let mut next = self.inner.next_id.lock();
        let id = match *next {
            Some(id) => id,
            None => {
                let stored = metadata::next_id(updates, spec.name)?;
                let after_last = match updates.last_with_prefix(spec.primary_prefix)? {
                    Some((key, _)) => spec.decode_primary_key(&key)? + 1,
                    None => 1,
                };
                stored.max(after_last)
            }
        };
        metadata::set_next_id(updates, spec.name, id + 1)?;
        *next = Some(id + 1);
        Ok(id)
    }

    /// Loads the entity with `local_id`.
    ///
    /// Returns the cached instance when one is alive. Missing, deleted and
    /// undecodable records all yield `None`; corruption is logged. Snapshot
    /// handles always get a private instance that is never cached.
    ///
    /// # Errors
    ///
    /// Only errors from reading `db` itself, such as a closed transaction.
    pub fn load(&self, local_id: i64, db: &DbHandle) -> CoreResult<Option<ContentHandle<T>>> {
        self.load_checked(local_id, None, db)
    }

    /// Loads the entity the server knows as `server_id`.
    pub fn load_by_server_id(
        &self,
        server_id: &str,
        db: &DbHandle,
    ) -> CoreResult<Option<ContentHandle<T>>> {
        let spec = &self.inner.spec;
        let Some(bytes) = db.get(spec.server_key(server_id))? else {
            return Ok(None);
        };
        match i64::decode_value(&bytes) {
            Ok(local_id) => self.load_checked(local_id, Some(server_id), db),
            Err(e) => {
                warn!(table = spec.name, server_id, error = %e, "undecodable server index entry");
                Ok(None)
            }
        }
    }

    fn load_checked(
        &self,
        local_id: i64,
        server_id: Option<&str>,
        db: &DbHandle,
    ) -> CoreResult<Option<ContentHandle<T>>> {
        let cacheable = !db.is_snapshot();
        if cacheable {
            match self.cached(local_id) {
                Lookup::Deleted => return Ok(None),
                Lookup::Live(cell) => return Ok(Some(ContentHandle(cell))),
                Lookup::Miss => {}
            }
        }

        let spec = &self.inner.spec;
        let Some(bytes) = db.get(spec.primary_key(local_id))? else {
            return Ok(None);
        };

        // Decode outside the cache lock.
        let entity: T = match from_message(&bytes) {
            Ok(entity) => entity,
            Err(e) => {
                warn!(table = spec.name, local_id, error = %e, "undecodable entity record");
                return Ok(None);
            }
        };
        let identity = entity.identity();
        if identity.local_id() != local_id {
            warn!(
                table = spec.name,
                local_id,
                stored = identity.local_id(),
                "entity record id does not match its key"
            );
            return Ok(None);
        }
        if let Some(expected) = server_id {
            if identity.server_id() != Some(expected) {
                warn!(
                    table = spec.name,
                    local_id,
                    server_id = expected,
                    "server index points at an entity with another server id"
                );
                return Ok(None);
            }
        }

        let table = if cacheable {
            Arc::downgrade(&self.inner)
        } else {
            Weak::new()
        };
        let fresh = Arc::new(ContentCell::new(entity, Arc::clone(spec), table));
        if !cacheable {
            return Ok(Some(ContentHandle(fresh)));
        }

        let mut cache = self.inner.cache.lock();
        if cache.deleted.contains(&local_id) {
            drop(cache);
            return Ok(None);
        }
        if let Some(existing) = cache.live.get(&local_id).and_then(Weak::upgrade) {
            // Lost a race with another load; `fresh` is dropped unpublished.
            drop(cache);
            return Ok(Some(ContentHandle(existing)));
        }
        cache.live.insert(local_id, Arc::downgrade(&fresh));
        drop(cache);
        Ok(Some(ContentHandle(fresh)))
    }

    fn cached(&self, local_id: i64) -> Lookup<T> {
        let cache = self.inner.cache.lock();
        if cache.deleted.contains(&local_id) {
            return Lookup::Deleted;
        }
        let live = cache.live.get(&local_id).and_then(Weak::upgrade);
        // The upgraded handle must outlive the lock: dropping the last
        // strong reference re-enters the cache.
        drop(cache);
        match live {
            Some(cell) if cell.deleted.load(Ordering::Acquire) => Lookup::Deleted,
            Some(cell) => Lookup::Live(cell),
            None => Lookup::Miss,
        }
    }

    /// Loads every entity in the table, in local id order.
    pub fn scan(&self, db: &DbHandle) -> CoreResult<Vec<ContentHandle<T>>> {
        let spec = &self.inner.spec;
        let mut out = Vec::new();
        for (key, _) in db.scan_prefix(spec.primary_prefix)? {
            let local_id = match spec.decode_primary_key(&key) {
                Ok(id) => id,
                Err(e) => {
                    warn!(table = spec.name, error = %e, "skipping malformed primary key");
                    continue;
                }
            };
            if let Some(handle) = self.load(local_id, db)? {
                out.push(handle);
            }
        }
        Ok(out)
    }

    fn mark_deleted(&self, local_id: i64) {
        self.inner.cache.lock().deleted.insert(local_id);
    }
}

impl<T: Content> Clone for ContentTable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Content> fmt::Debug for ContentTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentTable")
            .field("name", &self.inner.spec.name)
            .field("cached", &self.cached_count())
            .finish()
    }
}

enum Lookup<T: Content> {
    Live(Arc<ContentCell<T>>),
    Deleted,
    Miss,
}

/// A shared reference to a loaded entity.
///
/// Handles to the same cached entity compare equal with
/// [`ContentHandle::same_instance`]. The entity stays cached while any
/// handle is alive.
pub struct ContentHandle<T: Content>(Arc<ContentCell<T>>);

impl<T: Content> ContentHandle<T> {
    /// Returns the entity's local id.
    #[must_use]
    pub fn local_id(&self) -> i64 {
        self.0.local_id
    }

    /// True once the entity has been deleted through any handle.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.0.deleted.load(Ordering::Acquire)
    }

    /// True if both handles refer to the same in-memory object.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Takes the entity lock, blocking while another guard holds it.
    #[must_use]
    pub fn lock(&self) -> ContentGuard<T> {
        ContentGuard::acquire(Arc::clone(&self.0))
    }

    /// Takes the entity lock if it is free.
    #[must_use]
    pub fn try_lock(&self) -> Option<ContentGuard<T>> {
        let guard = self.0.state.try_lock_arc()?;
        Some(ContentGuard {
            cell: Arc::clone(&self.0),
            guard,
        })
    }

    /// Runs `f` with shared access to the entity. Blocks while a guard is
    /// held, including one held by the caller.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.0.state.lock().entity)
    }
}

impl<T: Content> Clone for ContentHandle<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: Content> fmt::Debug for ContentHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentHandle")
            .field("table", &self.0.spec.name)
            .field("local_id", &self.0.local_id)
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Exclusive access to an entity. Dereferences to the entity.
///
/// Dropping the guard unlocks without saving.
pub struct ContentGuard<T: Content> {
    cell: Arc<ContentCell<T>>,
    guard: ArcMutexGuard<RawMutex, ContentState<T>>,
}

impl<T: Content> ContentGuard<T> {
    fn acquire(cell: Arc<ContentCell<T>>) -> Self {
        let guard = cell.state.lock_arc();
        Self { cell, guard }
    }

    /// Returns the entity's local id.
    #[must_use]
    pub fn local_id(&self) -> i64 {
        self.cell.local_id
    }

    /// Returns a shared handle to the locked entity.
    #[must_use]
    pub fn handle(&self) -> ContentHandle<T> {
        ContentHandle(Arc::clone(&self.cell))
    }

    /// Writes the entity and its derived index entries to `updates`.
    ///
    /// Order: identity check, server index, secondary reindex, the type's
    /// save hook, then the primary record. Index entries are diffed against
    /// the record `updates` currently holds, so an abandoned earlier save
    /// leaves nothing stale behind.
    ///
    /// # Errors
    ///
    /// - `InvalidIdentityTransition` if the identity changed other than by a
    ///   first server id assignment
    /// - `InvalidOperation` if the entity was deleted
    /// - any error writing to `updates`
    pub fn save(&mut self, updates: &DbHandle) -> CoreResult<()> {
        if self.cell.deleted.load(Ordering::Acquire) {
            return Err(CoreError::invalid_operation(format!(
                "{} {} was deleted",
                self.cell.spec.name, self.cell.local_id
            )));
        }
        let spec = Arc::clone(&self.cell.spec);
        let local_id = self.cell.local_id;
        let state = &mut *self.guard;

        let (saved_identity, saved_index_keys) = persisted::<T>(&spec, local_id, updates)?;
        if Identity::transition(&saved_identity, state.entity.identity())? {
            if let Some(new) = state.entity.identity().server_id() {
                updates.put_value(spec.server_key(new), &local_id)?;
                debug!(table = spec.name, local_id, server_id = new, "server id assigned");
            }
        }

        let index_keys = state.entity.index_keys();
        reindex(updates, local_id, &saved_index_keys, &index_keys)?;

        state.entity.save_hook(updates)?;
        updates.put_message(spec.primary_key(local_id), &state.entity)?;
        Ok(())
    }

    /// Saves, then releases the lock.
    pub fn save_and_unlock(mut self, updates: &DbHandle) -> CoreResult<()> {
        self.save(updates)
    }

    /// Deletes the entity permanently, then releases the lock.
    ///
    /// The entity is flagged deleted before any write, so concurrent loads
    /// stop returning it even if `updates` is later abandoned.
    pub fn delete_and_unlock(mut self, updates: &DbHandle) -> CoreResult<()> {
        self.cell.deleted.store(true, Ordering::Release);
        if let Some(table) = self.cell.table.upgrade() {
            table.cache.lock().deleted.insert(self.cell.local_id);
        }

        let spec = Arc::clone(&self.cell.spec);
        let local_id = self.cell.local_id;
        let state = &mut *self.guard;
        let (saved_identity, saved_index_keys) = persisted::<T>(&spec, local_id, updates)?;

        let mut server_ids: Vec<&str> = saved_identity.server_id().into_iter().collect();
        if let Some(current) = state.entity.identity().server_id() {
            if !server_ids.contains(&current) {
                server_ids.push(current);
            }
        }
        for server_id in server_ids {
            updates.delete(spec.server_key(server_id))?;
        }

        let mut index_keys: HashSet<Vec<u8>> = saved_index_keys.into_iter().collect();
        index_keys.extend(state.entity.index_keys());
        for key in index_keys {
            updates.delete(key)?;
        }

        state.entity.delete_hook(updates)?;
        updates.delete(spec.primary_key(local_id))?;
        debug!(table = spec.name, local_id, "deleted entity");
        Ok(())
    }

    /// Releases the lock without saving.
    pub fn unlock(self) {}
}

impl<T: Content> ContentTable<T> {
    /// Deletes the entity behind `handle`, taking its lock first.
    pub fn delete(&self, handle: &ContentHandle<T>, updates: &DbHandle) -> CoreResult<()> {
        let result = handle.lock().delete_and_unlock(updates);
        self.mark_deleted(handle.local_id());
        result
    }
}

/// Identity and index keys of the record `updates` holds for `local_id`.
/// A missing or undecodable record counts as never saved.
fn persisted<T: Content>(
    spec: &TableSpec,
    local_id: i64,
    updates: &DbHandle,
) -> CoreResult<(Identity, Vec<Vec<u8>>)> {
    let Some(bytes) = updates.get(spec.primary_key(local_id))? else {
        return Ok((Identity::local(local_id), Vec::new()));
    };
    match from_message::<T>(&bytes) {
        Ok(stored) if stored.identity().local_id() == local_id => {
            Ok((stored.identity().clone(), stored.index_keys()))
        }
        Ok(_) | Err(_) => {
            warn!(table = spec.name, local_id, "overwriting unreadable entity record");
            Ok((Identity::local(local_id), Vec::new()))
        }
    }
}

fn reindex(
    updates: &DbHandle,
    local_id: i64,
    saved: &[Vec<u8>],
    current: &[Vec<u8>],
) -> CoreResult<()> {
    for stale in saved.iter().filter(|key| !current.contains(*key)) {
        updates.delete(stale)?;
    }
    for key in current.iter().filter(|key| !saved.contains(*key)) {
        updates.put_value(key, &local_id)?;
    }
    Ok(())
}

impl<T: Content> Deref for ContentGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard.entity
    }
}

impl<T: Content> DerefMut for ContentGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard.entity
    }
}

impl<T: Content> fmt::Debug for ContentGuard<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentGuard")
            .field("table", &self.cell.spec.name)
            .field("local_id", &self.cell.local_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use serde::{Deserialize, Serialize};
    use shoebox_codec::KeyBuilder;

    #[derive(Debug, Serialize, Deserialize)]
    struct Note {
        identity: Identity,
        rank: i64,
        text: String,
    }

    impl Content for Note {
        fn with_local_id(local_id: i64) -> Self {
            Self {
                identity: Identity::local(local_id),
                rank: 0,
                text: String::new(),
            }
        }

        fn identity(&self) -> &Identity {
            &self.identity
        }

        fn identity_mut(&mut self) -> &mut Identity {
            &mut self.identity
        }

        fn index_keys(&self) -> Vec<Vec<u8>> {
            vec![KeyBuilder::with_prefix("nr/")
                .i64(self.rank)
                .i64(self.identity.local_id())
                .build()]
        }
    }

    fn notes() -> ContentTable<Note> {
        ContentTable::new(TableSpec {
            name: "notes",
            primary_prefix: "n/",
            server_prefix: "ns/",
            index_prefixes: &["nr/"],
            fsck_version: 1,
        })
    }

    fn create(table: &ContentTable<Note>, db: &Database, text: &str) -> i64 {
        let txn = db.new_transaction().unwrap();
        let mut note = table.new_content(&txn).unwrap();
        note.text = text.into();
        let id = note.local_id();
        note.save_and_unlock(&txn).unwrap();
        txn.commit().unwrap();
        id
    }

    #[test]
    fn ids_are_allocated_monotonically() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let a = create(&table, &db, "a");
        let b = create(&table, &db, "b");
        assert_eq!((a, b), (1, 2));

        // A fresh table over the same store continues the sequence.
        let again = notes();
        assert_eq!(create(&again, &db, "c"), 3);
    }

    #[test]
    fn loads_share_one_instance_until_dropped() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "hello");
        assert_eq!(table.cached_count(), 0);

        let first = table.load(id, &db.handle()).unwrap().unwrap();
        let second = table.load(id, &db.handle()).unwrap().unwrap();
        assert!(first.same_instance(&second));
        assert_eq!(table.cached_count(), 1);

        drop(first);
        assert_eq!(table.cached_count(), 1);
        drop(second);
        assert_eq!(table.cached_count(), 0);
    }

    #[test]
    fn snapshot_loads_are_private() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "hello");

        let live = table.load(id, &db.handle()).unwrap().unwrap();
        let snap = table.load(id, &db.new_snapshot()).unwrap().unwrap();
        assert!(!live.same_instance(&snap));
        assert_eq!(table.cached_count(), 1);
    }

    #[test]
    fn server_id_assignment_maintains_index() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "x");

        let txn = db.new_transaction().unwrap();
        let handle = table.load(id, &txn).unwrap().unwrap();
        let mut note = handle.lock();
        note.identity_mut().assign_server_id("srv-1");
        note.save_and_unlock(&txn).unwrap();
        txn.commit().unwrap();

        let found = table.load_by_server_id("srv-1", &db.handle()).unwrap().unwrap();
        assert!(found.same_instance(&handle));

        let mut note = handle.lock();
        note.identity_mut().assign_server_id("srv-2");
        let err = note.save(&db.handle()).unwrap_err();
        assert!(matches!(err, CoreError::InvalidIdentityTransition { .. }));
    }

    #[test]
    fn reindex_moves_index_entry() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "x");
        let handle = table.load(id, &db.handle()).unwrap().unwrap();

        let mut note = handle.lock();
        note.rank = 9;
        note.save_and_unlock(&db.handle()).unwrap();

        let index = db.handle().scan_prefix("nr/").unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(
            index[0].0,
            KeyBuilder::with_prefix("nr/").i64(9).i64(id).build()
        );
    }

    #[test]
    fn save_after_abandoned_save_writes_every_entry() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "x");
        let handle = table.load(id, &db.handle()).unwrap().unwrap();

        let txn = db.new_transaction().unwrap();
        let mut note = handle.lock();
        note.rank = 4;
        note.identity_mut().assign_server_id("srv-4");
        note.save(&txn).unwrap();
        txn.abandon().unwrap();

        note.save_and_unlock(&db.handle()).unwrap();

        let direct = db.handle();
        let index: Vec<_> = direct
            .scan_prefix("nr/")
            .unwrap()
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(index, vec![KeyBuilder::with_prefix("nr/").i64(4).i64(id).build()]);
        let found = table.load_by_server_id("srv-4", &direct).unwrap().unwrap();
        assert!(found.same_instance(&handle));
    }

    #[test]
    fn deleted_entities_never_come_back() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "x");
        let handle = table.load(id, &db.handle()).unwrap().unwrap();

        let txn = db.new_transaction().unwrap();
        handle.lock().delete_and_unlock(&txn).unwrap();
        assert!(handle.is_deleted());
        txn.abandon().unwrap();

        assert!(table.load(id, &db.handle()).unwrap().is_none());
        assert!(handle.lock().save(&db.handle()).is_err());
        drop(handle);
        assert!(table.load(id, &db.handle()).unwrap().is_none());
    }

    #[test]
    fn delete_removes_derived_entries() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let id = create(&table, &db, "x");
        let handle = table.load(id, &db.handle()).unwrap().unwrap();
        {
            let mut note = handle.lock();
            note.identity_mut().assign_server_id("srv");
            note.save_and_unlock(&db.handle()).unwrap();
        }
        table.delete(&handle, &db.handle()).unwrap();

        let direct = db.handle();
        assert_eq!(direct.count_prefix("n/").unwrap(), 0);
        assert_eq!(direct.count_prefix("ns/").unwrap(), 0);
        assert_eq!(direct.count_prefix("nr/").unwrap(), 0);
    }

    #[test]
    fn corrupt_record_loads_as_none() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        db.handle().put(table.spec().primary_key(5), b"\xff\x00garbage").unwrap();
        assert!(table.load(5, &db.handle()).unwrap().is_none());

        let id = create(&table, &db, "real");
        let bytes = db.handle().get(table.spec().primary_key(id)).unwrap().unwrap();
        db.handle().put(table.spec().primary_key(id + 100), bytes).unwrap();
        assert!(table.load(id + 100, &db.handle()).unwrap().is_none());
    }

    #[test]
    fn try_lock_fails_while_guarded() {
        let db = Database::open_in_memory().unwrap();
        let table = notes();
        let txn = db.new_transaction().unwrap();
        let guard = table.new_content(&txn).unwrap();
        let handle = guard.handle();
        assert!(handle.try_lock().is_none());
        guard.unlock();
        assert!(handle.try_lock().is_some());
    }
}
