use crate::core::{MarineError, MarineId, OwnedMarine, Result};
use chrono::{DateTime, Local};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Ordered contents of the shared store.
///
/// `ordered` is keyed by (height, id) so iteration is the collection order;
/// `index` maps an id back to its height for O(log n) lookups by id.
#[derive(Debug, Default)]
pub struct StoreTable {
    ordered: BTreeMap<(i64, MarineId), OwnedMarine>,
    index: HashMap<MarineId, i64>,
}

impl StoreTable {
    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Inserts a record. Ids are unique across the store.
    pub fn insert(&mut self, record: OwnedMarine) -> Result<()> {
        let id = record.id();
        if self.index.contains_key(&id) {
            return Err(MarineError::Execution(format!(
                "record with id {} is already stored",
                id
            )));
        }
        self.index.insert(id, record.marine.height);
        self.ordered.insert(record.order_key(), record);
        Ok(())
    }

    pub fn get(&self, id: MarineId) -> Option<&OwnedMarine> {
        let height = self.index.get(&id)?;
        self.ordered.get(&(*height, id))
    }

    pub fn remove(&mut self, id: MarineId) -> Option<OwnedMarine> {
        let height = self.index.remove(&id)?;
        self.ordered.remove(&(height, id))
    }

    /// Minimum element under the collection order.
    pub fn first(&self) -> Option<&OwnedMarine> {
        self.ordered.values().next()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OwnedMarine> {
        self.ordered.values()
    }

    /// First record (in collection order) matching the predicate.
    pub fn find<F>(&self, mut predicate: F) -> Option<&OwnedMarine>
    where
        F: FnMut(&OwnedMarine) -> bool,
    {
        self.ordered.values().find(|r| predicate(r))
    }

    /// Ids of all records matching the predicate, in collection order.
    pub fn select_ids<F>(&self, mut predicate: F) -> Vec<MarineId>
    where
        F: FnMut(&OwnedMarine) -> bool,
    {
        self.ordered
            .values()
            .filter(|r| predicate(r))
            .map(OwnedMarine::id)
            .collect()
    }

    /// Removes every record matching the predicate in one step.
    pub fn remove_where<F>(&mut self, mut predicate: F) -> Vec<OwnedMarine>
    where
        F: FnMut(&OwnedMarine) -> bool,
    {
        let ids = self.select_ids(&mut predicate);
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}

/// Concurrency-safe ordered collection of owned marines.
///
/// Single operations take the lock once and are atomic. Handlers that must
/// check and then mutate (or call the gateway in between) hold the guard from
/// [`SharedStore::write`] for the whole sequence.
pub struct SharedStore {
    table: RwLock<StoreTable>,
    created_at: DateTime<Local>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(StoreTable::default()),
            created_at: Local::now(),
        }
    }

    /// Builds the store from the gateway's records.
    pub fn hydrate<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = OwnedMarine>,
    {
        let mut table = StoreTable::default();
        for record in records {
            table.insert(record)?;
        }
        Ok(Self {
            table: RwLock::new(table),
            created_at: Local::now(),
        })
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub async fn read(&self) -> RwLockReadGuard<'_, StoreTable> {
        self.table.read().await
    }

    pub async fn write(&self) -> RwLockWriteGuard<'_, StoreTable> {
        self.table.write().await
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    pub async fn insert(&self, record: OwnedMarine) -> Result<()> {
        self.table.write().await.insert(record)
    }

    pub async fn get(&self, id: MarineId) -> Option<OwnedMarine> {
        self.table.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: MarineId) -> Option<OwnedMarine> {
        self.table.write().await.remove(id)
    }

    /// All records in collection order.
    pub async fn snapshot(&self) -> Vec<OwnedMarine> {
        self.table.read().await.iter().cloned().collect()
    }

    pub async fn ids(&self) -> Vec<MarineId> {
        self.table.read().await.iter().map(OwnedMarine::id).collect()
    }
}

impl Default for SharedStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MeleeWeapon, SpaceMarine};

    fn owned(id: MarineId, height: i64, owner: &str) -> OwnedMarine {
        OwnedMarine::new(
            SpaceMarine::new(format!("m{}", id), height, MeleeWeapon::ChainSword).with_id(id),
            owner,
        )
    }

    #[tokio::test]
    async fn test_iteration_is_ordered_by_height_then_id() {
        let store = SharedStore::new();
        store.insert(owned(1, 30, "a")).await.unwrap();
        store.insert(owned(2, 10, "a")).await.unwrap();
        store.insert(owned(4, 20, "b")).await.unwrap();
        store.insert(owned(3, 20, "b")).await.unwrap();

        assert_eq!(store.ids().await, vec![2, 3, 4, 1]);
        assert_eq!(store.read().await.first().unwrap().id(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = SharedStore::new();
        store.insert(owned(1, 30, "a")).await.unwrap();
        assert!(store.insert(owned(1, 5, "b")).await.is_err());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(1).await.unwrap().marine.height, 30);
    }

    #[tokio::test]
    async fn test_remove_where_keeps_index_consistent() {
        let store = SharedStore::hydrate(vec![
            owned(1, 5, "a"),
            owned(2, 6, "b"),
            owned(3, 7, "a"),
        ])
        .unwrap();

        let removed = store.write().await.remove_where(|r| r.is_owned_by("a"));
        assert_eq!(removed.len(), 2);
        assert_eq!(store.ids().await, vec![2]);
        assert!(store.get(1).await.is_none());
        assert!(store.remove(3).await.is_none());
    }
}
