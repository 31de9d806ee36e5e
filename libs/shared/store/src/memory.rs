use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;
use uuid::Uuid;

use shared_models::DomainError;

/// One logical table of the durable store, keyed by entity id.
///
/// `try_update` runs the caller's closure on a copy of the row under the
/// table write lock and only writes the copy back when the closure succeeds.
/// That closure is the serializable unit the scheduling core builds its
/// atomicity contracts on: check-and-reserve, release, and notified-flag
/// claims all happen inside it, so two racing writers are strictly ordered
/// and a rejected update leaves the row untouched.
///
/// A poisoned lock surfaces as `StorageUnavailable`; the write that poisoned
/// it never becomes observable.
pub struct Table<T> {
    kind: &'static str,
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T: Clone> Table<T> {
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            rows: RwLock::new(HashMap::new()),
        }
    }

    /// Entity kind label used in `NotFound` errors.
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Insert a new row. Inserting an id that already exists is rejected:
    /// entity ids are generated once and an overwrite through `insert`
    /// signals a logic bug, not an update.
    pub fn insert(&self, id: Uuid, row: T) -> Result<(), DomainError> {
        let mut rows = self.write()?;
        if rows.contains_key(&id) {
            return Err(DomainError::validation(format!(
                "{} {} already exists",
                self.kind, id
            )));
        }
        rows.insert(id, row);
        debug!("{} {} inserted", self.kind, id);
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<T>, DomainError> {
        Ok(self.read()?.get(&id).cloned())
    }

    pub fn require(&self, id: Uuid) -> Result<T, DomainError> {
        self.get(id)?
            .ok_or_else(|| DomainError::not_found(self.kind, id))
    }

    pub fn list(&self) -> Result<Vec<T>, DomainError> {
        Ok(self.read()?.values().cloned().collect())
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>, DomainError> {
        Ok(self
            .read()?
            .values()
            .filter(|row| predicate(row))
            .cloned()
            .collect())
    }

    pub fn len(&self) -> Result<usize, DomainError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, DomainError> {
        Ok(self.read()?.is_empty())
    }

    /// Atomic read-modify-write. The closure sees a copy of the current row;
    /// the copy replaces the stored row only when the closure returns `Ok`,
    /// so a refused update is never partially visible.
    pub fn try_update<R>(
        &self,
        id: Uuid,
        mutate: impl FnOnce(&mut T) -> Result<R, DomainError>,
    ) -> Result<R, DomainError> {
        let mut rows = self.write()?;
        let current = rows
            .get(&id)
            .ok_or_else(|| DomainError::not_found(self.kind, id))?;
        let mut candidate = current.clone();
        let outcome = mutate(&mut candidate)?;
        rows.insert(id, candidate);
        Ok(outcome)
    }

    /// Remove a row. Used for compensating rollback of a just-inserted
    /// entity; business code never exposes deletes past that.
    pub fn remove(&self, id: Uuid) -> Result<Option<T>, DomainError> {
        Ok(self.write()?.remove(&id))
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<Uuid, T>>, DomainError> {
        self.rows
            .read()
            .map_err(|_| self.poisoned())
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<Uuid, T>>, DomainError> {
        self.rows
            .write()
            .map_err(|_| self.poisoned())
    }

    fn poisoned(&self) -> DomainError {
        DomainError::StorageUnavailable(format!("{} table lock poisoned", self.kind))
    }
}

impl<T: Clone> Default for Table<T> {
    fn default() -> Self {
        Self::new("row")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: u32,
        limit: u32,
    }

    fn table_with_counter(limit: u32) -> (Table<Counter>, Uuid) {
        let table = Table::new("counter");
        let id = Uuid::new_v4();
        table
            .insert(id, Counter { value: 0, limit })
            .expect("insert");
        (table, id)
    }

    #[test]
    fn require_reports_missing_rows() {
        let table: Table<Counter> = Table::new("counter");
        let id = Uuid::new_v4();
        assert_eq!(
            table.require(id),
            Err(DomainError::not_found("counter", id))
        );
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let (table, id) = table_with_counter(1);
        let result = table.insert(id, Counter { value: 9, limit: 9 });
        assert!(matches!(result, Err(DomainError::Validation(_))));
        // Original row untouched and still the only one.
        assert_eq!(table.require(id).unwrap().value, 0);
        assert_eq!(table.list().unwrap().len(), 1);
        assert!(!table.is_empty().unwrap());
    }

    #[test]
    fn remove_returns_the_row_and_clears_it() {
        let (table, id) = table_with_counter(1);
        let removed = table.remove(id).unwrap();
        assert_eq!(removed, Some(Counter { value: 0, limit: 1 }));
        assert!(table.get(id).unwrap().is_none());
        assert_eq!(table.remove(id).unwrap(), None);
    }

    #[test]
    fn refused_update_leaves_row_untouched() {
        let (table, id) = table_with_counter(1);
        let result: Result<(), DomainError> = table.try_update(id, |row| {
            row.value = 99;
            Err(DomainError::CapacityExhausted)
        });
        assert_eq!(result, Err(DomainError::CapacityExhausted));
        assert_eq!(table.require(id).unwrap().value, 0);
    }

    #[test]
    fn concurrent_bounded_increments_never_exceed_limit() {
        let (table, id) = table_with_counter(5);
        let table = Arc::new(table);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    table.try_update(id, |row| {
                        if row.value >= row.limit {
                            return Err(DomainError::CapacityExhausted);
                        }
                        row.value += 1;
                        Ok(())
                    })
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let successes = outcomes.iter().filter(|o| o.is_ok()).count();
        let rejections = outcomes
            .iter()
            .filter(|o| matches!(o, Err(DomainError::CapacityExhausted)))
            .count();

        assert_eq!(successes, 5);
        assert_eq!(rejections, 11);
        assert_eq!(table.require(id).unwrap().value, 5);
    }
}
