//! One homogeneous, insertion-ordered collection of records.
//!
//! Lookups are linear scans: the data volumes are tens of records, and a scan
//! keeps storage order equal to insertion order for free.

use super::csv::CsvRecord;
use super::store::RecordStore;
use super::DatabaseError;

/// An entity kept in a [`RecordStore`] collection.
pub trait Record: CsvRecord + Clone + std::fmt::Debug {
    /// Fixed ceiling on the number of records of this type.
    const CAPACITY: usize;

    fn id(&self) -> u32;

    fn set_id(&mut self, id: u32);

    /// Secondary lookup key (username, MRN or code), matched case-insensitively.
    fn key(&self) -> &str;

    fn collection(store: &RecordStore) -> &Collection<Self>;

    fn collection_mut(store: &mut RecordStore) -> &mut Collection<Self>;

    fn entity() -> &'static str {
        Self::SCHEMA.entity
    }
}

#[derive(Debug, Clone)]
pub struct Collection<T> {
    items: Vec<T>,
    next_id: u32,
}

impl<T: Record> Default for Collection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Collection<T> {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            next_id: 1,
        }
    }

    /// Rebuild a collection from loaded records.
    ///
    /// Records past the capacity ceiling are dropped, as is a record holding
    /// `u32::MAX`, which would leave the counter nowhere to go. The id counter
    /// resumes after the highest loaded id.
    pub fn from_records(mut records: Vec<T>) -> Self {
        records.retain(|r| {
            let usable = r.id() != u32::MAX;
            if !usable {
                tracing::warn!(
                    entity = T::entity(),
                    id = r.id(),
                    "Dropping record with exhausted id"
                );
            }
            usable
        });
        if records.len() > T::CAPACITY {
            tracing::warn!(
                entity = T::entity(),
                loaded = records.len(),
                capacity = T::CAPACITY,
                "Dropping records beyond capacity"
            );
            records.truncate(T::CAPACITY);
        }
        let next_id = records.iter().map(|r| r.id() + 1).max().unwrap_or(1);
        Self {
            items: records,
            next_id,
        }
    }

    /// Assign the next id and append. Ids are never reused.
    pub fn insert(&mut self, mut value: T) -> Result<u32, DatabaseError> {
        if self.items.len() >= T::CAPACITY {
            return Err(capacity_exceeded::<T>());
        }
        let following = self.next_id.checked_add(1).ok_or_else(capacity_exceeded::<T>)?;
        value.check()?;
        self.ensure_key_free(&value, None)?;
        let id = self.next_id;
        self.next_id = following;
        value.set_id(id);
        self.items.push(value);
        Ok(id)
    }

    /// The id the next insert will receive.
    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    pub fn get(&self, id: u32) -> Option<&T> {
        self.items.iter().find(|r| r.id() == id)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut T> {
        self.items.iter_mut().find(|r| r.id() == id)
    }

    pub fn get_by_key(&self, key: &str) -> Option<&T> {
        let key = key.trim();
        self.items.iter().find(|r| r.key().eq_ignore_ascii_case(key))
    }

    /// Replace the whole record, keeping its id.
    pub fn replace(&mut self, id: u32, mut value: T) -> Result<(), DatabaseError> {
        let pos = self.position(id)?;
        value.check()?;
        self.ensure_key_free(&value, Some(id))?;
        value.set_id(id);
        self.items[pos] = value;
        Ok(())
    }

    /// Keys are unique per collection, ignoring ASCII case. `owner` is the id
    /// allowed to hold the key already.
    fn ensure_key_free(&self, value: &T, owner: Option<u32>) -> Result<(), DatabaseError> {
        match self.get_by_key(value.key()) {
            Some(existing) if Some(existing.id()) != owner => Err(DatabaseError::DuplicateKey {
                entity_type: T::entity().to_string(),
                key: value.key().to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Remove a record, keeping the relative order of the rest.
    pub fn remove(&mut self, id: u32) -> Result<T, DatabaseError> {
        let pos = self.position(id)?;
        Ok(self.items.remove(pos))
    }

    fn position(&self, id: u32) -> Result<usize, DatabaseError> {
        self.items
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| DatabaseError::not_found(T::entity(), format_args!("id {id}")))
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn capacity_exceeded<T: Record>() -> DatabaseError {
    DatabaseError::CapacityExceeded {
        entity_type: T::entity().to_string(),
        capacity: T::CAPACITY,
    }
}
