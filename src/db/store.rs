//! The record store: four collections plus write-through persistence.
//!
//! Every mutation re-serializes the affected collection in full and hands it
//! to the [`Storage`] backend. A failed write is logged and remembered; the
//! in-memory collections stay authoritative and the next successful write of
//! that collection clears the flag.

use std::collections::{BTreeSet, HashSet};

use super::collection::{Collection, Record};
use super::csv::{decode_table_lenient, encode_table};
use super::storage::{MemoryStorage, Storage};
use super::DatabaseError;
use crate::config;
use crate::models::{Notification, Patient, Prescription, User};

pub struct RecordStore {
    users: Collection<User>,
    patients: Collection<Patient>,
    prescriptions: Collection<Prescription>,
    notifications: Collection<Notification>,
    storage: Box<dyn Storage>,
    unsynced: BTreeSet<&'static str>,
}

macro_rules! impl_record {
    ($ty:ty, $field:ident, $key:ident, $capacity:expr) => {
        impl Record for $ty {
            const CAPACITY: usize = $capacity;

            fn id(&self) -> u32 {
                self.id
            }

            fn set_id(&mut self, id: u32) {
                self.id = id;
            }

            fn key(&self) -> &str {
                &self.$key
            }

            fn collection(store: &RecordStore) -> &Collection<Self> {
                &store.$field
            }

            fn collection_mut(store: &mut RecordStore) -> &mut Collection<Self> {
                &mut store.$field
            }
        }
    };
}

impl_record!(User, users, username, config::MAX_USERS);
impl_record!(Patient, patients, mrn, config::MAX_PATIENTS);
impl_record!(Prescription, prescriptions, code, config::MAX_PRESCRIPTIONS);
impl_record!(Notification, notifications, code, config::MAX_NOTIFICATIONS);

impl RecordStore {
    /// An empty store backed by memory only.
    pub fn in_memory() -> Self {
        Self::empty(Box::new(MemoryStorage::new()))
    }

    fn empty(storage: Box<dyn Storage>) -> Self {
        Self {
            users: Collection::new(),
            patients: Collection::new(),
            prescriptions: Collection::new(),
            notifications: Collection::new(),
            storage,
            unsynced: BTreeSet::new(),
        }
    }

    /// Load every collection from `storage`.
    ///
    /// Missing files load as empty collections. Rows that fail to decode are
    /// skipped with a warning; a file with a wrong header or unbalanced quoting
    /// fails the whole open.
    pub fn open(storage: Box<dyn Storage>) -> Result<Self, DatabaseError> {
        let users = load_collection::<User>(storage.as_ref())?;
        let patients = load_collection::<Patient>(storage.as_ref())?;
        let prescriptions = load_collection::<Prescription>(storage.as_ref())?;
        let notifications = load_collection::<Notification>(storage.as_ref())?;

        tracing::info!(
            backend = storage.kind(),
            location = %storage.location(),
            users = users.len(),
            patients = patients.len(),
            prescriptions = prescriptions.len(),
            notifications = notifications.len(),
            "Record store opened"
        );

        Ok(Self {
            users,
            patients,
            prescriptions,
            notifications,
            storage,
            unsynced: BTreeSet::new(),
        })
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// True when no collection holds any record.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
            && self.patients.is_empty()
            && self.prescriptions.is_empty()
            && self.notifications.is_empty()
    }

    /// True when every collection's last write reached storage.
    pub fn is_synced(&self) -> bool {
        self.unsynced.is_empty()
    }

    /// Entity names whose latest state is not on storage.
    pub fn unsynced(&self) -> Vec<&'static str> {
        self.unsynced.iter().copied().collect()
    }

    // ═══════════════════════════════════════════════════════════
    // CRUD
    // ═══════════════════════════════════════════════════════════

    /// Append a record under the next id and persist its collection.
    pub fn create<T: Record>(&mut self, value: T) -> Result<u32, DatabaseError> {
        let id = T::collection_mut(self).insert(value)?;
        tracing::debug!(entity = T::entity(), id, "Record created");
        self.persist::<T>();
        Ok(id)
    }

    /// The id the next `create::<T>` will assign.
    pub fn next_id<T: Record>(&self) -> u32 {
        T::collection(self).next_id()
    }

    pub fn find<T: Record>(&self, id: u32) -> Option<&T> {
        T::collection(self).get(id)
    }

    pub fn get<T: Record>(&self, id: u32) -> Result<&T, DatabaseError> {
        self.find(id)
            .ok_or_else(|| DatabaseError::not_found(T::entity(), format_args!("id {id}")))
    }

    /// Lookup by username, MRN or code, ignoring ASCII case.
    pub fn find_by_key<T: Record>(&self, key: &str) -> Option<&T> {
        T::collection(self).get_by_key(key)
    }

    pub fn get_by_key<T: Record>(&self, key: &str) -> Result<&T, DatabaseError> {
        self.find_by_key(key)
            .ok_or_else(|| DatabaseError::not_found(T::entity(), format_args!("key '{key}'")))
    }

    /// First record, in insertion order, matching `predicate`.
    pub fn find_first<T: Record>(&self, predicate: impl Fn(&T) -> bool) -> Option<&T> {
        T::collection(self).iter().find(|&r| predicate(r))
    }

    /// Replace a record wholesale. The stored id is kept.
    pub fn update<T: Record>(&mut self, id: u32, value: T) -> Result<(), DatabaseError> {
        T::collection_mut(self).replace(id, value)?;
        tracing::debug!(entity = T::entity(), id, "Record updated");
        self.persist::<T>();
        Ok(())
    }

    /// Edit a record in place and return the result.
    pub fn modify<T: Record>(
        &mut self,
        id: u32,
        edit: impl FnOnce(&mut T),
    ) -> Result<T, DatabaseError> {
        let mut record = self.get::<T>(id)?.clone();
        edit(&mut record);
        record.set_id(id);
        T::collection_mut(self).replace(id, record.clone())?;
        tracing::debug!(entity = T::entity(), id, "Record modified");
        self.persist::<T>();
        Ok(record)
    }

    pub fn delete<T: Record>(&mut self, id: u32) -> Result<T, DatabaseError> {
        let removed = T::collection_mut(self).remove(id)?;
        tracing::debug!(entity = T::entity(), id, "Record deleted");
        self.persist::<T>();
        Ok(removed)
    }

    /// Records matching `filter`, in insertion order.
    pub fn list<T: Record>(&self, filter: impl Fn(&T) -> bool) -> Vec<T> {
        T::collection(self)
            .iter()
            .filter(|&r| filter(r))
            .cloned()
            .collect()
    }

    pub fn all<T: Record>(&self) -> &[T] {
        T::collection(self).as_slice()
    }

    pub fn count<T: Record>(&self) -> usize {
        T::collection(self).len()
    }

    // ═══════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════

    /// Rewrite every collection. Returns whether all writes succeeded.
    pub fn save_all(&mut self) -> bool {
        let users = self.persist::<User>();
        let patients = self.persist::<Patient>();
        let prescriptions = self.persist::<Prescription>();
        let notifications = self.persist::<Notification>();
        users && patients && prescriptions && notifications
    }

    fn persist<T: Record>(&mut self) -> bool {
        let schema = T::SCHEMA;
        let text = encode_table(T::collection(self).as_slice());
        match self.storage.write(schema.file_name, &text) {
            Ok(()) => {
                self.unsynced.remove(schema.entity);
                true
            }
            Err(e) => {
                tracing::warn!(
                    file = schema.file_name,
                    error = %e,
                    "Failed to persist collection; keeping in-memory state"
                );
                self.unsynced.insert(schema.entity);
                false
            }
        }
    }
}

fn load_collection<T: Record>(storage: &dyn Storage) -> Result<Collection<T>, DatabaseError> {
    let schema = T::SCHEMA;
    let Some(text) = storage.read(schema.file_name)? else {
        tracing::debug!(file = schema.file_name, "No saved file; starting empty");
        return Ok(Collection::new());
    };

    let decoded = decode_table_lenient::<T>(&text)?;
    for err in &decoded.rejected {
        tracing::warn!(file = schema.file_name, error = %err, "Skipping unreadable row");
    }

    let mut seen_ids = HashSet::new();
    let mut seen_keys = HashSet::new();
    let records = decoded
        .records
        .into_iter()
        .filter(|r| {
            if !seen_ids.insert(r.id()) {
                tracing::warn!(file = schema.file_name, id = r.id(), "Skipping duplicate id");
                return false;
            }
            if !seen_keys.insert(r.key().trim().to_ascii_lowercase()) {
                tracing::warn!(file = schema.file_name, key = r.key(), "Skipping duplicate key");
                return false;
            }
            true
        })
        .collect();
    Ok(Collection::from_records(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DirStorage;
    use crate::models::{Medication, PrescriptionStatus, UserRole};
    use std::io;

    fn patient(name: &str, mrn: &str) -> Patient {
        Patient::new(name, mrn, "Ward-A", "12", "1985-05-15")
    }

    fn prescription(code: &str, owner: &str) -> Prescription {
        Prescription {
            id: 0,
            code: code.into(),
            patient_id: Some(1),
            patient_name: "Sarah Wilson".into(),
            patient_mrn: "MRN-78901234".into(),
            prescribed_by: owner.into(),
            medications: vec![
                Medication::new("Medicine 2", "10mg", "tablet", "tid").with_quantity(30),
            ],
            status: PrescriptionStatus::Pending,
            date_created: "2024-01-16".into(),
            date_dispensed: None,
            notes: "Take with food, \"after\" meals".into(),
        }
    }

    fn open_dir(path: &std::path::Path) -> RecordStore {
        RecordStore::open(Box::new(DirStorage::open(path).unwrap())).unwrap()
    }

    struct ReadOnlyStorage;

    impl Storage for ReadOnlyStorage {
        fn kind(&self) -> &'static str {
            "read-only"
        }

        fn location(&self) -> String {
            "nowhere".into()
        }

        fn read(&self, _name: &str) -> io::Result<Option<String>> {
            Ok(None)
        }

        fn write(&self, _name: &str, _contents: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
        }

        fn list(&self) -> io::Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn create_then_delete_keeps_the_other_patient() {
        let mut store = RecordStore::in_memory();
        assert_eq!(store.create(patient("A", "MRN-1")).unwrap(), 1);
        assert_eq!(store.create(patient("B", "MRN-2")).unwrap(), 2);

        store.delete::<Patient>(1).unwrap();

        let remaining = store.list::<Patient>(|_| true);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].mrn, "MRN-2");
    }

    #[test]
    fn created_record_reads_back_with_assigned_id() {
        let mut store = RecordStore::in_memory();
        let input = prescription("RX-2024-001", "doctor1");
        let id = store.create(input.clone()).unwrap();

        let stored = store.get::<Prescription>(id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(Prescription { id: 0, ..stored.clone() }, input);
    }

    #[test]
    fn deleted_record_is_not_found() {
        let mut store = RecordStore::in_memory();
        let id = store.create(patient("A", "MRN-1")).unwrap();
        store.delete::<Patient>(id).unwrap();

        assert!(store.get::<Patient>(id).unwrap_err().is_not_found());
        assert!(store.delete::<Patient>(id).unwrap_err().is_not_found());
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let mut store = RecordStore::in_memory();
        store.create(patient("A", "MRN-1")).unwrap();
        let second = store.create(patient("B", "MRN-2")).unwrap();
        store.delete::<Patient>(second).unwrap();
        assert_eq!(store.create(patient("C", "MRN-3")).unwrap(), 3);
    }

    #[test]
    fn update_replaces_record_but_keeps_id() {
        let mut store = RecordStore::in_memory();
        let id = store.create(patient("A", "MRN-1")).unwrap();

        let mut replacement = patient("A. Renamed", "MRN-1");
        replacement.id = 99;
        store.update(id, replacement).unwrap();

        let stored = store.get::<Patient>(id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(stored.name, "A. Renamed");
        assert!(store.find::<Patient>(99).is_none());
        assert!(store.update(42, patient("X", "MRN-X")).unwrap_err().is_not_found());
    }

    #[test]
    fn modify_edits_in_place() {
        let mut store = RecordStore::in_memory();
        let id = store.create(prescription("RX-2024-001", "doctor1")).unwrap();

        let updated = store
            .modify::<Prescription>(id, |rx| rx.status = PrescriptionStatus::Ready)
            .unwrap();
        assert_eq!(updated.status, PrescriptionStatus::Ready);
        assert_eq!(
            store.get::<Prescription>(id).unwrap().status,
            PrescriptionStatus::Ready
        );
    }

    #[test]
    fn key_lookups_ignore_case() {
        let mut store = RecordStore::in_memory();
        store
            .create(User::new(
                "Doctor1",
                "pass123",
                "Dr. Sarah Johnson",
                "sarah@hospital.com",
                "MD-1",
                "Cardiology",
                UserRole::Doctor,
            ))
            .unwrap();
        store.create(patient("A", "MRN-abc")).unwrap();
        store.create(prescription("RX-2024-001", "doctor1")).unwrap();

        assert_eq!(store.get_by_key::<User>("doctor1").unwrap().full_name, "Dr. Sarah Johnson");
        assert_eq!(store.get_by_key::<Patient>(" mrn-ABC ").unwrap().name, "A");
        assert!(store.find_by_key::<Prescription>("rx-2024-001").is_some());
        assert!(store.get_by_key::<User>("nobody").unwrap_err().is_not_found());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let mut store = RecordStore::in_memory();
        store.create(prescription("RX-3", "doctor1")).unwrap();
        store.create(prescription("RX-1", "doctor2")).unwrap();
        store.create(prescription("RX-2", "doctor1")).unwrap();

        let mine: Vec<String> = store
            .list::<Prescription>(|rx| rx.prescribed_by == "doctor1")
            .into_iter()
            .map(|rx| rx.code)
            .collect();
        assert_eq!(mine, vec!["RX-3", "RX-2"]);
        assert_eq!(store.count::<Prescription>(), 3);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut store = RecordStore::in_memory();
        for i in 0..config::MAX_PATIENTS {
            store.create(patient("P", &format!("MRN-{i}"))).unwrap();
        }
        let err = store.create(patient("Overflow", "MRN-X")).unwrap_err();
        assert!(matches!(
            err,
            DatabaseError::CapacityExceeded { capacity, .. } if capacity == config::MAX_PATIENTS
        ));
        assert_eq!(store.count::<Patient>(), config::MAX_PATIENTS);
    }

    #[test]
    fn collections_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let mut store = open_dir(tmp.path());
            store.create(patient("Comma, Name", "MRN-1")).unwrap();
            store.create(patient("B", "MRN-2")).unwrap();
            store.create(prescription("RX-2024-001", "doctor1")).unwrap();
            store.delete::<Patient>(2).unwrap();
            assert!(store.is_synced());
        }

        let text = std::fs::read_to_string(tmp.path().join("patients.csv")).unwrap();
        assert!(text.starts_with("PatientID,Name,MRN,Ward,Bed,DateOfBirth,UserID\n"));

        let mut reopened = open_dir(tmp.path());
        assert_eq!(
            reopened.all::<Patient>(),
            &[Patient {
                id: 1,
                ..patient("Comma, Name", "MRN-1")
            }]
        );
        assert_eq!(
            reopened.get::<Prescription>(1).unwrap().notes,
            "Take with food, \"after\" meals"
        );
        assert_eq!(reopened.create(patient("C", "MRN-3")).unwrap(), 2);
    }

    #[test]
    fn failed_write_keeps_memory_and_reports_unsynced() {
        let mut store = RecordStore::open(Box::new(ReadOnlyStorage)).unwrap();
        let id = store.create(patient("A", "MRN-1")).unwrap();

        assert!(store.get::<Patient>(id).is_ok());
        assert!(!store.is_synced());
        assert_eq!(store.unsynced(), vec!["Patient"]);
        assert!(!store.save_all());
    }

    #[test]
    fn successful_write_clears_unsynced() {
        let mut store = RecordStore::in_memory();
        store.unsynced.insert("Patient");
        assert!(store.save_all());
        assert!(store.is_synced());
    }

    #[test]
    fn open_skips_bad_rows_and_duplicate_ids() {
        let storage = MemoryStorage::new();
        storage
            .write(
                "patients.csv",
                "PatientID,Name,MRN,Ward,Bed,DateOfBirth,UserID\n\
                 1,A,MRN-1,W,1,1990-01-01,\n\
                 x,B,MRN-2,W,2,1990-01-01,\n\
                 1,C,MRN-3,W,3,1990-01-01,-1\n\
                 4,D,MRN-4,W,4,1990-01-01,-1\n",
            )
            .unwrap();

        let mut store = RecordStore::open(Box::new(storage)).unwrap();
        let mrns: Vec<&str> = store.all::<Patient>().iter().map(|p| p.mrn.as_str()).collect();
        assert_eq!(mrns, vec!["MRN-1", "MRN-4"]);
        assert_eq!(store.create(patient("E", "MRN-5")).unwrap(), 5);
    }

    #[test]
    fn keys_are_unique_per_collection() {
        let mut store = RecordStore::in_memory();
        store.create(patient("A", "MRN-1")).unwrap();
        let second = store.create(patient("B", "MRN-2")).unwrap();

        let err = store.create(patient("Shadow", "mrn-1")).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey { .. }));
        let err = store.update(second, patient("B", "MRN-1")).unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey { .. }));
        let err = store
            .modify::<Patient>(second, |p| p.mrn = "MRN-1".into())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey { .. }));
        assert_eq!(store.get::<Patient>(second).unwrap().mrn, "MRN-2");

        store.update(second, patient("B. Renamed", "MRN-2")).unwrap();
        assert_eq!(store.count::<Patient>(), 2);
        assert_eq!(store.next_id::<Patient>(), 3);
    }

    #[test]
    fn notification_codes_are_unique() {
        let mut store = RecordStore::in_memory();
        let notification = Notification {
            id: 0,
            code: "NOTIF-001".into(),
            title: "Stock Alert".into(),
            content: "Low stock".into(),
            kind: Default::default(),
            time: "now".into(),
            read: false,
            action_required: false,
            related_prescription_id: None,
            assigned_to: "admin".into(),
        };
        store.create(notification.clone()).unwrap();
        assert!(matches!(
            store.create(notification),
            Err(DatabaseError::DuplicateKey { .. })
        ));
        assert_eq!(store.count::<Notification>(), 1);
    }

    #[test]
    fn unencodable_medication_is_rejected_before_storage() {
        let tmp = tempfile::tempdir().unwrap();
        let mut store = open_dir(tmp.path());

        let mut rx = prescription("RX-2024-001", "doctor1");
        rx.medications = vec![Medication::new("Co-amoxiclav 875:125", "1", "tablet", "bid")];
        let err = store.create(rx).unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedInput(_)));
        assert_eq!(store.count::<Prescription>(), 0);

        let mut rx = prescription("RX-2024-001", "doctor1");
        rx.medications = vec![Medication::new("Co-amoxiclav", "875/125mg", "tablet", "bid")];
        let id = store.create(rx).unwrap();
        let err = store
            .modify::<Prescription>(id, |rx| rx.medications[0].frequency = "bid | prn".into())
            .unwrap_err();
        assert!(matches!(err, DatabaseError::MalformedInput(_)));

        let reopened = open_dir(tmp.path());
        assert_eq!(reopened.all::<Prescription>(), store.all::<Prescription>());
        assert_eq!(reopened.all::<Prescription>()[0].medications[0].frequency, "bid");
    }

    #[test]
    fn open_drops_exhausted_ids_and_duplicate_keys() {
        let storage = MemoryStorage::new();
        storage
            .write(
                "patients.csv",
                "PatientID,Name,MRN,Ward,Bed,DateOfBirth,UserID\n\
                 4294967295,A,MRN-1,W,1,1990-01-01,\n\
                 2,B,MRN-2,W,2,1990-01-01,\n\
                 3,C,mrn-2,W,3,1990-01-01,\n",
            )
            .unwrap();

        let mut store = RecordStore::open(Box::new(storage)).unwrap();
        let mrns: Vec<&str> = store.all::<Patient>().iter().map(|p| p.mrn.as_str()).collect();
        assert_eq!(mrns, vec!["MRN-2"]);
        assert_eq!(store.create(patient("D", "MRN-1")).unwrap(), 3);
    }

    #[test]
    fn open_rejects_foreign_header() {
        let storage = MemoryStorage::new();
        storage.write("users.csv", "id,name\n1,x\n").unwrap();
        assert!(matches!(
            RecordStore::open(Box::new(storage)),
            Err(DatabaseError::MalformedInput(_))
        ));
    }
}
