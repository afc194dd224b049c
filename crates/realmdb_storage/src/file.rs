//! File-backed entity backend.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::{EntityBackend, StoreEntity, WriteOp};
use crate::criteria::{Criteria, QueryParams, Searchable};
use crate::error::{StorageError, StorageResult};

/// A file-backed entity backend.
///
/// Entities are held in memory and snapshotted to a JSON file on every
/// mutation. The snapshot is written to a temporary file and renamed
/// into place, so a crash mid-write leaves the previous snapshot intact,
/// and a mutation only becomes visible to readers once its snapshot has
/// landed. Data survives process restarts.
///
/// # Thread Safety
///
/// The backend is thread-safe; internal locking keeps the in-memory view
/// and the snapshot consistent.
pub struct FileBackend<E: StoreEntity> {
    path: PathBuf,
    entries: RwLock<BTreeMap<E::Key, E>>,
}

impl<E> FileBackend<E>
where
    E: StoreEntity + Serialize + DeserializeOwned,
{
    /// Opens or creates a file backend at the given path.
    ///
    /// An existing snapshot is loaded; a missing or empty file starts an
    /// empty store.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Corrupted` when an existing snapshot cannot
    /// be decoded, or an I/O error when the file cannot be read.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let mut entries = BTreeMap::new();

        if path.exists() && fs::metadata(path)?.len() > 0 {
            let reader = BufReader::new(File::open(path)?);
            let loaded: Vec<E> = serde_json::from_reader(reader)
                .map_err(|e| StorageError::corrupted(format!("snapshot decode: {e}")))?;
            for entity in loaded {
                entries.insert(entity.key().clone(), entity);
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            entries: RwLock::new(entries),
        })
    }

    /// Returns the path to the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a candidate entry map to the snapshot file.
    ///
    /// Callers hold the write lock and install the candidate as the live
    /// map only after this succeeds, so readers never observe a mutation
    /// whose snapshot failed to land.
    fn persist(&self, entries: &BTreeMap<E::Key, E>) -> StorageResult<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            let all: Vec<&E> = entries.values().collect();
            serde_json::to_writer(&mut writer, &all)
                .map_err(|e| StorageError::corrupted(format!("snapshot encode: {e}")))?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl<E: StoreEntity> std::fmt::Debug for FileBackend<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl<E> EntityBackend<E> for FileBackend<E>
where
    E: StoreEntity + Searchable + Serialize + DeserializeOwned,
{
    fn create(&self, entity: E) -> StorageResult<()> {
        let mut entries = self.entries.write();
        if entries.contains_key(entity.key()) {
            return Err(StorageError::duplicate_key(format!("{:?}", entity.key())));
        }
        let mut next = entries.clone();
        next.insert(entity.key().clone(), entity);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn read(&self, key: &E::Key) -> StorageResult<Option<E>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn query(&self, params: &QueryParams<E>) -> StorageResult<Vec<E>> {
        let matched: Vec<E> = self
            .entries
            .read()
            .values()
            .filter(|e| params.criteria().matches(e))
            .cloned()
            .collect();
        Ok(params.resolve(matched))
    }

    fn delete(&self, key: &E::Key) -> StorageResult<bool> {
        let mut entries = self.entries.write();
        if !entries.contains_key(key) {
            return Ok(false);
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(true)
    }

    fn count(&self, criteria: &Criteria<E>) -> StorageResult<usize> {
        Ok(self
            .entries
            .read()
            .values()
            .filter(|e| criteria.matches(e))
            .count())
    }

    fn apply(&self, ops: Vec<WriteOp<E>>) -> StorageResult<()> {
        let mut entries = self.entries.write();

        // Validate, build the post-batch map, snapshot it once, and only
        // then install it as the live view.
        let present: std::collections::BTreeSet<E::Key> = entries.keys().cloned().collect();
        crate::memory::validate_batch(&present, &ops)?;

        let mut next = entries.clone();
        for op in &ops {
            if let WriteOp::Delete(key) = op {
                next.remove(key);
            }
        }
        for op in ops {
            match op {
                WriteOp::Create(entity) | WriteOp::Put(entity) => {
                    next.insert(entity.key().clone(), entity);
                }
                WriteOp::Delete(_) => {}
            }
        }
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{FieldKind, FieldValue, Operator};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        id: u64,
        realm: String,
        text: String,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum NoteField {
        Realm,
        Text,
    }

    impl StoreEntity for Note {
        type Key = u64;

        fn key(&self) -> &u64 {
            &self.id
        }
    }

    impl Searchable for Note {
        type Field = NoteField;

        fn field_kind(field: NoteField) -> FieldKind {
            match field {
                NoteField::Realm | NoteField::Text => FieldKind::Text,
            }
        }

        fn field_values(&self, field: NoteField) -> Vec<FieldValue> {
            match field {
                NoteField::Realm => vec![FieldValue::Text(self.realm.clone())],
                NoteField::Text => vec![FieldValue::Text(self.text.clone())],
            }
        }
    }

    fn note(id: u64, realm: &str, text: &str) -> Note {
        Note {
            id,
            realm: realm.to_owned(),
            text: text.to_owned(),
        }
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.create(note(1, "r1", "first")).unwrap();
            backend.create(note(2, "r1", "second")).unwrap();
            backend.delete(&2).unwrap();
        }

        let backend: FileBackend<Note> = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read(&1).unwrap(), Some(note(1, "r1", "first")));
        assert_eq!(backend.read(&2).unwrap(), None);
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend: FileBackend<Note> =
            FileBackend::open(&dir.path().join("fresh.json")).unwrap();
        assert_eq!(backend.count(&Criteria::new()).unwrap(), 0);
    }

    #[test]
    fn corrupted_snapshot_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, b"this is not json").unwrap();

        let err = FileBackend::<Note>::open(&path).unwrap_err();
        assert!(matches!(err, StorageError::Corrupted(_)));
    }

    #[test]
    fn duplicate_create_fails() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("n.json")).unwrap();
        backend.create(note(1, "r1", "a")).unwrap();
        let err = backend.create(note(1, "r1", "b")).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey { .. }));
    }

    #[test]
    fn batch_applies_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");

        {
            let backend = FileBackend::open(&path).unwrap();
            backend.create(note(1, "r1", "old")).unwrap();
            backend
                .apply(vec![
                    WriteOp::Put(note(1, "r1", "updated")),
                    WriteOp::Create(note(2, "r1", "fresh")),
                ])
                .unwrap();
        }

        let backend: FileBackend<Note> = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read(&1).unwrap().unwrap().text, "updated");
        assert_eq!(backend.read(&2).unwrap().unwrap().text, "fresh");
    }

    #[test]
    fn failed_snapshot_write_leaves_the_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("n.json");
        let backend = FileBackend::open(&path).unwrap();
        backend.create(note(1, "r1", "kept")).unwrap();

        // Turn the snapshot path into an occupied directory so the
        // rename into place fails on every further mutation.
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupant"), b"x").unwrap();

        assert!(backend.create(note(2, "r1", "phantom")).is_err());
        assert_eq!(backend.read(&2).unwrap(), None);

        assert!(backend
            .apply(vec![
                WriteOp::Put(note(1, "r1", "renamed")),
                WriteOp::Create(note(3, "r1", "phantom")),
            ])
            .is_err());
        assert_eq!(backend.read(&3).unwrap(), None);

        assert!(backend.delete(&1).is_err());
        assert_eq!(backend.read(&1).unwrap(), Some(note(1, "r1", "kept")));
    }

    #[test]
    fn criteria_query_on_file_backend() {
        let dir = tempfile::tempdir().unwrap();
        let backend = FileBackend::open(&dir.path().join("q.json")).unwrap();
        backend.create(note(1, "r1", "hello world")).unwrap();
        backend.create(note(2, "r2", "hello moon")).unwrap();

        let c = Criteria::new()
            .compare(NoteField::Realm, Operator::Eq, "r1")
            .unwrap()
            .compare(NoteField::Text, Operator::Ilike, "%world%")
            .unwrap();
        let found = backend.query(&QueryParams::with_criteria(c)).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, 1);
    }
}
