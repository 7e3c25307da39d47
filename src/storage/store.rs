//! The persistence boundary.
//!
//! The marketplace keeps its working state in memory and writes each changed
//! [`CollaborationRecord`] through a [`Store`]. Any backend that can load and
//! save whole records can sit behind it.

use std::{collections::BTreeMap, fmt, io, path::PathBuf};

use nonempty::NonEmpty;
use parking_lot::Mutex;

use crate::{
    domain::CollaborationId,
    storage::{CollaborationRecord, InvalidRecord},
};

/// A repository of collaboration records.
pub trait Store: Send + Sync {
    /// Loads every stored record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend can't be read or holds records that
    /// can't be parsed.
    fn load(&self) -> Result<Vec<CollaborationRecord>, StoreError>;

    /// Loads the stored version of one collaboration, if there is one.
    ///
    /// # Errors
    ///
    /// As [`Store::load`].
    fn load_one(&self, id: CollaborationId) -> Result<Option<CollaborationRecord>, StoreError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|record| record.collaboration.id() == id))
    }

    /// Saves a record, replacing any earlier version with the same
    /// collaboration id.
    ///
    /// The write is conditional: if a version is already stored, `record`
    /// must carry the next revision after it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the stored version has moved on
    /// since `record` was read, or another error if the record could not be
    /// durably written. The previously stored version must be left intact in
    /// either case.
    fn save(&self, record: &CollaborationRecord) -> Result<(), StoreError>;
}

/// Errors raised by a [`Store`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// One or more stored records could not be loaded.
    #[error("{}", LoadFailures(.0))]
    Load(NonEmpty<(PathBuf, LoadError)>),

    /// A record could not be serialized.
    #[error("failed to serialize record for collaboration {id}")]
    Serialize {
        /// The collaboration being saved.
        id: CollaborationId,
        /// The underlying error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A file could not be written.
    #[error("failed to write {}", path.display())]
    Write {
        /// The file being written.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Someone else saved the collaboration since it was read.
    #[error("collaboration {id} was changed elsewhere (stored revision {stored}, saving {saving})")]
    Conflict {
        /// The collaboration being saved.
        id: CollaborationId,
        /// The revision currently stored.
        stored: u64,
        /// The revision that was refused.
        saving: u64,
    },

    /// Another writer held the record for too long.
    #[error("timed out waiting for {}; remove it if no other process is running", path.display())]
    Locked {
        /// The lock file.
        path: PathBuf,
    },

    /// The backend is not reachable.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Why a single stored record could not be loaded.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read record")]
    Io(#[from] io::Error),
    /// The file is not a valid record.
    #[error("failed to parse record")]
    Yaml(#[from] serde_yaml::Error),
    /// The record parses but describes an impossible state.
    #[error("inconsistent record: {0}")]
    Invalid(#[from] InvalidRecord),
    /// The file name doesn't match the collaboration it contains.
    #[error("file holds collaboration {found}")]
    Mismatch {
        /// The collaboration inside the file.
        found: CollaborationId,
    },
}

struct LoadFailures<'a>(&'a NonEmpty<(PathBuf, LoadError)>);

impl fmt::Display for LoadFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unreadable records: ")?;
        for (i, (path, error)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} ({error})", path.display())?;
        }
        Ok(())
    }
}

/// A store that keeps records in memory.
///
/// Useful for tests and for embedding the marketplace where persistence is
/// handled elsewhere.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<CollaborationId, CollaborationRecord>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `records`.
    #[must_use]
    pub fn with_records(records: impl IntoIterator<Item = CollaborationRecord>) -> Self {
        Self {
            records: Mutex::new(
                records
                    .into_iter()
                    .map(|r| (r.collaboration.id(), r))
                    .collect(),
            ),
        }
    }

    /// The stored version of a collaboration's record.
    #[must_use]
    pub fn get(&self, id: CollaborationId) -> Option<CollaborationRecord> {
        self.records.lock().get(&id).cloned()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl Store for MemoryStore {
    fn load(&self) -> Result<Vec<CollaborationRecord>, StoreError> {
        Ok(self.records.lock().values().cloned().collect())
    }

    fn load_one(&self, id: CollaborationId) -> Result<Option<CollaborationRecord>, StoreError> {
        Ok(self.get(id))
    }

    fn save(&self, record: &CollaborationRecord) -> Result<(), StoreError> {
        let id = record.collaboration.id();
        let mut records = self.records.lock();
        if let Some(stored) = records.get(&id) {
            check_revision(id, stored.revision, record.revision)?;
        }
        records.insert(id, record.clone());
        Ok(())
    }
}

/// Fails with [`StoreError::Conflict`] unless `saving` directly follows
/// `stored`.
pub(crate) fn check_revision(
    id: CollaborationId,
    stored: u64,
    saving: u64,
) -> Result<(), StoreError> {
    if stored.checked_add(1) == Some(saving) {
        Ok(())
    } else {
        Err(StoreError::Conflict { id, stored, saving })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Ledger, NewCollaboration, UserId};

    fn record(title: &str) -> CollaborationRecord {
        let mut ledger = Ledger::default();
        let id = ledger
            .create_collaboration(
                UserId::new("creator").unwrap(),
                NewCollaboration {
                    title: title.to_string(),
                    ..NewCollaboration::default()
                },
            )
            .unwrap()
            .id();
        ledger.record(id).unwrap()
    }

    #[test]
    fn save_replaces_by_collaboration_id() {
        let store = MemoryStore::new();
        let mut first = record("Photo book");
        store.save(&first).unwrap();

        first.collaboration.title = "Photo book, second edition".to_string();
        first.revision += 1;
        store.save(&first).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(first.collaboration.id()).unwrap().collaboration.title(),
            "Photo book, second edition"
        );
    }

    #[test]
    fn stale_saves_are_refused() {
        let store = MemoryStore::new();
        let mut original = record("Photo book");
        original.revision = 1;
        store.save(&original).unwrap();

        let mut first = original.clone();
        first.revision = 2;
        first.collaboration.title = "First edit".to_string();
        let mut second = original;
        second.revision = 2;
        second.collaboration.title = "Second edit".to_string();

        store.save(&first).unwrap();
        let err = store.save(&second).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                stored: 2,
                saving: 2,
                ..
            }
        ));
        let id = first.collaboration.id();
        assert_eq!(store.get(id).unwrap().collaboration.title(), "First edit");
        assert_eq!(store.load_one(id).unwrap(), Some(first));
    }

    #[test]
    fn load_returns_everything_saved() {
        let store = MemoryStore::with_records([record("One"), record("Two")]);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn load_failures_list_every_path() {
        let mut failures = NonEmpty::new((
            PathBuf::from("a.yaml"),
            LoadError::Io(io::ErrorKind::NotFound.into()),
        ));
        failures.push((
            PathBuf::from("b.yaml"),
            LoadError::Mismatch {
                found: CollaborationId::new(),
            },
        ));
        let message = StoreError::Load(failures).to_string();
        assert!(message.starts_with("Unreadable records: a.yaml"));
        assert!(message.contains(", b.yaml (file holds collaboration"));
    }
}
