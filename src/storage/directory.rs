//! A filesystem backed store of collaborations
//!
//! The [`Directory`] keeps one YAML file per collaboration under
//! `<root>/collaborations/`, named after the collaboration's id, alongside a
//! `config.toml` at the root.
//!
//! Several processes may share a directory. Saves are serialized per
//! collaboration with a `<id>.yaml.lock` file and refused when the stored
//! revision has moved on since the record was read.

use std::{
    ffi::OsStr,
    fs::{self, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use nonempty::NonEmpty;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use walkdir::WalkDir;

use crate::{
    domain::{CollaborationId, Config},
    storage::{store::check_revision, CollaborationRecord, LoadError, Store, StoreError},
};

const RECORDS_DIR: &str = "collaborations";
const CONFIG_FILE: &str = "config.toml";
const RECORD_EXTENSION: &str = "yaml";

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_POLL: Duration = Duration::from_millis(5);

/// A filesystem backed store of collaboration records.
#[derive(Debug, Clone)]
pub struct Directory {
    /// The root of the directory records are stored in.
    root: PathBuf,
    config: Config,
}

impl Directory {
    /// Opens a directory at the given path.
    ///
    /// The configuration is read from `<root>/config.toml`; if it is missing
    /// or unreadable the defaults are used.
    #[must_use]
    pub fn open(root: PathBuf) -> Self {
        let config = load_config(&root);
        Self { root, config }
    }

    /// Creates the directory layout and a default configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file already exists, or if the
    /// directories or file cannot be created.
    pub fn init(root: PathBuf) -> Result<Self, InitError> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Err(InitError::AlreadyInitialized(root));
        }

        fs::create_dir_all(root.join(RECORDS_DIR))?;
        let config = Config::default();
        config.save(&config_path).map_err(InitError::Config)?;

        tracing::info!("initialized marketplace in {}", root.display());
        Ok(Self { root, config })
    }

    /// The root of the directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The configuration in effect for this directory.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Path to the configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of the file holding a collaboration's record.
    #[must_use]
    pub fn path_for(&self, id: CollaborationId) -> PathBuf {
        self.root
            .join(RECORDS_DIR)
            .join(format!("{id}.{RECORD_EXTENSION}"))
    }

    fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }
}

impl Store for Directory {
    /// Loads every record file in parallel.
    ///
    /// Every unreadable file is reported, not just the first.
    fn load(&self) -> Result<Vec<CollaborationRecord>, StoreError> {
        let paths = collect_record_paths(&self.records_dir());

        let (records, failures): (Vec<_>, Vec<_>) = paths
            .par_iter()
            .map(|path| load_record(path).map_err(|e| (path.clone(), e)))
            .partition(Result::is_ok);

        let records: Vec<_> = records.into_iter().filter_map(Result::ok).collect();
        let failures: Vec<_> = failures.into_iter().filter_map(Result::err).collect();

        if let Some(failures) = NonEmpty::from_vec(failures) {
            return Err(StoreError::Load(failures));
        }

        tracing::debug!(
            count = records.len(),
            "loaded records from {}",
            self.root.display()
        );
        Ok(records)
    }

    fn load_one(&self, id: CollaborationId) -> Result<Option<CollaborationRecord>, StoreError> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        load_record(&path)
            .map(Some)
            .map_err(|e| StoreError::Load(NonEmpty::new((path, e))))
    }

    /// Writes the record to a temporary file and renames it into place, so a
    /// failed write never clobbers the previous version.
    ///
    /// The revision check and the rename happen while holding the
    /// collaboration's lock file.
    fn save(&self, record: &CollaborationRecord) -> Result<(), StoreError> {
        let id = record.collaboration.id();
        let yaml = record
            .to_yaml()
            .map_err(|source| StoreError::Serialize { id, source })?;

        let path = self.path_for(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let _lock = SaveLock::acquire(&path)?;
        if let Some(stored) = self.load_one(id)? {
            check_revision(id, stored.revision, record.revision)?;
        }

        let tmp = path.with_extension("yaml.tmp");
        let write = || -> io::Result<()> {
            fs::write(&tmp, &yaml)?;
            fs::rename(&tmp, &path)
        };

        write().map_err(|source| {
            let _ = fs::remove_file(&tmp);
            StoreError::Write {
                path: path.clone(),
                source,
            }
        })?;

        tracing::debug!(revision = record.revision, "saved {}", path.display());
        Ok(())
    }
}

/// Exclusive right to rewrite one record file, held while the lock file
/// exists.
#[derive(Debug)]
struct SaveLock {
    path: PathBuf,
}

impl SaveLock {
    fn acquire(record: &Path) -> Result<Self, StoreError> {
        let path = record.with_extension("yaml.lock");
        let deadline = Instant::now() + LOCK_TIMEOUT;
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if Instant::now() >= deadline {
                        return Err(StoreError::Locked { path });
                    }
                    thread::sleep(LOCK_POLL);
                }
                Err(source) => return Err(StoreError::Write { path, source }),
            }
        }
    }
}

impl Drop for SaveLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!("failed to release {}: {e}", self.path.display());
        }
    }
}

/// Errors that can occur when initializing a directory.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The directory already has a configuration file.
    #[error("marketplace already initialized in {}", .0.display())]
    AlreadyInitialized(PathBuf),
    /// A directory could not be created.
    #[error("failed to create directories")]
    Io(#[from] io::Error),
    /// The configuration file could not be written.
    #[error("{0}")]
    Config(String),
}

fn load_config(root: &Path) -> Config {
    let path = root.join(CONFIG_FILE);
    Config::load(&path).unwrap_or_else(|e| {
        tracing::debug!("Failed to load config: {e}");
        Config::default()
    })
}

fn collect_record_paths(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension() == Some(OsStr::new(RECORD_EXTENSION)))
        .collect()
}

fn load_record(path: &Path) -> Result<CollaborationRecord, LoadError> {
    let content = fs::read_to_string(path)?;
    let record = CollaborationRecord::from_yaml(&content)?;

    let id = record.collaboration.id();
    let named_for = path
        .file_stem()
        .and_then(OsStr::to_str)
        .and_then(|stem| stem.parse::<CollaborationId>().ok());
    if named_for != Some(id) {
        return Err(LoadError::Mismatch { found: id });
    }
    record.validate()?;

    Ok(record)
}
