//! The dual-store index handle
//!
//! Layout of an index directory:
//!
//! ```text
//! <dir>/version          "MAJOR.minor"
//! <dir>/fingerprint      random id, regenerated on every rebuild
//! <dir>/PrimaryIndex/    immutable content and properties
//! <dir>/SecondaryIndex/  mutable properties
//! <dir>/Locks/           <store>-write.lock while a writer is open
//! ```

pub mod filter;
pub mod indexer;
pub mod scoring;
pub mod searcher;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::IndexSettings;
use crate::error::{QuarryError, Result};
use crate::schema::fields::URI;
use crate::store::{index::is_lock_file, StoreWriter, TermIndex};
use crate::tokenizer::Tokenizer;

pub use filter::{ContentFilter, FilterOutcome, PlainTextFilter};
pub use indexer::{FlushObserver, NoopObserver};

pub const PRIMARY_DIR: &str = "PrimaryIndex";
pub const SECONDARY_DIR: &str = "SecondaryIndex";
pub const LOCK_DIR: &str = "Locks";
pub const VERSION_FILE: &str = "version";
pub const FINGERPRINT_FILE: &str = "fingerprint";

/// Primary + secondary stores sharing one directory
pub struct DualIndex {
    dir: PathBuf,
    settings: IndexSettings,
    tokenizer: Arc<Tokenizer>,
    primary: TermIndex,
    secondary: TermIndex,
    fingerprint: String,
    filter: Box<dyn ContentFilter>,
    /// Cached number of primary documents, refreshed on every commit
    item_count: Mutex<Option<u64>>,
}

impl DualIndex {
    /// Open the index under `dir`, creating it if absent
    ///
    /// An index with the wrong version, a dangling write lock or a corrupt
    /// store is purged and recreated empty.
    pub fn open<P: AsRef<Path>>(dir: P, settings: IndexSettings) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        match validate(&dir, &settings) {
            Ok(true) => {}
            Ok(false) => {
                info!(dir = %dir.display(), "creating index");
                create(&dir, &settings)?;
            }
            Err(e) if e.forces_rebuild() => {
                warn!(dir = %dir.display(), error = %e, "purging index");
                purge(&dir)?;
                create(&dir, &settings)?;
            }
            Err(e) => return Err(e),
        }

        match Self::open_stores(&dir, &settings) {
            Ok(index) => Ok(index),
            Err(e) if e.forces_rebuild() => {
                warn!(dir = %dir.display(), error = %e, "purging unreadable index");
                purge(&dir)?;
                create(&dir, &settings)?;
                Self::open_stores(&dir, &settings)
            }
            Err(e) => Err(e),
        }
    }

    fn open_stores(dir: &Path, settings: &IndexSettings) -> Result<Self> {
        let tokenizer = Arc::new(Tokenizer::new(&settings.tokenizer_config));
        let lock_dir = dir.join(LOCK_DIR);
        let primary = TermIndex::open(
            PRIMARY_DIR,
            dir.join(PRIMARY_DIR),
            &lock_dir,
            settings,
            tokenizer.clone(),
        )?;
        let secondary = TermIndex::open(
            SECONDARY_DIR,
            dir.join(SECONDARY_DIR),
            &lock_dir,
            settings,
            tokenizer.clone(),
        )?;
        let fingerprint = fs::read_to_string(dir.join(FINGERPRINT_FILE))?
            .trim()
            .to_string();
        let item_count = primary.open_reader().num_docs();

        Ok(Self {
            dir: dir.to_path_buf(),
            settings: settings.clone(),
            tokenizer,
            primary,
            secondary,
            fingerprint,
            filter: Box::new(PlainTextFilter),
            item_count: Mutex::new(Some(item_count)),
        })
    }

    /// Replace the content filter used by `flush`
    pub fn with_filter(mut self, filter: Box<dyn ContentFilter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn settings(&self) -> &IndexSettings {
        &self.settings
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn primary(&self) -> &TermIndex {
        &self.primary
    }

    pub fn secondary(&self) -> &TermIndex {
        &self.secondary
    }

    pub(crate) fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub(crate) fn content_filter(&self) -> &dyn ContentFilter {
        self.filter.as_ref()
    }

    /// Number of indexed items (primary documents)
    pub fn item_count(&self) -> u64 {
        let mut cached = self.item_count.lock();
        *cached.get_or_insert_with(|| self.primary.open_reader().num_docs())
    }

    pub(crate) fn refresh_item_count(&self) {
        *self.item_count.lock() = Some(self.primary.open_reader().num_docs());
    }

    /// Compact both stores
    pub fn optimize(&self) -> Result<()> {
        info!(dir = %self.dir.display(), "optimizing index");
        for store in [&self.primary, &self.secondary] {
            let mut writer = self.open_writer(store)?;
            writer.optimize();
            writer.commit()?;
        }
        Ok(())
    }

    /// Import every document of `other`, replacing ours for the same URIs
    pub fn merge(&self, other: &DualIndex) -> Result<()> {
        let other_primary = other.primary.open_reader();
        let other_secondary = other.secondary.open_reader();

        let mut primary = self.open_writer(&self.primary)?;
        let mut secondary = self.open_writer(&self.secondary)?;
        for doc in other_primary.live_docs().iter() {
            if let Some(uri) = other_primary.stored_field(doc, URI) {
                primary.delete_term(URI, uri);
                secondary.delete_term(URI, uri);
            }
        }
        primary.add_snapshot(&other_primary);
        secondary.add_snapshot(&other_secondary);
        primary.commit()?;
        secondary.commit()?;

        self.refresh_item_count();
        info!(
            from = %other.dir.display(),
            items = self.item_count(),
            "merged index"
        );
        Ok(())
    }

    /// Open a writer, retrying with backoff while the store is busy
    pub(crate) fn open_writer<'a>(&self, store: &'a TermIndex) -> Result<StoreWriter<'a>> {
        let policy = &self.settings.busy_retry;
        let mut attempt = 1;
        loop {
            match store.open_writer() {
                Ok(writer) => return Ok(writer),
                Err(e) if e.is_retriable() && attempt < policy.max_attempts => {
                    let backoff = policy.backoff(attempt);
                    warn!(store = store.name(), attempt, ?backoff, "store busy, retrying");
                    std::thread::sleep(backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// `Ok(true)` for a usable index, `Ok(false)` when there is none yet
fn validate(dir: &Path, settings: &IndexSettings) -> Result<bool> {
    let version_path = dir.join(VERSION_FILE);
    let parts_present = version_path.exists()
        && dir.join(FINGERPRINT_FILE).exists()
        && TermIndex::exists(dir.join(PRIMARY_DIR))
        && TermIndex::exists(dir.join(SECONDARY_DIR));
    if !parts_present {
        let anything = version_path.exists()
            || dir.join(PRIMARY_DIR).exists()
            || dir.join(SECONDARY_DIR).exists();
        if anything {
            return Err(QuarryError::CorruptStore(
                "index directory is incomplete".to_string(),
            ));
        }
        return Ok(false);
    }

    let found = fs::read_to_string(&version_path)?.trim().to_string();
    let expected = settings.version_string();
    if found != expected {
        return Err(QuarryError::SchemaVersionMismatch { expected, found });
    }

    let lock_dir = dir.join(LOCK_DIR);
    if lock_dir.exists() {
        for entry in fs::read_dir(&lock_dir)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if is_lock_file(&name) {
                return Err(QuarryError::CorruptOrDanglingLock(name.into_owned()));
            }
        }
    }
    Ok(true)
}

fn create(dir: &Path, settings: &IndexSettings) -> Result<()> {
    fs::create_dir_all(dir.join(LOCK_DIR))?;
    TermIndex::create(dir.join(PRIMARY_DIR))?;
    TermIndex::create(dir.join(SECONDARY_DIR))?;
    fs::write(
        dir.join(FINGERPRINT_FILE),
        uuid::Uuid::new_v4().simple().to_string(),
    )?;
    fs::write(dir.join(VERSION_FILE), settings.version_string())?;
    Ok(())
}

fn purge(dir: &Path) -> Result<()> {
    for sub in [PRIMARY_DIR, SECONDARY_DIR, LOCK_DIR] {
        let path = dir.join(sub);
        if path.exists() {
            fs::remove_dir_all(&path)?;
        }
    }
    for file in [VERSION_FILE, FINGERPRINT_FILE] {
        let path = dir.join(file);
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_create_writes_layout() {
        let tmp = TempDir::new().unwrap();
        let index = DualIndex::open(tmp.path(), IndexSettings::default()).unwrap();

        assert!(tmp.path().join(PRIMARY_DIR).is_dir());
        assert!(tmp.path().join(SECONDARY_DIR).is_dir());
        assert!(tmp.path().join(LOCK_DIR).is_dir());
        assert_eq!(
            fs::read_to_string(tmp.path().join(VERSION_FILE)).unwrap(),
            "10.0"
        );
        assert_eq!(index.fingerprint().len(), 32);
        assert_eq!(index.item_count(), 0);
    }

    #[test]
    fn test_reopen_keeps_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let first = DualIndex::open(tmp.path(), IndexSettings::default())
            .unwrap()
            .fingerprint()
            .to_string();
        let second = DualIndex::open(tmp.path(), IndexSettings::default()).unwrap();
        assert_eq!(second.fingerprint(), first);
    }

    #[test]
    fn test_version_mismatch_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let first = DualIndex::open(tmp.path(), IndexSettings::default())
            .unwrap()
            .fingerprint()
            .to_string();

        let settings = IndexSettings::default().with_minor_version(1);
        let rebuilt = DualIndex::open(tmp.path(), settings).unwrap();
        assert_ne!(rebuilt.fingerprint(), first);
        assert_eq!(
            fs::read_to_string(tmp.path().join(VERSION_FILE)).unwrap(),
            "10.1"
        );
    }

    #[test]
    fn test_dangling_lock_rebuilds() {
        let tmp = TempDir::new().unwrap();
        let first = DualIndex::open(tmp.path(), IndexSettings::default())
            .unwrap()
            .fingerprint()
            .to_string();
        fs::write(
            tmp.path().join(LOCK_DIR).join("PrimaryIndex-write.lock"),
            "4242",
        )
        .unwrap();

        let err = validate(tmp.path(), &IndexSettings::default()).unwrap_err();
        assert!(matches!(err, QuarryError::CorruptOrDanglingLock(_)));

        let rebuilt = DualIndex::open(tmp.path(), IndexSettings::default()).unwrap();
        assert_ne!(rebuilt.fingerprint(), first);
        assert!(!tmp
            .path()
            .join(LOCK_DIR)
            .join("PrimaryIndex-write.lock")
            .exists());
    }
}
