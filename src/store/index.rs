use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{debug, warn};

use super::snapshot::StoreSnapshot;
use super::state::StoreState;
use super::writer::StoreWriter;
use crate::config::IndexSettings;
use crate::error::{QuarryError, Result};
use crate::tokenizer::Tokenizer;

const STORE_FILE: &str = "store.bin";
const LOCK_SUFFIX: &str = "write.lock";

/// One on-disk term index: single writer, any number of snapshot readers
///
/// The published state is swapped atomically on commit, so readers never
/// block writers and always see a whole generation.
pub struct TermIndex {
    name: String,
    dir: PathBuf,
    lock_path: PathBuf,
    tokenizer: Arc<Tokenizer>,
    max_clause_count: usize,
    max_field_bytes: usize,
    current: ArcSwap<StoreState>,
    writer_active: AtomicBool,
}

impl TermIndex {
    /// Open the store under `dir`, creating an empty one if none exists
    pub fn open(
        name: &str,
        dir: impl AsRef<Path>,
        lock_dir: impl AsRef<Path>,
        settings: &IndexSettings,
        tokenizer: Arc<Tokenizer>,
    ) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        fs::create_dir_all(lock_dir.as_ref())?;

        let state = load_state(&dir)?;
        debug!(store = name, docs = state.num_docs(), "opened store");

        Ok(Self {
            name: name.to_string(),
            lock_path: lock_path(lock_dir.as_ref(), name),
            dir,
            tokenizer,
            max_clause_count: settings.max_clause_count,
            max_field_bytes: settings.max_field_bytes,
            current: ArcSwap::from_pointee(state),
            writer_active: AtomicBool::new(false),
        })
    }

    /// Whether `dir` holds a store
    pub fn exists<P: AsRef<Path>>(dir: P) -> bool {
        dir.as_ref().join(STORE_FILE).exists()
    }

    /// Write an empty store into `dir`
    pub fn create<P: AsRef<Path>>(dir: P) -> Result<()> {
        fs::create_dir_all(dir.as_ref())?;
        write_state(dir.as_ref(), &StoreState::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub(crate) fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub(crate) fn max_field_bytes(&self) -> usize {
        self.max_field_bytes
    }

    /// Snapshot of the last committed generation
    pub fn open_reader(&self) -> StoreSnapshot {
        StoreSnapshot::new(self.current.load_full(), self.max_clause_count)
    }

    /// Acquire the write lock
    ///
    /// Fails with `TransientStoreBusy` while another writer is open.
    pub fn open_writer(&self) -> Result<StoreWriter<'_>> {
        if self
            .writer_active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.busy());
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", std::process::id()) {
                    warn!(store = %self.name, error = %e, "failed to record lock owner");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                self.writer_active.store(false, Ordering::Release);
                return Err(self.busy());
            }
            Err(e) => {
                self.writer_active.store(false, Ordering::Release);
                return Err(e.into());
            }
        }

        let state = StoreState::clone(&self.current.load());
        Ok(StoreWriter::new(self, state))
    }

    /// Compact the store, dropping deleted documents
    pub fn optimize(&self) -> Result<()> {
        let mut writer = self.open_writer()?;
        writer.optimize();
        writer.commit()
    }

    pub(crate) fn publish(&self, state: StoreState) -> Result<()> {
        write_state(&self.dir, &state)?;
        self.current.store(Arc::new(state));
        Ok(())
    }

    pub(crate) fn release_writer(&self) {
        if let Err(e) = fs::remove_file(&self.lock_path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(store = %self.name, error = %e, "failed to remove write lock");
            }
        }
        self.writer_active.store(false, Ordering::Release);
    }

    fn busy(&self) -> QuarryError {
        QuarryError::TransientStoreBusy {
            store: self.name.clone(),
        }
    }
}

/// Lock file path for the store called `name`
pub fn lock_path(lock_dir: &Path, name: &str) -> PathBuf {
    lock_dir.join(format!("{}-{}", name, LOCK_SUFFIX))
}

/// Whether a file name is a store write lock
pub fn is_lock_file(file_name: &str) -> bool {
    file_name.ends_with(LOCK_SUFFIX)
}

fn load_state(dir: &Path) -> Result<StoreState> {
    let path = dir.join(STORE_FILE);
    if !path.exists() {
        return Ok(StoreState::default());
    }

    let bytes = fs::read(&path)?;
    if bytes.len() < 4 {
        return Err(QuarryError::CorruptStore(format!(
            "{} is truncated",
            path.display()
        )));
    }
    let (header, payload) = bytes.split_at(4);
    let expected = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if crc32fast::hash(payload) != expected {
        return Err(QuarryError::CorruptStore(format!(
            "{} failed checksum",
            path.display()
        )));
    }
    Ok(bincode::deserialize(payload)?)
}

fn write_state(dir: &Path, state: &StoreState) -> Result<()> {
    let payload = bincode::serialize(state)?;
    let mut bytes = Vec::with_capacity(payload.len() + 4);
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload);

    let tmp = dir.join(format!("{}.tmp", STORE_FILE));
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, dir.join(STORE_FILE))?;
    Ok(())
}
