//! Append-only journal gateway.
//!
//! Each entry is a 4-byte little-endian length followed by a MessagePack body.
//! Opening the journal replays every entry into memory; a torn entry at the
//! tail (crash mid-append) is cut off, anything else unreadable is fatal.
//! A failed append is rolled back to the last acknowledged entry before the
//! error is returned.

use super::gateway::{GatewayTables, PersistenceGateway};
use crate::connection::auth::{hash_password, verify_password};
use crate::core::{MarineError, MarineId, OwnedMarine, Result, SpaceMarine};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

// ============================================================================
// Journal Entry Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalEntry {
    UserRegistered { login: String, password_hash: String },
    RecordAdded { record: OwnedMarine },
    RecordDeleted { id: MarineId },
    RecordReplaced { old_id: MarineId, record: OwnedMarine },
}

impl JournalEntry {
    fn apply(self, tables: &mut GatewayTables) {
        match self {
            JournalEntry::UserRegistered {
                login,
                password_hash,
            } => {
                tables.users.insert(login, password_hash);
            }
            JournalEntry::RecordAdded { record } => tables.put_record(record),
            JournalEntry::RecordDeleted { id } => {
                tables.records.remove(&id);
            }
            JournalEntry::RecordReplaced { old_id, record } => {
                tables.records.remove(&old_id);
                tables.put_record(record);
            }
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every entry
    Sync,
    /// flush to the OS after every entry
    #[default]
    Flush,
}

/// Destination of encoded entries.
trait JournalSink: Write + Send {
    /// Cuts the sink back to `len` bytes; later writes continue from there.
    fn truncate(&mut self, len: u64) -> io::Result<()>;
    fn sync(&mut self) -> io::Result<()>;
}

impl JournalSink for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_data()
    }
}

struct JournalState {
    tables: GatewayTables,
    sink: Box<dyn JournalSink>,
    /// Bytes covered by acknowledged entries.
    durable_len: u64,
    /// A rollback failed; the tail on disk is unknown.
    broken: bool,
}

pub struct JournalGateway {
    path: PathBuf,
    state: Mutex<JournalState>,
    durability: DurabilityMode,
    cost: u32,
}

impl JournalGateway {
    /// Opens (or creates) the journal and replays it.
    ///
    /// I/O failures are reported as transient so the caller can retry;
    /// an undecodable entry is fatal.
    pub fn open<P: AsRef<Path>>(path: P, durability: DurabilityMode, cost: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                MarineError::unavailable(format!("failed to create journal directory: {}", e))
            })?;
        }

        let (tables, valid_len, total_entries) = Self::replay(&path)?;

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| MarineError::unavailable(format!("failed to open journal: {}", e)))?;
        let on_disk = file
            .metadata()
            .map_err(|e| MarineError::unavailable(format!("failed to stat journal: {}", e)))?
            .len();
        if on_disk > valid_len {
            warn!(
                path = %path.display(),
                dropped_bytes = on_disk - valid_len,
                "truncating torn journal tail"
            );
            file.set_len(valid_len)
                .map_err(|e| MarineError::unavailable(format!("failed to truncate journal: {}", e)))?;
        }
        drop(file);

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| MarineError::unavailable(format!("failed to open journal: {}", e)))?;

        info!(
            path = %path.display(),
            entries = total_entries,
            users = tables.users.len(),
            records = tables.records.len(),
            "journal replayed"
        );

        Ok(Self::with_sink(path, tables, Box::new(file), valid_len, durability, cost))
    }

    fn with_sink(
        path: PathBuf,
        tables: GatewayTables,
        sink: Box<dyn JournalSink>,
        durable_len: u64,
        durability: DurabilityMode,
        cost: u32,
    ) -> Self {
        Self {
            path,
            state: Mutex::new(JournalState {
                tables,
                sink,
                durable_len,
                broken: false,
            }),
            durability,
            cost,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the replayed tables, the byte length of the intact prefix and the entry count.
    fn replay(path: &Path) -> Result<(GatewayTables, u64, usize)> {
        let mut tables = GatewayTables::default();
        if !path.exists() {
            return Ok((tables, 0, 0));
        }

        let file = File::open(path)
            .map_err(|e| MarineError::unavailable(format!("failed to open journal for reading: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut valid_len = 0u64;
        let mut count = 0usize;

        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(MarineError::unavailable(format!(
                        "failed to read journal entry length: {}",
                        e
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            match reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(MarineError::unavailable(format!(
                        "failed to read journal entry data: {}",
                        e
                    )));
                }
            }
            let entry: JournalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                MarineError::fatal_persistence(format!(
                    "corrupt journal entry #{} in {}: {}",
                    count + 1,
                    path.display(),
                    e
                ))
            })?;
            entry.apply(&mut tables);
            valid_len += (4 + len) as u64;
            count += 1;
        }

        Ok((tables, valid_len, count))
    }

    fn append(&self, state: &mut JournalState, entry: &JournalEntry) -> Result<()> {
        if state.broken {
            return Err(MarineError::fatal_persistence(format!(
                "journal {} has an unknown tail after a failed rollback",
                self.path.display()
            )));
        }
        let serialized = rmp_serde::to_vec(entry).map_err(|e| {
            MarineError::fatal_persistence(format!("failed to serialize journal entry: {}", e))
        })?;
        let mut frame = Vec::with_capacity(4 + serialized.len());
        frame.extend_from_slice(&(serialized.len() as u32).to_le_bytes());
        frame.extend_from_slice(&serialized);

        match write_entry(state.sink.as_mut(), &frame, self.durability) {
            Ok(()) => {
                state.durable_len += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "journal append failed, rolling back");
                if let Err(rollback) = state.sink.truncate(state.durable_len) {
                    state.broken = true;
                    error!(path = %self.path.display(), error = %rollback, "journal rollback failed");
                    return Err(MarineError::fatal_persistence(format!(
                        "failed to roll back journal after a failed write: {}",
                        rollback
                    )));
                }
                Err(MarineError::unavailable(format!("failed to write journal: {}", e)))
            }
        }
    }
}

fn write_entry(sink: &mut dyn JournalSink, frame: &[u8], durability: DurabilityMode) -> io::Result<()> {
    sink.write_all(frame)?;
    sink.flush()?;
    if durability == DurabilityMode::Sync {
        sink.sync()?;
    }
    Ok(())
}

#[async_trait]
impl PersistenceGateway for JournalGateway {
    async fn is_login_free(&self, login: &str) -> Result<bool> {
        Ok(!self.state.lock().await.tables.users.contains_key(login))
    }

    async fn register_user(&self, login: &str, password: &str) -> Result<()> {
        let password_hash = hash_password(password, self.cost).await?;
        let mut state = self.state.lock().await;
        state.tables.check_login_free(login)?;
        let entry = JournalEntry::UserRegistered {
            login: login.to_string(),
            password_hash,
        };
        self.append(&mut state, &entry)?;
        entry.apply(&mut state.tables);
        Ok(())
    }

    async fn is_registered_user(&self, login: &str, password: &str) -> Result<bool> {
        let hash = self.state.lock().await.tables.password_hash(login);
        match hash {
            Some(hash) => verify_password(password, &hash).await,
            None => Ok(false),
        }
    }

    async fn add_record_with_owner(&self, marine: &SpaceMarine, owner: &str) -> Result<MarineId> {
        let mut state = self.state.lock().await;
        let id = state.tables.last_id + 1;
        let entry = JournalEntry::RecordAdded {
            record: OwnedMarine::new(marine.clone().with_id(id), owner),
        };
        self.append(&mut state, &entry)?;
        entry.apply(&mut state.tables);
        Ok(id)
    }

    async fn delete_record_by_id(&self, id: MarineId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tables.check_record_exists(id)?;
        let entry = JournalEntry::RecordDeleted { id };
        self.append(&mut state, &entry)?;
        entry.apply(&mut state.tables);
        Ok(())
    }

    async fn list_all_with_owners(&self) -> Result<Vec<OwnedMarine>> {
        Ok(self.state.lock().await.tables.records.values().cloned().collect())
    }

    /// One journal entry, so a crash can never leave both or neither copy.
    async fn replace_record_with_owner(
        &self,
        old_id: MarineId,
        marine: &SpaceMarine,
        owner: &str,
    ) -> Result<MarineId> {
        let mut state = self.state.lock().await;
        state.tables.check_record_exists(old_id)?;
        let id = state.tables.last_id + 1;
        let entry = JournalEntry::RecordReplaced {
            old_id,
            record: OwnedMarine::new(marine.clone().with_id(id), owner),
        };
        self.append(&mut state, &entry)?;
        entry.apply(&mut state.tables);
        Ok(id)
    }
}
