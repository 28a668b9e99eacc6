use crate::connection::auth::{hash_password, verify_password};
use crate::core::{MarineError, MarineId, OwnedMarine, Result, SpaceMarine};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// Durable storage the server mirrors every collection mutation into.
///
/// Users are keyed by login, records by the id the gateway assigns on insertion.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn is_login_free(&self, login: &str) -> Result<bool>;

    /// Stores a new user. Fails with `MarineError::Auth` if the login is taken.
    async fn register_user(&self, login: &str, password: &str) -> Result<()>;

    async fn is_registered_user(&self, login: &str, password: &str) -> Result<bool>;

    /// Persists the record and returns its freshly assigned id.
    async fn add_record_with_owner(&self, marine: &SpaceMarine, owner: &str) -> Result<MarineId>;

    async fn delete_record_by_id(&self, id: MarineId) -> Result<()>;

    async fn list_all_with_owners(&self) -> Result<Vec<OwnedMarine>>;

    /// Inserts the replacement first, then deletes the old record, so a failure
    /// in between leaves a duplicate rather than a lost record. Implementations
    /// that can do both in one durable step should override this.
    async fn replace_record_with_owner(
        &self,
        old_id: MarineId,
        marine: &SpaceMarine,
        owner: &str,
    ) -> Result<MarineId> {
        let new_id = self.add_record_with_owner(marine, owner).await?;
        self.delete_record_by_id(old_id).await?;
        Ok(new_id)
    }
}

// ============================================================================
// Shared in-memory tables
// ============================================================================

/// User and record tables shared by the gateway implementations.
#[derive(Debug, Default)]
pub(crate) struct GatewayTables {
    pub(crate) users: HashMap<String, String>,
    pub(crate) records: BTreeMap<MarineId, OwnedMarine>,
    pub(crate) last_id: MarineId,
}

impl GatewayTables {
    pub(crate) fn next_id(&mut self) -> MarineId {
        self.last_id += 1;
        self.last_id
    }

    pub(crate) fn put_record(&mut self, record: OwnedMarine) {
        self.last_id = self.last_id.max(record.id());
        self.records.insert(record.id(), record);
    }

    pub(crate) fn check_login_free(&self, login: &str) -> Result<()> {
        if self.users.contains_key(login) {
            return Err(MarineError::Auth(format!("login '{}' is already taken", login)));
        }
        Ok(())
    }

    pub(crate) fn check_record_exists(&self, id: MarineId) -> Result<()> {
        if !self.records.contains_key(&id) {
            return Err(MarineError::Execution(format!("record {} is not persisted", id)));
        }
        Ok(())
    }

    pub(crate) fn password_hash(&self, login: &str) -> Option<String> {
        self.users.get(login).cloned()
    }
}

// ============================================================================
// MemoryGateway
// ============================================================================

/// Non-durable gateway. Useful for tests and throwaway servers.
///
/// Can be switched offline to simulate an unreachable store.
pub struct MemoryGateway {
    tables: Mutex<GatewayTables>,
    online: AtomicBool,
    cost: u32,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::with_cost(bcrypt::DEFAULT_COST)
    }

    /// Uses the given bcrypt cost for stored passwords.
    pub fn with_cost(cost: u32) -> Self {
        Self {
            tables: Mutex::new(GatewayTables::default()),
            online: AtomicBool::new(true),
            cost,
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MarineError::unavailable("memory gateway is offline"))
        }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn is_login_free(&self, login: &str) -> Result<bool> {
        self.ensure_online()?;
        Ok(!self.tables.lock().await.users.contains_key(login))
    }

    async fn register_user(&self, login: &str, password: &str) -> Result<()> {
        self.ensure_online()?;
        let hash = hash_password(password, self.cost).await?;
        let mut tables = self.tables.lock().await;
        tables.check_login_free(login)?;
        tables.users.insert(login.to_string(), hash);
        Ok(())
    }

    async fn is_registered_user(&self, login: &str, password: &str) -> Result<bool> {
        self.ensure_online()?;
        let hash = self.tables.lock().await.password_hash(login);
        match hash {
            Some(hash) => verify_password(password, &hash).await,
            None => Ok(false),
        }
    }

    async fn add_record_with_owner(&self, marine: &SpaceMarine, owner: &str) -> Result<MarineId> {
        self.ensure_online()?;
        let mut tables = self.tables.lock().await;
        let id = tables.next_id();
        tables.put_record(OwnedMarine::new(marine.clone().with_id(id), owner));
        Ok(id)
    }

    async fn delete_record_by_id(&self, id: MarineId) -> Result<()> {
        self.ensure_online()?;
        let mut tables = self.tables.lock().await;
        tables.check_record_exists(id)?;
        tables.records.remove(&id);
        Ok(())
    }

    async fn list_all_with_owners(&self) -> Result<Vec<OwnedMarine>> {
        self.ensure_online()?;
        Ok(self.tables.lock().await.records.values().cloned().collect())
    }
}
