use crate::core::OwnedMarine;
use crate::storage::{PersistenceGateway, SharedStore};

/// Who is asking. Operators (the server console) may touch any record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    User,
    Operator,
}

/// Everything one command invocation needs: the requester and handles to the
/// store and the gateway.
pub struct ExecutionContext<'a> {
    pub login: &'a str,
    pub privilege: Privilege,
    pub store: &'a SharedStore,
    pub gateway: &'a dyn PersistenceGateway,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(login: &'a str, store: &'a SharedStore, gateway: &'a dyn PersistenceGateway) -> Self {
        Self {
            login,
            privilege: Privilege::User,
            store,
            gateway,
        }
    }

    pub fn operator(
        login: &'a str,
        store: &'a SharedStore,
        gateway: &'a dyn PersistenceGateway,
    ) -> Self {
        Self {
            login,
            privilege: Privilege::Operator,
            store,
            gateway,
        }
    }

    /// Ownership gate for every mutation that touches an existing record.
    pub fn may_modify(&self, record: &OwnedMarine) -> bool {
        self.privilege == Privilege::Operator || record.is_owned_by(self.login)
    }
}
