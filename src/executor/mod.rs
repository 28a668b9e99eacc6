//! Command execution.
//!
//! Every `Command` variant maps to exactly one handler through the `match` in
//! [`execute`]; there is no lookup that can miss.

pub mod context;
pub mod delete;
pub mod dml;
pub mod query;

pub use context::{ExecutionContext, Privilege};

use crate::core::Result;
use crate::protocol::{Command, Reply};

pub async fn execute(ctx: &ExecutionContext<'_>, command: Command) -> Result<Reply> {
    match command {
        Command::Add(marine) => dml::add(ctx, marine).await,
        Command::AddIfMin(marine) => dml::add_if_min(ctx, marine).await,
        Command::Update { id, marine } => dml::update(ctx, id, marine).await,
        Command::RemoveById(id) => delete::remove_by_id(ctx, id).await,
        Command::RemoveHead => delete::remove_head(ctx).await,
        Command::RemoveGreater(marine) => delete::remove_greater(ctx, marine).await,
        Command::RemoveAnyByHeight(height) => delete::remove_any_by_height(ctx, height).await,
        Command::Clear => delete::clear(ctx).await,
        Command::Show => query::show(ctx).await,
        Command::Info => query::info(ctx).await,
        Command::AverageOfHeight => query::average_of_height(ctx).await,
        Command::CountGreaterThan(weapon) => query::count_greater_than(ctx, weapon).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MarineId, MeleeWeapon, SpaceMarine};
    use crate::storage::{MemoryGateway, PersistenceGateway, SharedStore};

    struct Fixture {
        store: SharedStore,
        gateway: MemoryGateway,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: SharedStore::new(),
                gateway: MemoryGateway::with_cost(crate::connection::config::MIN_BCRYPT_COST),
            }
        }

        async fn run(&self, login: &str, command: Command) -> Reply {
            let ctx = ExecutionContext::new(login, &self.store, &self.gateway);
            execute(&ctx, command).await.unwrap()
        }

        async fn add(&self, login: &str, height: i64, weapon: MeleeWeapon) -> MarineId {
            self.run(login, Command::Add(SpaceMarine::new("m", height, weapon)))
                .await;
            self.store
                .snapshot()
                .await
                .into_iter()
                .map(|r| r.id())
                .max()
                .unwrap()
        }

        async fn gateway_ids(&self) -> Vec<MarineId> {
            let mut ids: Vec<_> = self
                .gateway
                .list_all_with_owners()
                .await
                .unwrap()
                .iter()
                .map(|r| r.id())
                .collect();
            ids.sort();
            ids
        }

        async fn store_ids(&self) -> Vec<MarineId> {
            let mut ids = self.store.ids().await;
            ids.sort();
            ids
        }
    }

    fn marine(height: i64) -> SpaceMarine {
        SpaceMarine::new("candidate", height, MeleeWeapon::ChainSword)
    }

    #[tokio::test]
    async fn test_add_and_remove_by_id_track_ids() {
        let f = Fixture::new();
        let a = f.add("alice", 10, MeleeWeapon::ChainSword).await;
        let b = f.add("alice", 20, MeleeWeapon::ChainSword).await;
        let c = f.add("bob", 30, MeleeWeapon::ChainSword).await;

        f.run("alice", Command::RemoveById(b)).await;

        assert_eq!(f.store_ids().await, vec![a, c]);
        assert_eq!(f.gateway_ids().await, vec![a, c]);
        assert_eq!(f.store.get(a).await.unwrap().owner, "alice");
        assert_eq!(f.store.get(c).await.unwrap().owner, "bob");
    }

    #[tokio::test]
    async fn test_foreign_records_are_untouchable() {
        let f = Fixture::new();
        let owned_by_bob = f.add("bob", 50, MeleeWeapon::ChainSword).await;

        f.run("alice", Command::RemoveById(owned_by_bob)).await;
        f.run("alice", Command::RemoveGreater(marine(0))).await;
        f.run("alice", Command::RemoveAnyByHeight(50)).await;
        f.run("alice", Command::Clear).await;
        f.run(
            "alice",
            Command::Update {
                id: owned_by_bob,
                marine: marine(1),
            },
        )
        .await;
        assert_eq!(f.run("alice", Command::RemoveHead).await, Reply::Nothing);

        let record = f.store.get(owned_by_bob).await.unwrap();
        assert_eq!(record.owner, "bob");
        assert_eq!(record.marine.height, 50);
        assert_eq!(f.gateway_ids().await, vec![owned_by_bob]);
    }

    #[tokio::test]
    async fn test_update_replaces_under_new_id() {
        let f = Fixture::new();
        let old = f.add("alice", 10, MeleeWeapon::ChainSword).await;

        f.run(
            "alice",
            Command::Update {
                id: old,
                marine: marine(99),
            },
        )
        .await;

        let records = f.store.snapshot().await;
        assert_eq!(records.len(), 1);
        assert_ne!(records[0].id(), old);
        assert_eq!(records[0].marine.height, 99);
        assert_eq!(records[0].owner, "alice");
        assert_eq!(f.gateway_ids().await, vec![records[0].id()]);
    }

    #[tokio::test]
    async fn test_add_if_min() {
        let f = Fixture::new();
        f.run("alice", Command::AddIfMin(marine(10))).await;
        assert_eq!(f.store.len().await, 1);

        // equal height is not strictly smaller
        f.run("alice", Command::AddIfMin(marine(10))).await;
        f.run("alice", Command::AddIfMin(marine(11))).await;
        assert_eq!(f.store.len().await, 1);

        f.run("bob", Command::AddIfMin(marine(9))).await;
        assert_eq!(f.store.len().await, 2);
        assert_eq!(f.store.read().await.first().unwrap().owner, "bob");
    }

    #[tokio::test]
    async fn test_remove_head() {
        let f = Fixture::new();
        assert_eq!(f.run("alice", Command::RemoveHead).await, Reply::Nothing);

        let low = f.add("alice", 5, MeleeWeapon::ChainSword).await;
        f.add("alice", 7, MeleeWeapon::ChainSword).await;

        match f.run("alice", Command::RemoveHead).await {
            Reply::Owned(record) => {
                assert_eq!(record.id(), low);
                assert_eq!(record.owner, "alice");
            }
            other => panic!("unexpected reply {:?}", other),
        }
        assert_eq!(f.store.len().await, 1);
        assert!(!f.gateway_ids().await.contains(&low));
    }

    #[tokio::test]
    async fn test_remove_greater_and_by_height() {
        let f = Fixture::new();
        f.add("alice", 10, MeleeWeapon::ChainSword).await;
        f.add("alice", 20, MeleeWeapon::ChainSword).await;
        f.add("alice", 30, MeleeWeapon::ChainSword).await;
        f.add("bob", 40, MeleeWeapon::ChainSword).await;

        f.run("alice", Command::RemoveGreater(marine(15))).await;
        let heights: Vec<_> = f.store.snapshot().await.iter().map(|r| r.marine.height).collect();
        assert_eq!(heights, vec![10, 40]);

        f.run("alice", Command::RemoveAnyByHeight(10)).await;
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove_any_by_height_zero() {
        let f = Fixture::new();
        f.add("alice", 0, MeleeWeapon::ChainSword).await;
        f.add("alice", 0, MeleeWeapon::ChainSword).await;

        f.run("alice", Command::RemoveAnyByHeight(0)).await;
        assert_eq!(f.store.len().await, 1);
    }

    #[tokio::test]
    async fn test_clear_only_own_records() {
        let f = Fixture::new();
        f.add("alice", 1, MeleeWeapon::ChainSword).await;
        f.add("alice", 2, MeleeWeapon::ChainSword).await;
        let bobs = f.add("bob", 3, MeleeWeapon::ChainSword).await;

        f.run("alice", Command::Clear).await;
        assert_eq!(f.store_ids().await, vec![bobs]);
        assert_eq!(f.gateway_ids().await, vec![bobs]);
    }

    #[tokio::test]
    async fn test_operator_bypasses_ownership() {
        let f = Fixture::new();
        f.add("alice", 1, MeleeWeapon::ChainSword).await;
        f.add("bob", 2, MeleeWeapon::ChainSword).await;

        let ctx = ExecutionContext::operator("admin", &f.store, &f.gateway);
        execute(&ctx, Command::Clear).await.unwrap();
        assert!(f.store.is_empty().await);
        assert!(f.gateway_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_queries() {
        let f = Fixture::new();
        assert_eq!(
            f.run("alice", Command::AverageOfHeight).await,
            Reply::Text("The average value of the height: 0.".into())
        );

        f.add("alice", 20, MeleeWeapon::Manreaper).await;
        f.add("bob", 10, MeleeWeapon::ChainSword).await;

        assert_eq!(
            f.run("alice", Command::AverageOfHeight).await,
            Reply::Text("The average value of the height: 15.0.".into())
        );
        assert_eq!(
            f.run("alice", Command::CountGreaterThan(MeleeWeapon::PowerSword)).await,
            Reply::Text(
                "1 queue's elements have the value \"Melee Weapon\", greater than the given value."
                    .into()
            )
        );

        let Reply::Text(info) = f.run("alice", Command::Info).await else {
            panic!("info must be text");
        };
        assert!(info.starts_with("collectionType: PriorityQueue<SpaceMarine>, createTime: "));
        assert!(info.ends_with("length: 2."));

        let Reply::Text(shown) = f.run("alice", Command::Show).await else {
            panic!("show must be text");
        };
        let parsed: serde_json::Value = serde_json::from_str(&shown).unwrap();
        assert_eq!(parsed[0]["marine"]["height"], 10);
        assert_eq!(parsed[1]["marine"]["height"], 20);
    }

    #[tokio::test]
    async fn test_invalid_marine_rejected_before_gateway() {
        let f = Fixture::new();
        let ctx = ExecutionContext::new("alice", &f.store, &f.gateway);
        let result = execute(&ctx, Command::Add(SpaceMarine::new("", 1, MeleeWeapon::ChainSword))).await;
        assert!(result.is_err());
        assert!(f.gateway_ids().await.is_empty());
    }
}
