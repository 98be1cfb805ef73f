//! Host adapter traits.
//!
//! The engine core never talks to persistence directly; everything it
//! wants changed arrives here as a batched call. Hosts plug in real
//! document stores, compendium indices, chat surfaces, and permission
//! models; tests plug in recording fakes.

use async_trait::async_trait;
use serde_json::Value as Json;

use srd35_core::model::{ActorId, Item, ItemId};

use crate::error::HostError;

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Options attached to a document update.
#[derive(Clone, Copy, Debug, Default)]
pub struct UpdateOptions {
    /// Suppress the host's own change-reaction pipeline; the caller will
    /// drive recomputation itself. Used to batch mutations into a single
    /// derived-state rebuild.
    pub stop_updates: bool,
}

/// Persistence backend for actors and their owned items.
///
/// Diffs are dotted-path JSON objects, the one place the typed model
/// crosses into dynamic territory.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn update_actor(
        &self,
        actor: ActorId,
        diff: Json,
        options: UpdateOptions,
    ) -> HostResult<()>;

    async fn create_items(&self, actor: ActorId, items: Vec<Item>) -> HostResult<Vec<ItemId>>;

    async fn update_items(
        &self,
        actor: ActorId,
        diffs: Vec<(ItemId, Json)>,
        options: UpdateOptions,
    ) -> HostResult<()>;

    async fn delete_items(&self, actor: ActorId, items: Vec<ItemId>) -> HostResult<()>;
}

/// Read-only lookup into the host's content collections.
#[async_trait]
pub trait CollectionSource: Send + Sync {
    /// Find a content item by exact name.
    async fn find_item(&self, name: &str) -> HostResult<Option<Item>>;
}

/// Outbound user-facing messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn warn(&self, message: &str);
    async fn post(&self, message: &str);
}

/// Who may mutate which actor.
pub trait PermissionGate: Send + Sync {
    fn can_modify(&self, actor: ActorId) -> bool;
}

/// Gate that allows everything; the default for single-user hosts.
pub struct OpenGate;

impl PermissionGate for OpenGate {
    fn can_modify(&self, _actor: ActorId) -> bool {
        true
    }
}
