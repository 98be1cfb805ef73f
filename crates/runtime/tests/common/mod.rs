//! Recording host fakes shared by the integration tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as Json;

use srd35_core::formula::SequenceRoller;
use srd35_core::model::{Actor, ActorId, Item, ItemId};
use srd35_runtime::{
    ActorService, CollectionSource, DocumentStore, HostAdapters, HostResult, Notifier, OpenGate,
    UpdateOptions,
};

/// Every call the service made, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreCall {
    UpdateActor(ActorId, Json),
    CreateItems(ActorId, Vec<String>),
    UpdateItems(ActorId, Vec<(ItemId, Json)>),
    DeleteItems(ActorId, Vec<ItemId>),
}

#[derive(Default)]
pub struct MemoryStore {
    pub calls: Mutex<Vec<StoreCall>>,
    next_id: Mutex<u32>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            next_id: Mutex::new(1000),
        })
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn actor_update_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, StoreCall::UpdateActor(..)))
            .count()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn update_actor(
        &self,
        actor: ActorId,
        diff: Json,
        _options: UpdateOptions,
    ) -> HostResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::UpdateActor(actor, diff));
        Ok(())
    }

    async fn create_items(&self, actor: ActorId, items: Vec<Item>) -> HostResult<Vec<ItemId>> {
        let names = items.iter().map(|item| item.name.clone()).collect();
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::CreateItems(actor, names));
        let mut next = self.next_id.lock().unwrap();
        Ok(items
            .iter()
            .map(|_| {
                *next += 1;
                ItemId(*next)
            })
            .collect())
    }

    async fn update_items(
        &self,
        actor: ActorId,
        diffs: Vec<(ItemId, Json)>,
        _options: UpdateOptions,
    ) -> HostResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::UpdateItems(actor, diffs));
        Ok(())
    }

    async fn delete_items(&self, actor: ActorId, items: Vec<ItemId>) -> HostResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(StoreCall::DeleteItems(actor, items));
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryCompendium {
    pub items: Mutex<Vec<Item>>,
}

impl MemoryCompendium {
    pub fn new(items: Vec<Item>) -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(items),
        })
    }
}

#[async_trait]
impl CollectionSource for MemoryCompendium {
    async fn find_item(&self, name: &str) -> HostResult<Option<Item>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .find(|item| item.name == name)
            .cloned())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub warnings: Mutex<Vec<String>>,
    pub posts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn warn(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    async fn post(&self, message: &str) {
        self.posts.lock().unwrap().push(message.to_string());
    }
}

pub struct Harness {
    pub service: ActorService,
    pub store: Arc<MemoryStore>,
    pub notifier: Arc<RecordingNotifier>,
}

/// Build a service over recording fakes with a scripted dice sequence.
pub fn harness(faces: Vec<u32>, compendium: Vec<Item>) -> Harness {
    let store = MemoryStore::new();
    let notifier = RecordingNotifier::new();
    let service = ActorService::with_roller(
        srd35_content::srd_defaults(),
        HostAdapters {
            store: store.clone(),
            collections: MemoryCompendium::new(compendium),
            notifier: notifier.clone(),
            gate: Arc::new(OpenGate),
        },
        Box::new(SequenceRoller::new(faces)),
    );
    Harness {
        service,
        store,
        notifier,
    }
}

/// An actor with one fighter level block already attached.
pub fn fighter(id: u32, levels: u32) -> Actor {
    use srd35_core::model::{
        AbilityScore, BabProgression, ClassData, ClassSaves, ItemKind, ItemPayload,
        SaveProgression,
    };

    let mut actor = Actor::new(ActorId(id), format!("Fighter {id}"));
    actor.abilities.str_ = AbilityScore::new(16);
    actor.abilities.dex = AbilityScore::new(13);
    actor.attributes.hp.value = 40;
    actor.attributes.hp.max = 40;
    let mut class = Item::new(ItemId(1), "Fighter", ItemKind::Class);
    class.payload = ItemPayload::Class(ClassData {
        levels,
        max_level: 20,
        hit_die: 10,
        bab: BabProgression::High,
        saves: ClassSaves {
            fort: SaveProgression::Good,
            reflex: SaveProgression::Poor,
            will: SaveProgression::Poor,
        },
        ..Default::default()
    });
    actor.items.push(class);
    actor
}
