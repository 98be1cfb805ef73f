//! Host integration for the d20 3.5e rules engine.
//!
//! This crate wires the pure engine core to an asynchronous host: a
//! document store for persistence, a compendium source for item lookup,
//! a notifier for chat-facing output, and a permission gate. Consumers
//! embed [`ActorService`] to own actor state and drive recomputation, and
//! [`CombatClock`] to run initiative order and timed effects.
//!
//! Modules are organized by responsibility:
//! - [`host`] defines the adapter traits hosts implement
//! - [`service`] owns actors, dirty tracking, and directive application
//! - [`clock`] runs rounds, turns, and buff progression
//! - [`error`] carries the unified error type

pub mod clock;
pub mod error;
pub mod host;
pub mod service;

pub use clock::{ClockEvent, CombatClock, Combatant, CombatantKind, RoundHook};
pub use error::{HostError, Result, RuntimeError};
pub use host::{
    CollectionSource, DocumentStore, HostResult, Notifier, OpenGate, PermissionGate, UpdateOptions,
};
pub use service::{ActorService, HostAdapters};
