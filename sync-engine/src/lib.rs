//! Offline-replay synchronization engine
//!
//! One [`SyncEngine`] instance exists per activity type, all sharing the same
//! reconciliation protocol: detect queued offline actions, take the per-entity
//! sync lock, replay the actions against the remote service in creation
//! order, discard what the server explicitly rejects, and clean up local
//! state. The per-activity behavior (where pending data lives, how an action
//! is submitted, what reconciliation the type needs) is supplied through the
//! [`ActivityHandler`] trait.
//!
//! Guarantees, in order of importance:
//!
//! - **At most one concurrent sync per (site, identifier)**: a second caller
//!   awaits the same in-flight outcome instead of starting a duplicate run.
//!   Check-and-register is a single atomic map insert.
//! - **No mutation without connectivity**: when offline and actions are
//!   queued, the run fails with a connectivity error and local data is left
//!   intact for the next retry.
//! - **Server rejections are terminal**: content the server refused is
//!   deleted and reported as a warning; it is never retried.
//! - **Within-entity ordering**: actions replay sequentially in creation
//!   order, because later actions may depend on earlier ones.
//!
//! Everything the engine talks to is an injected service: the offline store
//! and remote API live behind the handler, locks and sync times are shared
//! registries, outcomes of background batches are announced on the event bus.

pub mod collaborators;
pub mod config;
pub mod engine;
pub mod handler;
pub mod lock;
pub mod result;

pub use collaborators::*;
pub use config::*;
pub use engine::*;
pub use handler::*;
pub use lock::*;
pub use result::*;
