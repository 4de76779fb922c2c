//! Durable local storage of pending user actions
//!
//! While the device is offline, user actions (forum posts, quiz answers,
//! glossary entries, wiki pages, ...) are queued here and replayed by the
//! sync engines once connectivity returns. One table serves every activity
//! type; rows are keyed by site, component, owning entity, acting user, a
//! natural key (concept, page title, question slot) and the creation
//! timestamp, which doubles as the "fake id" for not-yet-synced items.
//!
//! Rows are never mutated in place. Editing a queued action is
//! delete-then-insert, and activity types that allow a single outstanding
//! action per (entity, user) call [`PendingStore::delete_entity`] before
//! inserting.
//!
//! Two implementations are provided: [`SqlitePendingStore`] backed by sqlx
//! for the device database, and [`MemoryPendingStore`] for tests and engine
//! development.

pub mod action;
pub mod memory;
pub mod sqlite;
pub mod store;
pub mod times;

pub use action::*;
pub use memory::*;
pub use sqlite::*;
pub use store::*;
pub use times::*;
