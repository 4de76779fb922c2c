//! In-process event bus for the OpenLearn mobile client
//!
//! Fire-and-forget notification channel between the sync engines and the UI
//! layer. The engines announce "auto-synced" outcomes here so open views can
//! refresh when background sync changed server state under the user's feet.
//!
//! Properties:
//! - Publish/Subscribe with one broadcast channel per topic
//! - Fan-out to every live subscriber, no backpressure
//! - No persistence: events published with nobody listening are lost
//! - Site-scoped payloads so multi-account installs don't cross-notify
//!
//! # Example
//!
//! ```rust
//! use events_bus::{EventBus, Event};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = EventBus::new();
//!     let mut subscriber = bus.subscribe("mod_choice.auto_synced");
//!
//!     bus.publish(Event::new(
//!         "mod_choice.auto_synced",
//!         "site1",
//!         json!({ "entity_id": 42, "user_id": 7, "warnings": [] }),
//!     ));
//!
//!     let event = subscriber.recv().await.unwrap();
//!     assert_eq!(event.site_id, "site1");
//! }
//! ```

pub mod bus;
pub mod error;
pub mod event;

pub use bus::*;
pub use error::*;
pub use event::*;
