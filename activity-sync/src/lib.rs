//! Per-activity sync providers
//!
//! Each module specializes the shared [`sync_engine::SyncEngine`] template
//! for one activity type: where its queued offline data lives, how an action
//! is submitted to the remote web service, and whatever reconciliation the
//! type needs before replay. The remote services are traits implemented by
//! the site's API layer and mocked in tests.
//!
//! The interesting variations:
//!
//! - `choice`/`survey`: a single outstanding action per (entity, user),
//!   replaced on edit
//! - `glossary`: multiple independent entries with locally staged attachment
//!   files to clean up
//! - `wiki`: subwiki scoping (`wikiId:userId:groupId` identifiers), created
//!   pages reported back for navigation
//! - `quiz`: attempt-based; answers are validated against the online
//!   sequence checks and the whole attempt is discarded when another client
//!   already finished it
//! - `feedback`: paged responses replayed strictly in page order
//! - `forum`: new discussions and replies, replies ordered after the posts
//!   they depend on
//! - `h5p`: ordered xAPI statement batches

pub mod choice;
pub mod feedback;
pub mod forum;
pub mod glossary;
pub mod h5p;
pub mod quiz;
pub mod survey;
pub mod wiki;

#[cfg(test)]
mod testing;
