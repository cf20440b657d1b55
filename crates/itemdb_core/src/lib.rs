//! # ItemDB Core
//!
//! Embedded transactional item store with sync shadows.
//!
//! This crate provides:
//! - an attribute model: typed attributes, values and attribute maps, with
//!   attributes themselves stored as items
//! - transactions over point-in-time snapshots, scheduled on two worker
//!   queues (writes and background reads on *main*, foreground reads on
//!   *view*)
//! - trunk and server branches per item, backed by BASE, CONFLICT, DOWNLOAD,
//!   UPLOAD_TASK and DONE_UPLOAD shadows, and the derived sync state
//! - boolean queries and incremental [`DbEvent`]s
//! - live queries and database listeners
//! - a CRC-framed commit journal for on-disk databases
//!
//! ```rust,ignore
//! use itemdb_core::{Attribute, BoolExpr, Database, Lifespan};
//!
//! let status = Attribute::text("app:status", "Status").shadowable();
//! let db = Database::open_in_memory()?;
//! let open = db.live_query(
//!     Lifespan::forever(),
//!     BoolExpr::equals(&status, "open"),
//!     |event: &DbEvent, icn: Icn, _: &DbReader<'_>| println!("{icn}: {:?}", event.added()),
//! );
//! db.write_foreground(move |w| {
//!     let item = w.create_item()?;
//!     item.set(&status, "open")?;
//!     Ok(())
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attribute;
mod config;
mod database;
mod dir;
pub mod dump;
mod error;
mod event;
mod journal;
mod live;
pub mod query;
pub mod scheduler;
pub mod shadow;
mod stats;
mod store;
mod transaction;
mod types;

pub use attribute::system::{Identified, ItemType, WellKnown};
pub use attribute::{Attribute, AttributeMap, Composition, FromValue, ScalarType, Value};
pub use config::Config;
pub use database::Database;
pub use dir::DatabaseDir;
pub use error::{CoreError, CoreResult};
pub use event::DbEvent;
pub use live::{DbListener, Lifespan, LiveQuery, LiveQueryListener};
pub use query::{BoolExpr, ItemPredicate, Predicate, Query};
pub use scheduler::{DbPriority, DbResult, Gate, PriorityClass};
pub use shadow::{
    BaseShadowPolicy, Branch, ItemVersion, ShadowEditor, ShadowKind, ShadowableChangeListener,
    SyncState, VersionWriter,
};
pub use stats::{DatabaseStats, StatsSnapshot};
pub use transaction::{CacheKey, CancelToken, DbReader, DbWriter, TransactionCache};
pub use types::{Icn, Item, TransactionId};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
