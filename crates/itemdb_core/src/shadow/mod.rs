//! Sync shadows and branch-aware versions.
//!
//! Every item has a trunk (the local version) and may carry shadows: maps of
//! shadowable attribute values stored in map-typed attributes of the item
//! itself. Reads on the server branch resolve to DOWNLOAD, then CONFLICT,
//! then BASE, then trunk. Trunk writes snapshot BASE before the first
//! shadowable change; server writes land in DOWNLOAD.
//!
//! # Usage
//!
//! ```rust,ignore
//! db.write_foreground(|w| {
//!     let item = w.create_item()?;
//!     item.set(&SUMMARY, "draft")?;
//!     assert_eq!(item.sync_state(), SyncState::New);
//!     Ok(item.item())
//! });
//! ```

mod editor;
mod holder;
mod merge;
mod resolve;
mod schema;
mod version;

pub use editor::{BaseShadowPolicy, ShadowEditor, ShadowableChangeListener};
pub use schema::{
    invisible_map, is_invisible, ShadowKind, ShadowPresence, SyncState, BASE, CONFLICT,
    DONE_UPLOAD, DONE_UPLOAD_HISTORY, DOWNLOAD, INVISIBLE, UPLOAD_TASK,
};
pub use version::{Branch, ItemVersion, VersionWriter};

pub(crate) use holder::HolderCache;
pub(crate) use version::BranchCache;
