//! Shadow attributes and sync states.

use crate::attribute::{Attribute, AttributeMap, Value};
use std::fmt;
use std::sync::LazyLock;

/// Values before the first outstanding local edit.
pub static BASE: LazyLock<Attribute> = LazyLock::new(|| Attribute::map("sync:base", "Base"));

/// Remote values that conflict with local edits.
pub static CONFLICT: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::map("sync:conflict", "Conflict"));

/// Remote values received but not merged.
pub static DOWNLOAD: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::map("sync:download", "Download"));

/// Local values requested for upload.
pub static UPLOAD_TASK: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::map("sync:uploadTask", "Upload task"));

/// The part of an upload task the remote accepted.
pub static DONE_UPLOAD: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::map("sync:doneUpload", "Done upload"));

/// Number of history steps the remote accepted with [`DONE_UPLOAD`].
pub static DONE_UPLOAD_HISTORY: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::int("sync:doneUploadHistory", "Done upload history"));

/// Marks a version as not existing: a local delete in trunk, a not-yet-created
/// item in BASE, a remote delete in CONFLICT.
pub static INVISIBLE: LazyLock<Attribute> =
    LazyLock::new(|| Attribute::bool("sync:invisible", "Invisible").shadowable());

/// The shadows an item can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShadowKind {
    /// See [`BASE`].
    Base,
    /// See [`CONFLICT`].
    Conflict,
    /// See [`DOWNLOAD`].
    Download,
    /// See [`UPLOAD_TASK`].
    UploadTask,
    /// See [`DONE_UPLOAD`].
    DoneUpload,
}

impl ShadowKind {
    /// Every shadow kind.
    pub const ALL: [ShadowKind; 5] = [
        ShadowKind::Base,
        ShadowKind::Conflict,
        ShadowKind::Download,
        ShadowKind::UploadTask,
        ShadowKind::DoneUpload,
    ];

    /// Resolution order of the server branch, before falling back to trunk.
    pub const SERVER_CHAIN: [ShadowKind; 3] =
        [ShadowKind::Download, ShadowKind::Conflict, ShadowKind::Base];

    /// The attribute holding this shadow.
    #[must_use]
    pub fn attribute(self) -> &'static Attribute {
        match self {
            ShadowKind::Base => &BASE,
            ShadowKind::Conflict => &CONFLICT,
            ShadowKind::Download => &DOWNLOAD,
            ShadowKind::UploadTask => &UPLOAD_TASK,
            ShadowKind::DoneUpload => &DONE_UPLOAD,
        }
    }

    /// The shadow kind stored under `attribute`, if any.
    #[must_use]
    pub fn of_attribute(attribute: &Attribute) -> Option<ShadowKind> {
        ShadowKind::ALL.into_iter().find(|kind| kind.attribute() == attribute)
    }

    /// Lower-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ShadowKind::Base => "base",
            ShadowKind::Conflict => "conflict",
            ShadowKind::Download => "download",
            ShadowKind::UploadTask => "upload-task",
            ShadowKind::DoneUpload => "done-upload",
        }
    }
}

/// A map marking a version that does not exist.
#[must_use]
pub fn invisible_map() -> AttributeMap {
    AttributeMap::new().with(&INVISIBLE, true)
}

/// Returns true if `map` carries `INVISIBLE = true`.
#[must_use]
pub fn is_invisible(map: &AttributeMap) -> bool {
    matches!(map.get(&INVISIBLE), Some(Value::Bool(true)))
}

/// Which shadows an item has, reduced to what the sync state depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShadowPresence {
    /// `Some(invisible)` when BASE exists.
    pub base: Option<bool>,
    /// `Some(invisible)` when CONFLICT exists.
    pub conflict: Option<bool>,
    /// Trunk carries `INVISIBLE = true`.
    pub trunk_deleted: bool,
}

/// Synchronization state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncState {
    /// No outstanding local edits.
    Sync,
    /// Created locally, never uploaded.
    New,
    /// Edited locally.
    Edited,
    /// Deleted locally.
    LocalDelete,
    /// Edited both locally and remotely.
    Conflict,
    /// Deleted remotely while edited locally.
    ModifiedCorpse,
    /// Deleted locally while edited remotely.
    DeleteModified,
}

impl SyncState {
    /// Every state.
    pub const ALL: [SyncState; 7] = [
        SyncState::Sync,
        SyncState::New,
        SyncState::Edited,
        SyncState::LocalDelete,
        SyncState::Conflict,
        SyncState::ModifiedCorpse,
        SyncState::DeleteModified,
    ];

    /// Derives the state from shadow presence alone.
    ///
    /// Rules apply in order: no BASE is SYNC whatever else exists, an
    /// invisible BASE is NEW, and only then does CONFLICT decide.
    #[must_use]
    pub fn classify(presence: ShadowPresence) -> Self {
        match (presence.base, presence.conflict) {
            (None, _) => SyncState::Sync,
            (Some(true), _) => SyncState::New,
            (Some(false), None) if presence.trunk_deleted => SyncState::LocalDelete,
            (Some(false), None) => SyncState::Edited,
            (Some(false), Some(true)) => SyncState::ModifiedCorpse,
            (Some(false), Some(false)) if presence.trunk_deleted => SyncState::DeleteModified,
            (Some(false), Some(false)) => SyncState::Conflict,
        }
    }

    /// Returns true for [`SyncState::Sync`].
    #[must_use]
    pub fn is_synced(self) -> bool {
        self == SyncState::Sync
    }

    /// Returns true for the three conflict states.
    #[must_use]
    pub fn is_conflict(self) -> bool {
        matches!(
            self,
            SyncState::Conflict | SyncState::ModifiedCorpse | SyncState::DeleteModified
        )
    }

    /// Upper-case name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SyncState::Sync => "SYNC",
            SyncState::New => "NEW",
            SyncState::Edited => "EDITED",
            SyncState::LocalDelete => "LOCAL_DELETE",
            SyncState::Conflict => "CONFLICT",
            SyncState::ModifiedCorpse => "MODIFIED_CORPSE",
            SyncState::DeleteModified => "DELETE_MODIFIED",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn presence(base: Option<bool>, conflict: Option<bool>, trunk_deleted: bool) -> ShadowPresence {
        ShadowPresence {
            base,
            conflict,
            trunk_deleted,
        }
    }

    #[test]
    fn shadow_attributes_map_back_to_kinds() {
        for kind in ShadowKind::ALL {
            assert_eq!(ShadowKind::of_attribute(kind.attribute()), Some(kind));
        }
        assert_eq!(ShadowKind::of_attribute(&INVISIBLE), None);
        assert_eq!(ShadowKind::of_attribute(&DONE_UPLOAD_HISTORY), None);
    }

    #[test]
    fn each_state_is_reachable() {
        let cases = [
            (presence(None, None, false), SyncState::Sync),
            (presence(Some(true), None, false), SyncState::New),
            (presence(Some(false), None, false), SyncState::Edited),
            (presence(Some(false), None, true), SyncState::LocalDelete),
            (presence(Some(false), Some(false), false), SyncState::Conflict),
            (presence(Some(false), Some(true), false), SyncState::ModifiedCorpse),
            (presence(Some(false), Some(false), true), SyncState::DeleteModified),
        ];
        for (input, expected) in cases {
            assert_eq!(SyncState::classify(input), expected, "{input:?}");
        }
    }

    #[test]
    fn no_base_is_sync_whatever_trunk_says() {
        assert_eq!(SyncState::classify(presence(None, None, true)), SyncState::Sync);
    }

    #[test]
    fn conflict_without_base_is_still_sync() {
        for conflict_invisible in [false, true] {
            for trunk_deleted in [false, true] {
                let p = presence(None, Some(conflict_invisible), trunk_deleted);
                assert_eq!(SyncState::classify(p), SyncState::Sync, "{p:?}");
            }
        }
    }

    #[test]
    fn invisible_base_wins_over_conflict() {
        for conflict_invisible in [false, true] {
            let p = presence(Some(true), Some(conflict_invisible), false);
            assert_eq!(SyncState::classify(p), SyncState::New, "{p:?}");
        }
    }

    #[test]
    fn invisible_map_is_invisible() {
        assert!(is_invisible(&invisible_map()));
        assert!(!is_invisible(&AttributeMap::new()));
        assert!(!is_invisible(&AttributeMap::new().with(&INVISIBLE, false)));
    }

    #[test]
    fn server_chain_order() {
        let ids: Vec<&str> = ShadowKind::SERVER_CHAIN
            .iter()
            .map(|k| k.attribute().id())
            .collect();
        assert_eq!(ids, vec!["sync:download", "sync:conflict", "sync:base"]);
    }

    fn base_conflict_combination() -> impl Strategy<Value = ShadowPresence> {
        (
            proptest::option::of(any::<bool>()),
            proptest::option::of(any::<bool>()),
            any::<bool>(),
        )
            .prop_map(|(base, conflict, trunk_deleted)| presence(base, conflict, trunk_deleted))
    }

    proptest! {
        #[test]
        fn classification_follows_the_table(p in base_conflict_combination()) {
            let state = SyncState::classify(p);
            match (p.base, p.conflict) {
                (None, _) => prop_assert_eq!(state, SyncState::Sync),
                (Some(true), _) => prop_assert_eq!(state, SyncState::New),
                (Some(false), None) if p.trunk_deleted => prop_assert_eq!(state, SyncState::LocalDelete),
                (Some(false), None) => prop_assert_eq!(state, SyncState::Edited),
                (Some(false), Some(true)) => prop_assert_eq!(state, SyncState::ModifiedCorpse),
                (Some(false), Some(false)) if p.trunk_deleted => prop_assert_eq!(state, SyncState::DeleteModified),
                (Some(false), Some(false)) => prop_assert_eq!(state, SyncState::Conflict),
            }
            prop_assert_eq!(state.is_conflict(), p.base == Some(false) && p.conflict.is_some());
            prop_assert_eq!(state.is_synced(), p.base.is_none());
        }
    }
}
