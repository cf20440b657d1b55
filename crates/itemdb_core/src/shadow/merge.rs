//! Merge primitives used by a sync client.
//!
//! These only move values between trunk and shadows; deciding when to call
//! them is up to the caller.

use super::editor::ShadowEditor;
use super::schema::{is_invisible, ShadowKind, SyncState};
use crate::attribute::{Attribute, AttributeMap};
use crate::error::{CoreError, CoreResult};
use crate::types::Item;
use std::collections::BTreeSet;

impl ShadowEditor<'_> {
    /// Replaces shadowable trunk values with `values`, bypassing the BASE
    /// policy.
    fn overwrite_trunk(&self, item: Item, values: &AttributeMap) -> CoreResult<()> {
        let trunk = self.tx.trunk_shadowables(item)?;
        for attribute in trunk.attributes().filter(|a| !values.contains(a)) {
            self.tx.set_raw(item, attribute, None)?;
        }
        for (attribute, value) in values.iter() {
            self.tx.set_raw(item, attribute, Some(value.clone()))?;
        }
        Ok(())
    }

    /// Trunk has been rewritten: the next local change starts a new BASE.
    fn reset_versions(&self, item: Item) {
        self.tx.context.holders.borrow_mut().forget_item(item);
    }

    /// Drops local edits and returns to the server version.
    ///
    /// If the server version is invisible the item is removed entirely.
    /// Returns false when there was nothing to discard.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn discard_local(&self, item: Item) -> CoreResult<bool> {
        let server = ShadowKind::SERVER_CHAIN
            .iter()
            .find_map(|&kind| self.get(item, kind));
        let Some(server) = server else {
            return Ok(false);
        };
        if is_invisible(&server) {
            self.tx.clear(item)?;
        } else {
            self.overwrite_trunk(item, &server)?;
            for kind in ShadowKind::SERVER_CHAIN {
                self.set(item, kind, None)?;
            }
        }
        self.reset_versions(item);
        tracing::debug!(%item, "local changes discarded");
        Ok(true)
    }

    /// Accepts the current trunk as resolving the conflict: CONFLICT becomes
    /// the new BASE.
    ///
    /// # Errors
    ///
    /// Fails if the item has no CONFLICT.
    pub fn mark_merged(&self, item: Item) -> CoreResult<SyncState> {
        let conflict = self
            .conflict(item)
            .ok_or_else(|| CoreError::invalid_operation(format!("{item} has no conflict")))?;
        self.set_base(item, Some(conflict))?;
        self.set_conflict(item, None)?;
        Ok(self.tx.sync_state(item))
    }

    /// Rebases local edits onto DOWNLOAD.
    ///
    /// Without BASE the download applies straight to trunk. An invisible
    /// BASE compares as an empty map. An attribute conflicts when both sides
    /// changed it from BASE to different values; a local delete against a
    /// remote change, and the reverse, also conflict. A conflict moves
    /// DOWNLOAD to CONFLICT and leaves a visible BASE. Otherwise the server
    /// changes apply to trunk and BASE becomes the downloaded map.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn merge_download(&self, item: Item) -> CoreResult<SyncState> {
        let Some(download) = self.download(item) else {
            return Ok(self.tx.sync_state(item));
        };
        let Some(base) = self.base(item) else {
            self.overwrite_trunk(item, &download)?;
            self.set_download(item, None)?;
            self.reset_versions(item);
            return Ok(self.tx.sync_state(item));
        };
        let base = if is_invisible(&base) { AttributeMap::new() } else { base };

        let local = self.tx.trunk_shadowables(item)?;
        let remote_changes: BTreeSet<Attribute> = base.diff(&download).into_iter().collect();
        let local_changes: BTreeSet<Attribute> = base.diff(&local).into_iter().collect();
        let conflicting = remote_changes
            .intersection(&local_changes)
            .any(|attribute| local.get(attribute) != download.get(attribute));
        let deletion_conflict = (is_invisible(&local) && !remote_changes.is_empty())
            || (is_invisible(&download) && !local_changes.is_empty());

        if conflicting || deletion_conflict {
            tracing::debug!(%item, "download conflicts with local changes");
            self.set_base(item, Some(base))?;
            self.set_conflict(item, Some(download))?;
            self.set_download(item, None)?;
            return Ok(self.tx.sync_state(item));
        }

        for attribute in &remote_changes {
            self.tx
                .set_raw(item, attribute, download.get(attribute).cloned())?;
        }
        self.set_base(item, Some(download))?;
        self.set_download(item, None)?;
        self.reset_versions(item);
        Ok(self.tx.sync_state(item))
    }

    /// Records the current shadowable trunk values as the upload task.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn request_upload(&self, item: Item) -> CoreResult<AttributeMap> {
        let task = self.tx.trunk_shadowables(item)?;
        self.set_upload_task(item, Some(task.clone()))?;
        Ok(task)
    }

    /// Records what the remote accepted from the upload task and moves BASE
    /// forward by it.
    ///
    /// When trunk then matches BASE, BASE is dropped and the item is synced.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn confirm_upload(
        &self,
        item: Item,
        accepted: AttributeMap,
        history: Option<i32>,
    ) -> CoreResult<SyncState> {
        let mut base = match self.base(item) {
            Some(base) if !is_invisible(&base) => base,
            _ => AttributeMap::new(),
        };
        for (attribute, value) in accepted.iter() {
            base.set(attribute, Some(value.clone()));
        }
        self.set_done_upload(item, Some(accepted), history)?;
        self.set_upload_task(item, None)?;

        if self.conflict(item).is_none() && self.tx.trunk_shadowables(item)? == base {
            self.set_base(item, None)?;
        } else {
            self.set_base(item, Some(base))?;
        }
        Ok(self.tx.sync_state(item))
    }

    /// Drops UPLOAD_TASK and DONE_UPLOAD.
    ///
    /// # Errors
    ///
    /// Fails outside write transactions and for unallocated items.
    pub fn forget_upload(&self, item: Item) -> CoreResult<bool> {
        let task = self.set_upload_task(item, None)?;
        let done = self.set_done_upload(item, None, None)?;
        Ok(task || done)
    }
}
