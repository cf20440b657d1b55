//! Inspect command implementation.

use super::{open_existing, CliResult};
use itemdb_core::{Item, SyncState};
use itemdb_storage::{FileBackend, StorageBackend};
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Journal size in bytes.
    pub journal_size: u64,
    /// ICN of the last replayed commit.
    pub icn: u64,
    /// Number of live items.
    pub item_count: usize,
    /// Item count per sync state, in state order.
    pub sync_states: Vec<StateCount>,
}

/// Items in one sync state.
#[derive(Debug, Serialize)]
pub struct StateCount {
    /// State name.
    pub state: &'static str,
    /// Number of items.
    pub count: usize,
    /// The items themselves, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<i64>>,
}

/// Runs the inspect command.
pub fn run(path: &Path, list_items: bool, format: &str) -> CliResult<()> {
    let result = inspect(path, list_items)?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

/// Opens the database at `path` and collects its statistics.
pub fn inspect(path: &Path, list_items: bool) -> CliResult<InspectResult> {
    let journal_size = {
        let journal = path.join("journal.log");
        if journal.exists() {
            FileBackend::open(&journal)?.len()?
        } else {
            0
        }
    };

    let db = open_existing(path)?;
    let (item_count, by_state) = db.with_snapshot(|reader| {
        let items = reader.items();
        let mut by_state: Vec<Vec<Item>> = vec![Vec::new(); SyncState::ALL.len()];
        for &item in &items {
            let state = reader.sync_state(item);
            if let Some(slot) = SyncState::ALL.iter().position(|s| *s == state) {
                by_state[slot].push(item);
            }
        }
        (items.len(), by_state)
    });
    let icn = db.icn().as_u64();
    db.close();

    let sync_states = SyncState::ALL
        .iter()
        .zip(by_state)
        .map(|(state, items)| StateCount {
            state: state.name(),
            count: items.len(),
            items: (list_items && *state != SyncState::Sync)
                .then(|| items.iter().map(|item| item.as_i64()).collect()),
        })
        .collect();

    Ok(InspectResult {
        path: path.display().to_string(),
        journal_size,
        icn,
        item_count,
        sync_states,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!();
    println!("Journal:     {} bytes", result.journal_size);
    println!("ICN:         {}", result.icn);
    println!("Live items:  {}", result.item_count);
    println!();
    println!("Sync states:");
    for entry in &result.sync_states {
        println!("  {:<16} {}", entry.state, entry.count);
        if let Some(items) = &entry.items {
            for item in items {
                println!("    #{item}");
            }
        }
    }
}
