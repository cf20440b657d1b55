//! Human-readable dumps of a snapshot.

use crate::error::CoreResult;
use crate::transaction::DbReader;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes every live item and its values to `out`.
///
/// ```text
/// icn:4, 3 items
///
/// #1 sys:t:type
///   sys:id = "sys:t:type"
///   sys:name = "Type"
/// ```
///
/// # Errors
///
/// Returns I/O errors from `out`.
pub fn dump(reader: &DbReader<'_>, out: &mut dyn Write) -> CoreResult<()> {
    let items = reader.items();
    writeln!(out, "{}, {} items", reader.icn(), items.len())?;
    for item in items {
        writeln!(out)?;
        match reader.identity_of(item) {
            Some(id) => writeln!(out, "{item} {id}")?,
            None => writeln!(out, "{item}")?,
        }
        for (attribute, value) in reader.values(item).iter() {
            writeln!(out, "  {} = {value}", attribute.id())?;
        }
    }
    out.flush()?;
    Ok(())
}

/// Dumps into a new file at `path`, replacing any existing one.
///
/// # Errors
///
/// Returns I/O errors.
pub fn dump_to_path(reader: &DbReader<'_>, path: &Path) -> CoreResult<()> {
    let mut out = BufWriter::new(File::create(path)?);
    dump(reader, &mut out)
}

/// Dumps into a string.
///
/// # Errors
///
/// Never fails in practice; the signature matches the other dump targets.
pub fn dump_to_string(reader: &DbReader<'_>) -> CoreResult<String> {
    let mut out = Vec::new();
    dump(reader, &mut out)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::system::TYPE_TYPE;
    use crate::attribute::Attribute;
    use crate::store::StoreState;
    use crate::transaction::{CancelToken, Transaction};
    use crate::types::TransactionId;
    use std::sync::Arc;

    #[test]
    fn dump_lists_items_and_values() {
        let tx = Transaction::new(
            TransactionId::new(1),
            Arc::new(StoreState::default()),
            true,
            CancelToken::new(),
        );
        let w = tx.writer().unwrap();
        w.materialize(&*TYPE_TYPE).unwrap();
        let item = w.next_item().unwrap();
        w.set(item, &Attribute::text("t:title", "Title"), "hello").unwrap();

        let text = dump_to_string(&tx.reader()).unwrap();
        assert!(text.starts_with("icn:0, 2 items"));
        assert!(text.contains("#1 sys:t:type"));
        assert!(text.contains("  t:title = \"hello\""));
    }

    #[test]
    fn dump_to_path_writes_a_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dump.txt");
        let tx = Transaction::new(
            TransactionId::new(1),
            Arc::new(StoreState::default()),
            false,
            CancelToken::new(),
        );
        dump_to_path(&tx.reader(), &path).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "icn:0, 0 items\n");
    }
}
