//! Link table preloading.
//!
//! A links file lists every `(source, target)` pair that occurs in the
//! edge stream. Loading it up front freezes the edge store, so a pair that
//! shows up in the stream but not in the table is reported instead of
//! silently appended.

use super::nodes::NodeIndex;
use super::reader::{TableError, TableReader};
use pa_common::Result;
use pa_heap::EdgeStore;
use std::io::BufRead;

/// Read `source target` lines, map both ids through `nodes` and build a
/// frozen edge store keyed by dense node indices.
pub fn read_links<R: BufRead>(table: &mut TableReader<R>, nodes: &mut NodeIndex) -> Result<EdgeStore> {
    let mut pairs = Vec::new();
    while table.read_line() {
        let (Some(source), Some(target)) = (table.read_u32(), table.read_u32()) else {
            return Err(table.error());
        };
        pairs.push((nodes.resolve(source)?, nodes.resolve(target)?));
    }
    if table.last_error() != TableError::Eof {
        return Err(table.error());
    }
    Ok(EdgeStore::preload(pairs)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pa_common::Error;
    use std::io::Cursor;

    fn table(text: &str) -> TableReader<Cursor<Vec<u8>>> {
        TableReader::new(Cursor::new(text.as_bytes().to_vec()))
    }

    #[test]
    fn test_links_are_keyed_by_dense_index() {
        let mut nodes = NodeIndex::fixed(vec![(100, false), (200, false), (300, false)], false).unwrap();
        let mut store = read_links(&mut table("100 200\n300 100\n"), &mut nodes).unwrap();
        assert!(store.is_frozen());
        assert_eq!(store.len(), 2);
        assert!(store.lookup(0, 1).is_some());
        assert!(store.lookup(2, 0).is_some());
        assert!(store.locate_or_insert(1, 2).is_err());
    }

    #[test]
    fn test_link_with_unknown_node() {
        let mut nodes = NodeIndex::fixed(vec![(1, false)], false).unwrap();
        let err = read_links(&mut table("1 2\n"), &mut nodes).unwrap_err();
        assert!(matches!(err, Error::InconsistentData(_)));
    }
}
