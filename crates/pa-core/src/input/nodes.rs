//! Node id to dense index mapping.
//!
//! A fixed index is read from an ids file (one id per line, optionally
//! `id <ignored> <contract>` when contract flags are in use) and answers
//! lookups by binary search; an id missing from it means the ids file and
//! the edge stream disagree. A dynamic index assigns indices on first sight.

use super::reader::{TableError, TableReader};
use pa_common::{Error, Result};
use std::collections::HashMap;
use std::io::BufRead;

#[derive(Debug, Clone)]
enum Repr {
    Fixed {
        /// Sorted, unique.
        ids: Vec<u32>,
        /// Parallel to `ids` when contract flags were loaded.
        contracts: Option<Vec<bool>>,
    },
    Dynamic {
        map: HashMap<u32, u32>,
    },
}

#[derive(Debug, Clone)]
pub struct NodeIndex {
    repr: Repr,
}

impl NodeIndex {
    pub fn dynamic() -> Self {
        NodeIndex {
            repr: Repr::Dynamic {
                map: HashMap::new(),
            },
        }
    }

    /// Fixed index over `(id, contract)` pairs in any order.
    pub fn fixed(mut entries: Vec<(u32, bool)>, with_contracts: bool) -> Result<Self> {
        entries.sort_unstable_by_key(|&(id, _)| id);
        if let Some(w) = entries.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(Error::InconsistentData(format!(
                "node id {} listed twice in ids file",
                w[0].0
            )));
        }
        let contracts = with_contracts.then(|| entries.iter().map(|&(_, c)| c).collect());
        let ids = entries.into_iter().map(|(id, _)| id).collect();
        Ok(NodeIndex {
            repr: Repr::Fixed { ids, contracts },
        })
    }

    /// Read an ids table. With `with_contracts`, each line is
    /// `id <skipped> <flag>` and a non-zero flag marks a contract.
    pub fn read_ids<R: BufRead>(table: &mut TableReader<R>, with_contracts: bool) -> Result<Self> {
        let mut entries = Vec::new();
        while table.read_line() {
            let Some(id) = table.read_u32() else {
                return Err(table.error());
            };
            let mut contract = false;
            if with_contracts {
                if !table.skip_field() {
                    return Err(table.error());
                }
                let Some(flag) = table.read_i64() else {
                    return Err(table.error());
                };
                contract = flag != 0;
            }
            entries.push((id, contract));
        }
        if table.last_error() != TableError::Eof {
            return Err(table.error());
        }
        Self::fixed(entries, with_contracts)
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.repr, Repr::Fixed { .. })
    }

    pub fn has_contracts(&self) -> bool {
        matches!(
            self.repr,
            Repr::Fixed {
                contracts: Some(_),
                ..
            }
        )
    }

    /// Number of known nodes.
    pub fn len(&self) -> usize {
        match &self.repr {
            Repr::Fixed { ids, .. } => ids.len(),
            Repr::Dynamic { map } => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dense index of `id`, assigning one in a dynamic index.
    pub fn resolve(&mut self, id: u32) -> Result<u32> {
        match &mut self.repr {
            Repr::Fixed { ids, .. } => ids
                .binary_search(&id)
                .map(|i| i as u32)
                .map_err(|_| Error::InconsistentData(format!("node id {} not in ids file", id))),
            Repr::Dynamic { map } => {
                let next = u32::try_from(map.len()).map_err(|_| Error::ResourceExhausted {
                    resource: "node index",
                    limit: u64::from(u32::MAX),
                })?;
                Ok(*map.entry(id).or_insert(next))
            }
        }
    }

    /// Dense index of `id` without assigning.
    pub fn lookup(&self, id: u32) -> Option<u32> {
        match &self.repr {
            Repr::Fixed { ids, .. } => ids.binary_search(&id).ok().map(|i| i as u32),
            Repr::Dynamic { map } => map.get(&id).copied(),
        }
    }

    /// Contract flag of a dense index; false without contract data.
    pub fn is_contract(&self, index: u32) -> bool {
        match &self.repr {
            Repr::Fixed {
                contracts: Some(c), ..
            } => c.get(index as usize).copied().unwrap_or(false),
            _ => false,
        }
    }
}
