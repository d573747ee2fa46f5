//! Normalization of grouping keys (label sequences, factors, key tables) into one
//! group assignment per entry.

use crate::error::{check_len, Result, ScaterError};
use itertools::Itertools;
use scater_types::{GroupKey, KeyValues, Label};
use std::collections::{BTreeMap, HashMap};

/// Labels of the distinct groups, one column per grouping key
#[derive(Clone, Debug, PartialEq)]
pub struct GroupLabels {
    /// key names
    pub names: Vec<String>,
    /// `columns[k][g]` is the value of key `k` for group `g`
    pub columns: Vec<Vec<Label>>,
}

impl GroupLabels {
    /// Number of groups
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    /// True if there are no groups
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Composite group identifiers, key values joined with `-`
    pub fn ids(&self) -> Vec<String> {
        (0..self.len())
            .map(|g| self.columns.iter().map(|col| col[g].to_string()).join("-"))
            .collect()
    }
}

/// Group assignment of every entry along the grouped axis
#[derive(Clone, Debug, PartialEq)]
pub struct GroupIndex {
    /// key values of each group
    pub labels: GroupLabels,
    /// group of each entry, `None` for entries with a missing key value
    pub assignment: Vec<Option<usize>>,
    /// number of entries assigned to each group
    pub sizes: Vec<usize>,
}

/// Output order of one key: the ordered distinct values and the rank of each entry
struct RankedKey {
    order: Vec<Label>,
    ranks: Vec<Option<usize>>,
}

fn rank_key(values: &KeyValues) -> Result<RankedKey> {
    let order: Vec<Label> = match values.levels() {
        Some(levels) => {
            if levels.iter().duplicates().next().is_some() {
                return Err(ScaterError::InvalidGroupKey("factor levels must be unique".to_string()));
            }
            levels.to_vec()
        }
        None => values.values().iter().flatten().cloned().sorted().dedup().collect(),
    };
    let position: HashMap<&Label, usize> = order.iter().enumerate().map(|(i, l)| (l, i)).collect();
    let ranks = values
        .values()
        .iter()
        .map(|v| v.as_ref().and_then(|l| position.get(l).copied()))
        .collect();
    Ok(RankedKey { order, ranks })
}

impl GroupIndex {
    /// Resolve `key` for an axis of length `axis_len`.
    ///
    /// Groups are ordered by the first key, then by subsequent keys; each key uses its
    /// level order when it is a factor and sorted order otherwise. An entry is left
    /// unassigned if any of its key values is missing. Factor levels without members
    /// produce no group.
    pub fn from_key(key: &GroupKey, axis_len: usize) -> Result<GroupIndex> {
        let columns = key.columns();
        if columns.is_empty() {
            return Err(ScaterError::InvalidGroupKey("key table has no columns".to_string()));
        }

        let mut ranked = Vec::with_capacity(columns.len());
        for (_, values) in &columns {
            check_len("grouping key", axis_len, values.len())?;
            ranked.push(rank_key(values)?);
        }

        let tuples: Vec<Option<Vec<usize>>> = (0..axis_len)
            .map(|i| ranked.iter().map(|k| k.ranks[i]).collect::<Option<Vec<usize>>>())
            .collect();

        // BTreeMap iteration gives the lexicographic order over the key ranks
        let mut group_of: BTreeMap<&[usize], usize> = tuples.iter().flatten().map(|t| (t.as_slice(), 0)).collect();
        for (g, v) in group_of.values_mut().enumerate() {
            *v = g;
        }

        let mut sizes = vec![0usize; group_of.len()];
        let assignment = tuples
            .iter()
            .map(|t| {
                t.as_ref().map(|t| {
                    let g = group_of[t.as_slice()];
                    sizes[g] += 1;
                    g
                })
            })
            .collect();

        let label_columns = ranked
            .iter()
            .enumerate()
            .map(|(k, rk)| group_of.keys().map(|t| rk.order[t[k]].clone()).collect())
            .collect();

        Ok(GroupIndex {
            labels: GroupLabels {
                names: columns.iter().map(|(n, _)| (*n).to_string()).collect(),
                columns: label_columns,
            },
            assignment,
            sizes,
        })
    }

    /// Number of groups
    pub fn num_groups(&self) -> usize {
        self.sizes.len()
    }
}
