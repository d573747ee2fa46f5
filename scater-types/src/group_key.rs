use serde::{Deserialize, Serialize};
use std::fmt;

/// A group label. Integer labels order numerically, text labels lexicographically,
/// and integers sort before text.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Label {
    /// integer label, e.g. a cluster number
    Int(i64),
    /// text label, e.g. a sample name
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{i}"),
            Label::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Label {
    fn from(v: i64) -> Self {
        Label::Int(v)
    }
}

impl From<i32> for Label {
    fn from(v: i32) -> Self {
        Label::Int(v as i64)
    }
}

impl From<&str> for Label {
    fn from(v: &str) -> Self {
        Label::Text(v.to_string())
    }
}

impl From<String> for Label {
    fn from(v: String) -> Self {
        Label::Text(v)
    }
}

impl Label {
    /// Parse a label from text: integers become `Int`, anything else `Text`.
    pub fn parse(s: &str) -> Label {
        s.parse::<i64>().map_or_else(|_| Label::Text(s.to_string()), Label::Int)
    }
}

/// Values of a single grouping key. `None` marks a missing value.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyValues {
    /// plain label sequence; groups are emitted in sorted order
    Labels(Vec<Option<Label>>),
    /// categorical sequence with an explicit level ordering; values not among the
    /// levels are treated as missing
    Factor {
        /// per-entry values
        values: Vec<Option<Label>>,
        /// level ordering used for the output
        levels: Vec<Label>,
    },
}

impl KeyValues {
    /// Number of entries
    pub fn len(&self) -> usize {
        self.values().len()
    }

    /// True if there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-entry values
    pub fn values(&self) -> &[Option<Label>] {
        match self {
            KeyValues::Labels(v) => v,
            KeyValues::Factor { values, .. } => values,
        }
    }

    /// Explicit level ordering, if any
    pub fn levels(&self) -> Option<&[Label]> {
        match self {
            KeyValues::Labels(_) => None,
            KeyValues::Factor { levels, .. } => Some(levels),
        }
    }
}

impl<L: Into<Label>> FromIterator<Option<L>> for KeyValues {
    fn from_iter<T: IntoIterator<Item = Option<L>>>(iter: T) -> Self {
        KeyValues::Labels(iter.into_iter().map(|v| v.map(Into::into)).collect())
    }
}

/// A named column of a grouping key table
#[derive(Clone, Debug, PartialEq)]
pub struct KeyColumn {
    /// column name, carried onto the aggregated output
    pub name: String,
    /// column values
    pub values: KeyValues,
}

impl KeyColumn {
    /// Create a new key column
    pub fn new(name: impl Into<String>, values: KeyValues) -> KeyColumn {
        KeyColumn {
            name: name.into(),
            values,
        }
    }
}

/// Grouping key over one axis of a matrix
#[derive(Clone, Debug, PartialEq)]
pub enum GroupKey {
    /// one key
    Single(KeyValues),
    /// several parallel keys forming a composite group identity
    Table(Vec<KeyColumn>),
}

impl GroupKey {
    /// Single key from a label sequence without missing values
    pub fn labels<L: Into<Label>>(labels: impl IntoIterator<Item = L>) -> GroupKey {
        GroupKey::Single(KeyValues::Labels(labels.into_iter().map(|l| Some(l.into())).collect()))
    }

    /// Single factor key with explicit levels
    pub fn factor<L: Into<Label>>(values: Vec<Option<Label>>, levels: impl IntoIterator<Item = L>) -> GroupKey {
        GroupKey::Single(KeyValues::Factor {
            values,
            levels: levels.into_iter().map(Into::into).collect(),
        })
    }

    /// Key columns as a slice of `(name, values)`. A single key is named `group`.
    pub fn columns(&self) -> Vec<(&str, &KeyValues)> {
        match self {
            GroupKey::Single(v) => vec![("group", v)],
            GroupKey::Table(cols) => cols.iter().map(|c| (c.name.as_str(), &c.values)).collect(),
        }
    }

    /// Number of entries, taken from the first column
    pub fn len(&self) -> usize {
        self.columns().first().map_or(0, |(_, v)| v.len())
    }

    /// True if the key has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_label_order() {
        let mut labels = vec![Label::from("b"), Label::from(10), Label::from("a"), Label::from(2)];
        labels.sort();
        assert_eq!(
            labels,
            vec![Label::Int(2), Label::Int(10), Label::from("a"), Label::from("b")]
        );
    }

    #[test]
    fn test_label_parse() {
        assert_eq!(Label::parse("12"), Label::Int(12));
        assert_eq!(Label::parse("T cells"), Label::from("T cells"));
        assert_eq!(Label::parse("-3").to_string(), "-3");
    }

    #[test]
    fn test_key_columns() {
        let key = GroupKey::labels(["x", "y", "x"]);
        assert_eq!(key.len(), 3);
        assert_eq!(key.columns()[0].0, "group");

        let values: KeyValues = vec![Some(1i64), None, Some(2)].into_iter().collect();
        let table = GroupKey::Table(vec![KeyColumn::new("sample", values)]);
        assert_eq!(table.columns()[0].1.values()[1], None);
        assert!(table.columns()[0].1.levels().is_none());
    }
}
