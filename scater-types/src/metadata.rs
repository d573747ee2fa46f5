use anyhow::{bail, Error};
use ndarray::Array1;

/// A metadata column
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    /// numeric values
    Numeric(Array1<f64>),
    /// text values, `None` when missing
    Text(Vec<Option<String>>),
    /// boolean flags
    Flag(Vec<bool>),
}

impl Column {
    /// Number of entries
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
            Column::Flag(v) => v.len(),
        }
    }

    /// True if the column has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render entry `i` for text output
    pub fn format(&self, i: usize) -> String {
        match self {
            Column::Numeric(v) => v[i].to_string(),
            Column::Text(v) => v[i].clone().unwrap_or_else(|| "NA".to_string()),
            Column::Flag(v) => v[i].to_string(),
        }
    }
}

/// Ordered, named metadata columns of a fixed length. Used for per-cell and per-feature
/// annotations of an `AnnotatedMatrix`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataTable {
    nrows: usize,
    columns: Vec<(String, Column)>,
}

impl MetadataTable {
    /// Empty table with `nrows` rows
    pub fn new(nrows: usize) -> MetadataTable {
        MetadataTable {
            nrows,
            columns: Vec::new(),
        }
    }

    /// Number of rows
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns
    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    /// Insert or replace a column. Replacing keeps the column's position.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> Result<(), Error> {
        let name = name.into();
        if column.len() != self.nrows {
            bail!(
                "column {} has {} entries but the table has {} rows",
                name,
                column.len(),
                self.nrows
            );
        }
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, c)) => *c = column,
            None => self.columns.push((name, column)),
        }
        Ok(())
    }

    /// Look up a column by name
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Look up a numeric column by name
    pub fn numeric(&self, name: &str) -> Option<&Array1<f64>> {
        match self.get(name) {
            Some(Column::Numeric(v)) => Some(v),
            _ => None,
        }
    }

    /// Column names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Iterate over `(name, column)` pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    /// Append all columns of `other`, replacing columns with the same name
    pub fn extend(&mut self, other: MetadataTable) -> Result<(), Error> {
        for (name, column) in other.columns {
            self.insert(name, column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_insert_and_replace() {
        let mut t = MetadataTable::new(2);
        t.insert("sum", Column::Numeric(array![1.0, 2.0])).unwrap();
        t.insert("keep", Column::Flag(vec![true, false])).unwrap();
        t.insert("sum", Column::Numeric(array![3.0, 4.0])).unwrap();
        assert_eq!(t.names().collect::<Vec<_>>(), vec!["sum", "keep"]);
        assert_eq!(t.numeric("sum"), Some(&array![3.0, 4.0]));
        assert!(t.numeric("keep").is_none());
        assert!(t.insert("bad", Column::Text(vec![None])).is_err());
        assert_eq!(t.get("keep").unwrap().format(1), "false");
    }
}
