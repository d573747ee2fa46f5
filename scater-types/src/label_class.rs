use anyhow::{format_err, Error};
use serde::{self, Deserialize, Serialize};

/// Partition of the feature axis by feature type ("Gene Expression", "Antibody Capture", ...).
/// `indices[offsets[i]..offsets[i + 1]]` are the features carrying `labels[i]`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LabelClass {
    pub labels: Vec<String>,
    pub offsets: Vec<usize>,
    pub indices: Vec<usize>,
}

impl LabelClass {
    pub fn new(labels: Vec<String>, offsets: Vec<usize>, indices: Vec<usize>) -> Result<LabelClass, Error> {
        if labels.len() != offsets.len() {
            return Err(format_err!("Label and offsets length unequal"));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) || offsets.last().is_some_and(|&o| o > indices.len()) {
            return Err(format_err!("LabelClass offsets must be non-decreasing and within the indices"));
        }
        Ok(LabelClass {
            labels,
            offsets,
            indices,
        })
    }

    /// Group a per-feature type column. Features need not be contiguous by type; the
    /// labels are kept in order of first appearance.
    pub fn from_feature_types(feature_types: &[String]) -> LabelClass {
        let mut labels: Vec<String> = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();
        for (i, ft) in feature_types.iter().enumerate() {
            match labels.iter().position(|l| l == ft) {
                Some(idx) => members[idx].push(i),
                None => {
                    labels.push(ft.clone());
                    members.push(vec![i]);
                }
            }
        }

        let mut offsets = Vec::with_capacity(labels.len());
        let mut indices = Vec::with_capacity(feature_types.len());
        for m in members {
            offsets.push(indices.len());
            indices.extend(m);
        }
        LabelClass {
            labels,
            offsets,
            indices,
        }
    }

    /// Get the index of a label string. Returns None if the label string is not found.
    fn get_label_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|x| x == label)
    }

    /// Returns either the set of indices pointing to the given label or None is the label doesn't exist.
    pub fn get_indices(&self, label: &str) -> Option<&[usize]> {
        self.get_label_index(label).map(|idx| {
            let offset = self.offsets[idx];
            let end = self.offsets.get(idx + 1).copied().unwrap_or(self.indices.len());
            &self.indices[offset..end]
        })
    }

    /// Number of features covered
    pub fn num_features(&self) -> usize {
        self.indices.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn types(v: &[&str]) -> Vec<String> {
        v.iter().map(std::string::ToString::to_string).collect()
    }

    #[test]
    fn test_from_feature_types() {
        let lc = LabelClass::from_feature_types(&types(&["GEX", "GEX", "AB", "GEX", "CRISPR"]));
        assert_eq!(lc.labels, vec!["GEX", "AB", "CRISPR"]);
        assert_eq!(lc.offsets, vec![0, 3, 4]);
        assert_eq!(lc.get_indices("GEX"), Some(&[0, 1, 3][..]));
        assert_eq!(lc.get_indices("AB"), Some(&[2][..]));
        assert_eq!(lc.get_indices("CRISPR"), Some(&[4][..]));
        assert_eq!(lc.get_indices("Peaks"), None);
        assert_eq!(lc.num_features(), 5);
    }

    #[test]
    fn test_new_validates() {
        assert!(LabelClass::new(types(&["a"]), vec![0, 1], vec![0, 1]).is_err());
        assert!(LabelClass::new(types(&["a", "b"]), vec![2, 1], vec![0, 1, 2]).is_err());
        let lc = LabelClass::new(types(&["a", "b"]), vec![0, 2], vec![0, 1, 2]).unwrap();
        assert_eq!(lc.get_indices("b"), Some(&[2][..]));
    }
}
