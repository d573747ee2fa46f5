//! Unique, human-readable feature names from identifiers and display names.

use crate::error::{check_len, Result};
use std::collections::HashMap;

/// Combine identifiers with optional display names (e.g. Ensembl ids and gene symbols).
///
/// A missing display name is replaced by the identifier. A display name that occurs
/// more than once is suffixed with `_<identifier>`. Duplicates are counted exactly
/// and case-sensitively over the non-missing names.
pub fn uniquify<S: AsRef<str>>(identifiers: &[S], display_names: &[Option<S>]) -> Result<Vec<String>> {
    check_len("display names", identifiers.len(), display_names.len())?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for name in display_names.iter().flatten() {
        *counts.entry(name.as_ref()).or_default() += 1;
    }

    let resolved = identifiers
        .iter()
        .zip(display_names)
        .map(|(id, name)| match name {
            None => id.as_ref().to_string(),
            Some(name) if counts[name.as_ref()] > 1 => format!("{}_{}", name.as_ref(), id.as_ref()),
            Some(name) => name.as_ref().to_string(),
        })
        .collect();
    Ok(resolved)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::error::ScaterError;

    #[test]
    fn test_duplicates_get_identifier() {
        let ids = ["ID1", "ID2", "ID3"];
        let names = [Some("A"), Some("A"), Some("B")];
        assert_eq!(uniquify(&ids, &names).unwrap(), vec!["A_ID1", "A_ID2", "B"]);
    }

    #[test]
    fn test_missing_name_uses_identifier() {
        let ids = ["ID1", "ID2", "ID3"];
        let names = [Some("A"), Some("A"), None];
        assert_eq!(uniquify(&ids, &names).unwrap(), vec!["A_ID1", "A_ID2", "ID3"]);
    }

    #[test]
    fn test_case_sensitive() {
        let ids = vec!["ENSG1".to_string(), "ENSG2".to_string()];
        let names = vec![Some("Actb".to_string()), Some("ACTB".to_string())];
        assert_eq!(uniquify(&ids, &names).unwrap(), vec!["Actb", "ACTB"]);
    }

    #[test]
    fn test_length_mismatch() {
        let res = uniquify(&["ID1", "ID2"], &[Some("A")]);
        assert_eq!(
            res,
            Err(ScaterError::DimensionMismatch {
                what: "display names",
                expected: 2,
                actual: 1
            })
        );
    }
}
