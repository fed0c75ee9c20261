// Order-preserving tag deduplication and merging

/// Merges an already-present tag attribute with caller-scoped tags.
///
/// Existing values keep their position at the front, scope tags are appended,
/// and the result is deduplicated preserving first occurrence. Returns `None`
/// when the merged sequence is empty so no empty tag attribute is emitted.
pub fn merge(existing: Option<&[String]>, scope: &[String]) -> Option<Vec<String>> {
    let merged: Vec<String> = existing
        .unwrap_or_default()
        .iter()
        .chain(scope.iter())
        .cloned()
        .collect();

    if merged.is_empty() {
        return None;
    }
    Some(uniquify(merged))
}

/// Removes duplicates from a sequence preserving first-seen order.
pub fn uniquify(seq: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    seq.into_iter().filter(|t| seen.insert(t.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_preserves_first_occurrence_order() {
        let existing = tags(&["b", "a"]);
        let scope = tags(&["c", "a", "b", "d"]);
        let merged = merge(Some(&existing), &scope);
        assert_eq!(merged, Some(tags(&["b", "a", "c", "d"])));
    }

    #[test]
    fn test_merge_without_existing() {
        let scope = tags(&["x", "y", "x"]);
        assert_eq!(merge(None, &scope), Some(tags(&["x", "y"])));
    }

    #[test]
    fn test_empty_merge_is_none() {
        assert_eq!(merge(None, &[]), None);
        assert_eq!(merge(Some(&[]), &[]), None);
    }

    #[test]
    fn test_existing_keeps_precedence_position() {
        let existing = tags(&["kept"]);
        let merged = merge(Some(&existing), &tags(&["added"]));
        assert_eq!(merged, Some(tags(&["kept", "added"])));
    }

    #[test]
    fn test_uniquify_no_duplicates() {
        let result = uniquify(tags(&["a", "b", "a", "c", "b"]));
        assert_eq!(result, tags(&["a", "b", "c"]));
    }
}
