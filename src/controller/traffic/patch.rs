//! Two-way JSON merge patch (RFC 7386) between two documents.

use serde_json::{Map, Value};

/// Compute the merge patch that turns `current` into `desired`
///
/// Returns `None` when both documents are equal. Objects are diffed key by
/// key (keys missing from `desired` become `null`); any other value, arrays
/// included, is replaced wholesale.
pub fn create_merge_patch(current: &Value, desired: &Value) -> Option<Value> {
    match (current, desired) {
        (Value::Object(current), Value::Object(desired)) => {
            let mut patch = Map::new();

            for (key, current_value) in current {
                match desired.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(desired_value) => {
                        if let Some(nested) = create_merge_patch(current_value, desired_value) {
                            patch.insert(key.clone(), nested);
                        }
                    }
                }
            }

            for (key, desired_value) in desired {
                if !current.contains_key(key) {
                    patch.insert(key.clone(), desired_value.clone());
                }
            }

            if patch.is_empty() {
                None
            } else {
                Some(Value::Object(patch))
            }
        }
        (current, desired) if current == desired => None,
        (_, desired) => Some(desired.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equal_documents_produce_no_patch() {
        let doc = json!({"metadata": {"annotations": {"a": "1"}}, "spec": {"rules": [1, 2]}});
        assert_eq!(create_merge_patch(&doc, &doc.clone()), None);
    }

    #[test]
    fn test_key_order_is_ignored() {
        let current = json!({"a": "1", "b": "2"});
        let desired = json!({"b": "2", "a": "1"});
        assert_eq!(create_merge_patch(&current, &desired), None);
    }

    #[test]
    fn test_changed_scalar_is_patched() {
        let current = json!({"metadata": {"annotations": {"w": "10", "keep": "x"}}});
        let desired = json!({"metadata": {"annotations": {"w": "20", "keep": "x"}}});

        assert_eq!(
            create_merge_patch(&current, &desired),
            Some(json!({"metadata": {"annotations": {"w": "20"}}}))
        );
    }

    #[test]
    fn test_removed_key_becomes_null() {
        let current = json!({"a": "1", "b": "2"});
        let desired = json!({"a": "1"});
        assert_eq!(
            create_merge_patch(&current, &desired),
            Some(json!({"b": null}))
        );
    }

    #[test]
    fn test_added_key_is_copied() {
        let current = json!({"spec": {}});
        let desired = json!({"spec": {"rules": [{"host": "a"}]}});
        assert_eq!(
            create_merge_patch(&current, &desired),
            Some(json!({"spec": {"rules": [{"host": "a"}]}}))
        );
    }

    #[test]
    fn test_arrays_are_replaced_wholesale() {
        let current = json!({"rules": [{"p": 1}]});
        let desired = json!({"rules": [{"p": 1}, {"p": 2}]});
        assert_eq!(
            create_merge_patch(&current, &desired),
            Some(json!({"rules": [{"p": 1}, {"p": 2}]}))
        );
    }

    #[test]
    fn test_array_order_matters() {
        let current = json!({"rules": [1, 2]});
        let desired = json!({"rules": [2, 1]});
        assert!(create_merge_patch(&current, &desired).is_some());
    }
}
