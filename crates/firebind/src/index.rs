//! Index arithmetic for the ordered mirror.
//!
//! Child events carry positions indirectly, as the key of the preceding
//! sibling in remote order. These helpers turn that sibling key into a
//! concrete index against the current local list. All functions are pure.

use crate::record::Record;

/// Position of the record whose key equals `key`, or `None` when no
/// record carries it.
pub fn index_for_key(records: &[Record], key: &str) -> Option<usize> {
    records.iter().position(|r| r.key == key)
}

/// Arrival index for a new child.
///
/// With a previous-sibling key the new record lands one past that
/// sibling's current index; without one (or when the sibling cannot be
/// found) it lands first.
///
/// # Example
///
/// ```
/// use firebind::{insertion_index, Record};
/// use serde_json::json;
///
/// let list = [Record::new("a", json!(1)), Record::new("b", json!(2))];
/// assert_eq!(insertion_index(&list, None), 0);
/// assert_eq!(insertion_index(&list, Some("a")), 1);
/// assert_eq!(insertion_index(&list, Some("b")), 2);
/// assert_eq!(insertion_index(&list, Some("missing")), 0);
/// ```
pub fn insertion_index(records: &[Record], prev_key: Option<&str>) -> usize {
    match prev_key {
        Some(prev) => index_for_key(records, prev).map(|i| i + 1).unwrap_or(0),
        None => 0,
    }
}

/// Destination index for a moved record.
///
/// The naive target is the insertion index after the new previous
/// sibling; because the record is removed from `current` first, a target
/// to the right of it shifts one position left.
pub fn move_target(records: &[Record], current: usize, prev_key: Option<&str>) -> usize {
    let naive = insertion_index(records, prev_key);
    if current < naive {
        naive - 1
    } else {
        naive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn list(keys: &[&str]) -> Vec<Record> {
        keys.iter().map(|k| Record::new(*k, json!(null))).collect()
    }

    #[test]
    fn index_for_key_finds_position() {
        let l = list(&["a", "b", "c"]);
        assert_eq!(index_for_key(&l, "a"), Some(0));
        assert_eq!(index_for_key(&l, "c"), Some(2));
        assert_eq!(index_for_key(&l, "z"), None);
        assert_eq!(index_for_key(&[], "a"), None);
    }

    #[test]
    fn insertion_without_sibling_is_first() {
        assert_eq!(insertion_index(&list(&["a", "b"]), None), 0);
        assert_eq!(insertion_index(&[], None), 0);
    }

    #[test]
    fn insertion_after_sibling_is_one_past_it() {
        let l = list(&["a", "b", "c"]);
        assert_eq!(insertion_index(&l, Some("a")), 1);
        assert_eq!(insertion_index(&l, Some("c")), 3);
    }

    #[test]
    fn insertion_after_unknown_sibling_is_first() {
        assert_eq!(insertion_index(&list(&["a", "b"]), Some("ghost")), 0);
    }

    #[test]
    fn move_to_the_right_shifts_left_once() {
        // [A, B, C]: moving A after C targets index 2, so the final
        // order after remove-then-insert is [B, C, A].
        let l = list(&["a", "b", "c"]);
        assert_eq!(move_target(&l, 0, Some("c")), 2);
    }

    #[test]
    fn move_to_the_left_keeps_naive_target() {
        let l = list(&["a", "b", "c"]);
        assert_eq!(move_target(&l, 2, Some("a")), 1);
        assert_eq!(move_target(&l, 2, None), 0);
    }

    #[test]
    fn move_after_unknown_sibling_goes_first() {
        let l = list(&["a", "b", "c"]);
        assert_eq!(move_target(&l, 1, Some("ghost")), 0);
    }
}
