//! Record normalization: the local form of one remote child.
//!
//! Every delivered snapshot is normalized into a [`Record`] before it is
//! committed. The remote child key always rides on the record itself, so
//! list lookups never depend on the value's shape; object values
//! additionally get the reserved `".key"` field injected so consumers
//! reading plain JSON can still identify the child.

use crate::source::Snapshot;
use serde_json::Value;

/// Reserved field injected into object-valued records.
pub const RECORD_KEY_FIELD: &str = ".key";

/// Normalized local form of one remote child, tagged with its child key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Remote child key this record mirrors.
    pub key: String,
    /// Normalized value: objects carry [`RECORD_KEY_FIELD`], everything
    /// else passes through untouched.
    pub value: Value,
}

impl Record {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Record {
            key: key.into(),
            value,
        }
    }
}

/// Builds the local record for one delivered snapshot.
///
/// Object values are shallow-copied with `".key"` set to the snapshot's
/// child key (an existing `".key"` field is overwritten). Primitive and
/// array values pass through unchanged; their key is carried only on the
/// returned record. Pure function of its input.
///
/// # Example
///
/// ```
/// use firebind::{create_record, Snapshot};
/// use serde_json::json;
///
/// let rec = create_record(&Snapshot::new("u1", json!({"name": "ada"})));
/// assert_eq!(rec.key, "u1");
/// assert_eq!(rec.value, json!({"name": "ada", ".key": "u1"}));
///
/// let bare = create_record(&Snapshot::new("n", json!(42)));
/// assert_eq!(bare.key, "n");
/// assert_eq!(bare.value, json!(42));
/// ```
pub fn create_record(snapshot: &Snapshot) -> Record {
    let value = match snapshot.value() {
        Value::Object(map) => {
            let mut copy = map.clone();
            copy.insert(
                RECORD_KEY_FIELD.to_owned(),
                Value::String(snapshot.key().to_owned()),
            );
            Value::Object(copy)
        }
        other => other.clone(),
    };
    Record::new(snapshot.key(), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_value_gets_key_injected() {
        let rec = create_record(&Snapshot::new("k1", json!({"a": 1, "b": 2})));
        assert_eq!(rec.key, "k1");
        assert_eq!(rec.value, json!({"a": 1, "b": 2, ".key": "k1"}));
    }

    #[test]
    fn injection_does_not_touch_the_snapshot() {
        let snap = Snapshot::new("k1", json!({"a": 1}));
        let _ = create_record(&snap);
        assert_eq!(snap.value(), &json!({"a": 1}));
    }

    #[test]
    fn existing_key_field_is_overwritten() {
        let rec = create_record(&Snapshot::new("real", json!({".key": "stale", "x": 0})));
        assert_eq!(rec.value[RECORD_KEY_FIELD], json!("real"));
    }

    #[test]
    fn primitives_pass_through_bare() {
        for value in [json!(42), json!("s"), json!(true), Value::Null] {
            let rec = create_record(&Snapshot::new("n", value.clone()));
            assert_eq!(rec.key, "n");
            assert_eq!(rec.value, value, "no key injection for {value}");
        }
    }

    #[test]
    fn arrays_pass_through_bare() {
        let rec = create_record(&Snapshot::new("n", json!([1, 2, 3])));
        assert_eq!(rec.value, json!([1, 2, 3]));
    }
}
