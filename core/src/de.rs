//! Decoding helpers shared by the entity models.

use serde::{Deserialize, Deserializer};

/// `null` decodes like a missing field: the type's default.
///
/// Vendor responses send `"description": null` or `"metadata": null` for
/// unset values; `#[serde(default)]` alone only covers absent keys.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "null_as_default")]
        text: String,
        #[serde(default, deserialize_with = "null_as_default")]
        count: i64,
        #[serde(default, deserialize_with = "null_as_default")]
        map: BTreeMap<String, String>,
    }

    #[test]
    fn null_and_missing_both_give_defaults() {
        let nulls: Sample =
            serde_json::from_str(r#"{"text": null, "count": null, "map": null}"#).unwrap();
        assert_eq!(nulls.text, "");
        assert_eq!(nulls.count, 0);
        assert!(nulls.map.is_empty());

        let missing: Sample = serde_json::from_str("{}").unwrap();
        assert_eq!(missing.text, "");

        let present: Sample = serde_json::from_str(r#"{"text": "x", "count": 3}"#).unwrap();
        assert_eq!(present.text, "x");
        assert_eq!(present.count, 3);
    }
}
