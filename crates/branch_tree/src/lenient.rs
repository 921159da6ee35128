//! Field readers that treat `null` like a missing field.

use serde::{Deserialize, Deserializer};

/// `null` or absent becomes `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A `null` list reads as empty and `null` entries are dropped.
pub(crate) fn list_without_nulls<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    let items = Option::<Vec<Option<T>>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(items.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "null_as_default")]
        name: String,
        #[serde(default, deserialize_with = "list_without_nulls")]
        items: Vec<String>,
    }

    #[test]
    fn null_reads_as_default() {
        let sample: Sample = serde_json::from_str(r#"{"name": null, "items": null}"#).unwrap();
        assert_eq!(sample.name, "");
        assert!(sample.items.is_empty());
    }

    #[test]
    fn null_entries_are_dropped() {
        let sample: Sample = serde_json::from_str(r#"{"items": ["a", null, "b"]}"#).unwrap();
        assert_eq!(sample.items, vec!["a".to_string(), "b".to_string()]);
    }
}
