use std::collections::HashMap;

use crate::error::DatastoreError;
use crate::types::RowValues;

/// Column value translation declared as `"k1:v1,k2:v2"`: stored `k` reads as
/// `v`, and `v` is written back as `k`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueMap {
    read: HashMap<String, String>,
    write: HashMap<String, String>,
}

impl ValueMap {
    /// # Errors
    /// Returns `ConfigError` for an entry without a `:` separator.
    pub fn parse(spec: &str) -> Result<Self, DatastoreError> {
        let mut map = Self::default();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (stored, mapped) = entry.split_once(':').ok_or_else(|| {
                DatastoreError::ConfigError(format!("invalid valueMap entry {entry:?}"))
            })?;
            let (stored, mapped) = (stored.trim().to_string(), mapped.trim().to_string());
            map.write.insert(mapped.clone(), stored.clone());
            map.read.insert(stored, mapped);
        }
        Ok(map)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read.is_empty()
    }

    /// Translate a value read from the datastore. Byte strings are decoded as
    /// UTF-8; unmapped values pass through.
    #[must_use]
    pub fn on_read(&self, value: RowValues) -> RowValues {
        translate(&self.read, value)
    }

    /// Translate a field value back to its stored form.
    #[must_use]
    pub fn on_write(&self, value: RowValues) -> RowValues {
        translate(&self.write, value)
    }
}

fn translate(table: &HashMap<String, String>, value: RowValues) -> RowValues {
    let key = match &value {
        RowValues::Null => return value,
        RowValues::Blob(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => text.to_string(),
            Err(_) => return value,
        },
        RowValues::Text(text) => text.clone(),
        other => other.to_string(),
    };
    match table.get(&key) {
        Some(mapped) => RowValues::parse_literal(mapped),
        None if matches!(value, RowValues::Blob(_)) => RowValues::Text(key),
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_both_directions() {
        let map = ValueMap::parse("Y:true, N:false").unwrap();
        assert_eq!(map.on_read(RowValues::Text("Y".into())), RowValues::Bool(true));
        assert_eq!(map.on_read(RowValues::Blob(b"N".to_vec())), RowValues::Bool(false));
        assert_eq!(map.on_write(RowValues::Bool(true)), RowValues::Text("Y".into()));
        assert_eq!(map.on_read(RowValues::Text("X".into())), RowValues::Text("X".into()));
        assert_eq!(map.on_read(RowValues::Null), RowValues::Null);
    }

    #[test]
    fn rejects_entries_without_separator() {
        assert!(ValueMap::parse("a:1,b").is_err());
    }
}
