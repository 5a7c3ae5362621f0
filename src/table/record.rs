use lazy_static::lazy_static;
use regex::Regex;

use crate::error::DatastoreError;
use crate::types::RowValues;

use super::dates;
use super::value_map::ValueMap;

lazy_static! {
    static ref TAG_PAIR: Regex = Regex::new(r#"([A-Za-z]+):"([^"]*)""#).unwrap();
}

/// Mapping metadata for one record field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    /// Field name passed to [`Record::get_field`]/[`Record::set_field`].
    pub name: String,
    pub column: String,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub sequence: Option<String>,
    /// Not mapped to any column.
    pub transient: bool,
    /// chrono layout for text-encoded timestamps.
    pub date_layout: Option<String>,
    pub value_map: Option<ValueMap>,
}

impl FieldMeta {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            column: name.clone(),
            name,
            primary_key: false,
            autoincrement: false,
            sequence: None,
            transient: false,
            date_layout: None,
            value_map: None,
        }
    }

    #[must_use]
    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Primary key assigned by the datastore.
    #[must_use]
    pub fn autoincrement(mut self) -> Self {
        self.primary_key = true;
        self.autoincrement = true;
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: impl Into<String>) -> Self {
        self.sequence = Some(sequence.into());
        self
    }

    #[must_use]
    pub fn transient(mut self) -> Self {
        self.transient = true;
        self
    }

    #[must_use]
    pub fn date_layout(mut self, layout: impl Into<String>) -> Self {
        self.date_layout = Some(layout.into());
        self
    }

    /// Java-style pattern such as `yyyy-MM-dd`.
    #[must_use]
    pub fn date_format(self, pattern: &str) -> Self {
        self.date_layout(dates::convert_date_format(pattern))
    }

    #[must_use]
    pub fn value_map(mut self, map: ValueMap) -> Self {
        self.value_map = Some(map);
        self
    }

    /// Build from a struct-tag style annotation:
    /// `column:"user_id" primaryKey:"true" valueMap:"Y:true,N:false"`.
    ///
    /// # Errors
    /// Returns `ConfigError` for an unknown key, an invalid date layout or a
    /// malformed value map.
    pub fn from_tag(name: impl Into<String>, tag: &str) -> Result<Self, DatastoreError> {
        let mut meta = Self::new(name);
        for captures in TAG_PAIR.captures_iter(tag) {
            let value = &captures[2];
            let enabled = value.eq_ignore_ascii_case("true");
            meta = match &captures[1] {
                "column" if value == "-" => meta.transient(),
                "column" => meta.column(value),
                "primaryKey" if enabled => meta.primary_key(),
                "autoincrement" if enabled => meta.autoincrement(),
                "transient" if enabled => meta.transient(),
                "primaryKey" | "autoincrement" | "transient" => meta,
                "sequence" => meta.sequence(value),
                "dateLayout" => meta.date_layout(value),
                "dateFormat" => meta.date_format(value),
                "valueMap" => meta.value_map(ValueMap::parse(value)?),
                other => {
                    return Err(DatastoreError::ConfigError(format!(
                        "unknown field annotation {other} on {}",
                        meta.name
                    )));
                }
            };
        }
        if let Some(layout) = &meta.date_layout {
            dates::validate_layout(layout)?;
        }
        Ok(meta)
    }

    /// Value as stored: inverse value map, then the date layout.
    #[must_use]
    pub fn to_column_value(&self, value: RowValues) -> RowValues {
        let value = match &self.value_map {
            Some(map) => map.on_write(value),
            None => value,
        };
        match &self.date_layout {
            Some(layout) => dates::format_with_layout(value, layout),
            None => value,
        }
    }

    /// Value as seen by the record: value map, then the date layout.
    ///
    /// # Errors
    /// Returns `BindingError` when text does not match the date layout.
    pub fn from_column_value(&self, value: RowValues) -> Result<RowValues, DatastoreError> {
        let value = match &self.value_map {
            Some(map) => map.on_read(value),
            None => value,
        };
        match (&self.date_layout, value) {
            (Some(layout), RowValues::Text(text)) => {
                Ok(RowValues::Timestamp(dates::parse_with_layout(&text, layout)?))
            }
            (_, value) => Ok(value),
        }
    }
}

/// An application type that can be mapped to and from table rows.
///
/// Implementations describe their fields once in [`Record::fields`]; field
/// access goes through [`RowValues`].
///
/// ```rust
/// use datastore_middleware::prelude::*;
///
/// #[derive(Default)]
/// struct User {
///     id: i64,
///     name: String,
/// }
///
/// impl Record for User {
///     fn fields() -> Vec<FieldMeta> {
///         vec![FieldMeta::new("id").autoincrement(), FieldMeta::new("name")]
///     }
///
///     fn get_field(&self, name: &str) -> Option<RowValues> {
///         match name {
///             "id" => Some(self.id.into()),
///             "name" => Some(self.name.clone().into()),
///             _ => None,
///         }
///     }
///
///     fn set_field(&mut self, name: &str, value: RowValues) -> Result<(), DatastoreError> {
///         match name {
///             "id" => self.id = i64::from_row_value(value)?,
///             "name" => self.name = String::from_row_value(value)?,
///             _ => {}
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait Record: Send + Sync {
    fn fields() -> Vec<FieldMeta>
    where
        Self: Sized;

    fn get_field(&self, name: &str) -> Option<RowValues>;

    /// # Errors
    /// Returns `BindingError` when `value` cannot be converted to the field type.
    fn set_field(&mut self, name: &str, value: RowValues) -> Result<(), DatastoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_annotations() {
        let meta = FieldMeta::from_tag(
            "active",
            r#"column:"is_active" valueMap:"Y:true,N:false""#,
        )
        .unwrap();
        assert_eq!(meta.column, "is_active");
        assert!(!meta.primary_key);
        assert_eq!(
            meta.from_column_value(RowValues::Text("Y".into())).unwrap(),
            RowValues::Bool(true)
        );
        assert_eq!(
            meta.to_column_value(RowValues::Bool(false)),
            RowValues::Text("N".into())
        );

        let id = FieldMeta::from_tag("id", r#"primaryKey:"true" autoincrement:"true""#).unwrap();
        assert!(id.primary_key && id.autoincrement);
        assert!(FieldMeta::from_tag("x", r#"column:"-""#).unwrap().transient);
    }

    #[test]
    fn date_annotations_convert_text() {
        let meta = FieldMeta::from_tag("born", r#"dateFormat:"yyyyMMdd""#).unwrap();
        let value = meta
            .from_column_value(RowValues::Text("20240102".into()))
            .unwrap();
        assert_eq!(meta.to_column_value(value), RowValues::Text("20240102".into()));
        assert!(FieldMeta::from_tag("x", r#"dateLayout:"%Q""#).is_err());
        assert!(FieldMeta::from_tag("x", r#"bogus:"1""#).is_err());
    }
}
