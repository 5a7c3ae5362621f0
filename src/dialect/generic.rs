use async_trait::async_trait;

use crate::translation::PlaceholderStyle;

use super::{BulkInsertStrategy, Dialect, LastInsertIdKind};

/// Capability-only dialect for drivers registered by the caller.
///
/// ```rust
/// use datastore_middleware::prelude::*;
///
/// let dialect = GenericDialect::new("vertica")
///     .with_strategy(BulkInsertStrategy::CopyLocal)
///     .with_last_insert_id_kind(LastInsertIdKind::First);
/// assert!(dialect.can_persist_batch());
/// ```
#[derive(Debug, Clone)]
pub struct GenericDialect {
    name: String,
    strategy: BulkInsertStrategy,
    placeholder_style: PlaceholderStyle,
    id_kind: LastInsertIdKind,
    tuple_in: bool,
}

impl GenericDialect {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            strategy: BulkInsertStrategy::MultiRowValues,
            placeholder_style: PlaceholderStyle::Question,
            id_kind: LastInsertIdKind::First,
            tuple_in: true,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: BulkInsertStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = style;
        self
    }

    #[must_use]
    pub fn with_last_insert_id_kind(mut self, kind: LastInsertIdKind) -> Self {
        self.id_kind = kind;
        self
    }

    #[must_use]
    pub fn with_tuple_in(mut self, supported: bool) -> Self {
        self.tuple_in = supported;
        self
    }
}

#[async_trait]
impl Dialect for GenericDialect {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_strategy(&self) -> BulkInsertStrategy {
        self.strategy
    }

    fn placeholder_style(&self) -> PlaceholderStyle {
        self.placeholder_style
    }

    fn last_insert_id_kind(&self) -> LastInsertIdKind {
        self.id_kind
    }

    fn supports_tuple_in(&self) -> bool {
        self.tuple_in
    }
}
