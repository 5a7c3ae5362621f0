//! Insert/update classification and the persist passes.

use std::collections::HashSet;

use tracing::debug;

use crate::error::DatastoreError;
use crate::sql::SqlKind;
use crate::table::DmlProvider;
use crate::types::RowValues;

use super::Session;
use super::bulk::BatchInserter;

/// Keys looked up per classification query.
pub(crate) const CLASSIFY_BATCH: usize = 200;

const KEY_SEPARATOR: char = '\u{1f}';

/// Indexes of records to insert and to update, each in input order.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Classified {
    pub insertable: Vec<usize>,
    pub updatable: Vec<usize>,
}

fn key_string(values: &[RowValues]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&KEY_SEPARATOR.to_string())
}

/// A key whose every part is a zero value identifies nothing stored yet.
fn is_empty_key(values: &[RowValues]) -> bool {
    values.iter().all(RowValues::is_zero)
}

/// Split `items` into insertables and updatables by looking up their keys.
pub(crate) async fn classify<T>(
    session: &mut Session<'_>,
    provider: &dyn DmlProvider<T>,
    items: &[T],
) -> Result<Classified, DatastoreError> {
    let descriptor = provider.descriptor();
    let mut classified = Classified::default();
    let mut lookups: Vec<(usize, Vec<RowValues>)> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        let key = provider.key(item);
        if key.is_empty() || is_empty_key(&key) {
            classified.insertable.push(index);
        } else {
            lookups.push((index, key));
        }
    }

    let pk_list = descriptor
        .pk_columns
        .iter()
        .map(|c| session.quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let table = session.quote(&descriptor.table);
    let composite = descriptor.pk_columns.len() > 1;

    let mut existing: HashSet<String> = HashSet::new();
    if composite && !session.dialect().supports_tuple_in() {
        let clause = descriptor
            .pk_columns
            .iter()
            .map(|c| format!("{} = ?", session.quote(c)))
            .collect::<Vec<_>>()
            .join(" AND ");
        let sql = format!("SELECT {pk_list} FROM {table} WHERE {clause}");
        for (_, key) in &lookups {
            collect_keys(session, &sql, key, &mut existing).await?;
        }
    } else {
        let row = if composite {
            format!("({})", vec!["?"; descriptor.pk_columns.len()].join(", "))
        } else {
            "?".to_string()
        };
        let target = if composite {
            format!("({pk_list})")
        } else {
            pk_list.clone()
        };
        for chunk in lookups.chunks(CLASSIFY_BATCH) {
            let sql = format!(
                "SELECT {pk_list} FROM {table} WHERE {target} IN ({})",
                vec![row.as_str(); chunk.len()].join(", ")
            );
            let params: Vec<RowValues> = chunk.iter().flat_map(|(_, key)| key.clone()).collect();
            collect_keys(session, &sql, &params, &mut existing).await?;
        }
    }

    for (index, key) in lookups {
        if existing.contains(&key_string(&key)) {
            classified.updatable.push(index);
        } else {
            classified.insertable.push(index);
        }
    }
    classified.insertable.sort_unstable();
    debug!(
        table = %descriptor.table,
        insertable = classified.insertable.len(),
        updatable = classified.updatable.len(),
        "classified records"
    );
    Ok(classified)
}

async fn collect_keys(
    session: &mut Session<'_>,
    sql: &str,
    params: &[RowValues],
    existing: &mut HashSet<String>,
) -> Result<(), DatastoreError> {
    let rs = session.query(sql, params).await?;
    for row in &rs.results {
        existing.insert(key_string(&row.rows));
    }
    Ok(())
}

/// Classify, insert, then update `items`; returns `(inserted, updated)`.
pub(crate) async fn persist<T>(
    session: &mut Session<'_>,
    provider: &dyn DmlProvider<T>,
    items: &mut [T],
) -> Result<(u64, u64), DatastoreError> {
    if items.is_empty() {
        return Ok((0, 0));
    }
    provider.descriptor().validate_for_persist()?;
    let classified = classify(session, provider, items).await?;
    let inserted = insert_pass(session, provider, items, &classified.insertable).await?;
    let updated = update_pass(session, provider, items, &classified.updatable).await?;
    Ok((inserted, updated))
}

async fn insert_pass<T>(
    session: &mut Session<'_>,
    provider: &dyn DmlProvider<T>,
    items: &mut [T],
    indexes: &[usize],
) -> Result<u64, DatastoreError> {
    if indexes.is_empty() {
        return Ok(0);
    }
    let strategy = session.insert_strategy();
    let batch_size = session.batch_size();
    let autoincrement = provider.descriptor().autoincrement;
    let strategy = if strategy.is_batched() && batch_size > 1 {
        strategy
    } else {
        crate::dialect::BulkInsertStrategy::SingleRow
    };
    let mut batch = BatchInserter::new(
        strategy,
        batch_size,
        autoincrement,
        session.dialect().last_insert_id_kind(),
    );
    for &index in indexes {
        let Some(item) = items.get(index) else {
            continue;
        };
        let statement = provider.get(SqlKind::Insert, item)?;
        batch.push(session, provider, items, index, statement).await?;
    }
    batch.flush(session, provider, items).await?;
    Ok(batch.inserted())
}

async fn update_pass<T>(
    session: &mut Session<'_>,
    provider: &dyn DmlProvider<T>,
    items: &[T],
    indexes: &[usize],
) -> Result<u64, DatastoreError> {
    let key_len = provider.descriptor().pk_columns.len();
    let mut updated = 0;
    for &index in indexes {
        let Some(item) = items.get(index) else {
            continue;
        };
        let statement = provider.get(SqlKind::Update, item)?;
        if statement.is_noop_update(key_len) {
            continue;
        }
        updated += session
            .execute(&statement.sql, &statement.values)
            .await?
            .rows_affected;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_keys_are_empty() {
        assert!(is_empty_key(&[RowValues::Int(0)]));
        assert!(is_empty_key(&[RowValues::Null, RowValues::Text(String::new())]));
        assert!(!is_empty_key(&[RowValues::Int(0), RowValues::Int(3)]));
    }

    #[test]
    fn key_strings_ignore_value_kind() {
        assert_eq!(
            key_string(&[RowValues::Int(1), RowValues::Text("a".into())]),
            key_string(&[RowValues::Text("1".into()), RowValues::Text("a".into())])
        );
    }
}
