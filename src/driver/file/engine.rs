//! Evaluation of parsed statements over decoded file records.

use std::collections::HashMap;

use crate::error::DatastoreError;
use crate::results::ResultSet;
use crate::sql::{Column, CriteriaPredicate, DmlStatement, FieldSource, QueryStatement};
use crate::types::RowValues;

use super::format::{Decoded, FileRecord};

/// Run a SELECT over `decoded`, binding `?` placeholders from `params`.
///
/// # Errors
/// Returns `BindingError` for missing parameters and `Unsupported` for unknown
/// aggregate functions.
pub(crate) fn select(
    query: &QueryStatement,
    decoded: &Decoded,
    params: &[RowValues],
) -> Result<ResultSet, DatastoreError> {
    let mut params = params.iter().cloned();
    let predicate = CriteriaPredicate::new(query.criteria(), &mut params)?;
    let matching: Vec<&FileRecord> = decoded
        .records
        .iter()
        .filter(|record| predicate.matches(*record))
        .collect();

    let columns: Vec<Column> = if query.all_field {
        decoded.columns.iter().map(Column::new).collect()
    } else {
        query.base.columns.clone()
    };
    let names: Vec<String> = columns.iter().map(|c| c.output_name().to_string()).collect();
    let mut result_set = ResultSet::with_columns(names);

    if query.group_by.is_empty() && !query.has_aggregates() {
        for record in matching {
            let row = columns
                .iter()
                .map(|column| field_or_null(record, &column.name))
                .collect();
            result_set.add_row_values(row);
        }
        return Ok(result_set);
    }

    for group in group_records(&query.group_by, matching) {
        let row = columns
            .iter()
            .map(|column| match &column.function {
                Some(function) => aggregate(
                    function,
                    column.function_arguments.as_deref().unwrap_or("*"),
                    &group,
                ),
                None => Ok(group
                    .first()
                    .map_or(RowValues::Null, |record| field_or_null(record, &column.name))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        result_set.add_row_values(row);
    }
    Ok(result_set)
}

/// Build the record an INSERT describes.
///
/// # Errors
/// Returns `BindingError` when placeholders outnumber parameters.
pub(crate) fn insert_record(
    statement: &DmlStatement,
    params: &[RowValues],
) -> Result<FileRecord, DatastoreError> {
    statement.bind_values(&mut params.iter().cloned())
}

/// Merge the SET values into every matching record; returns the match count.
///
/// # Errors
/// Returns `BindingError` when placeholders outnumber parameters.
pub(crate) fn update(
    statement: &DmlStatement,
    decoded: &mut Decoded,
    params: &[RowValues],
) -> Result<u64, DatastoreError> {
    let mut params = params.iter().cloned();
    let assignments = statement.bind_values(&mut params)?;
    let predicate = CriteriaPredicate::new(statement.criteria(), &mut params)?;
    decoded.extend_columns(assignments.iter().map(|(k, _)| k));
    let mut updated = 0;
    for record in &mut decoded.records {
        if !predicate.matches(&*record) {
            continue;
        }
        for (column, value) in &assignments {
            match record.iter_mut().find(|(k, _)| k == column) {
                Some((_, existing)) => *existing = value.clone(),
                None => record.push((column.clone(), value.clone())),
            }
        }
        updated += 1;
    }
    Ok(updated)
}

/// Drop every matching record; returns how many were removed.
///
/// # Errors
/// Returns `BindingError` when placeholders outnumber parameters.
pub(crate) fn delete(
    statement: &DmlStatement,
    decoded: &mut Decoded,
    params: &[RowValues],
) -> Result<u64, DatastoreError> {
    let predicate = CriteriaPredicate::new(statement.criteria(), &mut params.iter().cloned())?;
    let before = decoded.records.len();
    decoded.records.retain(|record| !predicate.matches(record));
    Ok((before - decoded.records.len()) as u64)
}

fn field_or_null(record: &FileRecord, name: &str) -> RowValues {
    record.field(name).cloned().unwrap_or(RowValues::Null)
}

/// Groups in first-seen order; without GROUP BY everything is one group.
fn group_records<'a>(group_by: &[Column], records: Vec<&'a FileRecord>) -> Vec<Vec<&'a FileRecord>> {
    if group_by.is_empty() {
        return vec![records];
    }
    let mut index: HashMap<Vec<String>, usize> = HashMap::new();
    let mut groups: Vec<Vec<&FileRecord>> = Vec::new();
    for record in records {
        let key: Vec<String> = group_by
            .iter()
            .map(|column| field_or_null(record, &column.name).to_string())
            .collect();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(record);
    }
    groups
}

fn aggregate(
    function: &str,
    argument: &str,
    group: &[&FileRecord],
) -> Result<RowValues, DatastoreError> {
    let argument = argument.trim();
    let values = || {
        group
            .iter()
            .filter_map(move |record| record.field(argument))
            .filter(|value| !value.is_null())
    };
    Ok(match function {
        "count" if argument == "*" || argument.is_empty() => RowValues::Int(group.len() as i64),
        "count" => RowValues::Int(values().count() as i64),
        "sum" => {
            if values().all(|v| matches!(v, RowValues::Int(_))) {
                RowValues::Int(values().filter_map(|v| v.as_int().copied()).sum())
            } else {
                RowValues::Float(values().filter_map(RowValues::to_number).sum())
            }
        }
        "avg" => {
            let numbers: Vec<f64> = values().filter_map(RowValues::to_number).collect();
            if numbers.is_empty() {
                RowValues::Null
            } else {
                RowValues::Float(numbers.iter().sum::<f64>() / numbers.len() as f64)
            }
        }
        "min" => values()
            .min_by(|a, b| a.compare(b))
            .cloned()
            .unwrap_or(RowValues::Null),
        "max" => values()
            .max_by(|a, b| a.compare(b))
            .cloned()
            .unwrap_or(RowValues::Null),
        other => {
            return Err(DatastoreError::Unsupported(format!(
                "aggregate function {other}"
            )));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{parse_dml, parse_query};

    fn table() -> Decoded {
        let rec = |id: i64, dept: &str, salary: i64| -> FileRecord {
            vec![
                ("id".into(), RowValues::Int(id)),
                ("dept".into(), RowValues::Text(dept.into())),
                ("salary".into(), RowValues::Int(salary)),
            ]
        };
        Decoded {
            columns: vec!["id".into(), "dept".into(), "salary".into()],
            records: vec![rec(1, "eng", 100), rec(2, "ops", 50), rec(3, "eng", 120)],
        }
    }

    #[test]
    fn projects_selected_columns_in_file_order() {
        let query = parse_query("SELECT id FROM t WHERE id IN (?, ?)").unwrap();
        let rs = select(&query, &table(), &[RowValues::Int(1), RowValues::Int(3)]).unwrap();
        let ids: Vec<_> = rs.results.iter().map(|r| r.rows[0].clone()).collect();
        assert_eq!(ids, vec![RowValues::Int(1), RowValues::Int(3)]);
        assert_eq!(rs.get_column_names().unwrap().as_slice(), ["id"]);
    }

    #[test]
    fn star_returns_every_column() {
        let query = parse_query("SELECT * FROM t WHERE dept = 'ops'").unwrap();
        let rs = select(&query, &table(), &[]).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.results[0].rows.len(), 3);
    }

    #[test]
    fn groups_with_aggregates() {
        let query =
            parse_query("SELECT dept, count(*), sum(salary) AS total, max(salary) FROM t GROUP BY 1")
                .unwrap();
        let rs = select(&query, &table(), &[]).unwrap();
        assert_eq!(
            rs.get_column_names().unwrap().as_slice(),
            ["dept", "f1", "total", "f3"]
        );
        assert_eq!(rs.len(), 2);
        let eng = &rs.results[0];
        assert_eq!(eng.get("dept"), Some(&RowValues::Text("eng".into())));
        assert_eq!(eng.get("f1"), Some(&RowValues::Int(2)));
        assert_eq!(eng.get("total"), Some(&RowValues::Int(220)));
        assert_eq!(eng.get("f3"), Some(&RowValues::Int(120)));
    }

    #[test]
    fn aggregate_without_group_by_yields_one_row() {
        let query = parse_query("SELECT avg(salary) AS a FROM t WHERE id > 10").unwrap();
        let rs = select(&query, &table(), &[]).unwrap();
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.results[0].get("a"), Some(&RowValues::Null));
    }

    #[test]
    fn update_and_delete_rewrite_matches() {
        let mut decoded = table();
        let upd = parse_dml("UPDATE t SET salary = ?, bonus = 5 WHERE dept = ?").unwrap();
        let n = update(&upd, &mut decoded, &[RowValues::Int(1), "eng".into()]).unwrap();
        assert_eq!(n, 2);
        assert!(decoded.columns.contains(&"bonus".to_string()));
        assert_eq!(decoded.records[2].field("salary"), Some(&RowValues::Int(1)));

        let del = parse_dml("DELETE FROM t WHERE bonus IS NULL").unwrap();
        assert_eq!(delete(&del, &mut decoded, &[]).unwrap(), 1);
        assert_eq!(decoded.records.len(), 2);
    }
}
