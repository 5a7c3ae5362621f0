//! Turns parsed WHERE criteria into predicates over keyed records.

use std::cmp::Ordering;
use std::collections::HashMap;

use regex::Regex;

use crate::error::DatastoreError;
use crate::types::RowValues;

use super::statement::{LogicalOperator, Operator, SqlCriterion};

/// Anything that can look up a field value by column name.
pub trait FieldSource {
    fn field(&self, name: &str) -> Option<&RowValues>;
}

impl FieldSource for HashMap<String, RowValues> {
    fn field(&self, name: &str) -> Option<&RowValues> {
        self.get(name).or_else(|| {
            self.iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }
}

impl FieldSource for Vec<(String, RowValues)> {
    fn field(&self, name: &str) -> Option<&RowValues> {
        self.iter()
            .find(|(key, _)| key == name)
            .or_else(|| self.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)))
            .map(|(_, value)| value)
    }
}

/// Single-value predicate.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare(Operator, RowValues),
    In(Vec<RowValues>),
    Like(Regex),
    Between(RowValues, RowValues),
    IsNull,
    Not(Box<Predicate>),
}

impl Predicate {
    /// Apply to a field value; `None` means the field is absent from the record.
    #[must_use]
    pub fn apply(&self, value: Option<&RowValues>) -> bool {
        match self {
            Predicate::Not(inner) => !inner.apply(value),
            Predicate::IsNull => value.is_none_or(RowValues::is_null),
            Predicate::Compare(operator, expected) => {
                let Some(actual) = value else {
                    return false;
                };
                let ordering = actual.compare(expected);
                match operator {
                    Operator::Eq => ordering == Ordering::Equal,
                    Operator::NotEq => ordering != Ordering::Equal,
                    Operator::Lt => ordering == Ordering::Less,
                    Operator::LtEq => ordering != Ordering::Greater,
                    Operator::Gt => ordering == Ordering::Greater,
                    Operator::GtEq => ordering != Ordering::Less,
                    _ => false,
                }
            }
            Predicate::In(candidates) => value.is_some_and(|actual| {
                candidates
                    .iter()
                    .any(|candidate| actual.loosely_equals(candidate))
            }),
            Predicate::Like(pattern) => {
                value.is_some_and(|actual| !actual.is_null() && pattern.is_match(&actual.to_string()))
            }
            Predicate::Between(from, to) => value.is_some_and(|actual| {
                actual.compare(from) != Ordering::Less && actual.compare(to) != Ordering::Greater
            }),
        }
    }
}

/// Compile a SQL LIKE pattern: `%` matches any run, `_` one character.
///
/// # Errors
/// Returns `BindingError` if the resulting expression cannot be compiled.
pub fn like_pattern(pattern: &str) -> Result<Regex, DatastoreError> {
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str("(?is)^");
    let mut literal = String::new();
    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    expression.push_str(&regex::escape(&literal));
    expression.push('$');
    Regex::new(&expression)
        .map_err(|e| DatastoreError::BindingError(format!("invalid LIKE pattern {pattern}: {e}")))
}

#[derive(Debug, Clone)]
struct CriterionPredicate {
    column: String,
    predicate: Predicate,
    logical_operator: Option<LogicalOperator>,
}

/// Compiled WHERE clause, evaluated left to right with short-circuit connectors.
#[derive(Debug, Clone, Default)]
pub struct CriteriaPredicate {
    predicates: Vec<CriterionPredicate>,
}

impl CriteriaPredicate {
    /// Build predicates, binding `?` placeholders from `params` in criterion order.
    ///
    /// # Errors
    /// Returns `BindingError` when placeholders outnumber parameters or a LIKE
    /// pattern is invalid.
    pub fn new(
        criteria: &[SqlCriterion],
        params: &mut dyn Iterator<Item = RowValues>,
    ) -> Result<Self, DatastoreError> {
        let predicates = criteria
            .iter()
            .map(|criterion| {
                Ok(CriterionPredicate {
                    column: criterion.left_operand.clone(),
                    predicate: build_predicate(criterion, params)?,
                    logical_operator: criterion.logical_operator,
                })
            })
            .collect::<Result<Vec<_>, DatastoreError>>()?;
        Ok(Self { predicates })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// AND stops at the first false, OR at the first true; otherwise the last
    /// evaluated result wins.
    pub fn matches(&self, source: &dyn FieldSource) -> bool {
        let mut result = true;
        for item in &self.predicates {
            result = item.predicate.apply(source.field(&item.column));
            match item.logical_operator {
                Some(LogicalOperator::And) if !result => return false,
                Some(LogicalOperator::Or) if result => return true,
                None => return result,
                _ => {}
            }
        }
        result
    }
}

fn build_predicate(
    criterion: &SqlCriterion,
    params: &mut dyn Iterator<Item = RowValues>,
) -> Result<Predicate, DatastoreError> {
    let single = |params: &mut dyn Iterator<Item = RowValues>| {
        criterion
            .right_operand
            .as_ref()
            .ok_or_else(|| {
                DatastoreError::BindingError(format!(
                    "missing right operand for {}",
                    criterion.left_operand
                ))
            })?
            .bind(params)
    };
    let predicate = match criterion.operator {
        Operator::IsNull => Predicate::IsNull,
        Operator::In => Predicate::In(
            criterion
                .right_operands
                .iter()
                .map(|operand| operand.bind(params))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Operator::Between => {
            let bounds = criterion
                .right_operands
                .iter()
                .map(|operand| operand.bind(params))
                .collect::<Result<Vec<_>, _>>()?;
            let [from, to]: [RowValues; 2] = bounds.try_into().map_err(|_| {
                DatastoreError::BindingError("BETWEEN expects two bounds".into())
            })?;
            Predicate::Between(from, to)
        }
        Operator::Like => Predicate::Like(like_pattern(&single(params)?.to_string())?),
        operator => Predicate::Compare(operator, single(params)?),
    };
    Ok(if criterion.inverse {
        Predicate::Not(Box::new(predicate))
    } else {
        predicate
    })
}
