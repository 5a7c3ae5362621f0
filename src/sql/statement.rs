//! Parsed statement trees.

use std::fmt;

use crate::error::DatastoreError;
use crate::types::RowValues;

use super::token::ValueToken;

/// Kind of a data manipulation statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for SqlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SqlKind::Insert => "INSERT",
            SqlKind::Update => "UPDATE",
            SqlKind::Delete => "DELETE",
        })
    }
}

/// Right-hand side operand as written in the statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Placeholder,
    Literal(RowValues),
}

impl Operand {
    pub(crate) fn from_token(token: &ValueToken) -> Self {
        match token {
            ValueToken::Placeholder => Operand::Placeholder,
            ValueToken::Quoted(text) => Operand::Literal(RowValues::Text(text.clone())),
            ValueToken::Bare(text) => Operand::Literal(RowValues::parse_literal(text)),
        }
    }

    /// Resolve against positional parameters.
    ///
    /// # Errors
    /// Returns `BindingError` when a placeholder has no parameter left.
    pub fn bind(
        &self,
        params: &mut dyn Iterator<Item = RowValues>,
    ) -> Result<RowValues, DatastoreError> {
        match self {
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Placeholder => params.next().ok_or_else(|| {
                DatastoreError::BindingError("missing parameter for '?' placeholder".into())
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Like,
    IsNull,
    Between,
}

impl Operator {
    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "=" => Operator::Eq,
            "!=" | "<>" => Operator::NotEq,
            "<" => Operator::Lt,
            "<=" => Operator::LtEq,
            ">" => Operator::Gt,
            ">=" => Operator::GtEq,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOperator {
    And,
    Or,
}

/// One atomic WHERE condition plus the connector to the condition that follows it.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlCriterion {
    pub left_operand: String,
    pub operator: Operator,
    pub right_operand: Option<Operand>,
    pub right_operands: Vec<Operand>,
    pub inverse: bool,
    pub logical_operator: Option<LogicalOperator>,
}

impl SqlCriterion {
    pub(crate) fn new(left_operand: String, operator: Operator) -> Self {
        Self {
            left_operand,
            operator,
            right_operand: None,
            right_operands: Vec::new(),
            inverse: false,
            logical_operator: None,
        }
    }

    /// Number of `?` placeholders this criterion consumes.
    #[must_use]
    pub fn placeholder_count(&self) -> usize {
        self.right_operand
            .iter()
            .chain(self.right_operands.iter())
            .filter(|op| matches!(op, Operand::Placeholder))
            .count()
    }
}

/// A projected or affected column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub alias: Option<String>,
    pub function: Option<String>,
    pub function_arguments: Option<String>,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            function: None,
            function_arguments: None,
        }
    }

    /// Output name: the alias when present, otherwise the column name.
    #[must_use]
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    #[must_use]
    pub fn is_function(&self) -> bool {
        self.function.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BaseStatement {
    pub sql: String,
    pub table: String,
    pub columns: Vec<Column>,
    pub criteria: Vec<SqlCriterion>,
}

impl BaseStatement {
    pub(crate) fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            table: String::new(),
            columns: Vec::new(),
            criteria: Vec::new(),
        }
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.output_name().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryStatement {
    pub base: BaseStatement,
    pub all_field: bool,
    pub group_by: Vec<Column>,
}

impl QueryStatement {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.base.table
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.base.column_names()
    }

    #[must_use]
    pub fn criteria(&self) -> &[SqlCriterion] {
        &self.base.criteria
    }

    #[must_use]
    pub fn has_aggregates(&self) -> bool {
        self.base.columns.iter().any(Column::is_function)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DmlStatement {
    pub base: BaseStatement,
    pub kind: SqlKind,
    pub values: Vec<Operand>,
}

impl DmlStatement {
    #[must_use]
    pub fn table(&self) -> &str {
        &self.base.table
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.base.column_names()
    }

    #[must_use]
    pub fn criteria(&self) -> &[SqlCriterion] {
        &self.base.criteria
    }

    /// Bind INSERT values or UPDATE SET values, in column order.
    ///
    /// # Errors
    /// Returns `BindingError` when placeholders outnumber parameters.
    pub fn bind_values(
        &self,
        params: &mut dyn Iterator<Item = RowValues>,
    ) -> Result<Vec<(String, RowValues)>, DatastoreError> {
        self.base
            .columns
            .iter()
            .zip(self.values.iter())
            .map(|(column, operand)| Ok((column.name.clone(), operand.bind(params)?)))
            .collect()
    }
}

/// Either parsed statement form.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Query(QueryStatement),
    Dml(DmlStatement),
}
