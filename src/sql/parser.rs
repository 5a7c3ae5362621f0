//! Recursive descent parser for the restricted grammar:
//!
//! ```text
//! query   := SELECT (*|col_list) FROM id [WHERE criteria] [GROUP BY col_list]
//! insert  := INSERT INTO id '(' id_list ')' VALUES '(' value_list ')'
//! update  := UPDATE id SET col=value (, col=value)* [WHERE criteria]
//! delete  := DELETE FROM id [WHERE criteria]
//! criteria:= cond (AND|OR cond)*
//! ```

use super::error::ParseError;
use super::lexer::Tokenizer;
use super::statement::{
    BaseStatement, Column, DmlStatement, LogicalOperator, Operand, Operator, QueryStatement,
    SqlCriterion, SqlKind, Statement,
};
use super::token::{Keyword, TokenKind};

const fn kw(keyword: Keyword) -> TokenKind {
    TokenKind::Keyword(keyword)
}

/// Parse any supported statement.
///
/// # Errors
/// Returns [`ParseError`] with the offending offset and the expected token set.
pub fn parse(sql: &str) -> Result<Statement, ParseError> {
    let tokenizer = Tokenizer::new(sql);
    let leading = [
        kw(Keyword::Select),
        kw(Keyword::Insert),
        kw(Keyword::Update),
        kw(Keyword::Delete),
    ];
    match tokenizer.peek(&leading).map(|token| token.kind) {
        Some(TokenKind::Keyword(Keyword::Select)) => parse_query(sql).map(Statement::Query),
        Some(_) => parse_dml(sql).map(Statement::Dml),
        None => {
            let mut tokenizer = tokenizer;
            Err(tokenizer
                .next(&leading)
                .err()
                .unwrap_or_else(|| ParseError::illegal_token(sql, 0, &leading)))
        }
    }
}

/// Parse a SELECT statement.
///
/// # Errors
/// Returns [`ParseError`] for anything outside the query grammar.
pub fn parse_query(sql: &str) -> Result<QueryStatement, ParseError> {
    let mut tokenizer = Tokenizer::new(sql);
    tokenizer.next(&[kw(Keyword::Select)])?;
    let mut query = QueryStatement {
        base: BaseStatement::new(sql),
        all_field: false,
        group_by: Vec::new(),
    };
    if tokenizer.accept(&[TokenKind::Star]).is_some() {
        query.all_field = true;
    } else {
        query.base.columns = parse_projection(&mut tokenizer)?;
    }
    tokenizer.next(&[kw(Keyword::From)])?;
    query.base.table = tokenizer.next(&[TokenKind::Identifier])?.text;

    let mut expected = vec![TokenKind::Eof, kw(Keyword::Where), kw(Keyword::Group)];
    loop {
        let token = tokenizer.next(&expected)?;
        match token.kind {
            TokenKind::Keyword(Keyword::Where) => {
                query.base.criteria = parse_criteria(&mut tokenizer)?;
                expected = vec![TokenKind::Eof, kw(Keyword::Group)];
            }
            TokenKind::Keyword(Keyword::Group) => {
                tokenizer.next(&[kw(Keyword::By)])?;
                query.group_by = parse_group_by(&mut tokenizer, &query)?;
                expected = vec![TokenKind::Eof];
            }
            _ => break,
        }
    }
    Ok(query)
}

/// Parse an INSERT, UPDATE or DELETE statement.
///
/// # Errors
/// Returns [`ParseError`] for anything outside the DML grammar.
pub fn parse_dml(sql: &str) -> Result<DmlStatement, ParseError> {
    let mut tokenizer = Tokenizer::new(sql);
    let token = tokenizer.next(&[
        kw(Keyword::Insert),
        kw(Keyword::Update),
        kw(Keyword::Delete),
    ])?;
    match token.kind {
        TokenKind::Keyword(Keyword::Insert) => parse_insert(&mut tokenizer),
        TokenKind::Keyword(Keyword::Update) => parse_update(&mut tokenizer),
        _ => parse_delete(&mut tokenizer),
    }
}

fn parse_insert(tokenizer: &mut Tokenizer<'_>) -> Result<DmlStatement, ParseError> {
    let sql = tokenizer.sql();
    let mut statement = DmlStatement {
        base: BaseStatement::new(sql),
        kind: SqlKind::Insert,
        values: Vec::new(),
    };
    tokenizer.next(&[kw(Keyword::Into)])?;
    statement.base.table = tokenizer.next(&[TokenKind::Identifier])?.text;
    tokenizer.next(&[TokenKind::OpenParen])?;
    loop {
        let column = tokenizer.next(&[TokenKind::Identifier])?;
        statement.base.columns.push(Column::new(column.text));
        let separator = tokenizer.next(&[TokenKind::Comma, TokenKind::CloseParen])?;
        if separator.kind == TokenKind::CloseParen {
            break;
        }
    }
    tokenizer.next(&[kw(Keyword::Values)])?;
    let values = tokenizer.next(&[TokenKind::ValueList])?;
    statement.values = values.values.iter().map(Operand::from_token).collect();
    if statement.values.len() != statement.base.columns.len() {
        return Err(ParseError::structural(
            sql,
            values.offset,
            format!(
                "{} columns but {} values",
                statement.base.columns.len(),
                statement.values.len()
            ),
        ));
    }
    tokenizer.next(&[TokenKind::Eof])?;
    Ok(statement)
}

fn parse_update(tokenizer: &mut Tokenizer<'_>) -> Result<DmlStatement, ParseError> {
    let mut statement = DmlStatement {
        base: BaseStatement::new(tokenizer.sql()),
        kind: SqlKind::Update,
        values: Vec::new(),
    };
    statement.base.table = tokenizer.next(&[TokenKind::Identifier])?.text;
    tokenizer.next(&[kw(Keyword::Set)])?;
    loop {
        let column = tokenizer.next(&[TokenKind::Identifier])?;
        let operator = tokenizer.next(&[TokenKind::Operator])?;
        if operator.text != "=" {
            return Err(ParseError::structural(
                tokenizer.sql(),
                operator.offset,
                "SET expects '='",
            ));
        }
        let value = tokenizer.next(&[TokenKind::Value])?;
        statement.base.columns.push(Column::new(column.text));
        statement.values.push(Operand::from_token(&value.values[0]));
        if tokenizer.accept(&[TokenKind::Comma]).is_none() {
            break;
        }
    }
    let token = tokenizer.next(&[TokenKind::Eof, kw(Keyword::Where)])?;
    if token.kind != TokenKind::Eof {
        statement.base.criteria = parse_criteria(tokenizer)?;
        tokenizer.next(&[TokenKind::Eof])?;
    }
    Ok(statement)
}

fn parse_delete(tokenizer: &mut Tokenizer<'_>) -> Result<DmlStatement, ParseError> {
    let mut statement = DmlStatement {
        base: BaseStatement::new(tokenizer.sql()),
        kind: SqlKind::Delete,
        values: Vec::new(),
    };
    tokenizer.next(&[kw(Keyword::From)])?;
    statement.base.table = tokenizer.next(&[TokenKind::Identifier])?.text;
    let token = tokenizer.next(&[TokenKind::Eof, kw(Keyword::Where)])?;
    if token.kind != TokenKind::Eof {
        statement.base.criteria = parse_criteria(tokenizer)?;
        tokenizer.next(&[TokenKind::Eof])?;
    }
    Ok(statement)
}

/// `col := id | function'('args')'` with an optional `[AS] alias`; functions without
/// an alias are named `f<position>`.
fn parse_projection(tokenizer: &mut Tokenizer<'_>) -> Result<Vec<Column>, ParseError> {
    let mut columns = Vec::new();
    loop {
        let ident = tokenizer.next(&[TokenKind::Identifier])?;
        let mut column = Column::new(ident.text.clone());
        if let Some(arguments) = tokenizer.accept(&[TokenKind::Expression]) {
            let arguments = arguments.text.trim().to_string();
            column.name = format!("{}({arguments})", ident.text);
            column.function = Some(ident.text.to_ascii_lowercase());
            column.function_arguments = Some(arguments);
        }
        if tokenizer.accept(&[kw(Keyword::As)]).is_some() {
            column.alias = Some(tokenizer.next(&[TokenKind::Identifier])?.text);
        } else if let Some(alias) = tokenizer.peek(&[
            kw(Keyword::From),
            TokenKind::Comma,
            TokenKind::Identifier,
        ]) && alias.kind == TokenKind::Identifier
        {
            tokenizer.next(&[TokenKind::Identifier])?;
            column.alias = Some(alias.text);
        }
        if column.is_function() && column.alias.is_none() {
            column.alias = Some(format!("f{}", columns.len()));
        }
        columns.push(column);
        if tokenizer.accept(&[TokenKind::Comma]).is_none() {
            break;
        }
    }
    Ok(columns)
}

fn parse_group_by(
    tokenizer: &mut Tokenizer<'_>,
    query: &QueryStatement,
) -> Result<Vec<Column>, ParseError> {
    let mut columns = Vec::new();
    loop {
        let token = tokenizer.next(&[TokenKind::Identifier])?;
        if token.text.bytes().all(|b| b.is_ascii_digit()) {
            let position: usize = token.text.parse().unwrap_or(0);
            let projected = position
                .checked_sub(1)
                .and_then(|idx| query.base.columns.get(idx));
            match projected {
                Some(column) => columns.push(column.clone()),
                None => {
                    return Err(ParseError::structural(
                        tokenizer.sql(),
                        token.offset,
                        format!("GROUP BY position {position} is out of range"),
                    ));
                }
            }
        } else {
            columns.push(Column::new(token.text));
        }
        if tokenizer.accept(&[TokenKind::Comma]).is_none() {
            break;
        }
    }
    Ok(columns)
}

fn parse_criteria(tokenizer: &mut Tokenizer<'_>) -> Result<Vec<SqlCriterion>, ParseError> {
    let mut criteria = Vec::new();
    loop {
        let mut criterion = parse_condition(tokenizer)?;
        let connector = tokenizer.accept(&[kw(Keyword::And), kw(Keyword::Or)]);
        criterion.logical_operator = connector.map(|token| match token.kind {
            TokenKind::Keyword(Keyword::Or) => LogicalOperator::Or,
            _ => LogicalOperator::And,
        });
        let more = criterion.logical_operator.is_some();
        criteria.push(criterion);
        if !more {
            return Ok(criteria);
        }
    }
}

fn parse_condition(tokenizer: &mut Tokenizer<'_>) -> Result<SqlCriterion, ParseError> {
    let left = tokenizer.next(&[TokenKind::Identifier])?.text;
    let mut inverse = false;
    let mut token = tokenizer.next(&[
        TokenKind::Operator,
        kw(Keyword::Not),
        kw(Keyword::In),
        kw(Keyword::Like),
        kw(Keyword::Is),
        kw(Keyword::Between),
    ])?;
    if token.kind == kw(Keyword::Not) {
        inverse = true;
        token = tokenizer.next(&[kw(Keyword::In), kw(Keyword::Like), kw(Keyword::Between)])?;
    }
    let criterion = match token.kind {
        TokenKind::Operator => {
            let operator = Operator::from_symbol(&token.text).ok_or_else(|| {
                ParseError::illegal_token(tokenizer.sql(), token.offset, &[TokenKind::Operator])
            })?;
            let value = tokenizer.next(&[TokenKind::Value])?;
            let mut criterion = SqlCriterion::new(left, operator);
            criterion.right_operand = Some(Operand::from_token(&value.values[0]));
            criterion
        }
        TokenKind::Keyword(Keyword::In) => {
            let list = tokenizer.next(&[TokenKind::ValueList])?;
            let mut criterion = SqlCriterion::new(left, Operator::In);
            criterion.right_operands = list.values.iter().map(Operand::from_token).collect();
            criterion
        }
        TokenKind::Keyword(Keyword::Like) => {
            let value = tokenizer.next(&[TokenKind::Value])?;
            let mut criterion = SqlCriterion::new(left, Operator::Like);
            criterion.right_operand = Some(Operand::from_token(&value.values[0]));
            criterion
        }
        TokenKind::Keyword(Keyword::Is) => {
            if tokenizer.accept(&[kw(Keyword::Not)]).is_some() {
                inverse = true;
            }
            tokenizer.next(&[kw(Keyword::Null)])?;
            SqlCriterion::new(left, Operator::IsNull)
        }
        _ => {
            let from = tokenizer.next(&[TokenKind::Value])?;
            tokenizer.next(&[kw(Keyword::And)])?;
            let to = tokenizer.next(&[TokenKind::Value])?;
            let mut criterion = SqlCriterion::new(left, Operator::Between);
            criterion.right_operands = vec![
                Operand::from_token(&from.values[0]),
                Operand::from_token(&to.values[0]),
            ];
            criterion
        }
    };
    Ok(SqlCriterion {
        inverse,
        ..criterion
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowValues;

    #[test]
    fn parses_projection_with_functions_and_aliases() {
        let query =
            parse_query("SELECT id, name AS n, COUNT(*), sum(amount) total FROM orders").unwrap();
        assert_eq!(query.table(), "orders");
        assert_eq!(query.column_names(), vec!["id", "n", "f2", "total"]);
        let count = &query.base.columns[2];
        assert_eq!(count.function.as_deref(), Some("count"));
        assert_eq!(count.function_arguments.as_deref(), Some("*"));
        assert!(!query.all_field);
    }

    #[test]
    fn parses_star_where_and_group_by() {
        let query = parse_query(
            "select * from events where kind = 'click' and ts between 1 and 5 or id in (1, ?)",
        )
        .unwrap();
        assert!(query.all_field);
        let criteria = query.criteria();
        assert_eq!(criteria.len(), 3);
        assert_eq!(criteria[0].operator, Operator::Eq);
        assert_eq!(
            criteria[0].right_operand,
            Some(Operand::Literal(RowValues::Text("click".into())))
        );
        assert_eq!(criteria[0].logical_operator, Some(LogicalOperator::And));
        assert_eq!(criteria[1].operator, Operator::Between);
        assert_eq!(criteria[1].logical_operator, Some(LogicalOperator::Or));
        assert_eq!(criteria[2].right_operands.len(), 2);
        assert_eq!(criteria[2].placeholder_count(), 1);
        assert_eq!(criteria[2].logical_operator, None);
    }

    #[test]
    fn group_by_accepts_positions() {
        let query = parse_query("SELECT kind, count(*) AS c FROM t GROUP BY 1").unwrap();
        assert_eq!(query.group_by, vec![Column::new("kind")]);
    }

    #[test]
    fn group_by_position_out_of_range_is_rejected() {
        let err = parse_query("SELECT kind FROM t GROUP BY 2").unwrap_err();
        assert_eq!(err.offset, 28);
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn negations_and_null_checks() {
        let query =
            parse_query("SELECT a FROM t WHERE a IS NOT NULL AND b NOT IN (1,2) AND c NOT LIKE 'x%'")
                .unwrap();
        let criteria = query.criteria();
        assert!(criteria.iter().all(|c| c.inverse));
        assert_eq!(criteria[0].operator, Operator::IsNull);
        assert_eq!(criteria[1].operator, Operator::In);
        assert_eq!(criteria[2].operator, Operator::Like);
    }

    #[test]
    fn parses_insert_update_delete() {
        let insert = parse_dml("INSERT INTO users(id, name) VALUES (?, 'bob')").unwrap();
        assert_eq!(insert.kind, SqlKind::Insert);
        assert_eq!(insert.column_names(), vec!["id", "name"]);
        assert_eq!(insert.values[0], Operand::Placeholder);

        let update = parse_dml("UPDATE users SET name = ?, active = true WHERE id = ?").unwrap();
        assert_eq!(update.kind, SqlKind::Update);
        assert_eq!(update.column_names(), vec!["name", "active"]);
        assert_eq!(update.values[1], Operand::Literal(RowValues::Bool(true)));
        assert_eq!(update.criteria().len(), 1);

        let delete = parse_dml("DELETE FROM users WHERE id != 3").unwrap();
        assert_eq!(delete.kind, SqlKind::Delete);
        assert_eq!(delete.criteria()[0].operator, Operator::NotEq);
    }

    #[test]
    fn dispatches_by_leading_keyword() {
        assert!(matches!(parse("select * from t").unwrap(), Statement::Query(_)));
        assert!(matches!(parse("delete from t").unwrap(), Statement::Dml(_)));
    }

    #[test]
    fn negative_corpus_reports_offsets() {
        let cases = [
            ("SELECT id t", 11usize),
            ("SELECT FROM t", 7),
            ("SELECT id FROM t WHERE", 22),
            ("SELECT id FROM t WHERE id = ", 28),
            ("SELECT id FROM t WHERE id IN (1, 2", 29),
            ("INSERT INTO t(a, b) VALUES (1)", 27),
            ("UPDATE t SET a > 1", 15),
            ("DELETE t", 7),
            ("DROP TABLE t", 0),
            ("SELECT id FROM t LIMIT 1", 17),
        ];
        for (sql, offset) in cases {
            let err = parse(sql).unwrap_err();
            assert_eq!(err.offset, offset, "offset for {sql:?}: {err}");
        }
    }

    #[test]
    fn error_lists_expected_tokens() {
        let err = parse_query("SELECT id FROM t WHERE id ~ 1").unwrap_err();
        assert!(err.expected.contains(&"operator".to_string()));
        assert!(err.expected.contains(&"IN".to_string()));
    }
}
