//! Restricted SQL dialect used by the file engine: tokenizer, parser and
//! predicate evaluation over keyed records.

mod error;
mod lexer;
mod parser;
mod predicate;
mod statement;
mod token;

pub use error::ParseError;
pub use lexer::Tokenizer;
pub use parser::{parse, parse_dml, parse_query};
pub use predicate::{CriteriaPredicate, FieldSource, Predicate, like_pattern};
pub use statement::{
    BaseStatement, Column, DmlStatement, LogicalOperator, Operand, Operator, QueryStatement,
    SqlCriterion, SqlKind, Statement,
};
pub use token::{Keyword, Token, TokenKind, ValueToken};

