use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::filter::Literal;

/// A value bound to a statement placeholder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl From<&Literal> for SqlValue {
    fn from(literal: &Literal) -> Self {
        match literal {
            Literal::String(s) => SqlValue::Text(s.clone()),
            Literal::Integer(i) => SqlValue::Integer(*i),
            Literal::Double(d) => SqlValue::Double(*d),
            Literal::Boolean(b) => SqlValue::Boolean(*b),
            Literal::DateTime(t) => SqlValue::Timestamp(*t),
        }
    }
}

/// Parameterized SQL text
///
/// Every user-supplied value lives in `params`; `sql` contains only
/// placeholders, quoted identifiers and fixed keywords.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlFragment {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl SqlFragment {
    pub fn new(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self { sql: sql.into(), params }
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}
