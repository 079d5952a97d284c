//! Structured predicates and a visitor for executing them.
//!
//! The `query` member of a [`FilterDescriptor`](crate::filter::FilterDescriptor) is a JSON
//! predicate in the widely used operator syntax:
//!
//! ```json
//! { "status": "published", "votes": { "$gte": 10 }, "$or": [{ "tags": "rust" }, { "pinned": true }] }
//! ```
//!
//! [`Expr::parse`] turns it into an [`Expr`] tree which backends consume through a
//! [`QueryVisitor`]: the in-memory adapter evaluates it against each document, the MongoDB adapter
//! translates it into a native filter.
//!
//! # Supported operators
//!
//! - Comparison: `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`
//! - Membership: `$in`, `$nin`
//! - Existence: `$exists`
//! - Logical: `$and`, `$or`, `$not`
//!
//! A plain value is an implicit `$eq`. Field names may be dotted paths. An empty predicate
//! matches every document.

use serde_json::{Map, Value};

use crate::error::{DataLayerError, DataLayerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// The field equals any member of the value array.
    In,
    /// The field equals no member of the value array.
    Nin,
}

impl FieldOp {
    fn from_operator(operator: &str) -> Option<Self> {
        Some(match operator {
            "$eq" => FieldOp::Eq,
            "$ne" => FieldOp::Ne,
            "$gt" => FieldOp::Gt,
            "$gte" => FieldOp::Gte,
            "$lt" => FieldOp::Lt,
            "$lte" => FieldOp::Lte,
            "$in" => FieldOp::In,
            "$nin" => FieldOp::Nin,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Exists(String, bool),
    Field {
        field: String,
        op: FieldOp,
        value: Value,
    },
}

impl Expr {
    pub fn field(field: impl Into<String>, op: FieldOp, value: Value) -> Self {
        Expr::Field { field: field.into(), op, value }
    }

    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Matches every document.
    pub fn all() -> Self {
        Expr::And(Vec::new())
    }

    /// Parses a JSON predicate.
    ///
    /// # Errors
    ///
    /// Returns [`DataLayerError::InvalidParameter`] for unknown operators and operands of the
    /// wrong shape (`$in` without an array, `$and` without an array of objects, ...).
    pub fn parse(predicate: &Map<String, Value>) -> DataLayerResult<Self> {
        let mut exprs = Vec::with_capacity(predicate.len());

        for (key, value) in predicate {
            let expr = match key.as_str() {
                "$and" => Expr::And(parse_branches(key, value)?),
                "$or" => Expr::Or(parse_branches(key, value)?),
                operator if operator.starts_with('$') => {
                    return Err(invalid(format!("unsupported top-level operator {operator}")));
                }
                field => parse_field(field, value)?,
            };
            exprs.push(expr);
        }

        Ok(collapse(exprs))
    }
}

/// Walks an [`Expr`] tree.
///
/// Implementors handle each node kind; [`QueryVisitor::visit_expr`] dispatches to them.
pub trait QueryVisitor {
    type Output;
    type Error: Into<DataLayerError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
        }
    }
}

fn invalid(message: String) -> DataLayerError {
    DataLayerError::InvalidParameter(format!("query: {message}"))
}

fn collapse(mut exprs: Vec<Expr>) -> Expr {
    if exprs.len() == 1 {
        exprs.remove(0)
    } else {
        Expr::And(exprs)
    }
}

fn parse_branches(operator: &str, value: &Value) -> DataLayerResult<Vec<Expr>> {
    let Value::Array(branches) = value else {
        return Err(invalid(format!("{operator} expects an array of predicates")));
    };

    branches
        .iter()
        .map(|branch| match branch {
            Value::Object(predicate) => Expr::parse(predicate),
            other => Err(invalid(format!("{operator} branch must be an object, got {other}"))),
        })
        .collect()
}

fn is_operator_object(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty() && map.keys().all(|key| key.starts_with('$')),
        _ => false,
    }
}

fn parse_field(field: &str, value: &Value) -> DataLayerResult<Expr> {
    let Value::Object(operators) = value else {
        return Ok(Expr::field(field, FieldOp::Eq, value.clone()));
    };
    if !is_operator_object(value) {
        return Ok(Expr::field(field, FieldOp::Eq, value.clone()));
    }

    let mut exprs = Vec::with_capacity(operators.len());
    for (operator, operand) in operators {
        let expr = match operator.as_str() {
            "$exists" => match operand {
                Value::Bool(should_exist) => Expr::Exists(field.to_string(), *should_exist),
                other => return Err(invalid(format!("$exists expects a boolean, got {other}"))),
            },
            "$not" if is_operator_object(operand) => parse_field(field, operand)?.not(),
            "$not" => return Err(invalid("$not expects an operator object".to_string())),
            other => {
                let op = FieldOp::from_operator(other)
                    .ok_or_else(|| invalid(format!("unsupported operator {other}")))?;
                if matches!(op, FieldOp::In | FieldOp::Nin) && !operand.is_array() {
                    return Err(invalid(format!("{other} expects an array")));
                }
                Expr::field(field, op, operand.clone())
            }
        };
        exprs.push(expr);
    }

    Ok(collapse(exprs))
}
