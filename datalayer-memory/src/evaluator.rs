//! Predicate evaluation, search and ordering for in-memory filtering.
//!
//! This module provides the evaluation engine for query expressions, enabling filtering and
//! comparison operations on JSON documents.

use serde_json::Value;
use std::{cmp::Ordering, collections::HashMap};

use datalayer_core::{
    error::{DataLayerError, DataLayerResult},
    filter::{SortDirection, SortField},
    path,
    query::{Expr, FieldOp, QueryVisitor},
};

/// Type-erased, comparable representation of JSON values.
///
/// All numbers are normalized to `f64` so that `1` and `1.0` compare equal.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Value> for Comparable<'a> {
    fn from(value: &'a Value) -> Self {
        match value {
            Value::Null => Comparable::Null,
            Value::Bool(value) => Comparable::Bool(*value),
            Value::Number(value) => value
                .as_f64()
                .map(Comparable::Number)
                .unwrap_or(Comparable::Null),
            Value::String(value) => Comparable::String(value),
            Value::Array(items) => Comparable::Array(
                items
                    .iter()
                    .map(Comparable::from)
                    .collect::<Vec<_>>()
            ),
            Value::Object(map) => Comparable::Map(
                map
                    .iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect::<HashMap<_, _>>()
            ),
        }
    }
}

impl<'a> PartialEq for Comparable<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl<'a> PartialOrd for Comparable<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl<'a> Comparable<'a> {
    /// Equality where an array field matches when any of its elements matches.
    fn matches(&self, expected: &Comparable<'_>) -> bool {
        if self == expected {
            return true;
        }

        match self {
            Comparable::Array(items) => items.iter().any(|item| item == expected),
            _ => false,
        }
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Value,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Value) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DataLayerResult<bool> {
        self.visit_expr(expr)
    }

    pub fn filter_documents(
        documents: impl IntoIterator<Item = &'a Value>,
        expr: &Expr,
    ) -> DataLayerResult<Vec<&'a Value>> {
        let mut matched = Vec::new();

        for doc in documents {
            if DocumentEvaluator::new(doc).evaluate(expr)? {
                matched.push(doc);
            }
        }

        Ok(matched)
    }

    fn lookup(&self, field: &str) -> Comparable<'a> {
        path::get(self.document, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null)
    }
}

impl<'a> QueryVisitor for DocumentEvaluator<'a> {
    type Output = bool;
    type Error = DataLayerError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(path::get(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        // Missing fields compare as null.
        let field_value = self.lookup(field);
        let expected = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => field_value.matches(&expected),
            FieldOp::Ne => !field_value.matches(&expected),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => {
                match field_value.partial_cmp(&expected) {
                    Some(ordering) => match op {
                        FieldOp::Gt => ordering == Ordering::Greater,
                        FieldOp::Gte => ordering != Ordering::Less,
                        FieldOp::Lt => ordering == Ordering::Less,
                        _ => ordering != Ordering::Greater,
                    },
                    None => false,
                }
            },
            FieldOp::In => match &expected {
                Comparable::Array(values) => values.iter().any(|val| field_value.matches(val)),
                single_value => field_value.matches(single_value),
            },
            FieldOp::Nin => match &expected {
                Comparable::Array(values) => !values.iter().any(|val| field_value.matches(val)),
                single_value => !field_value.matches(single_value),
            },
        })
    }
}

/// Case-insensitive substring search over `fields`, or over every top-level string and number
/// field when `fields` is empty.
pub(crate) fn matches_search(document: &Value, term: &str, fields: &[String]) -> bool {
    let needle = term.to_lowercase();
    let contains = |value: &Value| match value {
        Value::String(text) => text.to_lowercase().contains(&needle),
        Value::Number(number) => number.to_string().contains(&needle),
        _ => false,
    };

    if fields.is_empty() {
        return document
            .as_object()
            .is_some_and(|map| map.values().any(contains));
    }

    fields
        .iter()
        .filter_map(|field| path::get(document, field))
        .any(contains)
}

/// Orders two documents by a multi-field sort specification.
pub(crate) fn compare_documents(a: &Value, b: &Value, sort: &[SortField]) -> Ordering {
    for SortField { field, direction } in sort {
        let left = path::get(a, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);
        let right = path::get(b, field)
            .map(Comparable::from)
            .unwrap_or(Comparable::Null);

        let ordering = match direction {
            SortDirection::Asc => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
            SortDirection::Desc => right.partial_cmp(&left).unwrap_or(Ordering::Equal),
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    Ordering::Equal
}
