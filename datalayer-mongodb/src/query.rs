//! Query translation from datalayer predicates and filters to MongoDB query syntax.
//!
//! This module translates parsed [`Expr`] trees, text-search hints and sort specifications
//! into BSON documents for execution by the MongoDB query engine.

use bson::{Bson, Document, doc, ser::serialize_to_bson};
use serde_json::{Map, Value};

use datalayer_core::{
    error::{DataLayerError, DataLayerResult},
    filter::{FilterDescriptor, SortDirection, SortField},
    query::{Expr, FieldOp, QueryVisitor},
};


pub(crate) struct MongoQueryTranslator;

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DataLayerError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(doc! {});
        }

        Ok(doc! {
            "$and": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$or": exprs
                .iter()
                .map(|expr| self.visit_expr(expr))
                .collect::<Result<Vec<_>, _>>()?,
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        // `$not` is only valid on field operators; `$nor` negates a whole predicate.
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Value) -> Result<Self::Output, Self::Error> {
        let value = to_bson(value)?;

        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::In => doc! { "$in": value },
                FieldOp::Nin => doc! { "$nin": value },
            }
        })
    }
}

pub(crate) fn to_bson(value: &Value) -> DataLayerResult<Bson> {
    serialize_to_bson(value).map_err(|e| DataLayerError::Serialization(e.to_string()))
}

pub(crate) fn to_document(value: &Value) -> DataLayerResult<Document> {
    match to_bson(value)? {
        Bson::Document(document) => Ok(document),
        other => Err(DataLayerError::Serialization(format!(
            "expected a document, got {other}"
        ))),
    }
}

/// Translates a JSON predicate into a MongoDB filter.
pub(crate) fn translate_predicate(predicate: &Map<String, Value>) -> DataLayerResult<Document> {
    MongoQueryTranslator.visit_expr(&Expr::parse(predicate)?)
}

/// Builds the complete filter for a descriptor: its predicate combined with its search hint.
pub(crate) fn translate_filter(filter: &FilterDescriptor) -> DataLayerResult<Document> {
    let predicate = match &filter.query {
        Some(predicate) => translate_predicate(predicate)?,
        None => doc! {},
    };

    let Some(term) = &filter.search else {
        return Ok(predicate);
    };

    let search = match filter.search_fields.as_deref() {
        Some(fields) if !fields.is_empty() => doc! {
            "$or": fields
                .iter()
                .map(|field| doc! { field.as_str(): { "$regex": escape_regex(term), "$options": "i" } })
                .collect::<Vec<_>>(),
        },
        _ => doc! { "$text": { "$search": term.as_str() } },
    };

    if predicate.is_empty() {
        Ok(search)
    } else {
        Ok(doc! { "$and": [predicate, search] })
    }
}

pub(crate) fn translate_sort(sort: &[SortField]) -> Option<Document> {
    if sort.is_empty() {
        return None;
    }

    let mut document = Document::new();
    for SortField { field, direction } in sort {
        document.insert(
            field.clone(),
            match direction {
                SortDirection::Asc => 1,
                SortDirection::Desc => -1,
            },
        );
    }

    Some(document)
}

fn escape_regex(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());

    for c in term.chars() {
        if "\\^$.|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }

    escaped
}
