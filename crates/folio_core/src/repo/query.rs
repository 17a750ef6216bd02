//! SQL fragments for condition-driven reads and writes.
//!
//! Attributes live in a JSON column; fields are addressed with
//! `json_extract(attributes, '$.<field>')`, storage columns directly. Field
//! names are validated before they are spliced into SQL, values are always
//! bound.
//!
//! `json_extract` yields SQL values, which lose the difference between a JSON
//! boolean and an integer. Reads that hand values back to callers use
//! [`field_json_expr`] and decode the JSON text instead.

use crate::model::condition::{Condition, Predicate};
use crate::model::field::{is_reserved_field, validate_field_name, FieldValue, ValidationError};
use crate::model::kind::EntityKind;
use crate::repo::repository::OrderBy;
use rusqlite::types::Value;

/// Which rows of a soft-deleting kind a statement may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RowScope {
    Live,
    WithTrashed,
    TrashedOnly,
}

impl RowScope {
    pub(crate) fn from_with_trashed(with_trashed: bool) -> Self {
        if with_trashed {
            Self::WithTrashed
        } else {
            Self::Live
        }
    }
}

/// `WHERE` body plus its bound values.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SqlFilter {
    pub sql: String,
    pub params: Vec<Value>,
}

/// SQL expression addressing `field` on the kind's table.
pub(crate) fn field_expr(field: &str) -> Result<String, ValidationError> {
    if is_reserved_field(field) {
        return Ok(field.to_string());
    }
    validate_field_name(field)?;
    Ok(format!("json_extract(attributes, '$.{field}')"))
}

/// SQL expression yielding `field` as JSON text, SQL `NULL` when absent.
pub(crate) fn field_json_expr(field: &str) -> Result<String, ValidationError> {
    if is_reserved_field(field) {
        return Ok(format!("json_quote({field})"));
    }
    validate_field_name(field)?;
    Ok(format!("attributes -> '$.{field}'"))
}

pub(crate) fn build_filter(
    kind: &EntityKind,
    condition: &Condition,
    scope: RowScope,
) -> Result<SqlFilter, ValidationError> {
    let mut terms = Vec::with_capacity(condition.clauses().len() + 1);
    let mut params = Vec::new();

    if kind.soft_deletes {
        match scope {
            RowScope::Live => terms.push("deleted_at IS NULL".to_string()),
            RowScope::TrashedOnly => terms.push("deleted_at IS NOT NULL".to_string()),
            RowScope::WithTrashed => {}
        }
    } else if scope == RowScope::TrashedOnly {
        terms.push("0 = 1".to_string());
    }

    for clause in condition.clauses() {
        let expr = field_expr(&clause.field)?;
        match &clause.predicate {
            Predicate::Eq(value) => {
                terms.push(format!("{expr} IS ?"));
                params.push(value.to_sql_value());
            }
            Predicate::NotEq(value) => {
                terms.push(format!("{expr} IS NOT ?"));
                params.push(value.to_sql_value());
            }
            Predicate::In(values) => {
                let non_null: Vec<&FieldValue> =
                    values.iter().filter(|value| !value.is_null()).collect();
                let wants_null = non_null.len() != values.len();
                let mut alternatives = Vec::with_capacity(2);
                if !non_null.is_empty() {
                    let placeholders = vec!["?"; non_null.len()].join(", ");
                    alternatives.push(format!("{expr} IN ({placeholders})"));
                    params.extend(non_null.into_iter().map(FieldValue::to_sql_value));
                }
                if wants_null {
                    alternatives.push(format!("{expr} IS NULL"));
                }
                if alternatives.is_empty() {
                    terms.push("0 = 1".to_string());
                } else {
                    terms.push(format!("({})", alternatives.join(" OR ")));
                }
            }
        }
    }

    let sql = if terms.is_empty() {
        "1 = 1".to_string()
    } else {
        terms.join(" AND ")
    };
    Ok(SqlFilter { sql, params })
}

/// `ORDER BY` body; storage order (ascending id) breaks ties.
pub(crate) fn build_order(order_by: &[OrderBy]) -> Result<String, ValidationError> {
    let mut terms = Vec::with_capacity(order_by.len() + 1);
    for term in order_by {
        let direction = if term.descending { "DESC" } else { "ASC" };
        terms.push(format!("{} {direction}", field_expr(&term.field)?));
    }
    terms.push("id ASC".to_string());
    Ok(terms.join(", "))
}
