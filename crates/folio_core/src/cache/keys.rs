//! Cache key encoding.
//!
//! Keys have the shape `{namespace}{kind}:{operation}:{digest}` where the
//! digest is the SHA-256 of the canonical argument text. The
//! `{namespace}{kind}:` prefix lets one flush clear exactly one kind.

use crate::model::condition::{Condition, Predicate};
use crate::model::entity::EntityId;
use crate::model::field::FieldValue;
use crate::repo::repository::ReadOptions;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Derives cache keys for one kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeyEncoder {
    prefix: String,
}

impl CacheKeyEncoder {
    pub fn new(namespace: &str, kind: &str) -> Self {
        Self {
            prefix: kind_prefix(namespace, kind),
        }
    }

    /// Prefix shared by every key of this kind.
    pub fn kind_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, operation: &str, args: &KeyArgs) -> String {
        let digest = Sha256::digest(args.canonical().as_bytes());
        format!("{}{operation}:{}", self.prefix, hex::encode(digest))
    }
}

pub fn kind_prefix(namespace: &str, kind: &str) -> String {
    format!("{namespace}{kind}:")
}

/// Canonical, order-insensitive rendering of operation arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyArgs {
    parts: Vec<String>,
}

impl KeyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(self, id: EntityId) -> Self {
        self.part("id", id.to_string())
    }

    pub fn text(self, name: &str, value: Option<&str>) -> Self {
        let rendered = value.map_or_else(|| "-".to_string(), canonical_text);
        self.part(name, rendered)
    }

    pub fn condition(self, condition: &Condition) -> Self {
        let mut clauses: Vec<String> = condition
            .clauses()
            .iter()
            .map(|clause| {
                format!(
                    "{}{}",
                    canonical_text(&clause.field),
                    canonical_predicate(&clause.predicate)
                )
            })
            .collect();
        clauses.sort();
        self.part("cond", format!("[{}]", clauses.join(",")))
    }

    pub fn options(self, options: &ReadOptions) -> Self {
        let include: BTreeSet<&str> = options.include.iter().map(String::as_str).collect();
        let fields = if options.selects_all_fields() {
            "*".to_string()
        } else {
            let fields: BTreeSet<&str> = options.fields.iter().map(String::as_str).collect();
            join_texts(fields)
        };
        let order: Vec<String> = options
            .order_by
            .iter()
            .map(|term| {
                let direction = if term.descending { "d" } else { "a" };
                format!("{}{direction}", canonical_text(&term.field))
            })
            .collect();
        let limit = options
            .limit
            .map_or_else(|| "-".to_string(), |limit| limit.to_string());

        self.part("include", join_texts(include))
            .part("fields", fields)
            .part("trashed", u8::from(options.with_trashed).to_string())
            .part("order", format!("[{}]", order.join(",")))
            .part("limit", limit)
    }

    /// Text hashed into the key.
    pub fn canonical(&self) -> String {
        self.parts.join("|")
    }

    fn part(mut self, name: &str, value: String) -> Self {
        self.parts.push(format!("{name}={value}"));
        self
    }
}

fn canonical_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::Eq(value) => format!("eq({})", canonical_value(value)),
        Predicate::NotEq(value) => format!("ne({})", canonical_value(value)),
        Predicate::In(values) => {
            let set: BTreeSet<String> = values.iter().map(canonical_value).collect();
            format!("in({})", set.into_iter().collect::<Vec<_>>().join(","))
        }
    }
}

/// Tagged value text; strings are length-prefixed so separators inside them
/// cannot alias other argument shapes.
fn canonical_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Null => "n".to_string(),
        FieldValue::Bool(value) => format!("b{}", u8::from(*value)),
        FieldValue::Integer(value) => format!("i{value}"),
        FieldValue::Real(value) => format!("r{:016x}", value.to_bits()),
        FieldValue::Text(value) => canonical_text(value),
    }
}

fn canonical_text(value: &str) -> String {
    format!("s{}:{value}", value.len())
}

fn join_texts<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
    let rendered: Vec<String> = values.into_iter().map(canonical_text).collect();
    format!("[{}]", rendered.join(","))
}
