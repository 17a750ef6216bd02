//! Typed filter conditions.
//!
//! A [`Condition`] is an AND of clauses. The empty condition matches every
//! entity of a kind.

use super::entity::EntityId;
use super::field::{validate_field_name, Attributes, FieldValue, ValidationError};

/// Comparison applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Null-safe equality; `Eq(Null)` matches absent attributes.
    Eq(FieldValue),
    /// Null-safe inequality; absent attributes differ from any non-null value.
    NotEq(FieldValue),
    /// Membership; an empty set matches nothing.
    In(Vec<FieldValue>),
}

impl Predicate {
    pub fn operator(&self) -> &'static str {
        match self {
            Self::Eq(_) => "eq",
            Self::NotEq(_) => "ne",
            Self::In(_) => "in",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub field: String,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    /// Condition matching every entity.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: EntityId) -> Self {
        Self::all().eq("id", id)
    }

    /// Equality on every given attribute.
    pub fn from_attributes(attributes: &Attributes) -> Self {
        let clauses = attributes
            .iter()
            .map(|(field, value)| Clause {
                field: field.clone(),
                predicate: Predicate::Eq(value.clone()),
            })
            .collect();
        Self { clauses }
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, Predicate::Eq(value.into()))
    }

    pub fn not_eq(self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.with(field, Predicate::NotEq(value.into()))
    }

    pub fn is_in<I, V>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<FieldValue>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.with(field, Predicate::In(values))
    }

    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.clauses.push(Clause {
            field: field.into(),
            predicate,
        });
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.clauses
            .iter()
            .try_for_each(|clause| validate_field_name(&clause.field))
    }
}
