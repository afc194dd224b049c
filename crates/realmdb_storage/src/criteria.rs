//! Criteria builder and query parameters.
//!
//! A [`Criteria`] is a composable description of a filter: a conjunction
//! of (field, operator, value) terms. Backends resolve it however they
//! like; the bundled backends resolve it by matching against the field
//! values an entity exposes through [`Searchable`].
//!
//! Terms are validated when the criteria is built, so an operator that a
//! field cannot support fails with `UnsupportedField` at build time, never
//! at query time.

use std::fmt;
use std::marker::PhantomData;

use uuid::Uuid;

use crate::backend::StoreEntity;
use crate::error::{StorageError, StorageResult};

/// The shape of a searchable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A single text value.
    Text,
    /// A boolean flag.
    Boolean,
    /// A set of text values; `Eq` means set membership.
    TextSet,
}

/// A value compared against a field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Text value.
    Text(String),
    /// Boolean value.
    Boolean(bool),
}

impl FieldValue {
    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Boolean(_) => None,
        }
    }

    /// Returns the boolean payload, if any.
    #[must_use]
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Text(_) => None,
        }
    }

    /// A string usable as an ordering key.
    #[must_use]
    pub fn sort_key(&self) -> String {
        match self {
            Self::Text(s) => s.to_lowercase(),
            Self::Boolean(b) => b.to_string(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

/// An entity type whose fields can appear in criteria.
///
/// The associated `Field` enum is the closed set of searchable fields for
/// the entity type; anything outside it is unrepresentable, and operator
/// compatibility is checked against [`Searchable::field_kind`] when a
/// criteria term is built.
pub trait Searchable {
    /// The searchable fields of this entity type.
    type Field: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    /// Returns the kind of a field.
    fn field_kind(field: Self::Field) -> FieldKind;

    /// Returns the values an entity holds for a field.
    ///
    /// Single-valued fields return zero or one value; set-valued fields
    /// return one value per element.
    fn field_values(&self, field: Self::Field) -> Vec<FieldValue>;
}

/// Comparison operator for a criteria term.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Exact equality. On set-valued fields: set membership.
    Eq,
    /// Case-insensitive match. The pattern may carry a leading and/or
    /// trailing `%` for suffix/prefix/substring matching; without
    /// wildcards it is a case-insensitive exact match.
    Ilike,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "EQ"),
            Self::Ilike => write!(f, "ILIKE"),
        }
    }
}

/// One (field, operator, value) term of a criteria conjunction.
#[derive(Debug, Clone)]
pub struct Criterion<F> {
    /// The field compared.
    pub field: F,
    /// The operator applied.
    pub operator: Operator,
    /// The value compared against.
    pub value: FieldValue,
}

impl<F: Copy + fmt::Debug> Criterion<F> {
    fn matches_values(&self, values: &[FieldValue]) -> bool {
        match self.operator {
            Operator::Eq => values.contains(&self.value),
            Operator::Ilike => {
                let Some(pattern) = self.value.as_text() else {
                    return false;
                };
                values
                    .iter()
                    .filter_map(FieldValue::as_text)
                    .any(|v| ilike_matches(pattern, v))
            }
        }
    }
}

/// Case-insensitive pattern match with optional `%` affixes.
fn ilike_matches(pattern: &str, value: &str) -> bool {
    let value = value.to_lowercase();
    let pattern = pattern.to_lowercase();
    let leading = pattern.strip_prefix('%');
    let core = leading.unwrap_or(&pattern);
    let trailing = core.strip_suffix('%');
    let core = trailing.unwrap_or(core);

    match (leading.is_some(), trailing.is_some()) {
        (true, true) => value.contains(core),
        (true, false) => value.ends_with(core),
        (false, true) => value.starts_with(core),
        (false, false) => value == core,
    }
}

/// A conjunction of criteria terms over one entity type.
///
/// An empty criteria matches every entity. There is deliberately no OR
/// and no cross-entity join.
pub struct Criteria<E: Searchable> {
    terms: Vec<Criterion<E::Field>>,
    _marker: PhantomData<fn(&E)>,
}

impl<E: Searchable> Criteria<E> {
    /// Creates an empty criteria (matches everything).
    #[must_use]
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Adds a term to the conjunction.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::UnsupportedField` when the operator or the
    /// value type is incompatible with the field's kind.
    pub fn compare(
        mut self,
        field: E::Field,
        operator: Operator,
        value: impl Into<FieldValue>,
    ) -> StorageResult<Self> {
        let value = value.into();
        let supported = match (E::field_kind(field), operator, &value) {
            (FieldKind::Text | FieldKind::TextSet, Operator::Eq, FieldValue::Text(_))
            | (FieldKind::Text | FieldKind::TextSet, Operator::Ilike, FieldValue::Text(_))
            | (FieldKind::Boolean, Operator::Eq, FieldValue::Boolean(_)) => true,
            _ => false,
        };
        if !supported {
            return Err(StorageError::unsupported_field(
                format!("{field:?}"),
                operator.to_string(),
            ));
        }
        self.terms.push(Criterion {
            field,
            operator,
            value,
        });
        Ok(self)
    }

    /// Tests an entity against every term.
    #[must_use]
    pub fn matches(&self, entity: &E) -> bool {
        self.terms
            .iter()
            .all(|term| term.matches_values(&entity.field_values(term.field)))
    }

    /// Returns the terms of the conjunction.
    pub fn terms(&self) -> &[Criterion<E::Field>] {
        &self.terms
    }

    /// Returns true when the criteria matches everything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl<E: Searchable> Default for Criteria<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Searchable> Clone for Criteria<E> {
    fn clone(&self) -> Self {
        Self {
            terms: self.terms.clone(),
            _marker: PhantomData,
        }
    }
}

impl<E: Searchable> fmt::Debug for Criteria<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Criteria").field("terms", &self.terms).finish()
    }
}

/// Requested result order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    /// Ascending by the order field.
    Ascending,
    /// Descending by the order field.
    Descending,
}

/// Criteria plus pagination and ordering for a bulk read.
pub struct QueryParams<E: Searchable> {
    criteria: Criteria<E>,
    first: Option<usize>,
    max: Option<usize>,
    order_by: Option<(E::Field, Order)>,
}

impl<E: Searchable> QueryParams<E> {
    /// Wraps a criteria with no pagination and no explicit order.
    #[must_use]
    pub fn with_criteria(criteria: Criteria<E>) -> Self {
        Self {
            criteria,
            first: None,
            max: None,
            order_by: None,
        }
    }

    /// Sets the pagination window: skip `first`, yield at most `max`.
    #[must_use]
    pub fn pagination(mut self, first: Option<usize>, max: Option<usize>) -> Self {
        self.first = first;
        self.max = max;
        self
    }

    /// Requests a deterministic order by a field.
    #[must_use]
    pub fn order_by(mut self, field: E::Field, order: Order) -> Self {
        self.order_by = Some((field, order));
        self
    }

    /// The criteria component.
    pub fn criteria(&self) -> &Criteria<E> {
        &self.criteria
    }

    /// The pagination offset.
    #[must_use]
    pub fn first(&self) -> Option<usize> {
        self.first
    }

    /// The pagination limit.
    #[must_use]
    pub fn max(&self) -> Option<usize> {
        self.max
    }

    /// The requested order, if any.
    pub fn order(&self) -> Option<(E::Field, Order)> {
        self.order_by
    }
}

impl<E: StoreEntity + Searchable> QueryParams<E> {
    /// Orders and paginates a set of already-filtered entities.
    ///
    /// When no order is requested, entities are sorted by key so one
    /// resolution is always internally deterministic. Ties under an
    /// explicit order also break by key.
    #[must_use]
    pub fn resolve(&self, mut items: Vec<E>) -> Vec<E> {
        match self.order_by {
            Some((field, order)) => {
                items.sort_by(|a, b| {
                    let ka = a.field_values(field).first().map(FieldValue::sort_key);
                    let kb = b.field_values(field).first().map(FieldValue::sort_key);
                    // Missing values sort last regardless of direction.
                    let cmp = match (ka, kb) {
                        (Some(a), Some(b)) => match order {
                            Order::Ascending => a.cmp(&b),
                            Order::Descending => b.cmp(&a),
                        },
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    };
                    cmp.then_with(|| a.key().cmp(b.key()))
                });
            }
            None => items.sort_by(|a, b| a.key().cmp(b.key())),
        }

        items
            .into_iter()
            .skip(self.first.unwrap_or(0))
            .take(self.max.unwrap_or(usize::MAX))
            .collect()
    }
}

impl<E: Searchable> Clone for QueryParams<E> {
    fn clone(&self) -> Self {
        Self {
            criteria: self.criteria.clone(),
            first: self.first,
            max: self.max,
            order_by: self.order_by,
        }
    }
}

impl<E: Searchable> fmt::Debug for QueryParams<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryParams")
            .field("criteria", &self.criteria)
            .field("first", &self.first)
            .field("max", &self.max)
            .field("order_by", &self.order_by)
            .finish()
    }
}
