//! Immutable value objects describing one comparison, one ordering key, how filters
//! combine, and how many results a query may return.
//!
//! # Example
//!
//! ```ignore
//! use docmodel::filter::{Filter, Sort, Condition};
//!
//! let adults = Filter::gte("age", 18);
//! let by_name = Sort::ascending("name");
//! ```

use bson::Bson;
use std::{fmt, num::NonZeroUsize};

/// Comparison operators a [`Filter`] can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    /// Equal to.
    Equals,
    /// Not equal to.
    NotEquals,
    /// Greater than.
    GreaterThan,
    /// Greater than or equal to.
    GreaterOrEqual,
    /// Less than.
    LessThan,
    /// Less than or equal to.
    LessOrEqual,
}

impl Operator {
    /// The operator key used in native query documents.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equals => "$eq",
            Operator::NotEquals => "$ne",
            Operator::GreaterThan => "$gt",
            Operator::GreaterOrEqual => "$gte",
            Operator::LessThan => "$lt",
            Operator::LessOrEqual => "$lte",
        }
    }

    /// Looks up an operator from its native query symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "$eq" => Some(Operator::Equals),
            "$ne" => Some(Operator::NotEquals),
            "$gt" => Some(Operator::GreaterThan),
            "$gte" => Some(Operator::GreaterOrEqual),
            "$lt" => Some(Operator::LessThan),
            "$lte" => Some(Operator::LessOrEqual),
            _ => None,
        }
    }

    /// Infix notation, used when describing queries in logs.
    pub fn infix(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::NotEquals => "!=",
            Operator::GreaterThan => ">",
            Operator::GreaterOrEqual => ">=",
            Operator::LessThan => "<",
            Operator::LessOrEqual => "<=",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One `(key, operator, value)` comparison used to narrow a query.
///
/// The value is any BSON value: a scalar, a list of scalars, or an
/// [`EntityId`](crate::document::EntityId) reference.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    key: String,
    operator: Operator,
    value: Bson,
}

impl Filter {
    pub fn new(key: impl Into<String>, operator: Operator, value: impl Into<Bson>) -> Self {
        Self { key: key.into(), operator, value: value.into() }
    }

    /// Matches documents where the field equals the value.
    pub fn eq(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::Equals, value)
    }

    /// Matches documents where the field does not equal the value.
    pub fn ne(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::NotEquals, value)
    }

    /// Matches documents where the field is greater than the value.
    pub fn gt(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::GreaterThan, value)
    }

    /// Matches documents where the field is greater than or equal to the value.
    pub fn gte(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::GreaterOrEqual, value)
    }

    /// Matches documents where the field is less than the value.
    pub fn lt(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::LessThan, value)
    }

    /// Matches documents where the field is less than or equal to the value.
    pub fn lte(key: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::new(key, Operator::LessOrEqual, value)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn value(&self) -> &Bson {
        &self.value
    }
}

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Least to greatest.
    Ascending,
    /// Greatest to least.
    Descending,
}

impl SortDirection {
    /// The ordering value used in native sort documents.
    pub fn order(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// A single-key ordering for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub key: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(key: impl Into<String>, direction: SortDirection) -> Self {
        Self { key: key.into(), direction }
    }

    pub fn ascending(key: impl Into<String>) -> Self {
        Self::new(key, SortDirection::Ascending)
    }

    pub fn descending(key: impl Into<String>) -> Self {
        Self::new(key, SortDirection::Descending)
    }
}

/// How the filters of a query combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    /// Every filter must match.
    #[default]
    And,
    /// At least one filter must match.
    Or,
}

/// Maximum number of results a query returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Limit {
    #[default]
    Unlimited,
    Max(NonZeroUsize),
}

impl Limit {
    /// A limit of `n` results; zero means unlimited.
    pub fn new(n: usize) -> Self {
        NonZeroUsize::new(n).map_or(Limit::Unlimited, Limit::Max)
    }

    /// The cap as a plain count, if any.
    pub fn count(&self) -> Option<usize> {
        match self {
            Limit::Unlimited => None,
            Limit::Max(n) => Some(n.get()),
        }
    }
}

impl From<usize> for Limit {
    fn from(n: usize) -> Self {
        Limit::new(n)
    }
}
