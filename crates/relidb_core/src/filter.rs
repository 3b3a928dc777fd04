//! Relationship filters for iteration.

use crate::error::{Error, Result};

/// A relationship membership predicate.
///
/// A non-inverse filter matches entries carrying the relationship ID; an
/// inverse filter matches entries not carrying it. Iteration picks the
/// first non-inverse filter as its primary scan set and applies the rest
/// as membership probes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    relationship: String,
    id: String,
    inverse: bool,
}

impl Filter {
    /// Creates a filter matching entries related to `id` under
    /// `relationship`.
    pub fn new(relationship: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            id: id.into(),
            inverse: false,
        }
    }

    /// Creates a filter matching entries *not* related to `id` under
    /// `relationship`.
    pub fn inverse(relationship: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            relationship: relationship.into(),
            id: id.into(),
            inverse: true,
        }
    }

    /// Returns the relationship name.
    #[must_use]
    pub fn relationship(&self) -> &str {
        &self.relationship
    }

    /// Returns the relationship ID.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Reports whether this is an inverse comparison.
    #[must_use]
    pub fn is_inverse(&self) -> bool {
        self.inverse
    }
}

/// Picks the primary filter: the first non-inverse one.
///
/// # Errors
///
/// [`Error::EmptyFilters`] for an empty set or a filter with an empty
/// relationship name; [`Error::InversePrimaryFilter`] when every filter is
/// inverse.
pub(crate) fn select_primary(filters: &[Filter]) -> Result<usize> {
    if filters.is_empty() || filters.iter().any(|f| f.relationship.is_empty()) {
        return Err(Error::EmptyFilters);
    }
    filters
        .iter()
        .position(|f| !f.inverse)
        .ok_or(Error::InversePrimaryFilter)
}
