//! Request and correlation identifiers.
//!
//! Every request entering the pipeline gets a [`RequestId`] for log correlation.
//! Schema-validation failures additionally get a [`CorrelationId`] that is echoed
//! back to the caller so a support ticket can be matched to server-side logs.
//! Both are ULIDs: sortable, collision-free, and cheap to generate.

use std::fmt;
use ulid::Ulid;

/// Unique identifier attached to every request for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Ulid);

impl RequestId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier echoed to clients on validation failures and logged server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Ulid);

impl CorrelationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_unique() {
        let a = RequestId::new();
        let b = RequestId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn display_is_26_chars() {
        assert_eq!(CorrelationId::new().to_string().len(), 26);
    }
}
