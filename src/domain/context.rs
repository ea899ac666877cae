//! Operation Context
//!
//! Metadata about the current operation, carried for audit and tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context for an operation, used for auditing and log correlation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationContext {
    /// User ID from the authenticated session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_user_id: Option<Uuid>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Context with request user ID
    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    /// Context with correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a new correlation ID if not present
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let user_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let context = OperationContext::new()
            .with_request_user(user_id)
            .with_correlation_id(correlation_id);

        assert_eq!(context.request_user_id, Some(user_id));
        assert_eq!(context.correlation_id, Some(correlation_id));
    }

    #[test]
    fn test_ensure_correlation_id() {
        let mut context = OperationContext::new();
        assert!(context.correlation_id.is_none());

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));
        assert_eq!(context.ensure_correlation_id(), id);
    }
}
