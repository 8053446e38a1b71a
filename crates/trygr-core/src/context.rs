//! Context type for correlating an evaluation pass with its dispatches

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies the origin of a unit of work
///
/// Every evaluation pass gets a fresh context; each hit dispatched by that
/// pass runs under a child context so log lines can be tied back together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Unique identifier for this context (ULID)
    pub id: String,

    /// Parent context ID for tracking causality chains
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    /// Create a new context with a fresh ULID
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Create a new context with a specific ID
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
        }
    }

    /// Create a child context with this context as parent
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_links_parent() {
        let parent = Context::with_id("pass");
        let child = parent.child();

        assert_eq!(child.parent_id.as_deref(), Some("pass"));
        assert_ne!(child.id, parent.id);
        assert_eq!(child.id.len(), 26);
    }
}
