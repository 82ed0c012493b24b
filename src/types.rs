//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `HandlerId`: UUID-based identity of a connection handler

use uuid::Uuid;

/// Identity of the connection handler that owns a registry entry (newtype pattern)
///
/// Only used to locate an entry again at disconnect time; it carries no ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub Uuid);

impl HandlerId {
    /// Create a new random handler ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_id_unique() {
        let id1 = HandlerId::new();
        let id2 = HandlerId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_handler_id_display_is_uuid() {
        let id = HandlerId::new();
        assert_eq!(id.to_string(), id.0.to_string());
        assert_eq!(id.to_string().len(), 36);
    }
}
