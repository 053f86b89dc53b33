use uuid::Uuid;

/// Generates an opaque identifier, unique within a storage scope.
///
/// Collision probability is the standard UUIDv4 guarantee; identifiers
/// are never reused by this crate.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct() {
        let a = generate_id();
        let b = generate_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
