//! Identifier validation.
//!
//! Table and column names are interpolated into SQL text (only values are
//! bound as parameters), so every name that reaches a statement must be a
//! plain identifier: ASCII letters, digits, and underscores, not starting
//! with a digit.
//!
//! # Examples
//!
//! ```
//! use tinyorm_core::is_valid_identifier;
//!
//! assert!(is_valid_identifier("compat_items"));
//! assert!(is_valid_identifier("_migrations"));
//! assert!(!is_valid_identifier("1st"));
//! assert!(!is_valid_identifier("drop;--"));
//! ```

/// Returns `true` if `name` can be spliced into SQL as a bare identifier.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_identifiers() {
        assert!(is_valid_identifier("t"));
        assert!(is_valid_identifier("item_id"));
        assert!(is_valid_identifier("A_B_C"));
        assert!(is_valid_identifier("col2"));
    }

    #[test]
    fn test_invalid_identifier_empty() {
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_invalid_identifier_special_chars() {
        assert!(!is_valid_identifier("drop;--"));
        assert!(!is_valid_identifier("hello world"));
        assert!(!is_valid_identifier("test-prefix"));
        assert!(!is_valid_identifier("name = ?"));
        assert!(!is_valid_identifier("9lives"));
        assert!(!is_valid_identifier("naïve"));
    }
}
