//! Global string interner
//!
//! Converts strings into compact integer symbols so that color-space tags can be
//! compared and hashed in O(1) inside image identity keys.

use std::sync::LazyLock;

use lasso::{Spur, ThreadedRodeo};

static INTERNER: LazyLock<ThreadedRodeo> = LazyLock::new(ThreadedRodeo::new);

/// Compact identifier for an interned string.
pub type Symbol = Spur;

/// Interns a string, returning the existing symbol if it was seen before.
#[inline]
pub fn intern(s: &str) -> Symbol {
    INTERNER.get_or_intern(s)
}

/// Looks up a string without interning it.
#[inline]
pub fn get(s: &str) -> Option<Symbol> {
    INTERNER.get(s)
}

/// Resolves a symbol back to its string.
#[inline]
pub fn resolve(sym: Symbol) -> &'static str {
    INTERNER.resolve(&sym)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_and_resolve() {
        let s1 = intern("ACES2065-1");
        let s2 = intern("ACES2065-1");
        let s3 = intern("Filmic Log");

        assert_eq!(s1, s2);
        assert_ne!(s1, s3);

        assert_eq!(resolve(s1), "ACES2065-1");
        assert_eq!(resolve(s3), "Filmic Log");
    }

    #[test]
    fn test_get() {
        let _ = intern("existing_tag");

        assert!(get("existing_tag").is_some());
        assert!(get("never_interned_tag").is_none());
    }
}
