//! Utility Module
//!
//! - [`interner`]: String interning for color-space tags
//!
//! ```rust,ignore
//! use texcache::utils::interner;
//!
//! let sym1 = interner::intern("Linear Rec.709");
//! let sym2 = interner::intern("Linear Rec.709");
//! assert_eq!(sym1, sym2); // O(1) comparison
//! ```

pub mod interner;

pub use interner::Symbol;
