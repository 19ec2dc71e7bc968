//! Error Types
//!
//! This module defines the error types used by the public API of the cache.
//!
//! # Overview
//!
//! The main error type [`CacheError`] covers the failure modes a caller can observe:
//! - Settings parsing and I/O failures
//! - Image probing and decoding errors reported by an [`ImageReader`](crate::reader::ImageReader)
//! - Worker pool and device construction errors
//!
//! Per-slot load failures never surface here. They are recovered inside the loader by
//! substituting the missing-texture marker (see [`crate::loader`]).
//!
//! # Usage
//!
//! ```rust,ignore
//! use texcache::errors::Result;
//!
//! fn load_settings() -> Result<texcache::CacheSettings> {
//!     texcache::CacheSettings::from_json_file("texcache.json")
//! }
//! ```

use thiserror::Error;

/// The main error type for the texture cache.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Settings could not be parsed.
    #[error("Settings parse error: {0}")]
    SettingsError(#[from] serde_json::Error),

    /// Worker pool could not be created.
    #[error("Worker pool error: {0}")]
    ThreadPoolError(#[from] rayon::ThreadPoolBuildError),

    // ========================================================================
    // Device Errors
    // ========================================================================
    /// No usable device or adapter.
    #[error("Device error: {0}")]
    DeviceError(String),

    // ========================================================================
    // I/O Errors
    // ========================================================================
    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// The path does not exist.
    #[error("File '{0}' does not exist")]
    FileNotFound(String),

    /// The path is a directory.
    #[error("File '{0}' is a directory, can't use as image")]
    IsDirectory(String),

    // ========================================================================
    // Image Errors
    // ========================================================================
    /// Image decoding error.
    #[error("Image decode error: {0}")]
    ImageDecodeError(String),

    /// The file decoded, but its pixel layout is not something the cache can store.
    #[error("Unsupported image layout: {0}")]
    UnsupportedLayout(String),
}

// ============================================================================
// Convenient conversion implementations
// ============================================================================

impl From<image::ImageError> for CacheError {
    fn from(err: image::ImageError) -> Self {
        CacheError::ImageDecodeError(err.to_string())
    }
}

/// Alias for `Result<T, CacheError>`.
pub type Result<T> = std::result::Result<T, CacheError>;
