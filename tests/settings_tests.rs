//! Settings Tests
//!
//! Tests for:
//! - CacheSettings defaults and builder helpers
//! - JSON loading: partial documents, mip cache section, invalid input
//! - TextureCache construction from settings

use std::sync::Arc;

use texcache::settings::DEFAULT_MAX_IMAGES;
use texcache::{CacheError, CacheSettings, CpuDevice, MipCacheSettings, TextureCache};

// ============================================================================
// Defaults
// ============================================================================

#[test]
fn defaults_disable_limits_and_mip_cache() {
    let settings = CacheSettings::default();
    assert_eq!(settings.texture_limit, 0);
    assert_eq!(settings.max_images, DEFAULT_MAX_IMAGES);
    assert_eq!(settings.worker_threads, 0);
    assert!(settings.mip_cache.is_none());
}

#[test]
fn builder_helpers_set_fields() {
    let settings = CacheSettings::default()
        .with_texture_limit(2048)
        .with_max_images(10)
        .with_worker_threads(3)
        .with_mip_cache(MipCacheSettings::default());

    assert_eq!(settings.texture_limit, 2048);
    assert_eq!(settings.max_images, 10);
    assert_eq!(settings.worker_threads, 3);
    assert_eq!(settings.mip_cache, Some(MipCacheSettings::default()));
}

// ============================================================================
// JSON
// ============================================================================

#[test]
fn partial_json_keeps_defaults() {
    let settings = CacheSettings::from_json_str(r#"{ "texture_limit": 512 }"#).unwrap();
    assert_eq!(settings.texture_limit, 512);
    assert_eq!(settings.max_images, DEFAULT_MAX_IMAGES);
}

#[test]
fn mip_cache_section_is_parsed() {
    let json = r#"{
        "mip_cache": { "auto_convert": true, "custom_cache_path": "/var/cache/tx" }
    }"#;
    let settings = CacheSettings::from_json_str(json).unwrap();
    let mip = settings.mip_cache.expect("mip cache configured");
    assert!(mip.auto_convert);
    assert_eq!(
        mip.custom_cache_path.as_deref(),
        Some(std::path::Path::new("/var/cache/tx"))
    );
}

#[test]
fn invalid_json_is_a_settings_error() {
    let err = CacheSettings::from_json_str("{ texture_limit: }").unwrap_err();
    assert!(matches!(err, CacheError::SettingsError(_)));
}

#[test]
fn settings_round_trip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let settings = CacheSettings::default().with_texture_limit(1024);
    std::fs::write(&path, serde_json::to_string(&settings).unwrap()).unwrap();

    assert_eq!(CacheSettings::from_json_file(&path).unwrap(), settings);
    assert!(matches!(
        CacheSettings::from_json_file(dir.path().join("missing.json")),
        Err(CacheError::IoError(_))
    ));
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn cache_uses_configured_settings() {
    let cache = TextureCache::builder()
        .with_settings(CacheSettings::default().with_worker_threads(2))
        .with_device(Arc::new(CpuDevice::new()))
        .build()
        .unwrap();

    assert_eq!(cache.settings().worker_threads, 2);
    assert_eq!(cache.device_info().name, "CPU");
    assert!(!cache.need_update());
}
