//! Property-based tests for release-updater.
//!
//! These tests use proptest to verify correctness properties across
//! randomly generated inputs.
//!
//! # Properties Tested
//!
//! - Property 1: Freshness follows calendar order
//! - Property 2: Asset resolution is exact-match
//! - Property 3: Failed replacements restore the original bytes

#![cfg(test)]

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use tempfile::TempDir;

use crate::download::DownloadedArtifact;
use crate::error::UpdateError;
use crate::release::{is_newer, parse_release};
use crate::replace::{InPlaceReplacer, ReplacementEngine, ReplacementState};

// =============================================================================
// Generators
// =============================================================================

/// Generate a calendar date between 1970 and roughly 2100.
fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0i64..47_000).prop_map(|days| {
        NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + Duration::days(days)
    })
}

/// Generate a `YYYY-MM-DD` string.
fn arb_date_string() -> impl Strategy<Value = String> {
    arb_date().prop_map(|date| date.format("%Y-%m-%d").to_string())
}

/// Generate an asset name.
fn arb_asset_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.-]{0,20}"
}

/// Generate executable content (1 byte to 8KB).
fn arb_content() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..8192)
}

// =============================================================================
// Property 1: Freshness
//
// *For any* pair of valid dates, the lexicographic comparison SHALL agree
// with calendar order, and equal dates SHALL never count as newer.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_freshness_matches_calendar_order(a in arb_date(), b in arb_date()) {
        let current = a.format("%Y-%m-%d").to_string();
        let latest = b.format("%Y-%m-%d").to_string();
        prop_assert_eq!(is_newer(&current, &latest), b > a);
        prop_assert_eq!(is_newer(&current, &latest), latest > current);
    }

    #[test]
    fn prop_equal_dates_are_not_newer(date in arb_date_string()) {
        prop_assert!(!is_newer(&date, &date));
    }

    #[test]
    fn prop_published_date_is_timestamp_prefix(
        date in arb_date_string(),
        hour in 0u32..24,
        minute in 0u32..60,
    ) {
        let timestamp = format!("{}T{:02}:{:02}:00Z", date, hour, minute);
        let body = serde_json::json!({"published_at": timestamp}).to_string();
        let info = parse_release(body.as_bytes()).unwrap();
        prop_assert_eq!(info.published, date);
    }
}

// =============================================================================
// Property 2: Asset Resolution
//
// *For any* release, resolving a configured name SHALL return that asset's
// URL when present and AssetNotFound otherwise.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_resolve_is_exact_match(
        names in prop::collection::hash_set(arb_asset_name(), 1..8),
        wanted in arb_asset_name(),
    ) {
        let assets: Vec<_> = names
            .iter()
            .enumerate()
            .map(|(id, name)| serde_json::json!({
                "name": name,
                "browser_download_url": format!("https://host/{}", name),
                "id": id,
            }))
            .collect();
        let body = serde_json::json!({
            "published_at": "2025-06-08T00:00:00Z",
            "assets": assets,
        })
        .to_string();
        let info = parse_release(body.as_bytes()).unwrap();

        match info.resolve_asset(&wanted) {
            Ok(url) => {
                prop_assert!(names.contains(&wanted));
                prop_assert_eq!(url, format!("https://host/{}", wanted));
            }
            Err(UpdateError::AssetNotFound(name)) => {
                prop_assert!(!names.contains(&wanted));
                prop_assert_eq!(name, wanted);
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

// =============================================================================
// Property 3: Rollback
//
// *For any* executable content, a replacement that fails verification
// SHALL end RolledBack with the original bytes restored exactly.
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    #[test]
    fn prop_size_mismatch_restores_original(
        original in arb_content(),
        update in arb_content(),
        skew in 1u64..1024,
    ) {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("app");
        let download = temp_dir.path().join("download");
        std::fs::write(&target, &original).unwrap();
        std::fs::write(&download, &update).unwrap();

        let artifact = DownloadedArtifact {
            path: download,
            size: update.len() as u64 + skew,
            sha256: String::new(),
        };

        let mut engine = ReplacementEngine::new(&InPlaceReplacer);
        let result = engine.run(&target, &artifact, temp_dir.path());

        let is_size_mismatch = matches!(result, Err(UpdateError::SizeMismatch { .. }));
        prop_assert!(is_size_mismatch);
        prop_assert_eq!(engine.state(), ReplacementState::RolledBack);
        prop_assert_eq!(std::fs::read(&target).unwrap(), original);
    }
}
