//! Property tests for refresh decisions through the decorator.

use std::time::Duration;

use proptest::prelude::*;
use swr_core::CacheMetadata;
use swr_storage::{ReadOutcome, RefreshReason};
use swr_test_utils::fixtures::*;
use swr_test_utils::generators::*;
use swr_test_utils::ScriptedCache;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Beta zero never refreshes a value that is not stale.
    #[test]
    fn prop_beta_zero_never_expires_early(
        max_stale in arb_max_stale(),
        ahead in 1i64..86_400,
        ctime in arb_ctime(),
        key in arb_key(),
    ) {
        let expiry = at_offset(ahead) + chrono::Duration::from_std(max_stale).unwrap();
        let inner = ScriptedCache::new(reference_now())
            .hit(&1u32, CacheMetadata::new(Some(expiry), Some(ctime)));
        let fx = decorate(inner, max_stale, 0.01);

        let read = fx.cache.get(&key, returning(2u32, None), 0.0).unwrap();
        prop_assert_eq!(read.outcome(), ReadOutcome::Hit);
        prop_assert_eq!(fx.inner.calls().len(), 1);
    }

    /// Infinite beta always refreshes a value with a measured compute time.
    #[test]
    fn prop_infinite_beta_always_expires_early(
        max_stale in arb_max_stale(),
        ahead in 0i64..86_400,
        ctime in 1u64..60_000,
        draw in 1e-9f64..0.999_999,
    ) {
        let expiry = at_offset(ahead) + chrono::Duration::from_std(max_stale).unwrap();
        let inner = ScriptedCache::new(reference_now())
            .hit(&1u32, CacheMetadata::new(Some(expiry), Some(ctime)));
        let fx = decorate(inner, max_stale, draw);

        let read = fx.cache.get("k", returning(2u32, None), f64::INFINITY).unwrap();
        prop_assert_eq!(read.outcome(), ReadOutcome::Refreshed(RefreshReason::EarlyExpiration));
        prop_assert_eq!(fx.inner.betas(), vec![0.0, f64::INFINITY]);
    }

    /// Past the logical expiry every read refreshes, whatever beta is.
    #[test]
    fn prop_stale_values_always_refresh(
        max_stale in arb_max_stale(),
        behind in 1i64..86_400,
        beta in arb_beta(),
    ) {
        let expiry = at_offset(-behind) + chrono::Duration::from_std(max_stale).unwrap();
        let inner = ScriptedCache::new(reference_now())
            .hit(&1u32, CacheMetadata::new(Some(expiry), Some(0)));
        let fx = decorate(inner, max_stale, 0.5);

        let read = fx
            .cache
            .get("k", returning(2u32, Some(Duration::from_secs(60))), beta)
            .unwrap();
        prop_assert_eq!(read.outcome(), ReadOutcome::Refreshed(RefreshReason::Stale));
        prop_assert_eq!(*read.value(), 2);
    }

    /// Computed lifetimes always gain exactly the stale window.
    #[test]
    fn prop_lifetime_extended_by_window(
        max_stale in arb_max_stale(),
        lifetime in 0u64..604_800,
    ) {
        let fx = decorate(ScriptedCache::new(reference_now()), max_stale, 0.5);
        let read = fx
            .cache
            .get("k", returning(1u32, Some(Duration::from_secs(lifetime))), 0.0)
            .unwrap();

        let expected = at_offset(lifetime as i64) + chrono::Duration::from_std(max_stale).unwrap();
        prop_assert_eq!(read.metadata().expiry, Some(expected));
    }
}
