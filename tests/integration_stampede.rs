//! Integration tests for stampede protection
//!
//! Tests concurrent access patterns and request coalescing

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use parity_deals::TierName;
use tokio::task::JoinSet;

/// 100 concurrent cold reads reach the repository once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cold_reads_coalesce() {
    let fx = setup_with(|repo| repo.with_read_delay(Duration::from_millis(50)));
    fx.user("alice", TierName::Free).await;
    let system = Arc::new(fx.system.clone());

    let mut tasks = JoinSet::new();
    for _ in 0..100 {
        let system = Arc::clone(&system);
        tasks.spawn(async move {
            system
                .queries()
                .get_user_subscription_tier(&system.request_context(), "alice")
                .await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let tier = result
            .unwrap_or_else(|_| panic!("Task panicked"))
            .unwrap_or_else(|e| panic!("Read failed: {e}"));
        assert_eq!(tier.name, TierName::Free);
    }

    let calls = fx.repo.calls("subscription");
    assert_eq!(calls, 1, "Expected exactly 1 repository call, got {calls}");

    let stats = system.cache_manager().get_stats();
    assert_eq!(stats.in_flight_requests, 0);
    assert!(stats.coalesced_requests > 0);
}

/// Concurrent banner traffic resolves the product once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_banner_requests() {
    let fx = setup_with(|repo| repo.with_read_delay(Duration::from_millis(20)));
    let product = fx.discounted_product(TierName::Premium).await;
    let system = Arc::new(fx.system.clone());

    let mut tasks = JoinSet::new();
    for i in 0..40 {
        let system = Arc::clone(&system);
        let code = if i % 2 == 0 { "US" } else { "DE" };
        tasks.spawn(async move {
            let request = parity_deals::BannerRequest {
                product_id: product.id.to_string(),
                country_code: Some(code.to_string()),
                referer: Some(SHOP_URL.to_string()),
            };
            system.banners().banner(&system.request_context(), &request).await
        });
    }

    while let Some(result) = tasks.join_next().await {
        let banner = result
            .unwrap_or_else(|_| panic!("Task panicked"))
            .unwrap_or_else(|e| panic!("Banner failed: {e}"));
        assert!(banner.is_some());
    }

    assert_eq!(fx.repo.calls("product_by_url"), 1);
    assert_eq!(fx.store.view_total(), 40);
}
