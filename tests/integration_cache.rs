//! Integration tests for cached reads and tag invalidation
//!
//! Reads go through the system's queries; invalidation goes through the
//! dispatcher the mutations use.

mod common;

use common::*;
use parity_deals::tags::{CacheTopic, global_tag, user_tag};
use parity_deals::{Revalidation, TierName};

#[tokio::test]
async fn test_identical_reads_hit_repository_once() {
    let fx = setup();
    fx.user("alice", TierName::Free).await;
    let queries = fx.system.queries();

    let first = queries
        .get_user_subscription(&fx.system.request_context(), "alice")
        .await
        .unwrap_or_else(|e| panic!("read failed: {e}"));
    let second = queries
        .get_user_subscription(&fx.system.request_context(), "alice")
        .await
        .unwrap_or_else(|e| panic!("read failed: {e}"));

    assert_eq!(first, second);
    assert_eq!(fx.repo.calls("subscription"), 1);
}

#[tokio::test]
async fn test_revalidation_forces_fresh_read() {
    let fx = setup();
    fx.user("alice", TierName::Free).await;
    let queries = fx.system.queries();

    let tier = queries
        .get_user_subscription_tier(&fx.system.request_context(), "alice")
        .await
        .unwrap_or_else(|e| panic!("read failed: {e}"));
    assert_eq!(tier.name, TierName::Free);

    fx.system
        .actions()
        .update_subscription_tier("alice", TierName::Premium)
        .await
        .unwrap_or_else(|e| panic!("update failed: {e}"));

    let tier = queries
        .get_user_subscription_tier(&fx.system.request_context(), "alice")
        .await
        .unwrap_or_else(|e| panic!("read failed: {e}"));
    assert_eq!(tier.name, TierName::Premium);
    assert_eq!(fx.repo.calls("subscription"), 2);
}

#[tokio::test]
async fn test_user_scope_does_not_cross_users() {
    let fx = setup();
    fx.user("alice", TierName::Free).await;
    fx.user("bob", TierName::Free).await;
    let queries = fx.system.queries();

    for user in ["alice", "bob"] {
        queries
            .get_product_count(&fx.system.request_context(), user)
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"));
    }
    assert_eq!(fx.repo.calls("product_count"), 2);

    // Only alice's entry is dropped; the global tag carries no entries here
    fx.system
        .cache_manager()
        .invalidate_tag(&user_tag("alice", CacheTopic::Products))
        .await
        .unwrap_or_else(|e| panic!("invalidate failed: {e}"));

    for user in ["alice", "bob"] {
        queries
            .get_product_count(&fx.system.request_context(), user)
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"));
    }
    assert_eq!(fx.repo.calls("product_count"), 3);
}

#[tokio::test]
async fn test_global_topic_invalidation_spares_other_topics() {
    let fx = setup();
    let product = fx.discounted_product(TierName::Free).await;
    let queries = fx.system.queries();
    let read = async || {
        queries
            .get_discounts_for_country(&fx.system.request_context(), product.id, "CA")
            .await
            .unwrap_or_else(|e| panic!("read failed: {e}"))
    };

    read().await;
    let reads = fx.repo.calls("discounts_for_country");

    // The discounts read is not tagged with subscription
    fx.system
        .invalidator
        .revalidate(Revalidation::topic(CacheTopic::Subscription))
        .await;
    read().await;
    assert_eq!(fx.repo.calls("discounts_for_country"), reads);

    // ...but it is tagged with the countries topic
    fx.system
        .cache_manager()
        .invalidate_tag(&global_tag(CacheTopic::Countries))
        .await
        .unwrap_or_else(|e| panic!("invalidate failed: {e}"));
    read().await;
    assert_eq!(fx.repo.calls("discounts_for_country"), reads + 1);
}

#[tokio::test]
async fn test_flush_all_drops_every_topic() {
    let fx = setup();
    let product = fx.discounted_product(TierName::Free).await;
    let queries = fx.system.queries();

    let warm = async || {
        let ctx = fx.system.request_context();
        queries.get_product_count(&ctx, OWNER).await.unwrap_or_else(|e| panic!("{e}"));
        queries.get_user_subscription(&ctx, OWNER).await.unwrap_or_else(|e| panic!("{e}"));
        queries
            .get_discounts_for_country(&ctx, product.id, "DE")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
    };

    warm().await;
    let before = fx.repo.total_reads();
    warm().await;
    assert_eq!(fx.repo.total_reads(), before);

    fx.system.invalidator.flush_all().await;
    warm().await;
    assert_eq!(fx.repo.total_reads(), before + 3);
}

#[tokio::test]
async fn test_request_memo_serves_repeat_reads_within_request() {
    let fx = setup();
    fx.user("alice", TierName::Free).await;
    let ctx = fx.system.request_context();
    let queries = fx.system.queries();

    queries.get_product_count(&ctx, "alice").await.unwrap_or_else(|e| panic!("{e}"));
    fx.system.invalidator.flush_all().await;
    queries.get_product_count(&ctx, "alice").await.unwrap_or_else(|e| panic!("{e}"));

    // The flushed cache is not consulted again within the same request
    assert_eq!(fx.repo.calls("product_count"), 1);
    assert_eq!(ctx.len(), 1);
}

#[tokio::test]
async fn test_health_check_and_stats() {
    let fx = setup();
    assert!(fx.system.health_check().await);

    fx.user("alice", TierName::Free).await;
    let queries = fx.system.queries();
    for _ in 0..3 {
        queries
            .get_user_subscription(&fx.system.request_context(), "alice")
            .await
            .unwrap_or_else(|e| panic!("{e}"));
    }

    let stats = fx.system.cache_manager().get_stats();
    assert_eq!(stats.hits, 2);
    assert!(stats.hit_rate > 0.0);
    assert!(fx.system.invalidator.stats().revalidations >= 1);
}
