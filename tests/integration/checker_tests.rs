use chrono::Utc;

use super::*;
use pricewatch::plugins::NotificationDispatcher;

#[tokio::test]
async fn test_check_due_mixed_results() -> anyhow::Result<()> {
    let extractor = ScriptedExtractor::new()
        .script("https://shop.example/p/a", &[Some("$10"), Some("$8")])
        .script("https://shop.example/p/b", &[Some("$20"), Some("$25")])
        .script("https://shop.example/p/c", &[Some("$30")]);
    let checker = create_test_checker(extractor, NotificationDispatcher::new());

    for url in ["https://shop.example/p/a", "https://shop.example/p/b", "https://shop.example/p/c"] {
        checker.track_url(url).await?;
    }

    let later = Utc::now() + scheduler_config().check_interval();
    let summary = checker.check_due(later).await?;

    assert_eq!(summary.checked, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.price_changes, 2);
    assert_eq!(summary.price_drops, 1);

    let failed = summary.outcomes.iter().find(|o| !o.success).expect("one failure");
    assert_eq!(failed.url, "https://shop.example/p/c");

    // The failed item was still marked as checked
    let c = checker.ledger().get("https://shop.example/p/c").await?.expect("tracked");
    assert!(c.last_checked.expect("checked") > c.added_at);

    Ok(())
}

#[tokio::test]
async fn test_untracked_item_is_not_checked() -> anyhow::Result<()> {
    let url = "https://shop.example/p/lamp";
    let extractor = ScriptedExtractor::new().script(url, &[Some("$40"), Some("$20")]);
    let checker = create_test_checker(extractor, NotificationDispatcher::new());

    checker.track_url(url).await?;
    checker.ledger().untrack(url).await?;

    let summary = checker.check_all().await?;
    assert_eq!(summary.checked, 0);
    assert!(checker.check_url(url).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_tracking_without_price_then_first_price() -> anyhow::Result<()> {
    let url = "https://shop.example/p/preorder";
    let extractor = ScriptedExtractor::new().script(url, &[None, Some("$59.99")]);
    let checker = create_test_checker(extractor, NotificationDispatcher::new());

    let item = checker.track_url(url).await?;
    assert!(item.price_history.is_empty());
    assert!(item.last_checked.is_none());

    let outcome = checker.check_url(url).await?;
    assert!(outcome.success);
    assert!(outcome.price_changed);
    assert!(!outcome.price_drop);
    assert!(outcome.previous_price.is_none());

    Ok(())
}
