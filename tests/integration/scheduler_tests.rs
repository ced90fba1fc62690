use std::sync::Arc;
use std::time::Duration;

use super::*;
use pricewatch::plugins::NotificationDispatcher;
use pricewatch::PriceScheduler;

#[tokio::test]
async fn test_scheduler_run_now_counts_drops() -> anyhow::Result<()> {
    let url = "https://shop.example/p/headphones";
    let extractor = ScriptedExtractor::new().script(url, &[None, Some("$199"), Some("$149")]);
    let checker = Arc::new(create_test_checker(extractor, NotificationDispatcher::new()));
    checker.track_url(url).await?;

    let mut scheduler = PriceScheduler::new(Arc::clone(&checker), scheduler_config()).await?;
    scheduler.start().await?;
    assert!(scheduler.is_running());

    // Tracked without a price, so the item is due immediately
    let first = scheduler.run_now().await?;
    assert_eq!(first.checked, 1);
    assert_eq!(first.price_drops, 0);

    // Not due again until the check interval passes
    let second = scheduler.run_now().await?;
    assert_eq!(second.checked, 0);

    let drop = checker.check_url(url).await?;
    assert!(drop.price_drop);

    let stats = scheduler.get_stats().await;
    assert_eq!(stats.completed_runs, 2);
    assert_eq!(stats.items_checked, 1);
    assert!(stats.alarm_active);

    scheduler.shutdown().await?;
    assert!(!scheduler.is_running());
    Ok(())
}

#[tokio::test]
async fn test_alarm_can_be_rescheduled() -> anyhow::Result<()> {
    let checker = Arc::new(create_test_checker(ScriptedExtractor::new(), NotificationDispatcher::new()));
    let mut scheduler = PriceScheduler::new(checker, scheduler_config()).await?;

    scheduler.start().await?;
    let default_alarm = scheduler.alarm_info().await.expect("alarm installed on start");
    assert_eq!(default_alarm.period_seconds, scheduler_config().alarm_period().as_secs());

    let faster = scheduler.set_alarm(Duration::from_secs(5 * 60)).await?;
    assert_ne!(faster.job_id, default_alarm.job_id);
    assert!(faster.next_tick > faster.created_at);

    scheduler.shutdown().await?;
    Ok(())
}
