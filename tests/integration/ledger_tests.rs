use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;

use super::*;
use pricewatch::config::LedgerConfig;
use pricewatch::models::{NewTrackedItem, PriceDropNotification};
use pricewatch::storage::{JsonFileStore, SqliteStore};
use pricewatch::PriceLedger;

fn kettle() -> NewTrackedItem {
    NewTrackedItem {
        url: "https://shop.example/p/kettle".to_string(),
        name: "Kettle".to_string(),
        image_url: None,
        price: Some("$30.00".to_string()),
    }
}

#[tokio::test]
async fn test_json_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.json");

    {
        let ledger = ledger_on(Arc::new(JsonFileStore::new(&path)));
        ledger.track(kettle()).await?;
        ledger
            .record_observation("https://shop.example/p/kettle", "$27.50", Utc::now())
            .await?;
    }

    let reopened = ledger_on(Arc::new(JsonFileStore::new(&path)));
    let item = reopened.get("https://shop.example/p/kettle").await?.expect("persisted");
    assert_eq!(item.price_history.len(), 2);
    assert_eq!(item.current_price().map(|o| o.price.as_str()), Some("$27.50"));

    // Stored under the fixed key with camelCase fields
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert!(raw["tracked_items"][0]["priceHistory"].is_array());

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_writes_are_not_lost() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.json");
    let ledger = ledger_on(Arc::new(JsonFileStore::new(&path)));

    let mut handles = Vec::new();
    for i in 0..16 {
        let ledger = Arc::clone(&ledger);
        handles.push(tokio::spawn(async move {
            let url = format!("https://shop.example/p/{}", i);
            ledger
                .track(NewTrackedItem {
                    url: url.clone(),
                    name: format!("Item {}", i),
                    image_url: None,
                    price: Some("$100".to_string()),
                })
                .await?;
            for step in 1..=5 {
                ledger
                    .record_observation(&url, &format!("${}", 100 - step), Utc::now())
                    .await?;
            }
            Ok::<_, pricewatch::AppError>(())
        }));
    }
    for handle in handles {
        handle.await??;
    }

    let reopened = ledger_on(Arc::new(JsonFileStore::new(&path)));
    let items = reopened.list().await?;
    assert_eq!(items.len(), 16);
    for item in &items {
        assert_eq!(item.price_history.len(), 6, "history of {}", item.url);
        assert_eq!(item.current_price().map(|o| o.price.as_str()), Some("$95"));
    }

    Ok(())
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("ledger.db");
    let location = path.to_string_lossy().to_string();

    {
        let store = Arc::new(SqliteStore::connect(&location).await?);
        let ledger = ledger_on(store.clone());
        ledger.track(kettle()).await?;
        store.close().await;
    }

    let ledger = ledger_on(Arc::new(SqliteStore::connect(&location).await?));
    assert_eq!(ledger.list().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_history_and_notification_caps() -> anyhow::Result<()> {
    let ledger = PriceLedger::new(
        Arc::new(pricewatch::storage::MemoryStore::new()),
        LedgerConfig {
            max_history_entries: 3,
            max_notifications: 2,
        },
    );
    ledger.track(kettle()).await?;

    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for (i, price) in ["$29", "$28", "$28.00", "$27"].iter().enumerate() {
        ledger
            .record_observation("https://shop.example/p/kettle", price, start + Duration::days(i as i64))
            .await?;
    }

    // "$28.00" equals "$28" and is skipped; the oldest entries were evicted
    let item = ledger.get("https://shop.example/p/kettle").await?.expect("tracked");
    let prices: Vec<&str> = item.price_history.iter().map(|o| o.price.as_str()).collect();
    assert_eq!(prices, vec!["$29", "$28", "$27"]);

    for new_price in ["$3", "$2", "$1"] {
        ledger
            .push_notification(PriceDropNotification::new(&item.url, &item.name, "$4", new_price, Utc::now()))
            .await?;
    }
    let notifications = ledger.notifications().await?;
    let kept: Vec<&str> = notifications.iter().map(|n| n.new_price.as_str()).collect();
    assert_eq!(kept, vec!["$2", "$1"]);

    assert_eq!(ledger.mark_notifications_read().await?, 2);
    assert_eq!(ledger.unread_notifications().await?, 0);
    ledger.clear_notifications().await?;
    assert!(ledger.notifications().await?.is_empty());

    Ok(())
}
