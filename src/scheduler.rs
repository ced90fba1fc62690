use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::price_checker::{CheckRunSummary, PriceChecker};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmInfo {
    pub job_id: Uuid,
    pub period_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub last_tick: Option<DateTime<Utc>>,
    pub next_tick: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub alarm_active: bool,
    pub tick_in_progress: bool,
    pub completed_runs: u64,
    pub failed_runs: u64,
    /// Ticks dropped because the previous one was still running.
    pub skipped_ticks: u64,
    pub items_checked: u64,
    pub price_drops: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub average_run_time_ms: f64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Default)]
struct RunCounters {
    completed_runs: u64,
    failed_runs: u64,
    skipped_ticks: u64,
    items_checked: u64,
    price_drops: u64,
    total_run_time_ms: u64,
    last_run: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// Shared by the alarm job and `run_now`.
#[derive(Clone)]
struct TickRunner {
    checker: Arc<PriceChecker>,
    tick_lock: Arc<Mutex<()>>,
    in_progress: Arc<AtomicBool>,
    counters: Arc<RwLock<RunCounters>>,
    alarm: Arc<RwLock<Option<AlarmInfo>>>,
    job_timeout: Duration,
}

impl TickRunner {
    async fn tick(&self, trigger: &str) -> Result<CheckRunSummary> {
        let Ok(guard) = Arc::clone(&self.tick_lock).try_lock_owned() else {
            self.counters.write().await.skipped_ticks += 1;
            metrics::counter!("pricewatch_scheduler_skipped_ticks_total").increment(1);
            tracing::warn!("Skipping {} price check, previous run still in progress", trigger);
            return Err(anyhow::anyhow!("A price check run is already in progress"));
        };

        tracing::debug!("Starting {} price check", trigger);
        self.in_progress.store(true, Ordering::SeqCst);
        let started = tokio::time::Instant::now();

        // The run is never cancelled mid-check: past the timeout it finishes in
        // the background, holding the tick lock until it is done.
        let checker = Arc::clone(&self.checker);
        let in_progress = Arc::clone(&self.in_progress);
        let run = tokio::spawn(async move {
            let result = checker.check_due(Utc::now()).await;
            in_progress.store(false, Ordering::SeqCst);
            drop(guard);
            result
        });

        let result = match tokio::time::timeout(self.job_timeout, run).await {
            Ok(Ok(Ok(summary))) => Ok(summary),
            Ok(Ok(Err(e))) => Err(anyhow::Error::from(e)),
            Ok(Err(e)) => {
                self.in_progress.store(false, Ordering::SeqCst);
                Err(anyhow::anyhow!("Price check run aborted: {}", e))
            }
            Err(_) => Err(anyhow::anyhow!(
                "Price check run exceeded {}s, finishing in the background",
                self.job_timeout.as_secs()
            )),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut counters = self.counters.write().await;
        counters.last_run = Some(Utc::now());
        counters.total_run_time_ms += elapsed_ms;
        match &result {
            Ok(summary) => {
                counters.completed_runs += 1;
                counters.items_checked += summary.checked as u64;
                counters.price_drops += summary.price_drops as u64;
                counters.last_error = None;
            }
            Err(e) => {
                counters.failed_runs += 1;
                counters.last_error = Some(e.to_string());
                tracing::error!("Scheduled price check failed: {}", e);
            }
        }
        result
    }

    async fn record_alarm_tick(&self, job_id: Uuid) {
        let mut alarm = self.alarm.write().await;
        if let Some(info) = alarm.as_mut().filter(|info| info.job_id == job_id) {
            let now = Utc::now();
            info.last_tick = Some(now);
            info.next_tick = now + chrono::Duration::seconds(info.period_seconds as i64);
        }
    }
}

pub struct PriceScheduler {
    scheduler: JobScheduler,
    runner: TickRunner,
    running: AtomicBool,
    config: SchedulerConfig,
    start_time: DateTime<Utc>,
}

impl PriceScheduler {
    pub async fn new(checker: Arc<PriceChecker>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let runner = TickRunner {
            checker,
            tick_lock: Arc::new(Mutex::new(())),
            in_progress: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(RwLock::new(RunCounters::default())),
            alarm: Arc::new(RwLock::new(None)),
            job_timeout: Duration::from_secs(config.job_timeout),
        };

        Ok(Self {
            scheduler,
            runner,
            running: AtomicBool::new(false),
            config,
            start_time: Utc::now(),
        })
    }

    /// Start ticking. Installs the configured alarm unless one is already set,
    /// and kicks off an immediate check when `check_on_startup` is enabled.
    pub async fn start(&mut self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        if self.alarm_info().await.is_none() {
            self.set_alarm(self.config.alarm_period()).await?;
        }
        self.scheduler.start().await?;
        self.running.store(true, Ordering::SeqCst);
        tracing::info!("Price scheduler started");

        if self.config.check_on_startup {
            let runner = self.runner.clone();
            tokio::spawn(async move {
                // Errors are already logged and counted by the runner
                let _ = runner.tick("startup").await;
            });
        }
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.clear_alarm().await?;
        self.scheduler.shutdown().await?;
        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Price scheduler shutdown");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Install the repeating alarm, replacing any existing one.
    pub async fn set_alarm(&self, period: Duration) -> Result<AlarmInfo> {
        if period.is_zero() {
            return Err(anyhow::anyhow!("Alarm period must be greater than zero"));
        }
        self.clear_alarm().await?;

        let runner = self.runner.clone();
        let job = Job::new_repeated_async(period, move |job_id, _lock| {
            let runner = runner.clone();
            Box::pin(async move {
                runner.record_alarm_tick(job_id).await;
                let _ = runner.tick("scheduled").await;
            })
        })?;

        let job_id = self.scheduler.add(job).await?;
        let now = Utc::now();
        let info = AlarmInfo {
            job_id,
            period_seconds: period.as_secs(),
            created_at: now,
            last_tick: None,
            next_tick: now + chrono::Duration::from_std(period)?,
        };

        *self.runner.alarm.write().await = Some(info.clone());
        tracing::info!("Price check alarm set every {}s", period.as_secs());
        Ok(info)
    }

    /// Remove the alarm. Returns whether one was set.
    pub async fn clear_alarm(&self) -> Result<bool> {
        let previous = self.runner.alarm.write().await.take();
        match previous {
            Some(info) => {
                self.scheduler.remove(&info.job_id).await?;
                tracing::info!("Price check alarm cleared (job: {})", info.job_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn alarm_info(&self) -> Option<AlarmInfo> {
        self.runner.alarm.read().await.clone()
    }

    /// Run a check of the due items immediately (outside of the alarm).
    /// Fails when a run is already in progress.
    pub async fn run_now(&self) -> Result<CheckRunSummary> {
        tracing::info!("Running immediate price check");
        self.runner.tick("manual").await
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let counters = self.runner.counters.read().await;
        let alarm_active = self.runner.alarm.read().await.is_some();
        let total_runs = counters.completed_runs + counters.failed_runs;
        let uptime = Utc::now().signed_duration_since(self.start_time);

        SchedulerStats {
            alarm_active,
            tick_in_progress: self.runner.in_progress.load(Ordering::SeqCst),
            completed_runs: counters.completed_runs,
            failed_runs: counters.failed_runs,
            skipped_ticks: counters.skipped_ticks,
            items_checked: counters.items_checked,
            price_drops: counters.price_drops,
            last_run: counters.last_run,
            last_error: counters.last_error.clone(),
            average_run_time_ms: if total_runs > 0 {
                counters.total_run_time_ms as f64 / total_runs as f64
            } else {
                0.0
            },
            uptime_seconds: uptime.num_seconds().max(0) as u64,
        }
    }
}
