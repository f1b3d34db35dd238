//! Pipeline runner (SPEC_FULL §4.H): composes the monitor, scheduler, and
//! crawler phases under one of three modes, and owns the run-scoped
//! transactional commit boundary (one `flush_all`/remote-commit per run,
//! not per source).
//!
//! Grounded on `original_source/src/knowledge/pipeline/runner.py`
//! (`run_pipeline`, `PipelineResult`, the mode-dispatch table, and
//! `run_check_only`/`run_acquire_only` convenience wrappers) and on
//! `run_crawler`'s per-source dispatch loop in
//! `original_source/src/knowledge/pipeline/crawler.py` (domain cooldown wait
//! before each fetch, single-page vs. crawl branch on `source.is_crawlable`,
//! `scheduler.record_request` after each fetch) and on
//! `scheduler.py::DomainScheduler.build_schedule` for handing the crawler
//! phase a fair, capped ordering rather than the raw registry list.
//! Progress reporting follows
//! the teacher's `cli::commands::scrape` idiom (`console::style`,
//! `indicatif::ProgressBar`).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use thiserror::Error;
use tracing::info;

use crate::crawl_state::CrawlStateStore;
use crate::crawler::{self, AcquisitionResult};
use crate::models::{CrawlScope, SourceEntry};
use crate::monitor::{self, MonitorResult};
use crate::registry::{RegistryError, SourceRegistry};
use crate::robots;
use crate::scheduler::{DomainScheduler, Politeness, ScheduleAction, ScheduledSource};
use crate::store::StoreError;
use crate::url_utils::ScopeFilter;

pub const USER_AGENT: &str = "sourceacquire";

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crawler(#[from] crate::crawler::CrawlerError),
}

/// Which phases a run executes (spec.md §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineMode {
    /// Monitor then acquire: the default end-to-end run.
    Full,
    /// Monitor only — detection without acquisition.
    Check,
    /// Acquire only — skip detection, go straight for pending/changed sources.
    Acquire,
}

impl PipelineMode {
    fn runs_monitor(self) -> bool {
        matches!(self, PipelineMode::Full | PipelineMode::Check)
    }

    fn runs_crawler(self) -> bool {
        matches!(self, PipelineMode::Full | PipelineMode::Acquire)
    }
}

/// Run-scoped configuration (`config::PipelineConfig`).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub mode: PipelineMode,
    pub dry_run: bool,
    pub force_fresh: bool,
    pub enable_crawling: bool,
    pub max_pages_per_crawl: u32,
    pub politeness: Politeness,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: PipelineMode::Full,
            dry_run: false,
            force_fresh: false,
            enable_crawling: true,
            max_pages_per_crawl: 100,
            politeness: Politeness::default(),
            show_progress: true,
        }
    }
}

/// Result of the crawler phase across all sources in one run.
#[derive(Debug, Default)]
pub struct CrawlerRunResult {
    pub sources_processed: u32,
    pub successful: Vec<AcquisitionResult>,
    pub failed: Vec<AcquisitionResult>,
    pub pages_total: u32,
}

/// Result of running the full pipeline (`PipelineResult`).
#[derive(Debug)]
pub struct PipelineResult {
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub mode: PipelineMode,
    pub monitor: Option<MonitorResult>,
    pub crawler: Option<CrawlerRunResult>,
    pub dry_run: bool,
}

impl PipelineResult {
    fn new(mode: PipelineMode, dry_run: bool) -> Self {
        Self {
            started_at: Utc::now(),
            completed_at: None,
            mode,
            monitor: None,
            crawler: None,
            dry_run,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        match self.completed_at {
            Some(end) => (end - self.started_at).num_milliseconds() as f64 / 1000.0,
            None => 0.0,
        }
    }

    pub fn total_sources_processed(&self) -> u32 {
        self.monitor.as_ref().map(|m| m.sources_checked).unwrap_or(0)
    }

    pub fn total_pages_acquired(&self) -> u32 {
        self.crawler.as_ref().map(|c| c.pages_total).unwrap_or(0)
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Pipeline completed in {:.1}s", self.duration_seconds()),
            format!(
                "  Mode: {:?}{}",
                self.mode,
                if self.dry_run { " (dry run)" } else { "" }
            ),
        ];
        if let Some(monitor) = &self.monitor {
            lines.push(format!("  Monitor: {} checked", monitor.sources_checked));
            lines.push(format!("    - Initial needed: {}", monitor.initial_needed.len()));
            lines.push(format!("    - Updates needed: {}", monitor.updates_needed.len()));
            lines.push(format!("    - Unchanged: {}", monitor.unchanged.len()));
            lines.push(format!("    - Errors: {}", monitor.errors.len()));
        }
        if let Some(crawler) = &self.crawler {
            lines.push(format!("  Crawler: {} processed", crawler.sources_processed));
            lines.push(format!("    - Successful: {}", crawler.successful.len()));
            lines.push(format!("    - Failed: {}", crawler.failed.len()));
            lines.push(format!("    - Pages acquired: {}", crawler.pages_total));
        }
        lines.join("\n")
    }
}

fn scope_filter_for(source: &SourceEntry) -> ScopeFilter {
    match source.crawl_scope {
        CrawlScope::Page => ScopeFilter::Page,
        CrawlScope::PathPrefix => ScopeFilter::PathPrefix,
        // `custom` is declared opaque (spec.md §9 Open Question 2); a crate
        // consumer can swap in their own predicate, but with none supplied
        // the conservative default is same-host.
        CrawlScope::Host | CrawlScope::Custom => ScopeFilter::Host,
    }
}

/// Runs the pipeline end to end according to `config.mode`.
pub async fn run_pipeline(
    client: &Client,
    registry: &SourceRegistry,
    crawl_states: &CrawlStateStore,
    content_store: &Arc<dyn crate::store::Store>,
    config: &PipelineConfig,
) -> Result<PipelineResult, RunnerError> {
    let mut result = PipelineResult::new(config.mode, config.dry_run);
    info!(mode = ?config.mode, dry_run = config.dry_run, "starting content pipeline");

    let mut sources_to_acquire: Vec<SourceEntry> = Vec::new();

    if config.mode.runs_monitor() {
        info!("running monitor phase");
        let monitor_result = run_monitor_phase(client, registry, config).await?;

        for source in &monitor_result.initial_needed {
            sources_to_acquire.push(source.clone());
        }
        for (source, _check_result) in &monitor_result.updates_needed {
            sources_to_acquire.push(source.clone());
        }

        info!(
            needing_acquisition = sources_to_acquire.len(),
            "monitor phase complete"
        );
        result.monitor = Some(monitor_result);
    }

    if config.mode.runs_crawler() {
        if config.mode == PipelineMode::Acquire && sources_to_acquire.is_empty() {
            sources_to_acquire = acquire_mode_candidates(registry, config).await?;
        }

        if sources_to_acquire.is_empty() {
            info!("no sources need acquisition, skipping crawler phase");
            result.crawler = Some(CrawlerRunResult::default());
        } else {
            info!(count = sources_to_acquire.len(), "running crawler phase");
            let crawler_result = run_crawler_phase(
                client,
                registry,
                crawl_states,
                content_store,
                sources_to_acquire,
                config,
            )
            .await?;
            result.crawler = Some(crawler_result);
        }
    }

    result.completed_at = Some(Utc::now());
    info!("pipeline complete:\n{}", result.summary());
    Ok(result)
}

/// Convenience wrapper equivalent to `run_check_only`.
pub async fn run_check_only(
    client: &Client,
    registry: &SourceRegistry,
    crawl_states: &CrawlStateStore,
    content_store: &Arc<dyn crate::store::Store>,
    base: &PipelineConfig,
) -> Result<PipelineResult, RunnerError> {
    let config = PipelineConfig {
        mode: PipelineMode::Check,
        ..base.clone()
    };
    run_pipeline(client, registry, crawl_states, content_store, &config).await
}

/// Convenience wrapper equivalent to `run_acquire_only`.
pub async fn run_acquire_only(
    client: &Client,
    registry: &SourceRegistry,
    crawl_states: &CrawlStateStore,
    content_store: &Arc<dyn crate::store::Store>,
    base: &PipelineConfig,
) -> Result<PipelineResult, RunnerError> {
    let config = PipelineConfig {
        mode: PipelineMode::Acquire,
        ..base.clone()
    };
    run_pipeline(client, registry, crawl_states, content_store, &config).await
}

async fn run_monitor_phase(
    client: &Client,
    registry: &SourceRegistry,
    config: &PipelineConfig,
) -> Result<MonitorResult, RunnerError> {
    let all_sources = registry.list().await?;
    let mut monitor_result = MonitorResult::default();

    let pending = monitor::sources_pending_initial(&all_sources);
    let due = if config.force_fresh {
        all_sources
            .iter()
            .filter(|s| s.last_content_hash.is_some())
            .cloned()
            .collect()
    } else {
        monitor::sources_due_for_check(&all_sources)
    };

    monitor_result.initial_needed = pending;
    monitor_result.sources_checked = due.len() as u32;

    for mut source in due {
        let check_result = monitor::check_source(client, &source).await;
        monitor::update_source_after_check(&mut source, &check_result, &config.politeness);

        if !config.dry_run {
            registry.put(source.clone()).await?;
        }

        match check_result.status {
            crate::models::CheckStatus::Unchanged => monitor_result.unchanged.push(source),
            crate::models::CheckStatus::Changed => {
                monitor_result.updates_needed.push((source, check_result))
            }
            crate::models::CheckStatus::Failed => {
                let message = check_result.error.clone().unwrap_or_default();
                monitor_result.errors.push((source, message));
            }
        }
    }

    Ok(monitor_result)
}

async fn acquire_mode_candidates(
    registry: &SourceRegistry,
    config: &PipelineConfig,
) -> Result<Vec<SourceEntry>, RunnerError> {
    let all_sources = registry.list().await?;

    // No `.take(limit)` here: the per-run cap is enforced once, fairly
    // across domains, by `DomainScheduler::build_schedule` in the crawler
    // phase rather than by truncating in registry order here.
    let candidates = if config.force_fresh {
        all_sources
            .into_iter()
            .filter(|s| s.status == crate::models::SourceStatus::Active)
            .collect::<Vec<_>>()
    } else {
        monitor::sources_pending_initial(&all_sources)
    };

    Ok(candidates)
}

async fn run_crawler_phase(
    client: &Client,
    registry: &SourceRegistry,
    crawl_states: &CrawlStateStore,
    content_store: &Arc<dyn crate::store::Store>,
    sources: Vec<SourceEntry>,
    config: &PipelineConfig,
) -> Result<CrawlerRunResult, RunnerError> {
    let mut result = CrawlerRunResult::default();
    let mut scheduler = DomainScheduler::new(config.politeness.clone());
    let delay = Duration::from_secs_f64(config.politeness.crawler_delay_seconds);
    let max_backoff = std::time::Duration::from_secs(
        config.politeness.max_backoff_interval.num_seconds().max(0) as u64,
    );

    // Split by action so priority (initial acquisition outranks a re-check)
    // is computed correctly, then hand both batches to the scheduler so it
    // can apply the per-run cap, the per-domain cap, and fair round-robin
    // interleaving across domains (spec.md §4.F/§8) instead of draining the
    // list in raw registry order.
    let (initial, due): (Vec<SourceEntry>, Vec<SourceEntry>) =
        sources.into_iter().partition(|s| s.is_pending_initial());
    scheduler.add_sources(initial, ScheduleAction::Initial);
    scheduler.add_sources(due, ScheduleAction::Check);
    let scheduled = scheduler.build_schedule();

    let progress = if config.show_progress && !scheduled.is_empty() {
        let bar = ProgressBar::new(scheduled.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        Some(bar)
    } else {
        None
    };

    for ScheduledSource { source: mut source, .. } in scheduled {
        result.sources_processed += 1;
        if let Some(bar) = &progress {
            bar.set_message(source.url.clone());
        }

        scheduler.wait_for_domain(&crate::url_utils::extract_domain(&source.url).unwrap_or_default()).await;

        if config.dry_run {
            info!(url = %source.url, "[dry run] would acquire");
            result.successful.push(AcquisitionResult {
                source_url: source.url.clone(),
                success: true,
                content_hash: None,
                content_path: None,
                pages_acquired: 0,
                error: None,
                rendered: false,
            });
            if let Some(bar) = &progress {
                bar.inc(1);
            }
            continue;
        }

        let acquisition = if config.enable_crawling && source.is_crawlable() {
            let robots_policy = robots::fetch_for(client, &source.url, USER_AGENT).await;
            let scope = scope_filter_for(&source);
            source.crawl_max_pages = source.crawl_max_pages.min(config.max_pages_per_crawl);
            crawler::acquire_crawl(
                client,
                content_store,
                crawl_states,
                &source,
                &scope,
                &robots_policy,
                delay,
                max_backoff,
            )
            .await?
        } else {
            crawler::acquire_single_page(client, content_store, &source, delay).await
        };

        let domain = crate::url_utils::extract_domain(&source.url).unwrap_or_default();
        scheduler.record_request(&domain).await;

        if acquisition.success {
            if let Some(hash) = &acquisition.content_hash {
                source.last_content_hash = Some(hash.clone());
            }
            source.last_checked = Some(Utc::now());
            source.check_failures = 0;
            source.total_pages_acquired += acquisition.pages_acquired as u64;
            if source.is_crawlable() {
                source.last_crawl_completed = Some(Utc::now());
            }
            registry.put(source).await?;

            result.pages_total += acquisition.pages_acquired;
            result.successful.push(acquisition);
        } else {
            source.check_failures += 1;
            registry.put(source).await?;
            result.failed.push(acquisition);
        }

        if let Some(bar) = &progress {
            bar.inc(1);
        }
    }

    if let Some(bar) = progress {
        bar.finish_with_message("done");
    }

    if !config.dry_run {
        println!(
            "{} Crawler phase complete: {} successful, {} failed, {} pages acquired",
            style("✓").green(),
            result.successful.len(),
            result.failed.len(),
            result.pages_total
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlScope, SourceEntry, SourceType};

    #[test]
    fn mode_runs_monitor_and_crawler_only_in_full() {
        assert!(PipelineMode::Full.runs_monitor());
        assert!(PipelineMode::Full.runs_crawler());
        assert!(PipelineMode::Check.runs_monitor());
        assert!(!PipelineMode::Check.runs_crawler());
        assert!(!PipelineMode::Acquire.runs_monitor());
        assert!(PipelineMode::Acquire.runs_crawler());
    }

    #[test]
    fn scope_filter_maps_path_prefix() {
        let mut source = SourceEntry::new(
            "https://example.org/docs/".to_string(),
            "Docs".to_string(),
            SourceType::Primary,
        );
        source.crawl_scope = CrawlScope::PathPrefix;
        assert!(matches!(scope_filter_for(&source), ScopeFilter::PathPrefix));
    }

    #[test]
    fn custom_scope_falls_back_to_host() {
        let mut source = SourceEntry::new(
            "https://example.org/docs/".to_string(),
            "Docs".to_string(),
            SourceType::Primary,
        );
        source.crawl_scope = CrawlScope::Custom;
        assert!(matches!(scope_filter_for(&source), ScopeFilter::Host));
    }

    #[test]
    fn summary_reports_mode_and_dry_run_flag() {
        let result = PipelineResult::new(PipelineMode::Check, true);
        let summary = result.summary();
        assert!(summary.contains("Check"));
        assert!(summary.contains("dry run"));
    }
}
