//! Domain-aware scheduler (SPEC_FULL §4.F): fair round-robin interleaving
//! across domains, priority ordering within a domain, per-domain caps,
//! cooldown, jitter, and exponential backoff.
//!
//! Algorithm directly grounded on
//! `original_source/src/knowledge/pipeline/scheduler.py`
//! (`DomainScheduler`, `ScheduledSource::from_source`,
//! `calculate_backoff_interval`, `calculate_next_check_with_jitter`); the
//! adaptive per-domain state shape (`RwLock<HashMap<...>>`, `Instant`-based
//! timing) follows `scrapers::rate_limiter::RateLimiter`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use tokio::sync::RwLock;

use crate::models::{SourceEntry, SourceType, UpdateFrequency};
use crate::url_utils;

/// Rate limiting and politeness configuration (`config::PipelinePoliteness`).
#[derive(Debug, Clone)]
pub struct Politeness {
    pub min_domain_interval: Duration,
    pub max_domain_requests_per_run: u32,
    pub max_sources_per_run: u32,
    pub max_total_requests_per_run: u32,
    pub check_jitter_minutes: u32,
    pub crawler_delay_seconds: f64,
    pub respect_robots_crawl_delay: bool,
    pub base_backoff_interval: ChronoDuration,
    pub max_backoff_interval: ChronoDuration,
}

impl Default for Politeness {
    fn default() -> Self {
        Self {
            min_domain_interval: Duration::from_secs(2),
            max_domain_requests_per_run: 10,
            max_sources_per_run: 20,
            max_total_requests_per_run: 100,
            check_jitter_minutes: 60,
            crawler_delay_seconds: 1.0,
            respect_robots_crawl_delay: true,
            base_backoff_interval: ChronoDuration::hours(6),
            max_backoff_interval: ChronoDuration::days(7),
        }
    }
}

/// What the scheduler was asked to do with a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleAction {
    Initial,
    Check,
}

/// A source paired with its scheduling metadata.
#[derive(Debug, Clone)]
pub struct ScheduledSource {
    pub source: SourceEntry,
    pub domain: String,
    pub action: ScheduleAction,
    pub priority: f64,
}

impl ScheduledSource {
    pub fn from_source(source: SourceEntry, action: ScheduleAction) -> Self {
        let domain = url_utils::extract_domain(&source.url).unwrap_or_default();

        let mut priority = 0.0;
        if action == ScheduleAction::Initial {
            priority -= 100.0;
        }
        match source.source_type {
            SourceType::Primary => priority -= 50.0,
            SourceType::Derived => priority -= 25.0,
            SourceType::Reference => {}
        }
        if let Some(next_check) = source.next_check_after {
            let overdue = Utc::now() - next_check;
            priority -= overdue.num_seconds() as f64 / 3600.0;
        }

        Self {
            source,
            domain,
            action,
            priority,
        }
    }
}

/// Default check interval for an update frequency (`config.CHECK_INTERVALS`).
pub fn check_interval(frequency: UpdateFrequency) -> ChronoDuration {
    match frequency {
        UpdateFrequency::Frequent => ChronoDuration::hours(6),
        UpdateFrequency::Daily => ChronoDuration::hours(24),
        UpdateFrequency::Weekly => ChronoDuration::days(7),
        UpdateFrequency::Monthly => ChronoDuration::days(30),
        UpdateFrequency::Unknown => ChronoDuration::days(7),
    }
}

/// Next check time with uniform jitter added to the base interval.
pub fn calculate_next_check_with_jitter(
    source: &SourceEntry,
    politeness: &Politeness,
) -> DateTime<Utc> {
    let base = check_interval(source.update_frequency);
    let jitter_minutes = if politeness.check_jitter_minutes == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=politeness.check_jitter_minutes)
    };
    Utc::now() + base + ChronoDuration::minutes(jitter_minutes as i64)
}

/// Exponential backoff interval after consecutive failures, capped at
/// `max_interval`.
pub fn calculate_backoff_interval(failures: u32, politeness: &Politeness) -> ChronoDuration {
    if failures == 0 {
        return politeness.base_backoff_interval;
    }
    let capped = failures.min(20);
    let multiplier = 1i64 << capped;
    let backoff = politeness.base_backoff_interval * multiplier as i32;
    backoff.min(politeness.max_backoff_interval)
}

struct DomainQueue {
    sources: Vec<ScheduledSource>,
}

/// Schedules sources for one pipeline run with domain fairness.
pub struct DomainScheduler {
    politeness: Politeness,
    by_domain: HashMap<String, DomainQueue>,
    last_request: Arc<RwLock<HashMap<String, Instant>>>,
    request_counts: HashMap<String, u32>,
}

impl DomainScheduler {
    pub fn new(politeness: Politeness) -> Self {
        Self {
            politeness,
            by_domain: HashMap::new(),
            last_request: Arc::new(RwLock::new(HashMap::new())),
            request_counts: HashMap::new(),
        }
    }

    pub fn politeness(&self) -> &Politeness {
        &self.politeness
    }

    /// Add sources under the given action, re-sorting each domain's queue
    /// by ascending priority.
    pub fn add_sources(&mut self, sources: Vec<SourceEntry>, action: ScheduleAction) -> usize {
        let added = sources.len();
        for source in sources {
            let scheduled = ScheduledSource::from_source(source, action);
            self.by_domain
                .entry(scheduled.domain.clone())
                .or_insert_with(|| DomainQueue { sources: Vec::new() })
                .sources
                .push(scheduled);
        }
        for queue in self.by_domain.values_mut() {
            queue
                .sources
                .sort_by(|a, b| a.priority.partial_cmp(&b.priority).unwrap());
        }
        added
    }

    /// Domains that still have at least one unscheduled source.
    pub fn domains_with_pending(&self) -> Vec<String> {
        self.by_domain
            .iter()
            .filter(|(_, q)| !q.sources.is_empty())
            .map(|(d, _)| d.clone())
            .collect()
    }

    /// Produce a fair round-robin ordering across domains, respecting the
    /// per-run and per-domain caps. Consumes each domain's queue.
    pub fn build_schedule(&mut self) -> Vec<ScheduledSource> {
        let max_sources = self.politeness.max_sources_per_run as usize;
        let max_per_domain = self.politeness.max_domain_requests_per_run as usize;

        let mut domains: Vec<String> = self.by_domain.keys().cloned().collect();
        domains.sort();
        if domains.is_empty() {
            return Vec::new();
        }

        let mut domain_yielded: HashMap<String, usize> = HashMap::new();
        let mut out = Vec::new();
        let mut domain_index = 0usize;
        let mut empty_rounds = 0usize;

        while out.len() < max_sources && empty_rounds < domains.len() {
            let domain = &domains[domain_index];
            let yielded_here = *domain_yielded.get(domain).unwrap_or(&0);

            let popped = self
                .by_domain
                .get_mut(domain)
                .filter(|q| !q.sources.is_empty() && yielded_here < max_per_domain)
                .map(|q| q.sources.remove(0));

            match popped {
                Some(scheduled) => {
                    domain_yielded.insert(domain.clone(), yielded_here + 1);
                    out.push(scheduled);
                    empty_rounds = 0;
                }
                None => empty_rounds += 1,
            }

            domain_index = (domain_index + 1) % domains.len();
        }

        out
    }

    /// Record that a request has just been made to `domain`, resetting its
    /// cooldown clock.
    pub async fn record_request(&mut self, domain: &str) {
        self.last_request
            .write()
            .await
            .insert(domain.to_string(), Instant::now());
        *self.request_counts.entry(domain.to_string()).or_insert(0) += 1;
    }

    /// Seconds remaining before `domain`'s cooldown is satisfied.
    pub async fn domain_cooldown(&self, domain: &str) -> Duration {
        let last = self.last_request.read().await;
        match last.get(domain) {
            Some(instant) => {
                let elapsed = instant.elapsed();
                self.politeness
                    .min_domain_interval
                    .checked_sub(elapsed)
                    .unwrap_or(Duration::ZERO)
            }
            None => Duration::ZERO,
        }
    }

    /// Sleep out `domain`'s remaining cooldown, if any.
    pub async fn wait_for_domain(&self, domain: &str) {
        let wait = self.domain_cooldown(domain).await;
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;

    fn source(url: &str, source_type: SourceType) -> SourceEntry {
        SourceEntry::new(url.to_string(), "Test".to_string(), source_type)
    }

    #[test]
    fn priority_favors_initial_and_primary() {
        let initial = ScheduledSource::from_source(
            source("https://a.example.org", SourceType::Reference),
            ScheduleAction::Initial,
        );
        let check = ScheduledSource::from_source(
            source("https://a.example.org", SourceType::Primary),
            ScheduleAction::Check,
        );
        assert!(initial.priority < check.priority);
    }

    #[test]
    fn build_schedule_respects_per_domain_cap() {
        let mut politeness = Politeness::default();
        politeness.max_domain_requests_per_run = 1;
        politeness.max_sources_per_run = 10;
        let mut scheduler = DomainScheduler::new(politeness);
        scheduler.add_sources(
            vec![
                source("https://a.example.org/1", SourceType::Primary),
                source("https://a.example.org/2", SourceType::Primary),
            ],
            ScheduleAction::Check,
        );
        let schedule = scheduler.build_schedule();
        assert_eq!(schedule.len(), 1);
    }

    #[test]
    fn build_schedule_interleaves_domains_fairly() {
        let mut politeness = Politeness::default();
        politeness.max_sources_per_run = 10;
        politeness.max_domain_requests_per_run = 10;
        let mut scheduler = DomainScheduler::new(politeness);
        scheduler.add_sources(
            vec![
                source("https://a.example.org/1", SourceType::Primary),
                source("https://a.example.org/2", SourceType::Primary),
                source("https://b.example.org/1", SourceType::Primary),
            ],
            ScheduleAction::Check,
        );
        let schedule = scheduler.build_schedule();
        assert_eq!(schedule.len(), 3);
        // first two picks must come from different domains (round robin)
        assert_ne!(schedule[0].domain, schedule[1].domain);
    }

    #[test]
    fn backoff_is_exponential_and_capped() {
        let politeness = Politeness::default();
        let one = calculate_backoff_interval(1, &politeness);
        let two = calculate_backoff_interval(2, &politeness);
        assert!(two > one);
        let huge = calculate_backoff_interval(100, &politeness);
        assert_eq!(huge, politeness.max_backoff_interval);
    }

    #[test]
    fn zero_failures_uses_base_interval() {
        let politeness = Politeness::default();
        assert_eq!(
            calculate_backoff_interval(0, &politeness),
            politeness.base_backoff_interval
        );
    }

    #[tokio::test]
    async fn cooldown_is_zero_before_first_request() {
        let scheduler = DomainScheduler::new(Politeness::default());
        assert_eq!(scheduler.domain_cooldown("example.org").await, Duration::ZERO);
    }

    #[tokio::test]
    async fn cooldown_nonzero_immediately_after_request() {
        let mut scheduler = DomainScheduler::new(Politeness::default());
        scheduler.record_request("example.org").await;
        let cooldown = scheduler.domain_cooldown("example.org").await;
        assert!(cooldown > Duration::ZERO);
    }
}
