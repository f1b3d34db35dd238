//! robots.txt compliance (SPEC_FULL §4.G supplement): the teacher asserts
//! politeness but never actually parses `robots.txt`. Rules and the
//! `Crawl-delay` cap come from spec.md §4.G step 3.

use std::time::Duration;

use reqwest::Client;
use robotstxt::DefaultMatcher;
use url::Url;

/// Parsed `robots.txt` for one host, decided once per crawl and reused for
/// every candidate URL on that host.
pub struct RobotsPolicy {
    body: String,
    user_agent: String,
    crawl_delay: Option<Duration>,
}

impl RobotsPolicy {
    /// `body` is empty for hosts with no (or unreachable) `robots.txt` — an
    /// empty body allows everything, matching the "absence is permission"
    /// convention.
    pub fn parse(body: &str, user_agent: &str) -> Self {
        Self {
            body: body.to_string(),
            user_agent: user_agent.to_string(),
            crawl_delay: extract_crawl_delay(body, user_agent),
        }
    }

    pub fn allows(&self, url: &str) -> bool {
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.body, &self.user_agent, url)
    }

    /// The `Crawl-delay` directive for this agent, capped by the caller's
    /// configured `max_backoff`.
    pub fn crawl_delay(&self, max_backoff: Duration) -> Option<Duration> {
        self.crawl_delay.map(|d| d.min(max_backoff))
    }
}

/// Fetches and parses `robots.txt` for `seed_url`'s host. A missing or
/// non-2xx `robots.txt` is treated as "allow everything" rather than an
/// error — robots absence is permission, not a fetch failure.
pub async fn fetch_for(client: &Client, seed_url: &str, user_agent: &str) -> RobotsPolicy {
    let body = match Url::parse(seed_url) {
        Ok(mut url) => {
            url.set_path("/robots.txt");
            url.set_query(None);
            url.set_fragment(None);
            match client.get(url).send().await {
                Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
                _ => String::new(),
            }
        }
        Err(_) => String::new(),
    };
    RobotsPolicy::parse(&body, user_agent)
}

fn extract_crawl_delay(body: &str, user_agent: &str) -> Option<Duration> {
    let mut in_matching_group = false;
    let mut applies_to_all = false;
    let mut delay = None;
    let mut delay_for_all = None;

    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_lowercase();
        let value = value.trim();

        match directive.as_str() {
            "user-agent" => {
                applies_to_all = value == "*";
                in_matching_group = value.eq_ignore_ascii_case(user_agent) || applies_to_all;
            }
            "crawl-delay" => {
                if let Ok(secs) = value.parse::<f64>() {
                    let d = Duration::from_secs_f64(secs.max(0.0));
                    if in_matching_group && !applies_to_all {
                        delay = Some(d);
                    } else if applies_to_all {
                        delay_for_all = Some(d);
                    }
                }
            }
            _ => {}
        }
    }

    delay.or(delay_for_all)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_allows_everything() {
        let policy = RobotsPolicy::parse("", "sourceacquire");
        assert!(policy.allows("https://example.org/anything"));
    }

    #[test]
    fn disallow_blocks_matching_path() {
        let body = "User-agent: *\nDisallow: /private/\n";
        let policy = RobotsPolicy::parse(body, "sourceacquire");
        assert!(!policy.allows("https://example.org/private/doc"));
        assert!(policy.allows("https://example.org/public/doc"));
    }

    #[test]
    fn crawl_delay_is_parsed_and_capped() {
        let body = "User-agent: *\nCrawl-delay: 30\n";
        let policy = RobotsPolicy::parse(body, "sourceacquire");
        let capped = policy.crawl_delay(Duration::from_secs(10)).unwrap();
        assert_eq!(capped, Duration::from_secs(10));
    }

    #[test]
    fn crawl_delay_absent_is_none() {
        let body = "User-agent: *\nDisallow:\n";
        let policy = RobotsPolicy::parse(body, "sourceacquire");
        assert!(policy.crawl_delay(Duration::from_secs(10)).is_none());
    }
}
