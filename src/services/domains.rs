//! Malware domain list.

use crate::config::Config;
use anyhow::{Context, Result};
use reqwest::blocking::Client;
use std::{collections::HashSet, time::Duration};

/// Known-bad domain check over extracted URL literals.
pub trait DomainList: Send + Sync {
    /// Returns the subset of the given URLs whose host is on the
    /// known-bad domain list.
    fn known_bad(&self, urls: &[String]) -> Result<Vec<String>>;
}

/// Production domain list client, fed by a hosts-format blocklist.
pub struct HostListClient {
    client: Client,
    url: String,
}

impl HostListClient {
    /// Creates a new client from the configuration.
    pub fn new(config: &Config) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout()))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.domain_list_url().to_owned(),
        }
    }
}

impl DomainList for HostListClient {
    fn known_bad(&self, urls: &[String]) -> Result<Vec<String>> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .context("the domain list request failed")?
            .error_for_status()
            .context("the domain list server rejected the request")?
            .text()
            .context("could not read the domain list")?;

        let listed = parse_host_list(&body);
        Ok(filter_known_bad(urls, &listed))
    }
}

/// Parses a hosts-format blocklist into the set of listed domains.
///
/// Lines are either `<ip> <host>` pairs or bare hosts; comments and
/// `localhost` entries are skipped.
pub fn parse_host_list(body: &str) -> HashSet<String> {
    body.lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let mut parts = line.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some(_), Some(host)) => Some(host.to_lowercase()),
                (Some(host), None) => Some(host.to_lowercase()),
                _ => None,
            }
        })
        .filter(|host| host != "localhost")
        .collect()
}

/// Filters the URLs whose host appears on the list, preserving their
/// order.
pub fn filter_known_bad(urls: &[String], listed: &HashSet<String>) -> Vec<String> {
    let mut found = Vec::new();
    for url in urls {
        if let Some(host) = host_of(url) {
            if listed.contains(&host) && !found.contains(url) {
                found.push(url.clone());
            }
        }
    }
    found
}

/// Extracts the lowercased host of a URL literal.
fn host_of(url: &str) -> Option<String> {
    let rest = url.split("://").nth(1)?;
    let host = rest.split(|c| c == '/' || c == ':').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::{filter_known_bad, host_of, parse_host_list};

    #[test]
    fn it_parses_a_hosts_format_list() {
        let listed = parse_host_list(
            "# known bad domains\n\
             127.0.0.1 localhost\n\
             127.0.0.1 evil.example.com\n\
             bare-host.example.net\n\
             \n",
        );

        assert!(listed.contains("evil.example.com"));
        assert!(listed.contains("bare-host.example.net"));
        assert!(!listed.contains("localhost"));
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn it_filters_urls_by_host() {
        let listed = parse_host_list("127.0.0.1 evil.example.com");
        let urls = vec![
            String::from("https://api.example.com/v1"),
            String::from("http://EVIL.example.com/payload"),
            String::from("http://evil.example.com:8080/other"),
        ];

        let bad = filter_known_bad(&urls, &listed);
        assert_eq!(
            bad,
            &[
                "http://EVIL.example.com/payload",
                "http://evil.example.com:8080/other"
            ]
        );
    }

    #[test]
    fn it_extracts_hosts_from_urls() {
        assert_eq!(
            host_of("https://api.example.com/v1").as_deref(),
            Some("api.example.com")
        );
        assert_eq!(
            host_of("http://api.example.com:8080").as_deref(),
            Some("api.example.com")
        );
        assert_eq!(host_of("not a url"), None);
    }
}
