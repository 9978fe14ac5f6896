//! Static domain blocklist for platforms that refuse or defeat extraction.

use crate::utils::host_matches;

pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "zhihu.com",
    "weibo.com",
    "twitter.com",
    "facebook.com",
    "instagram.com",
    "youtube.com",
    "bilibili.com",
    "douyin.com",
];

/// Domains whose links are dropped during aggregation and never fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainBlocklist {
    domains: Vec<String>,
}

impl DomainBlocklist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            domains: domains
                .into_iter()
                .map(|d| d.as_ref().trim().to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn is_blocked(&self, url: &str) -> bool {
        self.domains.iter().any(|d| host_matches(url, d))
    }
}

impl Default for DomainBlocklist {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCKED_DOMAINS)
    }
}
