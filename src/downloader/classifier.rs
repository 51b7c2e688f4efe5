// URL classification: accepted host families and resource id extraction

use url::Url;

/// Result of classifying a locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub valid: bool,
    pub resource_id: Option<String>,
}

impl Classification {
    fn invalid() -> Self {
        Self {
            valid: false,
            resource_id: None,
        }
    }
}

/// Accepts locators on a primary domain (id in the `v` query parameter)
/// or a short-link domain (id in the first path segment).
#[derive(Debug, Clone)]
pub struct UrlClassifier {
    primary_domains: Vec<String>,
    short_domains: Vec<String>,
}

impl Default for UrlClassifier {
    fn default() -> Self {
        Self::new(vec!["youtube.com".to_string()], vec!["youtu.be".to_string()])
    }
}

impl UrlClassifier {
    pub fn new(primary_domains: Vec<String>, short_domains: Vec<String>) -> Self {
        let normalize = |domains: Vec<String>| {
            domains
                .into_iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect()
        };
        Self {
            primary_domains: normalize(primary_domains),
            short_domains: normalize(short_domains),
        }
    }

    pub fn classify(&self, locator: &str) -> Classification {
        let Ok(url) = Url::parse(locator.trim()) else {
            return Classification::invalid();
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Classification::invalid();
        }
        let Some(host) = url.host_str().map(|h| h.to_ascii_lowercase()) else {
            return Classification::invalid();
        };

        if self.short_domains.iter().any(|d| host_matches(&host, d)) {
            let id = url
                .path()
                .trim_start_matches('/')
                .split('/')
                .next()
                .map(str::to_string);
            return Classification {
                valid: true,
                resource_id: non_empty(id),
            };
        }

        if self.primary_domains.iter().any(|d| host_matches(&host, d)) {
            let id = url
                .query_pairs()
                .find(|(k, _)| k == "v")
                .map(|(_, v)| v.into_owned());
            return Classification {
                valid: true,
                resource_id: non_empty(id),
            };
        }

        Classification::invalid()
    }
}

/// `host` is `domain` itself or one of its subdomains
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
