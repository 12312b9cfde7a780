//! Origin allow-list for browser clients.
//!
//! `https://*.example.com` style entries match `https://example.com` and any
//! subdomain chain of it; everything else must match exactly.

use actix_cors::Cors;

#[derive(Debug, Clone, PartialEq)]
enum OriginRule {
    Exact(String),
    /// Scheme prefix (e.g. `https://`) and the bare domain after `*.`.
    Wildcard { scheme: String, domain: String },
}

impl OriginRule {
    fn parse(entry: &str) -> Self {
        let entry = entry.trim().trim_end_matches('/');
        if let Some((scheme, rest)) = entry.split_once("://") {
            if let Some(domain) = rest.strip_prefix("*.") {
                if domain.contains('.') {
                    return OriginRule::Wildcard {
                        scheme: format!("{}://", scheme),
                        domain: domain.to_ascii_lowercase(),
                    };
                }
            }
        }
        OriginRule::Exact(entry.to_string())
    }

    fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Exact(allowed) => allowed == origin,
            OriginRule::Wildcard { scheme, domain } => {
                let Some(host) = origin.strip_prefix(scheme.as_str()) else {
                    return false;
                };
                let host = host.to_ascii_lowercase();
                if host == *domain {
                    return true;
                }
                let Some(labels) = host.strip_suffix(domain.as_str()) else {
                    return false;
                };
                let Some(labels) = labels.strip_suffix('.') else {
                    return false;
                };
                !labels.is_empty()
                    && labels.split('.').all(|label| {
                        !label.is_empty()
                            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                    })
            }
        }
    }
}

/// Parsed allow-list of origins.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    rules: Vec<OriginRule>,
}

impl OriginPolicy {
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        Self {
            rules: entries
                .iter()
                .map(|entry| entry.as_ref())
                .filter(|entry| !entry.trim().is_empty())
                .map(OriginRule::parse)
                .collect(),
        }
    }

    pub fn allows(&self, origin: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(origin))
    }

    /// actix-cors middleware enforcing this policy for any method and header.
    pub fn to_cors(&self) -> Cors {
        let policy = self.clone();
        Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|origin| policy.allows(origin))
                    .unwrap_or(false)
            })
            .allow_any_method()
            .allow_any_header()
            .max_age(3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> OriginPolicy {
        OriginPolicy::new(&crate::config::AppConfig::default().cors.allowed_origins)
    }

    #[test]
    fn test_exact_origins() {
        let policy = default_policy();
        assert!(policy.allows("http://localhost:3000"));
        assert!(policy.allows("http://localhost:5173"));
        assert!(!policy.allows("http://localhost:8000"));
    }

    #[test]
    fn test_wildcard_subdomains() {
        let policy = default_policy();
        assert!(policy.allows("https://lovable.app"));
        assert!(policy.allows("https://my-app.lovable.app"));
        assert!(policy.allows("https://preview.my-app.lovable.app"));
    }

    #[test]
    fn test_wildcard_rejects_lookalikes() {
        let policy = default_policy();
        assert!(!policy.allows("http://my-app.lovable.app"));
        assert!(!policy.allows("https://evil-lovable.app"));
        assert!(!policy.allows("https://lovable.app.evil.com"));
        assert!(!policy.allows("https://bad_label.lovable.app"));
        assert!(!policy.allows("https://.lovable.app"));
    }

    #[test]
    fn test_empty_policy_allows_nothing() {
        let policy = OriginPolicy::new::<String>(&[]);
        assert!(!policy.allows("http://localhost:3000"));
    }
}
