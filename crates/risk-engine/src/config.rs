//! Risk engine configuration.

use serde::Deserialize;

/// Risk engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Disposable-email domain fragments matched against signup emails.
    #[serde(default = "default_disposable_domains")]
    pub disposable_email_domains: Vec<String>,

    /// When signal gathering fails: `true` degrades to allow-with-logging,
    /// `false` blocks the request. The open default preserves availability
    /// over strict enforcement; it is a policy choice, not an accident.
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

fn default_disposable_domains() -> Vec<String> {
    [
        "tempmail",
        "throwaway",
        "guerrillamail",
        "mailinator",
        "10minutemail",
        "trashmail",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_fail_open() -> bool {
    true
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            disposable_email_domains: default_disposable_domains(),
            fail_open: default_fail_open(),
        }
    }
}

impl RiskConfig {
    /// Check an email against the disposable-domain list
    /// (case-insensitive substring match).
    pub fn is_disposable_email(&self, email: &str) -> bool {
        let email = email.to_lowercase();
        self.disposable_email_domains
            .iter()
            .any(|domain| email.contains(domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposable_email_matching() {
        let config = RiskConfig::default();

        assert!(config.is_disposable_email("abuser@tempmail.com"));
        assert!(config.is_disposable_email("someone@MAILINATOR.net"));
        assert!(!config.is_disposable_email("student@university.edu"));
    }

    #[test]
    fn custom_domain_list() {
        let config = RiskConfig {
            disposable_email_domains: vec!["burner".into()],
            ..Default::default()
        };

        assert!(config.is_disposable_email("x@burner.io"));
        assert!(!config.is_disposable_email("abuser@tempmail.com"));
    }
}
