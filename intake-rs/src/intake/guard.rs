use crate::error::{IntakeError, Result};
use regex::Regex;
use tracing::warn;

/// Recipient domain guard
///
/// Only addresses of the local mail domain are accepted, so the gateway can
/// never be used to relay mail to third-party domains.
#[derive(Debug, Clone)]
pub struct DomainGuard {
    domain: String,
    pattern: Regex,
}

impl DomainGuard {
    pub fn new(domain: &str) -> Result<Self> {
        let domain = domain.trim().to_ascii_lowercase();
        if domain.is_empty() {
            return Err(IntakeError::Config("Mail domain is empty".to_string()));
        }

        let pattern = Regex::new(&format!(
            r"^[a-zA-Z0-9._%+-]+@(?i:{})$",
            regex::escape(&domain)
        ))
        .map_err(|e| IntakeError::Config(format!("Invalid mail domain '{}': {}", domain, e)))?;

        Ok(Self { domain, pattern })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Accept `recipient` only if it is a plain address of the local domain.
    pub fn validate(&self, recipient: &str) -> Result<()> {
        if self.pattern.is_match(recipient) {
            Ok(())
        } else {
            warn!(recipient = %recipient, domain = %self.domain, "Recipient outside local domain");
            Err(IntakeError::DomainRejected(recipient.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> DomainGuard {
        DomainGuard::new("mailhub.su").unwrap()
    }

    #[test]
    fn test_local_recipients_accepted() {
        let guard = guard();
        assert!(guard.validate("bob@mailhub.su").is_ok());
        assert!(guard.validate("first.last+tag@mailhub.su").is_ok());
        assert!(guard.validate("bob@MailHub.SU").is_ok());
    }

    #[test]
    fn test_foreign_recipients_rejected() {
        let guard = guard();
        for recipient in [
            "bob@example.com",
            "bob@mailhub.su.evil.com",
            "bob@sub.mailhub.su",
            "bob@mailhubXsu",
            "bob@mailhub.su\n",
            "bob@evil.com@mailhub.su",
            "@mailhub.su",
            "\"bob\"@mailhub.su",
        ] {
            let err = guard.validate(recipient).unwrap_err();
            assert!(matches!(err, IntakeError::DomainRejected(_)), "{:?}", recipient);
        }
    }

    #[test]
    fn test_configured_domain() {
        let guard = DomainGuard::new(" Example.ORG ").unwrap();
        assert_eq!(guard.domain(), "example.org");
        assert!(guard.validate("a@example.org").is_ok());
        assert!(guard.validate("a@mailhub.su").is_err());
    }

    #[test]
    fn test_empty_domain_is_config_error() {
        assert!(matches!(DomainGuard::new("  "), Err(IntakeError::Config(_))));
    }
}
