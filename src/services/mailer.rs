//! Password-reset mail delivery.
//!
//! No SMTP transport is wired up; the message is emitted through the
//! structured log instead, which is enough for operators to relay the link
//! during development. The reset endpoint stays neutral either way.

use crate::config::EmailConfig;
use tracing::info;

#[derive(Clone)]
pub struct Mailer {
    reset_base_url: String,
    from_address: String,
}

impl Mailer {
    #[must_use]
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            reset_base_url: config.reset_base_url.trim_end_matches('/').to_owned(),
            from_address: config.from_address.clone(),
        }
    }

    #[must_use]
    pub fn reset_link(&self, token: &str) -> String {
        format!("{}/reset-password?token={token}", self.reset_base_url)
    }

    pub fn send_password_reset(&self, email: &str, token: &str) {
        let link = self.reset_link(token);
        info!(
            from = %self.from_address,
            to = %email,
            link = %link,
            "Password reset requested; link expires in 1 hour"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_link() {
        let mailer = Mailer::new(&EmailConfig {
            reset_base_url: "https://app.example.com/".into(),
            from_address: "noreply@example.com".into(),
        });
        assert_eq!(
            mailer.reset_link("abc123"),
            "https://app.example.com/reset-password?token=abc123"
        );
    }
}
