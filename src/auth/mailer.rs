//! Email hook
//!
//! Delivery itself belongs to the hosting application; accounts only need a
//! place to hand messages off.

use tracing::info;

pub trait Mailer: Send + Sync {
    fn send_mail(
        &self,
        subject: &str,
        message: &str,
        from_email: Option<&str>,
        recipients: &[String],
    ) -> anyhow::Result<()>;
}

/// Mailer that records messages in the log instead of sending them
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

impl Mailer for LogMailer {
    fn send_mail(
        &self,
        subject: &str,
        message: &str,
        from_email: Option<&str>,
        recipients: &[String],
    ) -> anyhow::Result<()> {
        info!(
            subject,
            from = from_email.unwrap_or("webmaster@localhost"),
            recipients = ?recipients,
            bytes = message.len(),
            "📧 Mail handed to log backend"
        );
        Ok(())
    }
}
