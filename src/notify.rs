use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use crate::config::{Config, SmtpConfig};
use crate::models::DemoRequest;

/// Outbound notifications triggered by API writes.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn demo_requested(&self, request: &DemoRequest) -> anyhow::Result<()>;
}

/// Used when no SMTP relay is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn demo_requested(&self, request: &DemoRequest) -> anyhow::Result<()> {
        tracing::info!(
            demo_request_id = %request.id,
            school = %request.school,
            "demo request received (smtp not configured, email skipped)"
        );
        Ok(())
    }
}

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpNotifier {
    pub fn new(cfg: &SmtpConfig) -> anyhow::Result<Self> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.host)?.port(cfg.port);
        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from: cfg.from.parse()?,
            to: cfg.notify_to.parse()?,
        })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn demo_requested(&self, request: &DemoRequest) -> anyhow::Result<()> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(demo_request_subject(request))
            .header(ContentType::TEXT_PLAIN);
        if let Ok(reply_to) = request.email.parse::<Mailbox>() {
            builder = builder.reply_to(reply_to);
        }
        let email = builder.body(demo_request_body(request))?;
        self.transport.send(email).await?;
        tracing::info!(demo_request_id = %request.id, "demo request email sent");
        Ok(())
    }
}

pub fn from_config(config: &Config) -> anyhow::Result<Arc<dyn Notifier>> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpNotifier::new(smtp)?)),
        None => Ok(Arc::new(LogNotifier)),
    }
}

pub fn demo_request_subject(request: &DemoRequest) -> String {
    format!("New demo request: {}", request.school)
}

pub fn demo_request_body(request: &DemoRequest) -> String {
    let mut lines = vec![
        "A new demo request was submitted.".to_string(),
        String::new(),
        format!("Name: {}", request.name),
        format!("Email: {}", request.email),
        format!("School: {}", request.school),
    ];
    if let Some(role) = request.role.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Role: {role}"));
    }
    if let Some(phone) = request.phone.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Phone: {phone}"));
    }
    if let Some(message) = request.message.as_deref().filter(|s| !s.is_empty()) {
        lines.push(String::new());
        lines.push(message.to_string());
    }
    lines.push(String::new());
    lines.push(format!("Submitted at {}", request.created_at));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DemoRequest {
        DemoRequest {
            id: "d1".into(),
            name: "Rosa Quispe".into(),
            email: "rosa@colegio.pe".into(),
            school: "Colegio Andino".into(),
            role: Some("Director".into()),
            phone: None,
            message: Some("We have 400 students.".into()),
            status: "pending".into(),
            created_at: "2024-03-01T10:00:00+00:00".into(),
        }
    }

    #[test]
    fn body_lists_contact_fields_and_skips_empty_ones() {
        let body = demo_request_body(&sample());
        assert!(body.contains("Name: Rosa Quispe"));
        assert!(body.contains("School: Colegio Andino"));
        assert!(body.contains("Role: Director"));
        assert!(!body.contains("Phone:"));
        assert!(body.contains("We have 400 students."));
        assert_eq!(demo_request_subject(&sample()), "New demo request: Colegio Andino");
    }

    #[tokio::test]
    async fn log_notifier_never_fails() {
        LogNotifier.demo_requested(&sample()).await.expect("log");
    }
}
