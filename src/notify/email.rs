//! SMTP notifier.
//!
//! Configured entirely from the environment:
//! `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NOTIFY_EMAIL_FROM`,
//! `NOTIFY_EMAIL_TO` (comma-separated) and optionally
//! `NOTIFY_EMAIL_ADMIN` (comma-separated) for health alerts and reports.
//! Without `NOTIFY_EMAIL_ADMIN`, operational mail goes to the same list.

use anyhow::{anyhow, Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::{NotificationEvent, Notifier};

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
    admin_to: Vec<Mailbox>,
}

fn parse_mailboxes(raw: &str, what: &str) -> Result<Vec<Mailbox>> {
    let boxes = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Mailbox>().with_context(|| format!("invalid {what}: {s}")))
        .collect::<Result<Vec<_>>>()?;
    if boxes.is_empty() {
        return Err(anyhow!("{what} is empty"));
    }
    Ok(boxes)
}

impl EmailSender {
    /// `Ok(None)` when SMTP is simply not configured; `Err` when it is
    /// configured but broken.
    pub fn from_env() -> Result<Option<Self>> {
        let Ok(host) = std::env::var("SMTP_HOST") else {
            return Ok(None);
        };
        let user = std::env::var("SMTP_USER").context("SMTP_USER missing")?;
        let pass = std::env::var("SMTP_PASS").context("SMTP_PASS missing")?;
        let from_addr = std::env::var("NOTIFY_EMAIL_FROM").context("NOTIFY_EMAIL_FROM missing")?;
        let to_addr = std::env::var("NOTIFY_EMAIL_TO").context("NOTIFY_EMAIL_TO missing")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr
            .parse()
            .with_context(|| format!("invalid NOTIFY_EMAIL_FROM: {from_addr}"))?;
        let to = parse_mailboxes(&to_addr, "NOTIFY_EMAIL_TO")?;
        let admin_to = match std::env::var("NOTIFY_EMAIL_ADMIN") {
            Ok(raw) => parse_mailboxes(&raw, "NOTIFY_EMAIL_ADMIN")?,
            Err(_) => to.clone(),
        };

        Ok(Some(Self {
            mailer,
            from,
            to,
            admin_to,
        }))
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, ev: &NotificationEvent) -> Result<()> {
        let recipients = if ev.is_operational() {
            &self.admin_to
        } else {
            &self.to
        };

        let mut builder = Message::builder().from(self.from.clone());
        for mbx in recipients {
            builder = builder.to(mbx.clone());
        }
        let msg = builder
            .subject(ev.subject())
            .header(header::ContentType::TEXT_PLAIN)
            .body(ev.body())
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
