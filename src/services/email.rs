//! Notification mail over SMTP
//!
//! Sent best effort: callers log failures and carry on. Without an SMTP host
//! the mailer is disabled and every send is a no-op.

use crate::config::MailConfig;
use crate::models::{format_sek, FormSubmission, Order};
use anyhow::{anyhow, Result};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

pub struct Mailer {
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    notify_to: Option<Mailbox>,
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .map_err(|e| anyhow!("Invalid mail.from address '{}': {}", config.from, e))?;
        let notify_to = config
            .notify_to
            .as_deref()
            .map(|addr| addr.parse::<Mailbox>().map_err(|e| anyhow!("Invalid mail.notify_to '{}': {}", addr, e)))
            .transpose()?;

        let transport = match config.smtp_host.as_deref().filter(|h| !h.is_empty()) {
            Some(host) => {
                let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(host)
                    .map_err(|e| anyhow!("Failed to create SMTP transport: {}", e))?
                    .port(config.smtp_port);
                if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
                    builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
                }
                Some(builder.build())
            }
            None => None,
        };

        Ok(Self { transport, from, notify_to })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    async fn send(&self, message: Message) -> Result<()> {
        let Some(transport) = &self.transport else {
            return Ok(());
        };
        transport.send(message).await.map_err(|e| anyhow!("Failed to send email: {}", e))?;
        Ok(())
    }

    /// Tell the site owner about a new contact form submission
    pub async fn notify_submission(&self, submission: &FormSubmission) -> Result<()> {
        let Some(to) = &self.notify_to else {
            return Ok(());
        };
        self.send(self.submission_message(submission, to.clone())?).await
    }

    fn submission_message(&self, s: &FormSubmission, to: Mailbox) -> Result<Message> {
        let reply_to: Mailbox = s.email.parse().map_err(|e| anyhow!("Invalid submitter address: {}", e))?;
        let body = format!(
            "Nytt meddelande via formuläret \"{}\".\n\nNamn: {}\nE-post: {}\nTelefon: {}\nFöretag: {}\n\n{}\n",
            s.form_name,
            s.name,
            s.email,
            s.phone.as_deref().unwrap_or("-"),
            s.company.as_deref().unwrap_or("-"),
            s.message,
        );

        Message::builder()
            .from(self.from.clone())
            .reply_to(reply_to)
            .to(to)
            .subject(format!("Nytt formulärmeddelande från {}", s.name))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }

    /// Order receipt to the customer
    pub async fn send_order_confirmation(&self, to: &str, order: &Order) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        self.send(self.order_message(to, order)?).await
    }

    fn order_message(&self, to: &str, order: &Order) -> Result<Message> {
        let to: Mailbox = to.parse().map_err(|e| anyhow!("Invalid customer address: {}", e))?;
        let lines: Vec<String> = order
            .items
            .iter()
            .map(|i| format!("{} x {}  {}", i.quantity, i.product_name, format_sek(i.line_total())))
            .collect();
        let body = format!(
            "Tack för din beställning!\n\nOrder #{}\n\n{}\n\nTotalt: {}\n\nLeveransadress:\n{}\n{}\n{} {}\n",
            order.id,
            lines.join("\n"),
            format_sek(order.total_ore),
            order.shipping_recipient,
            order.shipping_street,
            order.shipping_postal_code,
            order.shipping_city,
        );

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(format!("Orderbekräftelse #{}", order.id))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| anyhow!("Failed to build email: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderItem, OrderStatus, SubmissionStatus};
    use chrono::Utc;

    fn submission() -> FormSubmission {
        FormSubmission {
            id: 1,
            form_name: "kontakt".into(),
            name: "Anna".into(),
            email: "anna@kund.se".into(),
            phone: None,
            company: Some("Kund AB".into()),
            message: "Hej".into(),
            campaign_variant_id: None,
            status: SubmissionStatus::New,
            remote_ip: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_disabled_without_host() {
        let mailer = Mailer::from_config(&MailConfig::default()).unwrap();
        assert!(!mailer.is_enabled());
    }

    #[test]
    fn test_invalid_from_rejected() {
        let config = MailConfig { from: "inte en adress".into(), ..Default::default() };
        assert!(Mailer::from_config(&config).is_err());
    }

    #[test]
    fn test_submission_message_headers() {
        let mailer = Mailer::from_config(&MailConfig::default()).unwrap();
        let message = mailer
            .submission_message(&submission(), "info@firma.se".parse().unwrap())
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Reply-To: anna@kund.se"));
        assert!(raw.contains("To: info@firma.se"));
    }

    #[test]
    fn test_order_message_builds() {
        let mailer = Mailer::from_config(&MailConfig::default()).unwrap();
        let order = Order {
            id: 7,
            user_id: 1,
            status: OrderStatus::Pending,
            total_ore: 39800,
            currency: "SEK".into(),
            shipping_recipient: "Anna".into(),
            shipping_street: "Storgatan 1".into(),
            shipping_postal_code: "111 22".into(),
            shipping_city: "Stockholm".into(),
            shipping_country: "SE".into(),
            items: vec![OrderItem {
                id: 1,
                order_id: 7,
                product_id: Some(3),
                product_name: "Termos".into(),
                unit_price_ore: 19900,
                quantity: 2,
            }],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let raw = String::from_utf8(mailer.order_message("anna@kund.se", &order).unwrap().formatted()).unwrap();
        assert!(raw.contains("To: anna@kund.se"));
    }

    #[tokio::test]
    async fn test_send_is_noop_when_disabled() {
        let mailer = Mailer::from_config(&MailConfig::default()).unwrap();
        mailer.notify_submission(&submission()).await.unwrap();
    }
}
