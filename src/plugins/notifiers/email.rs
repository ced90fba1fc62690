use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::EmailConfig;
use crate::plugins::traits::{NotificationResult, NotifierPlugin, PriceDropEvent};

pub struct EmailNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

impl EmailNotifier {
    /// Returns `Ok(None)` when SMTP is not configured, and an error when it is
    /// configured but unusable (bad address, bad relay).
    pub fn from_config(config: &EmailConfig) -> Result<Option<Self>, Box<dyn std::error::Error + Send + Sync>> {
        let (Some(host), Some(from_address), Some(to_address)) =
            (&config.smtp_host, &config.from_address, &config.to_address)
        else {
            return Ok(None);
        };

        let from = Mailbox::new(Some(config.from_name.clone()), from_address.parse::<Address>()?);
        let to = Mailbox::new(None, to_address.parse::<Address>()?);

        let mut builder = if config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        }
        .port(config.smtp_port);

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Some(Self {
            transport: builder.build(),
            from,
            to,
        }))
    }

    fn format_subject(&self, event: &PriceDropEvent) -> String {
        format!("🔔 Price Drop: {} - {}", event.product_name, event.new_price)
    }

    fn format_text_body(&self, event: &PriceDropEvent) -> String {
        let mut text = format!(
            "Price drop for {}\n\nOld price: {}\nNew price: {}\nChange: {}\n",
            event.product_name, event.old_price, event.new_price, event.difference
        );
        if let Some(lowest) = &event.lowest_price {
            text.push_str(&format!("Lowest recorded: {}\n", lowest));
        }
        text.push_str(&format!("\n{}\n", event.url));
        text
    }

    fn format_html_body(&self, event: &PriceDropEvent) -> String {
        let mut html = format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background: #f0f0f0; padding: 15px; border-radius: 5px; }}
        .product {{ font-size: 18px; font-weight: bold; }}
        .change {{ margin: 15px 0; padding: 10px; border-radius: 5px; background: #e8f5e8; border-left: 4px solid #4CAF50; }}
        .button {{ display: inline-block; padding: 8px 15px; text-decoration: none; border-radius: 3px; background: #007cba; color: white; }}
    </style>
</head>
<body>
    <div class="header">
        <div class="product">{name}</div>
    </div>
    <div class="change">
        <strong>Change:</strong> {old} → {new}<br>
        <strong>Difference:</strong> {difference}
"#,
            name = escape_html(&event.product_name),
            old = escape_html(&event.old_price),
            new = escape_html(&event.new_price),
            difference = escape_html(&event.difference),
        );

        if let Some(lowest) = &event.lowest_price {
            html.push_str(&format!("        <br><strong>Lowest recorded:</strong> {}\n", escape_html(lowest)));
        }
        html.push_str("    </div>\n");

        if let Some(image_url) = &event.image_url {
            html.push_str(&format!(
                "    <img src=\"{}\" alt=\"\" style=\"max-width: 200px;\">\n",
                escape_html(image_url)
            ));
        }

        html.push_str(&format!(
            "    <p><a class=\"button\" href=\"{}\">View product</a></p>\n</body>\n</html>\n",
            escape_html(&event.url)
        ));
        html
    }

    fn build_message(&self, event: &PriceDropEvent) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(self.format_subject(event))
            .multipart(MultiPart::alternative_plain_html(
                self.format_text_body(event),
                self.format_html_body(event),
            ))?;
        Ok(message)
    }
}

#[async_trait]
impl NotifierPlugin for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn plugin_type(&self) -> &str {
        "email"
    }

    fn description(&self) -> &str {
        "Sends price drop emails over SMTP"
    }

    async fn notify(&self, event: &PriceDropEvent) -> Result<NotificationResult, Box<dyn std::error::Error + Send + Sync>> {
        let message = self.build_message(event)?;
        let response = self.transport.send(message).await?;

        let message_id = response.message().next().map(str::to_string);
        tracing::debug!("Email notification sent for {}", event.url);
        Ok(NotificationResult::sent(message_id))
    }

    async fn test_connection(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.transport.test_connection().await?)
    }

    async fn shutdown(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}
