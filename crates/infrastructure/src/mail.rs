use application::{MailError, Mailer, OutboundMail};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// 通过 HTTP 邮件中继发送
#[derive(Clone)]
pub struct HttpRelayMailer {
    client: reqwest::Client,
    relay_url: String,
    sender: String,
}

impl HttpRelayMailer {
    pub fn new(relay_url: impl Into<String>, sender: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url: relay_url.into(),
            sender: sender.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpRelayMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&RelayRequest {
                from: &self.sender,
                to: &mail.to,
                subject: &mail.subject,
                body: &mail.body,
            })
            .send()
            .await
            .map_err(|err| MailError::transport("mail relay request failed", err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MailError::Rejected(format!("{status}: {body}")));
        }

        info!(to = %mail.to, subject = %mail.subject, "邮件已提交到中继");
        Ok(())
    }
}

/// 未配置中继时使用，只写日志
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: OutboundMail) -> Result<(), MailError> {
        info!(to = %mail.to, subject = %mail.subject, "未配置邮件中继，仅记录邮件");
        Ok(())
    }
}
