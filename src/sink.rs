//! Outbound side of the chat protocol.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::assemble::MessageSection;

/// Handle to a sent message, used to retract it later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt(pub String);

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Reply to the triggering message with a short status line.
    async fn reply_status(&self, text: &str) -> Result<Receipt>;
    /// Schedule retraction; must not block the caller for `after`.
    async fn retract(&self, receipt: Receipt, after: Duration) -> Result<()>;
    async fn send_text(&self, text: &str) -> Result<()>;
    async fn send_forward(&self, sections: Vec<MessageSection>) -> Result<()>;
}

/// Prints replies to stdout. Sections are separated by a rule.
#[derive(Default)]
pub struct ConsoleSink {
    out: Mutex<()>,
}

impl ConsoleSink {
    pub fn new() -> Self { Self::default() }

    async fn write(&self, text: &str) -> Result<()> {
        let _g = self.out.lock().await;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

pub fn render_forward(sections: &[MessageSection]) -> String {
    let mut out = String::new();
    for s in sections {
        out.push_str("----\n");
        out.push_str(&s.render());
        if !out.ends_with('\n') { out.push('\n'); }
    }
    out
}

#[async_trait]
impl MessageSink for ConsoleSink {
    async fn reply_status(&self, text: &str) -> Result<Receipt> {
        let receipt = Receipt(uuid::Uuid::new_v4().to_string());
        self.write(&format!("> {text}\n")).await?;
        Ok(receipt)
    }

    async fn retract(&self, receipt: Receipt, after: Duration) -> Result<()> {
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            debug!(receipt = %receipt.0, "status message retracted");
        });
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.write(&format!("{text}\n")).await
    }

    async fn send_forward(&self, sections: Vec<MessageSection>) -> Result<()> {
        self.write(&render_forward(&sections)).await
    }
}
