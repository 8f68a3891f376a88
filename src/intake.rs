//! Message intake over newline-delimited JSON.
//!
//! One message is in flight at a time: a line is read, handed to the
//! [`PairingHandler`], and acknowledged by writing the reply line. Replies are
//! acknowledged whether or not they carry an error; only an infrastructure
//! failure (reading input, writing a checkpoint, writing the reply) stops the
//! loop before acknowledgment.

use crate::error::PairingError;
use crate::protocol::PairingHandler;
use crate::store::MemoryStore;
use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::future::Future;
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tracing::{debug, info};

/// A message taken off the input, not yet acknowledged.
#[derive(Debug)]
pub struct Delivery {
    pub sequence: u64,
    /// Decoded message, or the reply to send when the line was not JSON.
    pub message: std::result::Result<Value, Value>,
}

pub struct LineIntake<R, W> {
    lines: Lines<R>,
    writer: W,
    sequence: u64,
}

impl<R, W> LineIntake<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            lines: reader.lines(),
            writer,
            sequence: 0,
        }
    }

    /// Next non-blank line, or `None` at end of input.
    pub async fn next(&mut self) -> Result<Option<Delivery>> {
        loop {
            let Some(line) = self.lines.next_line().await.context("reading message")? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            self.sequence += 1;
            let message = serde_json::from_str::<Value>(&line).map_err(|err| {
                PairingError::invalid("", format!("message is not valid JSON: {err}")).to_reply()
            });
            return Ok(Some(Delivery {
                sequence: self.sequence,
                message,
            }));
        }
    }

    /// Write the reply line for `delivery`.
    pub async fn acknowledge(&mut self, delivery: &Delivery, reply: &Value) -> Result<()> {
        let header = delivery.message.as_ref().ok().and_then(|msg| msg.get("header"));
        let field = |name: &str| {
            header
                .and_then(|header| header.get(name))
                .cloned()
                .unwrap_or(Value::Null)
        };
        let line = json!({
            "sequence": delivery.sequence,
            "requestId": field("requestId"),
            "deviceId": field("deviceId"),
            "reply": reply,
        });
        let mut encoded = serde_json::to_vec(&line).context("encoding reply")?;
        encoded.push(b'\n');
        self.writer
            .write_all(&encoded)
            .await
            .context("writing reply")?;
        self.writer.flush().await.context("flushing reply")?;
        Ok(())
    }

    pub fn into_writer(self) -> W {
        self.writer
    }
}

/// Store snapshot written after each message, before it is acknowledged.
pub struct Checkpoint {
    pub store: MemoryStore,
    pub path: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IntakeStats {
    pub processed: u64,
    pub errors: u64,
}

pub struct IntakeLoop<'a> {
    handler: &'a PairingHandler,
    checkpoint: Option<Checkpoint>,
}

impl<'a> IntakeLoop<'a> {
    pub fn new(handler: &'a PairingHandler) -> Self {
        Self {
            handler,
            checkpoint: None,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: Checkpoint) -> Self {
        self.checkpoint = Some(checkpoint);
        self
    }

    /// Drain `intake` until end of input or until `shutdown` resolves. The
    /// shutdown signal is only observed between messages; a shutdown future
    /// that resolves to an error stops the loop with that error.
    pub async fn run<R, W, S>(
        &self,
        intake: &mut LineIntake<R, W>,
        shutdown: S,
    ) -> Result<IntakeStats>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: Future<Output = Result<()>>,
    {
        tokio::pin!(shutdown);
        let mut stats = IntakeStats::default();
        loop {
            let delivery = tokio::select! {
                biased;
                signalled = &mut shutdown => {
                    signalled.context("waiting for shutdown signal")?;
                    info!("shutdown requested; stopping intake");
                    break;
                }
                next = intake.next() => match next? {
                    Some(delivery) => delivery,
                    None => break,
                },
            };

            let reply = match &delivery.message {
                Ok(message) => self.handler.handle(message).await,
                Err(reply) => reply.clone(),
            };
            if let Some(checkpoint) = &self.checkpoint {
                checkpoint
                    .store
                    .save(&checkpoint.path)
                    .await
                    .context("checkpointing store before acknowledgment")?;
            }
            intake.acknowledge(&delivery, &reply).await?;

            stats.processed += 1;
            if reply.get("errorCode").is_some() {
                stats.errors += 1;
            }
            debug!(sequence = delivery.sequence, "acknowledged message");
        }
        info!(
            processed = stats.processed,
            errors = stats.errors,
            "intake finished"
        );
        Ok(stats)
    }
}
