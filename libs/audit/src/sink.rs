use std::io::Write;
use std::sync::Mutex;

use aws_sdk_sqs::Client;

use crate::{AUDIT_LOG_LABEL, AuditEvent};

/// Destination for serialized audit events.
///
/// `emit` is called on the request path and must not block on network I/O.
pub trait AuditSink: Send + Sync {
    fn emit(&self, serialized_event: &str);
}

pub fn format_audit_line(serialized_event: &str) -> String {
    format!("{} {}", AUDIT_LOG_LABEL, serialized_event)
}

/// Writes `AUDIT_LOG: {...}` lines to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink;

impl AuditSink for StdoutSink {
    fn emit(&self, serialized_event: &str) {
        let mut stdout = std::io::stdout().lock();
        // nowhere left to report a broken stdout
        let _ = writeln!(stdout, "{}", format_audit_line(serialized_event));
    }
}

/// Forwards events to the audit SQS queue on a background task.
#[derive(Debug, Clone)]
pub struct QueueSink {
    client: Client,
    queue_url: String,
}

impl QueueSink {
    pub fn new(client: Client, queue_url: impl Into<String>) -> Self {
        QueueSink {
            client,
            queue_url: queue_url.into(),
        }
    }

    /// Loads AWS credentials and region from the environment.
    pub async fn from_env(queue_url: impl Into<String>) -> Self {
        let client = Client::new(&aws_config::load_from_env().await);
        QueueSink::new(client, queue_url)
    }
}

impl AuditSink for QueueSink {
    fn emit(&self, serialized_event: &str) {
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!("No tokio runtime available, audit event not forwarded to queue");
                return;
            }
        };

        let client = self.client.clone();
        let queue_url = self.queue_url.clone();
        let message_body = serialized_event.to_owned();

        runtime.spawn(async move {
            let result = client
                .send_message()
                .queue_url(&queue_url)
                .message_body(message_body)
                .send()
                .await;

            if let Err(err) = result {
                tracing::error!("Failed to forward audit event to queue: {}", err);
            }
        });
    }
}

/// Keeps emitted events in memory. Used by tests to assert on audit output.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Serialized events in emission order, without the log label.
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Emitted events parsed back; lines that fail to parse are skipped.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lines()
            .iter()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect()
    }
}

impl AuditSink for MemorySink {
    fn emit(&self, serialized_event: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(serialized_event.to_owned());
    }
}
