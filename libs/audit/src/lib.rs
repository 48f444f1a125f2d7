mod sink;

use std::fmt;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use sink::{AuditSink, MemorySink, QueueSink, StdoutSink, format_audit_line};

/// Label every audit line starts with, so log pipelines can pick them out of stdout.
pub const AUDIT_LOG_LABEL: &str = "AUDIT_LOG:";

/// Service tag stamped on events when nothing else is configured.
pub const DEFAULT_SERVICE: &str = "objects-api";

/// User id recorded when an action happens without an identified user.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Action specific payload of an audit event.
pub type Details = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    ObjectAccessed,
    ObjectCreated,
    ObjectUpdated,
    ObjectDeleted,
    ObjectAccessFailed,
    ObjectAccessError,
}

/// Identity of the user behind a single request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub user_id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Client details of a single request, as seen through the proxy headers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub user_agent: Option<String>,
    pub ip_address: String,
    /// Correlation id supplied by the caller, if any.
    pub request_id: Option<String>,
}

/// One emitted audit record. Serialized as a single line of camelCase JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub timestamp: String,
    pub action: AuditAction,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_groups: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(default)]
    pub details: Details,
    pub service: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Optional parts of an audit event.
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub object_id: Option<String>,
    pub details: Details,
    pub request_id: Option<String>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl AuditOptions {
    /// Options carrying the client details of the request.
    pub fn from_metadata(metadata: &RequestMetadata) -> Self {
        AuditOptions {
            object_id: None,
            details: Details::new(),
            request_id: metadata.request_id.clone(),
            user_agent: metadata.user_agent.clone(),
            ip_address: Some(metadata.ip_address.clone()),
        }
    }

    pub fn with_object_id(mut self, object_id: Option<&str>) -> Self {
        self.object_id = object_id.map(str::to_owned);
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_owned(), value.into());
        self
    }
}

/// Generates a correlation id for grouping the log lines of one operation.
///
/// Not meant to be a secret, only unique enough to tell requests apart.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Builds audit events and hands them to the configured sinks.
///
/// The logger holds no mutable state; cloning it is cheap and every request
/// handler may call it concurrently.
#[derive(Clone)]
pub struct AuditLogger {
    service: String,
    sinks: Arc<[Arc<dyn AuditSink>]>,
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("service", &self.service)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        AuditLogger::new(DEFAULT_SERVICE)
    }
}

impl AuditLogger {
    /// Logger writing to stdout only.
    pub fn new(service: impl Into<String>) -> Self {
        AuditLogger::with_sinks(service, vec![Arc::new(StdoutSink)])
    }

    pub fn with_sinks(service: impl Into<String>, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        let service = service.into();
        let service = if service.trim().is_empty() {
            DEFAULT_SERVICE.to_string()
        } else {
            service
        };

        AuditLogger {
            service,
            sinks: sinks.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Assembles the event without emitting it.
    pub fn build_event(
        &self,
        action: AuditAction,
        user_context: Option<&UserContext>,
        options: AuditOptions,
    ) -> AuditEvent {
        let user_id = user_context
            .map(|user| user.user_id.as_str())
            .filter(|user_id| !user_id.is_empty())
            .unwrap_or(ANONYMOUS_USER)
            .to_string();

        let request_id = options
            .request_id
            .filter(|request_id| !request_id.trim().is_empty())
            .unwrap_or_else(generate_request_id);

        AuditEvent {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            action,
            user_id,
            user_email: user_context.and_then(|user| user.email.clone()),
            user_groups: user_context.map(|user| user.groups.clone()),
            object_id: options.object_id,
            details: options.details,
            service: self.service.clone(),
            request_id,
            user_agent: options.user_agent,
            ip_address: options.ip_address,
        }
    }

    /// Emits one audit event to every sink. Never fails towards the caller.
    pub fn log_event(
        &self,
        action: AuditAction,
        user_context: Option<&UserContext>,
        options: AuditOptions,
    ) {
        let event = self.build_event(action, user_context, options);

        let serialized_event = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(err) => {
                tracing::error!("Failed to serialize {:?} audit event: {}", action, err);
                return;
            }
        };

        for sink in self.sinks.iter() {
            sink.emit(&serialized_event);
        }
    }

    pub fn log_object_access(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        object_count: Option<usize>,
        metadata: &RequestMetadata,
    ) {
        let mut options = AuditOptions::from_metadata(metadata).with_object_id(object_id);
        if let Some(count) = object_count {
            options = options.with_detail("objectCount", count);
        }
        self.log_event(AuditAction::ObjectAccessed, user_context, options);
    }

    pub fn log_object_created(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        request_body: &Value,
        metadata: &RequestMetadata,
    ) {
        let options = object_change_options(object_id, request_body, metadata);
        self.log_event(AuditAction::ObjectCreated, user_context, options);
    }

    pub fn log_object_updated(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        request_body: &Value,
        metadata: &RequestMetadata,
    ) {
        let options = object_change_options(object_id, request_body, metadata);
        self.log_event(AuditAction::ObjectUpdated, user_context, options);
    }

    pub fn log_object_deleted(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        deleted_object: &Value,
        metadata: &RequestMetadata,
    ) {
        let options = AuditOptions::from_metadata(metadata)
            .with_object_id(object_id)
            .with_detail("deletedObject", deleted_object.clone());
        self.log_event(AuditAction::ObjectDeleted, user_context, options);
    }

    /// The upstream answered with a well-formed error response.
    pub fn log_access_failure(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        error: &str,
        status: u16,
        metadata: &RequestMetadata,
    ) {
        let options = AuditOptions::from_metadata(metadata)
            .with_object_id(object_id)
            .with_detail("error", error)
            .with_detail("status", status);
        self.log_event(AuditAction::ObjectAccessFailed, user_context, options);
    }

    /// The call never produced a usable upstream response.
    pub fn log_system_error(
        &self,
        user_context: Option<&UserContext>,
        object_id: Option<&str>,
        error: &str,
        metadata: &RequestMetadata,
    ) {
        let options = AuditOptions::from_metadata(metadata)
            .with_object_id(object_id)
            .with_detail("error", error);
        self.log_event(AuditAction::ObjectAccessError, user_context, options);
    }
}

fn object_change_options(
    object_id: Option<&str>,
    request_body: &Value,
    metadata: &RequestMetadata,
) -> AuditOptions {
    let mut options = AuditOptions::from_metadata(metadata).with_object_id(object_id);
    if let Some(name) = request_body.get("name") {
        options = options.with_detail("name", name.clone());
    }
    options.with_detail("originalRequest", request_body.clone())
}
