use axum::extract::{Extension, Json, Query, State, rejection::JsonRejection};
use serde::Deserialize;
use serde_json::{Map, Value};

use audit::AuditLogger;
use auth_check::RequestContext;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::upstream::{UpstreamError, UpstreamOutcome};

#[derive(Debug, Default, Deserialize)]
pub struct ObjectQuery {
    pub id: Option<String>,
}

impl ObjectQuery {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }
}

/// Lists all objects, or fetches a single one when `?id=` is given.
///
/// # Arguments
/// * `ctx` - The caller's identity and client details, resolved by the middleware
/// * `query` - Optional object id
///
/// Returns the upstream JSON as is. One `OBJECT_ACCESSED` event is recorded
/// on success, carrying the number of objects returned.
pub async fn get_objects(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ObjectQuery>,
) -> ApiResult<Json<Value>> {
    let id = query.id();

    let outcome = match id {
        Some(id) => state.objects.get(id).await,
        None => state.objects.list().await,
    };
    let objects = settle(&state.audit, &ctx, id, outcome, "Failed to fetch objects")?;

    let object_count = match (id, &objects) {
        (Some(_), _) => Some(1),
        (None, Value::Array(items)) => Some(items.len()),
        (None, _) => None,
    };

    state.audit.log_object_access(ctx.user.as_ref(), id, object_count, &ctx.metadata);
    Ok(Json(objects))
}

/// Creates an object.
///
/// When a server annotation is configured it is appended to `data.description`
/// before the body is forwarded; the audit record keeps the body as the client sent it.
pub async fn create_object(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let forwarded_body = annotate(&body, state.server_annotation.as_deref());

    let outcome = state.objects.create(&forwarded_body).await;
    let created = settle(&state.audit, &ctx, None, outcome, "Failed to create object")?;

    let object_id = created.get("id").and_then(id_string);
    state
        .audit
        .log_object_created(ctx.user.as_ref(), object_id.as_deref(), &body, &ctx.metadata);

    Ok(Json(created))
}

/// Replaces the object given by `?id=`.
pub async fn update_object(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ObjectQuery>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Some(id) = query.id() else {
        return Err(ApiError::BadRequest("ID is required for update".to_string()));
    };
    let Json(body) = body?;

    let outcome = state.objects.update(id, &body).await;
    let updated = settle(&state.audit, &ctx, Some(id), outcome, "Failed to update object")?;

    state
        .audit
        .log_object_updated(ctx.user.as_ref(), Some(id), &body, &ctx.metadata);

    Ok(Json(updated))
}

/// Deletes the object given by `?id=`.
pub async fn delete_object(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    Query(query): Query<ObjectQuery>,
) -> ApiResult<Json<Value>> {
    let Some(id) = query.id() else {
        return Err(ApiError::BadRequest("ID is required for delete".to_string()));
    };

    let outcome = state.objects.delete(id).await;
    let deleted = settle(&state.audit, &ctx, Some(id), outcome, "Failed to delete object")?;

    state
        .audit
        .log_object_deleted(ctx.user.as_ref(), Some(id), &deleted, &ctx.metadata);

    Ok(Json(deleted))
}

/// Turns an upstream outcome into the handler's result.
///
/// Failures are audited here, exactly once; on success the caller records the
/// action specific event itself.
fn settle(
    audit: &AuditLogger,
    ctx: &RequestContext,
    object_id: Option<&str>,
    outcome: Result<UpstreamOutcome, UpstreamError>,
    client_message: &str,
) -> ApiResult<Value> {
    match outcome {
        Ok(UpstreamOutcome::Success(value)) => Ok(value),
        Ok(UpstreamOutcome::Failure(failure)) => {
            tracing::warn!(
                "Objects API answered {} for object {:?}: {}",
                failure.status,
                object_id,
                failure.message
            );
            audit.log_access_failure(
                ctx.user.as_ref(),
                object_id,
                &failure.message,
                failure.status.as_u16(),
                &ctx.metadata,
            );
            Err(ApiError::Upstream(failure))
        }
        Err(err) => {
            tracing::error!("Objects API call failed for object {:?}: {}", object_id, err);
            audit.log_system_error(ctx.user.as_ref(), object_id, &err.to_string(), &ctx.metadata);
            Err(ApiError::Internal(client_message.to_string()))
        }
    }
}

fn annotate(body: &Value, annotation: Option<&str>) -> Value {
    let mut body = body.clone();
    let Some(annotation) = annotation else {
        return body;
    };

    if let Value::Object(fields) = &mut body {
        let data = fields
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()));
        if !data.is_object() {
            *data = Value::Object(Map::new());
        }

        if let Value::Object(data) = data {
            let description = match data.get("description").and_then(Value::as_str) {
                Some(description) if !description.is_empty() => format!("{} - {}", description, annotation),
                _ => annotation.to_string(),
            };
            data.insert("description".to_string(), Value::String(description));
        }
    }

    body
}

fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
