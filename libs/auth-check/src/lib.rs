mod claims;
mod context;
mod session;

use std::sync::Arc;

use axum::{
    extract::{
        Request,
        State,
    },
    middleware::Next,
    response::Response,
};

pub use claims::{TokenDecodeError, UNKNOWN_USER, decode_id_token_claims, parse_groups, user_context_from_claims};
pub use context::{RequestContext, UNKNOWN_IP, get_request_metadata, get_user_context};
pub use session::{HttpSessionFetcher, NoSessionFetcher, SessionError, SessionFetcher, SessionTokens};

// tower middleware that resolves who is calling, and from where, before the handler runs.
// Unlike a login gate it never rejects: anonymous requests carry `user: None` and the
// handlers decide what that means. Handlers read the result as `Extension<RequestContext>`.

pub async fn user_context_middleware(
    State(fetcher): State<Arc<dyn SessionFetcher>>,
    mut req: Request,
    next: Next,
) -> Response {
    let user = get_user_context(fetcher.as_ref(), req.headers()).await;
    let metadata = get_request_metadata(req.headers());

    req.extensions_mut().insert(RequestContext { user, metadata });

    next.run(req).await
}
