//! SSE feed: real-time knowledge events
//!
//! Each connected client holds a dedicated receiver on the notification hub
//! (the channel analogue of a persistent listen connection, separate from the
//! transactional pool). Routing: `public` events reach every client,
//! `private` events only the matching tenant. A keep-alive ping goes out
//! every 25 seconds so idle-connection proxies don't drop the stream; a
//! client disconnect simply drops the receiver - no cleanup errors to raise.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::auth::resolve_x_api_key;
use crate::errors::ApiError;
use crate::state::AppState;

/// Keep-alive interval for idle connections
const PING_INTERVAL: Duration = Duration::from_secs(25);

/// GET /api/v1/stream/feed
pub async fn feed(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // Tenant comes from the credential; never from query parameters
    let caller = resolve_x_api_key(&state, &headers).await?;
    let tenant_id = caller.auth.tenant_id;

    info!("SSE: client connected for tenant {tenant_id}");
    let receiver = state.hub.subscribe();

    let stream = futures::stream::unfold(
        (receiver, tenant_id),
        |(mut receiver, tenant_id)| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        let visible_as = if event.is_public {
                            "public"
                        } else if event.tenant_id == tenant_id {
                            "private"
                        } else {
                            // Another tenant's private event: skip silently
                            continue;
                        };

                        let data = serde_json::to_string(&event).unwrap_or_default();
                        let sse_event = Event::default().event(visible_as).data(data);
                        return Some((Ok(sse_event), (receiver, tenant_id)));
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("SSE: subscriber for {tenant_id} lagged, skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("SSE: hub closed, ending stream for {tenant_id}");
                        return None;
                    }
                }
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(PING_INTERVAL).text("ping")))
}
