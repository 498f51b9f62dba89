use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use shared_database::{ChangeEvent, ChangeKind, PortalContext, Subscription};
use shared_models::auth::Role;
use shared_models::error::AppError;
use shared_utils::extractor::Actor;

use crate::models::{AccessRequest, RequestAccessBody, VisibilityQuery, ACCESS_REQUESTS_TABLE};
use crate::services::{AccessControlService, AccessRequestView};

fn service(ctx: &PortalContext) -> AccessControlService {
    AccessControlService::new(ctx.store.clone())
}

#[axum::debug_handler]
pub async fn request_access(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Json(body): Json<RequestAccessBody>,
) -> Result<(StatusCode, Json<AccessRequest>), AppError> {
    let request = service(&ctx)
        .request_access(&actor, &body.patient_id, body.request_type)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

#[axum::debug_handler]
pub async fn pending_requests(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let requests = service(&ctx)
        .pending_for_patient(actor.id(), Some(&actor.token))
        .await?;

    Ok(Json(json!({
        "requests": requests,
        "total": requests.len()
    })))
}

#[axum::debug_handler]
pub async fn approve_request(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Result<Json<AccessRequest>, AppError> {
    Ok(Json(service(&ctx).approve(&actor, &request_id).await?))
}

#[axum::debug_handler]
pub async fn reject_request(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Path(request_id): Path<String>,
) -> Result<Json<AccessRequest>, AppError> {
    Ok(Json(service(&ctx).reject(&actor, &request_id).await?))
}

#[axum::debug_handler]
pub async fn check_visibility(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Path(patient_id): Path<String>,
    Query(query): Query<VisibilityQuery>,
) -> Json<Value> {
    let visible = service(&ctx)
        .check_visibility(actor.id(), &patient_id, query.resource, Some(&actor.token))
        .await;

    Json(json!({
        "patient_id": patient_id,
        "resource": query.resource,
        "visible": visible
    }))
}

#[axum::debug_handler]
pub async fn doctor_board(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Json<Value>, AppError> {
    let patients = service(&ctx).doctor_board(actor.id(), Some(&actor.token)).await?;

    Ok(Json(json!({
        "patients": patients,
        "total": patients.len()
    })))
}

#[axum::debug_handler]
pub async fn patient_records(
    State(ctx): State<PortalContext>,
    actor: Actor,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let records = service(&ctx)
        .patient_records(actor.id(), &patient_id, Some(&actor.token))
        .await?;
    Ok(Json(json!(records)))
}

/// Server-sent access state for the caller. The stream opens with a
/// `snapshot` event, then sends one `access_request` event per change that
/// involves the caller, carrying the change and the updated snapshot.
/// Dropping the response stream drops the feed subscription with it.
pub async fn live_updates(
    State(ctx): State<PortalContext>,
    actor: Actor,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    // Subscribe before reading so nothing written in between is missed.
    let subscription = ctx.feed.subscribe(&[ACCESS_REQUESTS_TABLE]);
    let view = service(&ctx).live_view(&actor).await?;
    debug!(
        "Live access stream {} opened for {} with {} request(s)",
        subscription.id(),
        actor.id(),
        view.len()
    );

    let live = LiveStream {
        subscription,
        view,
        caller: actor.id().to_string(),
        role: actor.role,
    };
    let opening: Option<Result<Event, Infallible>> = match Event::default()
        .event("snapshot")
        .json_data(live.view.snapshot_for(&live.caller, live.role))
    {
        Ok(event) => Some(Ok(event)),
        Err(e) => {
            warn!("Could not encode opening snapshot for {}: {}", live.caller, e);
            None
        }
    };

    let updates = stream::unfold(live, |mut live| async move {
        loop {
            let change = live.subscription.next().await?;
            if !live.involves(&change) || !live.view.apply(&change) {
                continue;
            }
            let snapshot = live.view.snapshot_for(&live.caller, live.role);
            let payload = json!({ "change": change, "snapshot": snapshot });
            match Event::default().event("access_request").json_data(payload) {
                Ok(event) => return Some((Ok(event), live)),
                Err(e) => warn!("Dropping unserializable change {}: {}", change.row_id, e),
            }
        }
    });

    Ok(Sse::new(stream::iter(opening).chain(updates)).keep_alive(KeepAlive::default()))
}

struct LiveStream {
    subscription: Subscription,
    view: AccessRequestView,
    caller: String,
    role: Role,
}

impl LiveStream {
    /// Deletes carry no row image, so they only count for requests the
    /// view already holds.
    fn involves(&self, change: &ChangeEvent) -> bool {
        match change.kind {
            ChangeKind::Delete => self.view.contains(&change.row_id),
            ChangeKind::Insert | ChangeKind::Update => change.row.as_ref().is_some_and(|row| {
                ["doctor_id", "patient_id"]
                    .iter()
                    .any(|column| row.get(*column).and_then(Value::as_str) == Some(self.caller.as_str()))
            }),
        }
    }
}
