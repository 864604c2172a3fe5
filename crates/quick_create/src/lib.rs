//! Quick-create workflow controller.
//!
//! An edit form can suspend itself to create a missing related record and
//! resume once that record is saved. Suspended edits are kept as a stack of
//! [`Frame`]s in a per-session slot, so quick-creates can nest. The host
//! admin calls the hooks below at fixed points of its own request lifecycle:
//!
//! - [`prepare_edit`] at the top of every edit action,
//! - [`after_list`] once a list action knows its type,
//! - [`after_index`] when the bare index of a module is requested,
//! - [`after_save`] right after a record is persisted.
//!
//! Hooks never redirect on their own. They hand back a [`Redirect`] that the
//! host must send instead of doing any further work for the request; any
//! stack change is persisted before the redirect is returned.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use shared::{
    domain::{EntityType, RecordId, RecordRef, SessionId},
    error::{ApiError, ErrorCode},
    naming::{default_module, form_key, trigger_parameter, QUICK_CREATED_MARKER},
    params::{FormRequest, Method, Parameters},
    protocol::{FieldSpec, Frame, WorkflowState},
};
use tracing::{debug, info, warn};

mod navigator;
mod registry;

pub use navigator::{Navigator, RouteNavigator};
pub use registry::{AccessorRegistry, RecordAccessor};

const EDIT_ACTION: &str = "edit";

/// Durable per-session home of the stack.
#[async_trait]
pub trait StackStore: Send + Sync {
    /// Returns the session's stack, empty when nothing was stored.
    async fn load(&self, session: &SessionId) -> Result<WorkflowState>;
    /// Replaces the session's stack. Saving an empty stack clears the slot.
    async fn save(&self, session: &SessionId, state: &WorkflowState) -> Result<()>;
}

#[derive(Clone)]
pub struct QuickCreateContext {
    pub store: Arc<dyn StackStore>,
    pub accessors: AccessorRegistry,
    pub navigator: Arc<dyn Navigator>,
}

/// An HTTP redirect the host must issue in place of the rest of the request.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub url: String,
}

/// Result of [`prepare_edit`].
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `render_form == true`: render the edit form as usual.
    /// `render_form == false`: the request was rewritten into a form
    /// submission; process it instead of rendering.
    Continue { render_form: bool },
    Redirect(Redirect),
}

impl Outcome {
    pub const RENDER_FORM: Outcome = Outcome::Continue { render_form: true };
    pub const PROCESS_SUBMISSION: Outcome = Outcome::Continue { render_form: false };
}

/// Entry hook of every edit action for `admin_type`.
///
/// Starts a quick-create when the request carries the trigger parameter of
/// one of `field_specs`, resumes the suspended edit when it carries the
/// `quick-created` marker, and otherwise leaves the request alone.
pub async fn prepare_edit(
    ctx: &QuickCreateContext,
    session: &SessionId,
    admin_type: &EntityType,
    field_specs: &[FieldSpec],
    request: &mut FormRequest,
) -> Result<Outcome, ApiError> {
    for spec in field_specs {
        let field = spec.field();
        if !request.has(&trigger_parameter(&field)) {
            continue;
        }

        let redirect = redirect_to(ctx, &format!("{}/{EDIT_ACTION}", spec.module()), &[])?;
        let mut state = load_stack(ctx, session).await?;
        state.push(Frame::new(
            admin_type.clone(),
            spec.entity_type.clone(),
            field.clone(),
            request.get_all(),
        ));
        save_stack(ctx, session, &state).await?;
        info!(
            %session,
            %admin_type,
            related_type = %spec.entity_type,
            %field,
            depth = state.depth(),
            "quick create started"
        );
        return Ok(Outcome::Redirect(redirect));
    }

    if request.has(QUICK_CREATED_MARKER) {
        return resume_edit(ctx, session, admin_type, request).await;
    }

    Ok(Outcome::RENDER_FORM)
}

async fn resume_edit(
    ctx: &QuickCreateContext,
    session: &SessionId,
    admin_type: &EntityType,
    request: &mut FormRequest,
) -> Result<Outcome, ApiError> {
    let mut state = load_stack(ctx, session).await?;
    let depth = state.depth();
    let popped = state.pop();

    let Some(frame) = popped.filter(|frame| &frame.admin_type == admin_type) else {
        // A frame for another type means the user navigated away mid-workflow.
        // Every pending frame is dropped, not just the top one.
        state.clear();
        save_stack(ctx, session, &state).await?;
        info!(%session, %admin_type, abandoned = depth, "quick create abandoned on mismatched resume");
        return Ok(Outcome::RENDER_FORM);
    };
    save_stack(ctx, session, &state).await?;

    let mut parameters = frame.parameters.clone();
    match resolve_related(ctx, &frame).await? {
        Some(record) => {
            inject_related_id(&mut parameters, &form_key(admin_type), &frame.field, record.id);
            info!(
                %session,
                %admin_type,
                related_type = %frame.related_type,
                field = %frame.field,
                id = %record.id,
                depth = state.depth(),
                "quick create resumed"
            );
        }
        None => {
            debug!(
                %session,
                %admin_type,
                related_type = %frame.related_type,
                "related record not found; resuming without it"
            );
        }
    }

    request.replace_all(parameters);
    request.set_method(Method::Post);
    Ok(Outcome::PROCESS_SUBMISSION)
}

/// Hook run by a list action of `related_type`.
///
/// When the top frame is waiting on `related_type`, returns the redirect back
/// to the suspended edit. The stack is left untouched.
pub async fn after_list(
    ctx: &QuickCreateContext,
    session: &SessionId,
    related_type: &EntityType,
) -> Result<Option<Redirect>, ApiError> {
    let state = load_stack(ctx, session).await?;
    let Some(frame) = state.peek().filter(|frame| &frame.related_type == related_type) else {
        return Ok(None);
    };

    let redirect = resume_redirect(ctx, frame)?;
    debug!(%session, %related_type, url = %redirect.url, "list returns to suspended edit");
    Ok(Some(redirect))
}

/// Hook run when the index of `related_type` is requested directly.
///
/// Reaching an index page abandons every pending quick-create.
pub async fn after_index(
    ctx: &QuickCreateContext,
    session: &SessionId,
    related_type: &EntityType,
) -> Result<(), ApiError> {
    let mut state = load_stack(ctx, session).await?;
    if !state.is_active() {
        return Ok(());
    }

    let abandoned = state.depth();
    state.clear();
    save_stack(ctx, session, &state).await?;
    info!(%session, %related_type, abandoned, "quick create abandoned on index");
    Ok(())
}

/// Hook run after `saved` was persisted.
///
/// When the top frame is waiting on the saved record's type, records its id on
/// that frame and returns the redirect back to the suspended edit. Saves of
/// any other type leave the stack untouched.
pub async fn after_save(
    ctx: &QuickCreateContext,
    session: &SessionId,
    saved: &RecordRef,
) -> Result<Option<Redirect>, ApiError> {
    let mut state = load_stack(ctx, session).await?;
    let Some(frame) = state
        .peek()
        .filter(|frame| frame.related_type == saved.entity_type)
    else {
        return Ok(None);
    };

    let redirect = resume_redirect(ctx, frame)?;
    state.set_id(saved.id);
    save_stack(ctx, session, &state).await?;
    debug!(
        %session,
        related_type = %saved.entity_type,
        id = %saved.id,
        url = %redirect.url,
        "save satisfies pending quick create"
    );
    Ok(Some(redirect))
}

/// Whether a quick-create workflow is in progress for the session.
pub async fn active(ctx: &QuickCreateContext, session: &SessionId) -> Result<bool, ApiError> {
    Ok(load_stack(ctx, session).await?.is_active())
}

async fn load_stack(ctx: &QuickCreateContext, session: &SessionId) -> Result<WorkflowState, ApiError> {
    ctx.store.load(session).await.map_err(storage)
}

async fn save_stack(
    ctx: &QuickCreateContext,
    session: &SessionId,
    state: &WorkflowState,
) -> Result<(), ApiError> {
    ctx.store.save(session, state).await.map_err(storage)
}

async fn resolve_related(ctx: &QuickCreateContext, frame: &Frame) -> Result<Option<RecordRef>, ApiError> {
    let Some(id) = frame.id else {
        return Ok(None);
    };
    let Some(accessor) = ctx.accessors.get(&frame.related_type) else {
        warn!(related_type = %frame.related_type, "no record accessor registered");
        return Ok(None);
    };
    accessor.retrieve_by_primary_key(id).await.map_err(storage)
}

fn inject_related_id(parameters: &mut Parameters, form_key: &str, field: &str, id: RecordId) {
    let slot = parameters
        .entry(form_key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(fields) = slot {
        fields.insert(field.to_string(), Value::String(id.to_string()));
    }
}

/// Redirect back to the action the frame was suspended from, with the resume marker.
fn resume_redirect(ctx: &QuickCreateContext, frame: &Frame) -> Result<Redirect, ApiError> {
    let module = frame
        .module()
        .map(str::to_string)
        .unwrap_or_else(|| default_module(&frame.admin_type));
    let action = frame.action().unwrap_or(EDIT_ACTION);
    redirect_to(ctx, &format!("{module}/{action}"), &[(QUICK_CREATED_MARKER, "1")])
}

fn redirect_to(ctx: &QuickCreateContext, route: &str, query: &[(&str, &str)]) -> Result<Redirect, ApiError> {
    let url = ctx.navigator.build_url(route, query).map_err(navigation)?;
    Ok(Redirect { url })
}

fn storage(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Storage, format!("{err:#}"))
}

fn navigation(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Navigation, format!("{err:#}"))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
