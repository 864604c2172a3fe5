use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Method as HttpMethod, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use quick_create::{
    active, after_index, after_list, after_save, prepare_edit, Navigator, Outcome, RouteNavigator,
};
use serde_json::Map;
use shared::{
    domain::{RecordRef, SessionId},
    error::{ApiError, ErrorCode},
    params::{FormRequest, Method},
};
use storage::Storage;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::form_urlencoded;

mod admin;
mod app_state;
mod config;
mod render;
mod session;

use admin::{AdminEntities, AdminEntity};
use app_state::AppState;
use config::{load_settings, prepare_database_url, public_base_url};
use render::RelationChoices;
use session::BrowserSession;

const MAX_FORM_BYTES: usize = 64 * 1024;

type HttpError = (StatusCode, Json<ApiError>);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let navigator = RouteNavigator::new(&public_base_url(&settings))?;
    let entities = AdminEntities::from_config(&settings.entities);

    let state = AppState::new(storage, entities, navigator);
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "admin listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/:module", get(index))
        .route("/:module/index", get(index))
        .route("/:module/list", get(list))
        .route("/:module/edit", get(edit).post(edit))
        .layer(RequestBodyLimitLayer::new(MAX_FORM_BYTES))
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, HttpError> {
    state.storage.health_check().await.map_err(|e| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::new(ErrorCode::Storage, e.to_string())),
        )
    })?;
    Ok("ok")
}

/// Bare index of a module. Reaching it abandons any quick-create in progress.
async fn index(
    State(state): State<Arc<AppState>>,
    Path(module): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let session = BrowserSession::from_headers(&headers);
    let entity = entity_for(&state, &module)?;

    after_index(&state.quick_create, &session.id, &entity.entity_type)
        .await
        .map_err(api_error)?;
    let page = list_page(&state, entity, &session.id).await?;
    Ok(session.attach(page))
}

async fn list(
    State(state): State<Arc<AppState>>,
    Path(module): Path<String>,
    headers: HeaderMap,
) -> Result<Response, HttpError> {
    let session = BrowserSession::from_headers(&headers);
    let entity = entity_for(&state, &module)?;

    if let Some(redirect) = after_list(&state.quick_create, &session.id, &entity.entity_type)
        .await
        .map_err(api_error)?
    {
        return Ok(session.attach(Redirect::to(&redirect.url).into_response()));
    }
    let page = list_page(&state, entity, &session.id).await?;
    Ok(session.attach(page))
}

async fn edit(
    State(state): State<Arc<AppState>>,
    Path(module): Path<String>,
    method: HttpMethod,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response, HttpError> {
    let session = BrowserSession::from_headers(&headers);
    let entity = entity_for(&state, &module)?;

    let mut request = form_request(&method, query.as_deref(), &body);
    request.set("module", entity.module.clone());
    request.set("action", "edit");

    let outcome = prepare_edit(
        &state.quick_create,
        &session.id,
        &entity.entity_type,
        &entity.relations,
        &mut request,
    )
    .await
    .map_err(api_error)?;

    let response = match outcome {
        Outcome::Redirect(redirect) => Redirect::to(&redirect.url).into_response(),
        Outcome::Continue { render_form: true } if request.method() == Method::Get => {
            edit_page(&state, entity, &session.id, &request).await?
        }
        Outcome::Continue { .. } => save_submission(&state, entity, &session.id, &request).await?,
    };
    Ok(session.attach(response))
}

fn form_request(method: &HttpMethod, query: Option<&str>, body: &[u8]) -> FormRequest {
    let method = if *method == HttpMethod::POST {
        Method::Post
    } else {
        Method::Get
    };
    let body: &[u8] = if method == Method::Post { body } else { &[] };
    let query_pairs = form_urlencoded::parse(query.unwrap_or_default().as_bytes());
    let body_pairs = form_urlencoded::parse(body);
    FormRequest::from_pairs(method, query_pairs.chain(body_pairs))
}

async fn list_page(
    state: &AppState,
    entity: &AdminEntity,
    session: &SessionId,
) -> Result<Response, HttpError> {
    let records = state
        .storage
        .list_records(&entity.entity_type)
        .await
        .map_err(internal)?;
    let workflow_active = active(&state.quick_create, session)
        .await
        .map_err(api_error)?;
    let chrome = state.chrome(workflow_active);
    Ok(Html(render::list_page(entity, &records, &chrome)).into_response())
}

async fn edit_page(
    state: &AppState,
    entity: &AdminEntity,
    session: &SessionId,
    request: &FormRequest,
) -> Result<Response, HttpError> {
    let id = AdminEntity::record_id(request);
    let values = match id {
        Some(id) => {
            state
                .storage
                .load_record(&entity.entity_type, id)
                .await
                .map_err(internal)?
                .ok_or_else(|| not_found(format!("{} #{id} not found", entity.entity_type)))?
                .fields
        }
        None => Map::new(),
    };

    let mut relations = Vec::with_capacity(entity.relations.len());
    for spec in &entity.relations {
        let records = state
            .storage
            .list_records(&spec.entity_type)
            .await
            .map_err(internal)?;
        relations.push(RelationChoices { spec, records });
    }

    let workflow_active = active(&state.quick_create, session)
        .await
        .map_err(api_error)?;
    let chrome = state.chrome(workflow_active);
    Ok(Html(render::edit_page(entity, id, &values, &relations, &chrome)).into_response())
}

/// Persists a submitted edit form, then lets a pending quick-create claim the save.
async fn save_submission(
    state: &AppState,
    entity: &AdminEntity,
    session: &SessionId,
    request: &FormRequest,
) -> Result<Response, HttpError> {
    let fields = entity.submitted_fields(request);
    let id = match AdminEntity::record_id(request) {
        Some(id) => {
            let updated = state
                .storage
                .update_record(&entity.entity_type, id, &fields)
                .await
                .map_err(internal)?;
            if !updated {
                return Err(not_found(format!("{} #{id} not found", entity.entity_type)));
            }
            id
        }
        None => state
            .storage
            .insert_record(&entity.entity_type, &fields)
            .await
            .map_err(internal)?,
    };
    info!(entity_type = %entity.entity_type, %id, "record saved");

    let saved = RecordRef::new(entity.entity_type.clone(), id);
    if let Some(redirect) = after_save(&state.quick_create, session, &saved)
        .await
        .map_err(api_error)?
    {
        return Ok(Redirect::to(&redirect.url).into_response());
    }

    let navigator = &state.quick_create.navigator;
    let id_param = id.to_string();
    let url = if request.has("save_and_list") {
        navigator.build_url(&format!("{}/list", entity.module), &[])
    } else {
        navigator.build_url(&format!("{}/edit", entity.module), &[("id", id_param.as_str())])
    }
    .map_err(|e| api_error(ApiError::new(ErrorCode::Navigation, e.to_string())))?;
    Ok(Redirect::to(&url).into_response())
}

fn entity_for<'a>(state: &'a AppState, module: &str) -> Result<&'a AdminEntity, HttpError> {
    state
        .entities
        .by_module(module)
        .ok_or_else(|| not_found(format!("unknown admin module '{module}'")))
}

fn api_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Storage | ErrorCode::Navigation | ErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(err))
}

fn internal(err: anyhow::Error) -> HttpError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, err.to_string())),
    )
}

fn not_found(message: String) -> HttpError {
    (
        StatusCode::NOT_FOUND,
        Json(ApiError::new(ErrorCode::NotFound, message)),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
