//! API route handlers for the gateway.
//!
//! Every response uses the envelope `{"status": true, "data": ...}` or
//! `{"status": false, "message": ...}`. Failure messages are generic; the
//! underlying error only goes to the log.

use axum::extract::{Form, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use scorehall_core::error::ScoreHallError;
use scorehall_core::types::{Identity, Role, TenantBilling};
use scorehall_platform::auth::session_cookie;

use super::server::AppState;

/// Error returned by handlers; renders as the failure envelope.
pub struct ApiError(ScoreHallError);

impl From<ScoreHallError> for ApiError {
    fn from(err: ScoreHallError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.status_code();
        if code >= 500 {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::debug!("request rejected ({code}): {}", self.0);
        }
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({ "status": false, "message": self.0.public_message() }));
        (status, body).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn success(data: Value) -> ApiResult {
    Ok(Json(json!({ "status": true, "data": data })))
}

/// Run store work off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> scorehall_core::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ScoreHallError::Database(format!("blocking task failed: {e}")))?
        .map_err(ApiError::from)
}

fn request_host(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find_map(|cookie| session_cookie(cookie).map(str::to_string))
}

/// Resolve the caller, requiring an admin on the admin pseudo-tenant.
async fn require_admin(state: &Arc<AppState>, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let (token, host) = (session_token(headers), request_host(headers));
    let platform = state.platform.clone();
    let identity = blocking(move || platform.viewer().resolve(token.as_deref(), &host)).await?;

    if !identity.is_admin_tenant() {
        return Err(ScoreHallError::not_found("admin API on a tenant host").into());
    }
    identity.require_role(Role::Admin)?;
    Ok(identity)
}

/// Wipe every tenant and recreate the registry.
pub async fn initialize(State(state): State<Arc<AppState>>) -> ApiResult {
    let platform = state.platform.clone();
    blocking(move || platform.reset()).await?;
    success(json!({ "lang": "rust" }))
}

#[derive(Debug, Deserialize)]
pub struct TenantsAddForm {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

/// Register a tenant and create its store.
pub async fn tenants_add(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<TenantsAddForm>,
) -> ApiResult {
    require_admin(&state, &headers).await?;

    let platform = state.platform.clone();
    let tenant =
        blocking(move || platform.provision_tenant(&form.name, &form.display_name)).await?;

    success(json!({ "tenant": TenantBilling::unbilled(&tenant) }))
}

#[derive(Debug, Deserialize)]
pub struct BillingQuery {
    pub before: Option<String>,
}

/// Billing cursor. Absent, empty and `0` all mean "from the newest tenant".
fn parse_before(raw: Option<&str>) -> Result<Option<i64>, ScoreHallError> {
    match raw {
        None | Some("") => Ok(None),
        Some(v) => match v.parse::<i64>() {
            Ok(0) => Ok(None),
            Ok(id) => Ok(Some(id)),
            Err(e) => Err(ScoreHallError::validation(format!(
                "failed to parse query parameter 'before={v}': {e}"
            ))),
        },
    }
}

/// One page of per-tenant billing, id descending.
pub async fn tenants_billing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<BillingQuery>,
) -> ApiResult {
    let host = request_host(&headers);
    if host.split(':').next() != Some(state.admin_hostname.as_str()) {
        return Err(ScoreHallError::not_found(format!("billing requested on host {host}")).into());
    }
    require_admin(&state, &headers).await?;
    let before = parse_before(query.before.as_deref())?;

    let platform = state.platform.clone();
    let tenants = blocking(move || platform.billing().report(before)).await?;
    success(json!({ "tenants": tenants }))
}

/// Who the caller is. Failed authentication is not an error here; it is
/// reported as role `none`.
pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> ApiResult {
    let (token, host) = (session_token(&headers), request_host(&headers));
    let platform = state.platform.clone();

    let data = blocking(move || {
        let tenant = platform.viewer().tenant_from_host(&host)?;
        let tenant_json = json!({ "name": tenant.name, "display_name": tenant.display_name });
        let anonymous = json!({ "tenant": tenant_json, "me": null, "role": Role::None, "logged_in": false });

        let identity = match platform.viewer().resolve(token.as_deref(), &host) {
            Ok(identity) => identity,
            Err(ScoreHallError::Authentication(reason)) => {
                tracing::debug!("anonymous /api/me: {reason}");
                return Ok(anonymous);
            }
            Err(e) => return Err(e),
        };

        if identity.role != Role::Player {
            return Ok(json!({
                "tenant": tenant_json,
                "me": null,
                "role": identity.role,
                "logged_in": true,
            }));
        }

        let shard = platform.shards().open(identity.tenant_id)?;
        let Some(player) = shard.retrieve_player(&identity.subject)? else {
            return Ok(anonymous);
        };
        Ok(json!({
            "tenant": tenant_json,
            "me": {
                "id": player.id,
                "display_name": player.display_name,
                "is_disqualified": player.is_disqualified,
            },
            "role": identity.role,
            "logged_in": true,
        }))
    })
    .await?;

    success(data)
}
