//! JSON API and navigation routes.
//!
//! - `POST /api/v1/login/{portal}`          role login (user, admin, super_admin)
//! - `POST /api/v1/logout`                  end the session, land on `/login`
//! - `GET  /api/v1/wizard`                  current wizard position and step data
//! - `POST /api/v1/wizard/{command}`        advance, retreat, submit, reset
//! - `PUT  /api/v1/wizard/steps/{step}`     merge fields into one step
//! - `GET  /api/v1/wizard/summary`          read-only summary once submitted
//! - `GET  /*`                              guarded navigation (200 or 303)

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use stonequote_core::flows::StepFields;
use stonequote_core::{
    AppContext, ApplicationError, CredentialVerifier, Credentials, Identity, InterfaceError,
    LoginPortal, MemoryStorage, QuoteStep, RoleLoginFlow, Role, Screen, WizardCommand,
    WizardOutcome, WizardSnapshot,
};
use tokio::sync::MutexGuard;
use tracing::{info, warn};
use uuid::Uuid;

use crate::contexts::{context_cookie, context_id_from_headers, ContextRegistry, SharedContext};

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone)]
pub struct ApiState {
    pub contexts: ContextRegistry,
    pub verifier: Arc<dyn CredentialVerifier>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub redirect: &'static str,
    pub identity: Identity,
    pub user_type: LoginPortal,
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub redirect: &'static str,
}

#[derive(Debug, Serialize)]
pub struct WizardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<WizardOutcome>,
    pub wizard: WizardSnapshot,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub user_type: LoginPortal,
}

#[derive(Debug, Serialize)]
pub struct ScreenResponse {
    pub screen: Screen,
    pub location: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wizard: Option<WizardSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub user_message: &'static str,
    pub correlation_id: String,
}

pub struct ApiError(InterfaceError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorBody {
            error: self.0.message().to_string(),
            user_message: self.0.user_message(),
            correlation_id: self.0.correlation_id().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// One request's view of its browser context.
struct Browser {
    id: Uuid,
    context: SharedContext,
    issued: bool,
    correlation_id: String,
}

impl Browser {
    async fn open(state: &ApiState, headers: &HeaderMap) -> Self {
        let correlation_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.trim().is_empty())
            .map(str::to_owned)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let (id, context, issued) = state.contexts.open(context_id_from_headers(headers)).await;
        Self { id, context, issued, correlation_id }
    }

    /// Locks the context with this request's correlation id in place, so
    /// audit events raised under the lock name this request.
    async fn lock(&self) -> MutexGuard<'_, AppContext<MemoryStorage>> {
        let mut context = self.context.lock().await;
        context.set_correlation_id(self.correlation_id.clone());
        context
    }

    fn error(&self, error: ApplicationError) -> ApiError {
        if let Some(class) = error.failure_class() {
            info!(
                event_name = "server.request.failed",
                failure_class = class.as_str(),
                correlation_id = %self.correlation_id,
                context_id = %self.id,
                error = %error,
                "request refused"
            );
        }
        ApiError(error.into_interface(self.correlation_id.clone()))
    }

    fn bad_request(&self, message: impl Into<String>) -> ApiError {
        ApiError(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: self.correlation_id.clone(),
        })
    }

    fn conflict(&self, message: impl Into<String>) -> ApiError {
        ApiError(InterfaceError::Conflict {
            message: message.into(),
            correlation_id: self.correlation_id.clone(),
        })
    }

    /// Attaches the context cookie when this request created the context.
    fn finish<R: IntoResponse>(self, response: R) -> Response {
        let mut response = response.into_response();
        if self.issued {
            if let Some(cookie) = context_cookie(self.id) {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
        }
        response
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/login/{portal}", post(login))
        .route("/api/v1/logout", post(logout))
        .route("/api/v1/wizard", get(wizard_state))
        .route("/api/v1/wizard/summary", get(wizard_summary))
        .route("/api/v1/wizard/steps/{step}", put(record_step))
        .route("/api/v1/wizard/{command}", post(wizard_command))
        .fallback(navigate)
        .with_state(state)
}

async fn login(
    State(state): State<ApiState>,
    Path(portal): Path<String>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let portal = match portal.parse::<LoginPortal>() {
        Ok(portal) => portal,
        Err(error) => {
            let error = browser.bad_request(error.to_string());
            return browser.finish(error);
        }
    };

    let result = RoleLoginFlow::new(portal, state.verifier.as_ref())
        .correlated(browser.correlation_id.clone())
        .submit(browser.context.as_ref(), Credentials::new(body.email, body.password))
        .await;

    match result {
        Ok(success) => {
            let response = LoginResponse {
                redirect: success.navigation.location,
                identity: success.identity,
                user_type: success.user_type,
            };
            browser.finish(Json(response))
        }
        Err(error) => {
            let error = browser.error(ApplicationError::from(error));
            browser.finish(error)
        }
    }
}

async fn logout(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let result = browser.lock().await.logout();
    match result {
        Ok(outcome) => browser.finish(Json(LogoutResponse { redirect: outcome.location })),
        Err(error) => {
            warn!(
                event_name = "server.logout.storage_failed",
                correlation_id = %browser.correlation_id,
                error = %error,
                "session storage could not be cleared"
            );
            let error = browser.error(ApplicationError::from(error));
            browser.finish(error)
        }
    }
}

async fn wizard_state(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let result = browser.lock().await.quotation().map(|wizard| wizard.snapshot());
    match result {
        Ok(wizard) => browser.finish(Json(WizardResponse { outcome: None, wizard })),
        Err(error) => {
            let error = browser.error(error);
            browser.finish(error)
        }
    }
}

async fn wizard_command(
    State(state): State<ApiState>,
    Path(command): Path<String>,
    headers: HeaderMap,
) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let command = match command.as_str() {
        "advance" => WizardCommand::Advance,
        "retreat" => WizardCommand::Retreat,
        "submit" => WizardCommand::Submit,
        "reset" => WizardCommand::Reset,
        other => {
            let error = browser.bad_request(format!("unknown wizard command `{other}`"));
            return browser.finish(error);
        }
    };
    apply(browser, command).await
}

async fn record_step(
    State(state): State<ApiState>,
    Path(step): Path<String>,
    headers: HeaderMap,
    Json(fields): Json<StepFields>,
) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let step = match step.parse::<QuoteStep>() {
        Ok(step) => step,
        Err(error) => {
            let error = browser.bad_request(error.to_string());
            return browser.finish(error);
        }
    };
    apply(browser, WizardCommand::Record { step, fields }).await
}

async fn apply(browser: Browser, command: WizardCommand) -> Response {
    let result = {
        let mut context = browser.lock().await;
        context
            .apply_wizard(command)
            .map(|outcome| WizardResponse { outcome: Some(outcome), wizard: context.wizard().snapshot() })
    };
    match result {
        Ok(response) => browser.finish(Json(response)),
        Err(error) => {
            let error = browser.error(error);
            browser.finish(error)
        }
    }
}

async fn wizard_summary(State(state): State<ApiState>, headers: HeaderMap) -> Response {
    let browser = Browser::open(&state, &headers).await;
    let result = browser.lock().await.quotation().map(|wizard| wizard.summary());
    match result {
        Ok(Some(summary)) => browser.finish(Json(summary)),
        Ok(None) => {
            let error = browser.conflict("quotation has not been submitted".to_string());
            browser.finish(error)
        }
        Err(error) => {
            let error = browser.error(error);
            browser.finish(error)
        }
    }
}

async fn navigate(
    State(state): State<ApiState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let browser = Browser::open(&state, &headers).await;
    let target = uri.path_and_query().map(|value| value.as_str()).unwrap_or_else(|| uri.path());

    let response = {
        let mut context = browser.lock().await;
        let outcome = context.navigate(target);
        if outcome.is_redirect() {
            (StatusCode::SEE_OTHER, [(header::LOCATION, outcome.location)], Json(outcome))
                .into_response()
        } else {
            let session = context.session().map(|session| SessionView {
                email: session.identity.email.clone(),
                display_name: session.identity.display_name().to_string(),
                role: session.role(),
                user_type: session.user_type,
            });
            let wizard = (outcome.screen == Screen::Quotation).then(|| context.wizard().snapshot());
            Json(ScreenResponse { screen: outcome.screen, location: outcome.location, session, wizard })
                .into_response()
        }
    };
    browser.finish(response)
}
