//! In-memory HTTP API used by the client integration tests.
//!
//! # Design
//! Two small surfaces share one router:
//! - a JSON widget store, where creating and deleting widgets needs Basic
//!   credentials ([`BASIC_USER`], [`BASIC_PASSWORD`]);
//! - an OAuth 1.0a provider with the usual three endpoints plus a protected
//!   `/me` resource. Every OAuth request must carry a valid HMAC-SHA1
//!   signature, recomputed here with [`signature`] over `http://{Host}{path}`.
//!   The provider also checks the consumer key, the tokens it issued and the
//!   verifier.
//!
//! `GET /oauth/authorize` stands in for the browser step: it approves the
//! temporary token at once and answers with the verifier as JSON.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::{debug, info};
use uuid::Uuid;

pub const BASIC_USER: &str = "admin";
pub const BASIC_PASSWORD: &str = "hunter2";
pub const CONSUMER_KEY: &str = "mock-consumer";
pub const CONSUMER_SECRET: &str = "mock-consumer-secret";

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

const OAUTH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

type HmacSha1 = Hmac<Sha1>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Widget {
    pub id: Uuid,
    pub name: String,
    pub size: i64,
    pub color: String,
}

#[derive(Deserialize)]
pub struct CreateWidget {
    pub name: String,
    pub size: i64,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_color() -> String {
    "grey".to_string()
}

#[derive(Deserialize)]
pub struct ListFilter {
    pub min_size: Option<i64>,
    pub color: Option<String>,
}

#[derive(Debug, Default)]
struct OAuthState {
    /// Temporary token to (secret, verifier once authorized).
    pending: HashMap<String, (String, Option<String>)>,
    /// Access token to secret.
    issued: HashMap<String, String>,
}

#[derive(Clone, Default)]
pub struct AppState {
    widgets: Arc<RwLock<HashMap<Uuid, Widget>>>,
    oauth: Arc<RwLock<OAuthState>>,
}

pub fn app() -> Router {
    Router::new()
        .route("/widgets", get(list_widgets).post(create_widget))
        .route("/widgets/{id}", get(get_widget).delete(delete_widget))
        .route("/oauth/request_token", post(request_token))
        .route("/oauth/authorize", get(authorize))
        .route("/oauth/access_token", post(access_token))
        .route("/me", get(me))
        .with_state(AppState::default())
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "mock server listening");
    }
    axum::serve(listener, app()).await
}

fn basic_authorized(headers: &HeaderMap) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded) else {
        return false;
    };
    decoded == format!("{BASIC_USER}:{BASIC_PASSWORD}").as_bytes()
}

pub fn percent_encode(value: &str) -> String {
    utf8_percent_encode(value, OAUTH_ENCODE_SET).to_string()
}

/// Parameters of an `Authorization: OAuth ...` header, percent-decoded.
pub fn oauth_params(headers: &HeaderMap) -> Option<HashMap<String, String>> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let params = value.strip_prefix("OAuth ")?;
    Some(
        params
            .split(',')
            .filter_map(|pair| {
                let (key, value) = pair.trim().split_once('=')?;
                let value = percent_decode_str(value.trim_matches('"')).decode_utf8_lossy();
                Some((key.to_string(), value.into_owned()))
            })
            .collect(),
    )
}

/// Base64 HMAC-SHA1 signature of a request. `url` has no query string;
/// query and form body pairs go into `params` with the protocol parameters.
pub fn signature(
    method: &str,
    url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Option<String> {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect();
    encoded.sort();
    let joined = encoded
        .iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let base = format!("{method}&{}&{}", percent_encode(url), percent_encode(&joined));

    let key = format!("{}&{}", percent_encode(consumer_secret), percent_encode(token_secret));
    let mut mac = HmacSha1::new_from_slice(key.as_bytes()).ok()?;
    mac.update(base.as_bytes());
    Some(STANDARD.encode(mac.finalize().into_bytes()))
}

fn signature_matches(
    method: &str,
    uri: &Uri,
    headers: &HeaderMap,
    oauth: &HashMap<String, String>,
    extra: &[(String, String)],
    token_secret: &str,
) -> bool {
    let Some(given) = oauth.get("oauth_signature") else {
        return false;
    };
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost")
        .to_ascii_lowercase();
    let url = format!("http://{host}{}", uri.path());
    let params: Vec<(String, String)> = oauth
        .iter()
        .filter(|(key, _)| key.as_str() != "oauth_signature" && key.as_str() != "realm")
        .map(|(key, value)| (key.clone(), value.clone()))
        .chain(extra.iter().cloned())
        .collect();
    let matches = signature(method, &url, &params, CONSUMER_SECRET, token_secret).as_deref() == Some(given.as_str());
    if !matches {
        debug!(%url, "oauth signature mismatch");
    }
    matches
}

fn form(body: String) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, FORM_CONTENT_TYPE)], body)
}

async fn list_widgets(State(state): State<AppState>, Query(filter): Query<ListFilter>) -> Json<Vec<Widget>> {
    let widgets = state.widgets.read().await;
    let mut matching: Vec<Widget> = widgets
        .values()
        .filter(|w| filter.min_size.is_none_or(|min| w.size >= min))
        .filter(|w| filter.color.as_ref().is_none_or(|color| &w.color == color))
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.name.cmp(&b.name));
    Json(matching)
}

async fn create_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CreateWidget>,
) -> Result<(StatusCode, Json<Widget>), StatusCode> {
    if !basic_authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let widget = Widget {
        id: Uuid::new_v4(),
        name: input.name,
        size: input.size,
        color: input.color,
    };
    debug!(id = %widget.id, "widget created");
    state.widgets.write().await.insert(widget.id, widget.clone());
    Ok((StatusCode::CREATED, Json(widget)))
}

async fn get_widget(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Widget>, StatusCode> {
    let widgets = state.widgets.read().await;
    widgets.get(&id).cloned().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn delete_widget(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StatusCode> {
    if !basic_authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let mut widgets = state.widgets.write().await;
    widgets.remove(&id).map(|_| StatusCode::NO_CONTENT).ok_or(StatusCode::NOT_FOUND)
}

async fn request_token(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
) -> Result<impl IntoResponse, StatusCode> {
    let params = oauth_params(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if params.get("oauth_consumer_key").map(String::as_str) != Some(CONSUMER_KEY)
        || !signature_matches("POST", &uri, &headers, &params, &[], "")
    {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let token = format!("tmp-{}", Uuid::new_v4().simple());
    let secret = format!("tmp-secret-{}", Uuid::new_v4().simple());
    state
        .oauth
        .write()
        .await
        .pending
        .insert(token.clone(), (secret.clone(), None));
    debug!(%token, "temporary credentials issued");
    let confirmed = params.contains_key("oauth_callback");
    Ok(form(format!(
        "oauth_token={token}&oauth_token_secret={secret}&oauth_callback_confirmed={confirmed}"
    )))
}

#[derive(Deserialize)]
pub struct AuthorizeQuery {
    pub oauth_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Authorization {
    pub oauth_token: String,
    pub oauth_verifier: String,
}

async fn authorize(
    State(state): State<AppState>,
    Query(query): Query<AuthorizeQuery>,
) -> Result<Json<Authorization>, StatusCode> {
    let mut oauth = state.oauth.write().await;
    let (_, verifier) = oauth.pending.get_mut(&query.oauth_token).ok_or(StatusCode::NOT_FOUND)?;
    let verifier = verifier
        .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
        .clone();
    Ok(Json(Authorization {
        oauth_token: query.oauth_token,
        oauth_verifier: verifier,
    }))
}

async fn access_token(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Form(body): Form<HashMap<String, String>>,
) -> Result<impl IntoResponse, StatusCode> {
    let params = oauth_params(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let token = params.get("oauth_token").ok_or(StatusCode::UNAUTHORIZED)?;
    let mut oauth = state.oauth.write().await;
    let (secret, expected) = match oauth.pending.get(token) {
        Some((secret, Some(verifier))) => (secret.clone(), verifier.clone()),
        _ => return Err(StatusCode::UNAUTHORIZED),
    };
    let signed_body: Vec<(String, String)> = body.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    if !signature_matches("POST", &uri, &headers, &params, &signed_body, &secret) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    if body.get("oauth_verifier") != Some(&expected) {
        return Ok(form("error=invalid_verifier".to_string()));
    }
    oauth.pending.remove(token);
    let access = format!("acc-{}", Uuid::new_v4().simple());
    let secret = format!("acc-secret-{}", Uuid::new_v4().simple());
    oauth.issued.insert(access.clone(), secret.clone());
    debug!(token = %access, "token credentials issued");
    Ok(form(format!("oauth_token={access}&oauth_token_secret={secret}")))
}

async fn me(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let params = oauth_params(&headers).ok_or(StatusCode::UNAUTHORIZED)?;
    let token = params.get("oauth_token").ok_or(StatusCode::UNAUTHORIZED)?;
    let Some(secret) = state.oauth.read().await.issued.get(token).cloned() else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    if !signature_matches("GET", &uri, &headers, &params, &query, &secret) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(Json(serde_json::json!({ "screen_name": "mock-user", "token": token })))
}
