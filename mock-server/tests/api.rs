use axum::http::{self, Request, StatusCode};
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use mock_server::{
    app, percent_encode, signature, Authorization, Widget, BASIC_PASSWORD, BASIC_USER, CONSUMER_KEY, CONSUMER_SECRET,
};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes: bytes::Bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn basic() -> String {
    format!("Basic {}", STANDARD.encode(format!("{BASIC_USER}:{BASIC_PASSWORD}")))
}

fn create_request(body: &str, authorization: Option<&str>) -> Request<String> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/widgets")
        .header(http::header::CONTENT_TYPE, "application/json");
    if let Some(value) = authorization {
        builder = builder.header(http::header::AUTHORIZATION, value);
    }
    builder.body(body.to_string()).unwrap()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

fn oauth_post(uri: &str, header: &str, body: &str) -> Request<String> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(http::header::AUTHORIZATION, header)
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(body.to_string())
        .unwrap()
}

/// `OAuth ...` header for `method path` signed with `consumer_secret` and
/// `token_secret`. `extra` holds the protocol parameters beyond the
/// consumer key; `body` pairs are signed but not sent in the header.
fn oauth_header(
    method: &str,
    path: &str,
    extra: &[(&str, &str)],
    body: &[(&str, &str)],
    consumer_secret: &str,
    token_secret: &str,
) -> String {
    let mut protocol: Vec<(String, String)> = [
        ("oauth_consumer_key", CONSUMER_KEY),
        ("oauth_nonce", "n0nce"),
        ("oauth_signature_method", "HMAC-SHA1"),
        ("oauth_timestamp", "1700000000"),
        ("oauth_version", "1.0"),
    ]
    .iter()
    .chain(extra)
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let mut signed = protocol.clone();
    signed.extend(body.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let url = format!("http://localhost{path}");
    let sig = signature(method, &url, &signed, consumer_secret, token_secret).unwrap();
    protocol.push(("oauth_signature".to_string(), sig));
    let pairs = protocol
        .iter()
        .map(|(k, v)| format!(r#"{}="{}""#, percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("OAuth {pairs}")
}

fn with_authorization(uri: &str, header: &str) -> Request<String> {
    Request::builder()
        .uri(uri)
        .header(http::header::AUTHORIZATION, header)
        .body(String::new())
        .unwrap()
}

fn form_value(body: &str, key: &str) -> Option<String> {
    body.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

// --- widgets ---

#[tokio::test]
async fn list_widgets_empty() {
    let resp = app().oneshot(get("/widgets")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let widgets: Vec<Widget> = body_json(resp).await;
    assert!(widgets.is_empty());
}

#[tokio::test]
async fn create_widget_requires_basic_auth() {
    let resp = app()
        .oneshot(create_request(r#"{"name":"gear","size":3}"#, None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_then_filter_widgets() {
    let app = app();
    let auth = basic();
    let resp = app
        .clone()
        .oneshot(create_request(r#"{"name":"gear","size":3,"color":"red"}"#, Some(&auth)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let gear: Widget = body_json(resp).await;
    assert_eq!(gear.color, "red");

    app.clone()
        .oneshot(create_request(r#"{"name":"bolt","size":1}"#, Some(&auth)))
        .await
        .unwrap();

    let resp = app.clone().oneshot(get("/widgets?min_size=2")).await.unwrap();
    let widgets: Vec<Widget> = body_json(resp).await;
    assert_eq!(widgets, vec![gear.clone()]);

    let resp = app.clone().oneshot(get("/widgets?color=grey")).await.unwrap();
    let widgets: Vec<Widget> = body_json(resp).await;
    assert_eq!(widgets.len(), 1);
    assert_eq!(widgets[0].name, "bolt");

    let resp = app.oneshot(get(&format!("/widgets/{}", gear.id))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched: Widget = body_json(resp).await;
    assert_eq!(fetched, gear);
}

#[tokio::test]
async fn delete_widget_lifecycle() {
    let app = app();
    let auth = basic();
    let resp = app
        .clone()
        .oneshot(create_request(r#"{"name":"gear","size":3}"#, Some(&auth)))
        .await
        .unwrap();
    let gear: Widget = body_json(resp).await;
    let uri = format!("/widgets/{}", gear.id);

    let delete = |authorization: Option<&str>| {
        let mut builder = Request::builder().method("DELETE").uri(&uri);
        if let Some(value) = authorization {
            builder = builder.header(http::header::AUTHORIZATION, value);
        }
        builder.body(String::new()).unwrap()
    };

    let resp = app.clone().oneshot(delete(None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let resp = app.clone().oneshot(delete(Some(&auth))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let resp = app.clone().oneshot(delete(Some(&auth))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let resp = app.oneshot(get(&uri)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_widget_invalid_uuid_returns_400() {
    let resp = app().oneshot(get("/widgets/not-a-uuid")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- oauth ---

#[tokio::test]
async fn request_token_rejects_unknown_consumer() {
    let header = r#"OAuth oauth_consumer_key="someone-else", oauth_signature="x""#;
    let resp = app()
        .oneshot(oauth_post("/oauth/request_token", header, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn request_token_rejects_bad_signature() {
    let header = oauth_header("POST", "/oauth/request_token", &[], &[], "not-the-secret", "");
    let resp = app()
        .oneshot(oauth_post("/oauth/request_token", &header, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let header = oauth_header("POST", "/oauth/request_token", &[], &[], CONSUMER_SECRET, "");
    let resp = app()
        .oneshot(oauth_post("/oauth/request_token", &header, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn three_legged_flow() {
    let app = app();

    let callback = [("oauth_callback", "https://app.example/cb")];
    let header = oauth_header("POST", "/oauth/request_token", &callback, &[], CONSUMER_SECRET, "");
    let resp = app
        .clone()
        .oneshot(oauth_post("/oauth/request_token", &header, ""))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[http::header::CONTENT_TYPE],
        "application/x-www-form-urlencoded"
    );
    let body = body_text(resp).await;
    assert_eq!(form_value(&body, "oauth_callback_confirmed").as_deref(), Some("true"));
    let temporary = form_value(&body, "oauth_token").unwrap();
    let temporary_secret = form_value(&body, "oauth_token_secret").unwrap();

    let resp = app
        .clone()
        .oneshot(get(&format!("/oauth/authorize?oauth_token={temporary}")))
        .await
        .unwrap();
    let authorization: Authorization = body_json(resp).await;
    assert_eq!(authorization.oauth_token, temporary);

    let token = [("oauth_token", temporary.as_str())];
    let wrong = [("oauth_verifier", "wrong")];
    let leg = oauth_header("POST", "/oauth/access_token", &token, &wrong, CONSUMER_SECRET, &temporary_secret);
    let resp = app
        .clone()
        .oneshot(oauth_post("/oauth/access_token", &leg, "oauth_verifier=wrong"))
        .await
        .unwrap();
    assert_eq!(form_value(&body_text(resp).await, "error").as_deref(), Some("invalid_verifier"));

    let verifier = [("oauth_verifier", authorization.oauth_verifier.as_str())];
    let body = format!("oauth_verifier={}", authorization.oauth_verifier);
    let unsigned_secret = oauth_header("POST", "/oauth/access_token", &token, &verifier, CONSUMER_SECRET, "");
    let resp = app
        .clone()
        .oneshot(oauth_post("/oauth/access_token", &unsigned_secret, &body))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let leg = oauth_header("POST", "/oauth/access_token", &token, &verifier, CONSUMER_SECRET, &temporary_secret);
    let resp = app
        .clone()
        .oneshot(oauth_post("/oauth/access_token", &leg, &body))
        .await
        .unwrap();
    let body = body_text(resp).await;
    let access = form_value(&body, "oauth_token").unwrap();
    let access_secret = form_value(&body, "oauth_token_secret").unwrap();
    assert!(access.starts_with("acc-"));

    let access_token = [("oauth_token", access.as_str())];
    let header = oauth_header("GET", "/me", &access_token, &[], CONSUMER_SECRET, &access_secret);
    let resp = app.clone().oneshot(with_authorization("/me", &header)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let profile: serde_json::Value = body_json(resp).await;
    assert_eq!(profile["screen_name"], "mock-user");

    let query = [("include_entities", "1")];
    let header = oauth_header("GET", "/me", &access_token, &query, CONSUMER_SECRET, &access_secret);
    let resp = app
        .clone()
        .oneshot(with_authorization("/me?include_entities=1", &header))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app
        .clone()
        .oneshot(with_authorization("/me?include_entities=0", &header))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let stale_token = [("oauth_token", temporary.as_str())];
    let stale = oauth_header("GET", "/me", &stale_token, &[], CONSUMER_SECRET, &temporary_secret);
    let resp = app.oneshot(with_authorization("/me", &stale)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn authorize_unknown_token_returns_404() {
    let resp = app().oneshot(get("/oauth/authorize?oauth_token=nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
