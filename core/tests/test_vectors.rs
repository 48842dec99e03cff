//! Verify request building, response parsing and OAuth1 signing against the
//! JSON test vectors stored in `test-vectors/`.
//!
//! Each vector file describes inputs and expected results. Bodies are
//! compared as parsed JSON where the wire format is JSON, so field order in
//! the fixtures does not matter.

use std::sync::Arc;

use apiapi_core::auth::{sign, signature_base_string};
use apiapi_core::{
    ApiError, AuthData, DefinedStructure, HttpMethod, Request, Route, RouteDefinition, Structure, TransportResponse,
    ValidationError,
};
use serde_json::Value;

fn parse_method(s: &str) -> HttpMethod {
    s.parse().unwrap_or_else(|e| panic!("{e}"))
}

fn load(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap()
}

fn request_for(structure: &DefinedStructure, case: &Value) -> Result<Request, ApiError> {
    let route = structure.get_route_object(case["route"].as_str().unwrap())?;
    route.create_request_object(
        case["route"].as_str().unwrap(),
        parse_method(case["method"].as_str().unwrap()),
        case["mode"].as_str().unwrap_or_default(),
        None,
        AuthData::new(),
    )
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

#[test]
fn request_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/requests.json"));
    let structure = DefinedStructure::from_json("articles", &vectors["structure"].to_string()).unwrap();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let mut request = request_for(&structure, case).unwrap();
        for pair in case["params"].as_array().unwrap() {
            let param = pair[0].as_str().unwrap();
            request
                .set_param(param, pair[1].clone())
                .unwrap_or_else(|e| panic!("{name}: setting {param}: {e}"));
        }

        if let Some(expected_missing) = case.get("expected_missing") {
            let expected: Vec<String> = serde_json::from_value(expected_missing.clone()).unwrap();
            assert_eq!(request.is_valid(), Err(expected), "{name}: missing params");
            continue;
        }
        assert_eq!(request.is_valid(), Ok(()), "{name}: valid");

        let expected = &case["expected_request"];
        let http = request.to_http_request().unwrap();
        assert_eq!(http.method, parse_method(expected["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(http.url, expected["url"].as_str().unwrap(), "{name}: url");

        let expected_headers: Vec<(String, String)> = serde_json::from_value(expected["headers"].clone()).unwrap();
        assert_eq!(http.headers, expected_headers, "{name}: headers");

        let body = &expected["body"];
        if body.is_null() {
            assert!(http.body.is_none(), "{name}: body should be None");
        } else if let Some(json) = body.get("json") {
            let sent: Value = serde_json::from_str(http.body.as_deref().unwrap()).unwrap();
            assert_eq!(&sent, json, "{name}: json body");
        } else {
            assert_eq!(http.body.as_deref(), body["form"].as_str(), "{name}: form body");
        }
    }
}

#[test]
fn rejected_request_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/requests.json"));
    let structure = DefinedStructure::from_json("articles", &vectors["structure"].to_string()).unwrap();

    for case in vectors["rejected"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let result = request_for(&structure, case).and_then(|mut request| {
            let param = &case["param"];
            request.set_param(param[0].as_str().unwrap(), param[1].clone())
        });
        let err = result.expect_err(name);
        let matched = match case["error"].as_str().unwrap() {
            "NotInEnum" => matches!(err, ApiError::Validation(ValidationError::NotInEnum { .. })),
            "BelowMinimum" => matches!(err, ApiError::Validation(ValidationError::BelowMinimum { .. })),
            "NotScalar" => matches!(err, ApiError::Validation(ValidationError::NotScalar { .. })),
            "CustomParamNotAllowed" => matches!(err, ApiError::CustomParamNotAllowed { .. }),
            "UnsupportedMethod" => matches!(err, ApiError::UnsupportedMethod { .. }),
            "UnknownRoute" => matches!(err, ApiError::UnknownRoute { .. }),
            other => panic!("{name}: unknown expected error: {other}"),
        };
        assert!(matched, "{name}: unexpected error {err:?}");
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[test]
fn response_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/responses.json"));
    let definition: RouteDefinition = serde_json::from_value(vectors["route"]["definition"].clone()).unwrap();
    let route = Arc::new(Route::new(vectors["route"]["uri"].as_str().unwrap(), definition).unwrap());

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let raw: TransportResponse = serde_json::from_value(case["raw"].clone()).unwrap();
        let method = parse_method(case["method"].as_str().unwrap());
        let response = route.create_response_object(raw, method).unwrap();
        let expected = &case["expected"];

        assert_eq!(
            u64::from(response.status_code()),
            expected["status_code"].as_u64().unwrap(),
            "{name}: status"
        );
        assert_eq!(
            response.status_message(),
            expected["status_message"].as_str().unwrap(),
            "{name}: status message"
        );
        let params = &expected["params"];
        assert_eq!(response.get_params(), (!params.is_null()).then_some(params), "{name}: params");

        let headers = expected["headers"].as_object().unwrap();
        assert_eq!(response.get_headers().iter().count(), headers.len(), "{name}: header count");
        for (header, values) in headers {
            let values: Vec<String> = serde_json::from_value(values.clone()).unwrap();
            assert_eq!(
                response.get_header_values(header),
                Some(values.as_slice()),
                "{name}: header {header}"
            );
        }
    }
}

// ---------------------------------------------------------------------------
// OAuth1
// ---------------------------------------------------------------------------

#[test]
fn oauth1_signature_test_vectors() {
    let vectors = load(include_str!("../../test-vectors/oauth1.json"));

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let params: Vec<(String, String)> = serde_json::from_value(case["params"].clone()).unwrap();
        let base = signature_base_string(
            parse_method(case["method"].as_str().unwrap()),
            case["url"].as_str().unwrap(),
            &params,
        );
        assert_eq!(base, case["expected_base_string"].as_str().unwrap(), "{name}: base string");

        let signature = sign(
            &base,
            case["consumer_secret"].as_str().unwrap(),
            case["token_secret"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(signature, case["expected_signature"].as_str().unwrap(), "{name}: signature");
    }
}
