use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::header::{HeaderName, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use unai_http::{
    ClientError, ClientOptions, HttpClient, Method, RequestBody, RequestConfig, ResponseBody,
};

/// Client whose default `/api` base resolves against the mock server.
fn client_for(server: &MockServer) -> HttpClient {
    HttpClient::new(&ClientOptions::default().with_origin(server.uri())).unwrap()
}

#[tokio::test]
async fn test_query_and_base_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let config = RequestConfig::default()
        .with_param("a", 1)
        .with_param("b", json!([2, 3]))
        .with_param("skip", Value::Null);
    let response = client.get::<Value>("/users", Some(config)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.request.url, "/users");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].url.path(), "/api/users");
    assert_eq!(requests[0].url.query(), Some("a=1&b=2&b=3"));
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Item {
    name: String,
    tags: Vec<String>,
}

#[tokio::test]
async fn test_json_round_trip() {
    let server = MockServer::start().await;
    let item = Item {
        name: "lamp".to_string(),
        tags: vec!["desk".to_string()],
    };
    Mock::given(method("POST"))
        .and(path("/api/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(&item))
        .respond_with(ResponseTemplate::new(201).set_body_json(&item))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let body = RequestBody::json(&item).unwrap();
    let response = client.post::<Item>("/items", Some(body), None).await.unwrap();

    assert_eq!(response.status, 201);
    assert_eq!(response.data, item);
}

#[tokio::test]
async fn test_not_found_goes_through_error_chain() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "not found"})))
        .mount(&server)
        .await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut client = client_for(&server);
    let log = seen.clone();
    client.use_error_interceptor(move |error: ClientError, request: Option<&RequestConfig>| {
        log.lock().unwrap().push((
            error.status(),
            request.map(|r| r.url.clone()),
        ));
        error
    });

    let err = client.get::<Value>("/missing", None).await.unwrap_err();

    assert_eq!(err.status(), Some(404));
    let message = err.to_string();
    assert!(message.contains("404"), "{message}");
    assert!(message.contains("not found"), "{message}");
    assert_eq!(err.data(), Some(&ResponseBody::Json(json!({"message": "not found"}))));
    assert_eq!(err.request().unwrap().url, "/missing");

    let seen = seen.lock().unwrap();
    assert_eq!(*seen, vec![(Some(404), Some("/missing".to_string()))]);
}

#[tokio::test]
async fn test_error_chain_can_replace_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut client = client_for(&server);
    client.use_error_interceptor(|error: ClientError, _: Option<&RequestConfig>| {
        ClientError::Interceptor(format!("first: {}", error.status().unwrap_or_default()))
    });
    client.use_error_interceptor(|error: ClientError, _: Option<&RequestConfig>| {
        ClientError::Interceptor(format!("{error} / second"))
    });

    let err = client.delete::<Value>("/items/1", None).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "Interceptor error: Interceptor error: first: 500 / second"
    );
}

#[tokio::test]
async fn test_authorization_precedence() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = HttpClient::new(
        &ClientOptions::default()
            .with_origin(server.uri())
            .with_api_key("sk-stored"),
    )
    .unwrap();

    client.get::<Value>("/stored", None).await.unwrap();

    let explicit = RequestConfig::default()
        .with_header(AUTHORIZATION, HeaderValue::from_static("Bearer caller"));
    client.get::<Value>("/explicit", Some(explicit)).await.unwrap();

    client.set_token(None).unwrap();
    client.get::<Value>("/anonymous", None).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth: Vec<Option<String>> = requests
        .iter()
        .map(|r| {
            r.headers
                .get("authorization")
                .map(|v| v.to_str().unwrap().to_string())
        })
        .collect();
    assert_eq!(
        auth,
        vec![
            Some("Bearer sk-stored".to_string()),
            Some("Bearer caller".to_string()),
            None,
        ]
    );
}

#[tokio::test]
async fn test_default_headers_and_caller_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("accept", "application/json, text/plain, */*"))
        .and(header("x-requested-with", "XMLHttpRequest"))
        .and(header("x-trace", "abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let config = RequestConfig::default().with_header(
        HeaderName::from_static("x-trace"),
        HeaderValue::from_static("abc"),
    );
    let response = client.get::<Value>("/ping", Some(config)).await.unwrap();
    assert_eq!(response.data, json!({"ok": true}));
}

#[tokio::test]
async fn test_timeout_surfaces_as_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let client = client_for(&server);
    let config = RequestConfig::default().with_timeout_ms(50);
    let err = client.get::<Value>("/slow", Some(config)).await.unwrap_err();

    assert!(err.is_timeout());
    assert!(matches!(err, ClientError::Timeout { timeout_ms: 50 }));
}

#[tokio::test]
async fn test_response_classification() {
    let server = MockServer::start().await;
    Mock::given(path("/api/text"))
        .respond_with(ResponseTemplate::new(200).set_body_string("plain words"))
        .mount(&server)
        .await;
    Mock::given(path("/api/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 159, 146, 150]))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let text = client
        .request_raw(RequestConfig::new(Method::Get, "/text"))
        .await
        .unwrap();
    assert_eq!(text.data, ResponseBody::Text("plain words".to_string()));

    let blob = client
        .request_raw(RequestConfig::new(Method::Get, "/blob"))
        .await
        .unwrap();
    match blob.data {
        ResponseBody::Bytes(bytes) => assert_eq!(bytes.as_ref(), &[0u8, 159, 146, 150]),
        other => panic!("expected bytes, got {other:?}"),
    }

    // Text payloads can still be decoded as strings
    let decoded = client.get::<String>("/text", None).await.unwrap();
    assert_eq!(decoded.data, "plain words");
}

#[tokio::test]
async fn test_form_and_text_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/form"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("name=a+b&tag=x%26y"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("stored")))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/raw"))
        .and(body_string("as is"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("patched")))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let form = RequestBody::form([("name", "a b"), ("tag", "x&y")]);
    let response = client.put::<String>("/form", Some(form), None).await.unwrap();
    assert_eq!(response.data, "stored");

    let config = RequestConfig::default().with_json(false);
    let response = client
        .patch::<String>("/raw", Some("as is".into()), Some(config))
        .await
        .unwrap();
    assert_eq!(response.data, "patched");
}

#[tokio::test]
async fn test_interceptor_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/items"))
        .and(header("x-step", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"n": 1})))
        .mount(&server)
        .await;

    let log = Arc::new(Mutex::new(Vec::new()));
    let mut client = client_for(&server);

    let first = log.clone();
    client.use_request_interceptor(move |mut config: RequestConfig| {
        first.lock().unwrap().push("request 1");
        config.url = format!("/v2{}", config.url);
        config
            .headers
            .insert("x-step", HeaderValue::from_static("1"));
        Ok::<_, ClientError>(config)
    });
    let second = log.clone();
    client.use_request_interceptor(move |mut config: RequestConfig| {
        second.lock().unwrap().push("request 2");
        config
            .headers
            .insert("x-step", HeaderValue::from_static("2"));
        Ok::<_, ClientError>(config)
    });
    let third = log.clone();
    client.use_response_interceptor(
        move |mut response: unai_http::Response<ResponseBody>| {
            third.lock().unwrap().push("response");
            response.data = ResponseBody::Json(json!({"n": 2}));
            Ok::<_, ClientError>(response)
        },
    );

    let response = client.get::<Value>("/items", None).await.unwrap();
    assert_eq!(response.data, json!({"n": 2}));
    assert_eq!(response.request.url, "/v2/items");
    assert_eq!(
        *log.lock().unwrap(),
        vec!["request 1", "request 2", "response"]
    );
}

#[tokio::test]
async fn test_failing_request_interceptor_skips_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let reached_chain = Arc::new(Mutex::new(false));
    let mut client = client_for(&server);
    client.use_request_interceptor(|_: RequestConfig| -> Result<RequestConfig, ClientError> {
        Err(ClientError::Interceptor("refused".to_string()))
    });
    let flag = reached_chain.clone();
    client.use_error_interceptor(move |error: ClientError, _: Option<&RequestConfig>| {
        *flag.lock().unwrap() = true;
        error
    });

    let err = client.get::<Value>("/never", None).await.unwrap_err();
    assert_eq!(err.to_string(), "Interceptor error: refused");
    assert!(*reached_chain.lock().unwrap());
}

#[tokio::test]
async fn test_set_base_url_applies_to_later_requests() {
    let server = MockServer::start().await;
    Mock::given(path("/gateway/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("up")))
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.set_base_url(format!("{}/gateway/", server.uri()));
    let response = client.get::<String>("status", None).await.unwrap();
    assert_eq!(response.data, "up");
}
