use std::time::Duration;

use comms::{ClientErr, GenerateRequest, ReplicaClient};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
};

/// Serves a single canned HTTP response and hands back the raw request it received.
async fn canned(status: &str, headers: &[(&str, &str)], body: &str) -> (ReplicaClient, tokio::task::JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n",
        body.len()
    );
    for (name, value) in headers {
        response.push_str(&format!("{name}: {value}\r\n"));
    }
    response.push_str("\r\n");
    response.push_str(body);

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = vec![0; 4096];
        let n = stream.read(&mut buf).await.unwrap();
        stream.write_all(response.as_bytes()).await.unwrap();
        stream.shutdown().await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });

    let client = ReplicaClient::new(&format!("http://{addr}/"), Duration::from_secs(5)).unwrap();
    (client, server)
}

#[tokio::test]
async fn healthz_decodes_liveness() {
    let (client, server) = canned("200 OK", &[], r#"{"ok":true}"#).await;

    let res = client.healthz().await.unwrap();

    assert!(res.ok);
    assert!(server.await.unwrap().starts_with("GET /healthz "));
}

#[tokio::test]
async fn generate_reads_model_headers() {
    let (client, server) = canned(
        "200 OK",
        &[("x-model-version", "7"), ("x-model-repo-id", "org/b")],
        r#"{"text":"hi there"}"#,
    )
    .await;

    let reply = client.generate(&GenerateRequest::new("hi")).await.unwrap();

    assert_eq!(reply.text, "hi there");
    assert_eq!(reply.model_version, Some(7));
    assert_eq!(reply.model_repo_id.as_deref(), Some("org/b"));

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /generate "));
}

#[tokio::test]
async fn generate_without_headers_leaves_them_unset() {
    let (client, _server) = canned("200 OK", &[], r#"{"text":"hi"}"#).await;

    let reply = client.generate(&GenerateRequest::new("hi")).await.unwrap();

    assert_eq!(reply.model_version, None);
    assert_eq!(reply.model_repo_id, None);
}

#[tokio::test]
async fn conflict_is_an_unaccepted_update() {
    let body = r#"{"success":false,"requested_model_repo_id":"org/c","message":"update already in progress","error":"update_in_progress"}"#;
    let (client, server) = canned("409 Conflict", &[], body).await;

    let res = client.update_model("org/c").await.unwrap();

    assert!(!res.success);
    assert_eq!(res.error.as_deref(), Some("update_in_progress"));
    assert!(server.await.unwrap().contains(r#""model_repo_id":"org/c""#));
}

#[tokio::test]
async fn not_ready_is_decoded_not_raised() {
    let body = r#"{"ready":false,"message":"model is still loading","model_repo_id":"org/a"}"#;
    let (client, _server) = canned("503 Service Unavailable", &[], body).await;

    let res = client.ready().await.unwrap();

    assert!(!res.ready);
    assert_eq!(res.message.as_deref(), Some("model is still loading"));
}

#[tokio::test]
async fn server_error_keeps_status_and_body() {
    let body = r#"{"kind":"generation","detail":"boom"}"#;
    let (client, _server) = canned("500 Internal Server Error", &[], body).await;

    let err = client.generate(&GenerateRequest::new("hi")).await.unwrap_err();

    let ClientErr::Status { code, body } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*code, 500);
    assert!(body.contains("boom"));
    assert!(!err.is_transient());
}

#[tokio::test]
async fn gateway_errors_are_transient() {
    let (client, _server) = canned("503 Service Unavailable", &[], "{}").await;

    let err = client.status().await.unwrap_err();

    assert!(matches!(err, ClientErr::Status { code: 503, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn garbage_body_is_a_decode_error() {
    let (client, _server) = canned("200 OK", &[], "not json").await;

    let err = client.status().await.unwrap_err();

    assert!(matches!(err, ClientErr::Decode(_)));
    assert!(!err.is_transient());
}
