//! End-to-end scenarios over loopback TCP: a real server, a real pooled
//! client, OS-assigned ports.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

use wirecall_client::{CallOptions, Client, PoolOptions};
use wirecall_server::{CallContext, RpcError, Serializer, Server, ServiceStub};

#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
struct GetByIdReq {
    #[prost(int64, tag = "1")]
    id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
struct GetByIdResp {
    #[prost(string, tag = "1")]
    msg: String,
}

#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
struct EchoReq {
    #[prost(string, tag = "1")]
    text: String,
}

#[derive(Clone, PartialEq, ::prost::Message, serde::Serialize, serde::Deserialize)]
struct EchoResp {
    #[prost(string, tag = "1")]
    text: String,
}

wirecall_client::client_stub! {
    /// Typed client for the user service fixture.
    struct UserServiceClient {
        service = "user-service";
        rpc get_by_id("GetById"): GetByIdReq => GetByIdResp;
    }
}

fn user_service() -> ServiceStub {
    ServiceStub::new("user-service")
        .method("GetById", |_cx, _req: GetByIdReq| async move {
            Ok(GetByIdResp {
                msg: "hi".to_string(),
            })
        })
        .method("Boom", |_cx, _req: GetByIdReq| async move {
            Err::<GetByIdResp, _>(RpcError::handler("boom"))
        })
}

fn echo_service() -> ServiceStub {
    ServiceStub::new("echo-service").method("Echo", |_cx, req: EchoReq| async move {
        Ok(EchoResp { text: req.text })
    })
}

async fn serve(server: Server) -> SocketAddr {
    let bound = server.bind("127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = bound.serve().await;
    });
    addr
}

async fn json_client(addr: SocketAddr) -> Client {
    Client::builder(addr.to_string()).build().await.unwrap()
}

fn unix_millis(at: SystemTime) -> u128 {
    at.duration_since(UNIX_EPOCH).unwrap().as_millis()
}

#[tokio::test]
async fn test_happy_path_json() {
    let mut server = Server::new();
    server.register_service(user_service());
    let addr = serve(server).await;

    let users = UserServiceClient::new(json_client(addr).await);
    let resp = users.get_by_id(&GetByIdReq { id: 1 }).await.unwrap();
    assert_eq!(resp.msg, "hi");
}

#[tokio::test]
async fn test_happy_path_proto() {
    let mut server = Server::new();
    server.register_serializer(Serializer::Proto);
    server.register_service(user_service());
    let addr = serve(server).await;

    let client = Client::builder(addr.to_string())
        .use_proto()
        .build()
        .await
        .unwrap();
    let resp: GetByIdResp = client
        .call_unary("user-service", "GetById", &GetByIdReq { id: 1 })
        .await
        .unwrap();
    assert_eq!(resp.msg, "hi");
}

#[tokio::test]
async fn test_server_error_keeps_connection_usable() {
    let mut server = Server::new();
    server.register_service(user_service());
    let addr = serve(server).await;

    let users = UserServiceClient::new(json_client(addr).await);
    let err = users
        .client()
        .call_unary::<GetByIdReq, GetByIdResp>("user-service", "Boom", &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Handler(_)));
    assert_eq!(err.to_string(), "boom");

    // The failure travelled as an application error; the same pooled
    // connection serves the next call.
    let resp = users.get_by_id(&GetByIdReq { id: 1 }).await.unwrap();
    assert_eq!(resp.msg, "hi");
}

#[tokio::test]
async fn test_missing_method() {
    let mut server = Server::new();
    server.register_service(user_service());
    let addr = serve(server).await;

    let client = json_client(addr).await;
    let err = client
        .call_unary::<GetByIdReq, GetByIdResp>("user-service", "Nope", &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Handler(_)));
    assert!(err.to_string().contains("does not exist"));
}

#[tokio::test]
async fn test_missing_service() {
    let mut server = Server::new();
    server.register_service(user_service());
    let addr = serve(server).await;

    let client = json_client(addr).await;
    let err = client
        .call_unary::<GetByIdReq, GetByIdResp>("ghost-service", "GetById", &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    // A service miss reports the same wire text as a method miss.
    assert_eq!(err.to_string(), "rpc: method does not exist");
}

#[tokio::test]
async fn test_unregistered_serializer_is_reported_not_dropped() {
    let mut server = Server::new();
    server.register_service(user_service());
    let addr = serve(server).await;

    // Protobuf on the client, never registered on the server.
    let client = Client::builder(addr.to_string())
        .use_proto()
        .build()
        .await
        .unwrap();
    let err = client
        .call_unary::<GetByIdReq, GetByIdResp>("user-service", "GetById", &GetByIdReq { id: 1 })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("serializer code 2"));
}

#[tokio::test]
async fn test_payload_with_newline_round_trips() {
    let mut server = Server::new();
    server.register_service(echo_service());
    let addr = serve(server).await;

    let client = json_client(addr).await;
    let resp: EchoResp = client
        .call_unary(
            "echo-service",
            "Echo",
            &EchoReq {
                text: "hello \n world".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.text, "hello \n world");
}

#[tokio::test]
async fn test_deadline_and_meta_propagate_to_the_server() {
    let (tx, mut rx) = mpsc::unbounded_channel::<CallContext>();
    let mut server = Server::new();
    server.register_service(ServiceStub::new("meta-service").method(
        "Inspect",
        move |cx, _req: EchoReq| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(cx);
                Ok(EchoResp::default())
            }
        },
    ));
    let addr = serve(server).await;
    let client = json_client(addr).await;

    let before = unix_millis(SystemTime::now());
    let _resp: EchoResp = client
        .call_unary_with_options(
            "meta-service",
            "Inspect",
            &EchoReq::default(),
            CallOptions::new()
                .timeout(Duration::from_secs(2))
                .meta("trace-id", "t-1"),
        )
        .await
        .unwrap();
    let after = unix_millis(SystemTime::now());

    let cx = rx.recv().await.unwrap();
    assert_eq!(cx.meta("trace-id"), Some("t-1"));

    let deadline = unix_millis(cx.deadline.expect("deadline meta should be set"));
    assert!(deadline >= before + 2_000);
    assert!(deadline <= after + 2_000);
}

#[tokio::test]
async fn test_server_enforces_an_expired_deadline() {
    let mut server = Server::new();
    server.register_service(echo_service());
    let addr = serve(server).await;
    let client = json_client(addr).await;

    // Hand-rolled request with a deadline long in the past, driven through
    // the raw transport so the client's own deadline racing stays out of
    // the picture.
    let mut request = wirecall_core::Request {
        request_id: 7,
        version: 1,
        serializer: Serializer::Json.code(),
        service_name: "echo-service".to_string(),
        method_name: "Echo".to_string(),
        data: Serializer::Json.encode(&EchoReq::default()).unwrap(),
        ..Default::default()
    };
    request
        .meta
        .insert("deadline".to_string(), "1000".to_string());
    request.validate().unwrap();
    request.calculate_head_length();
    request.calculate_body_length();

    let response = client.invoke(&request, None).await.unwrap();
    assert_eq!(response.request_id, request.request_id);
    let error = String::from_utf8_lossy(&response.error).into_owned();
    assert!(error.contains("deadline exceeded"));
}

#[tokio::test]
async fn test_client_deadline_cancels_a_slow_call() {
    let mut server = Server::new();
    server.register_service(ServiceStub::new("slow-service").method(
        "Sleep",
        |_cx, _req: EchoReq| async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(EchoResp::default())
        },
    ));
    let addr = serve(server).await;
    let client = json_client(addr).await;

    let err = client
        .call_unary_with_options::<EchoReq, EchoResp>(
            "slow-service",
            "Sleep",
            &EchoReq::default(),
            CallOptions::new().timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Cancelled));
}

#[tokio::test]
async fn test_one_way_call_fires_and_forgets() {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let mut server = Server::new();
    server.register_service(
        ServiceStub::new("echo-service")
            .method("Notify", move |_cx, req: EchoReq| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(req.text);
                    Ok(EchoResp::default())
                }
            })
            .method("Echo", |_cx, req: EchoReq| async move {
                Ok(EchoResp { text: req.text })
            }),
    );
    let addr = serve(server).await;
    let client = json_client(addr).await;

    // The one-way call returns the zero value immediately, without error.
    let resp: EchoResp = client
        .call_unary_with_options(
            "echo-service",
            "Notify",
            &EchoReq {
                text: "ping".to_string(),
            },
            CallOptions::new().one_way(),
        )
        .await
        .unwrap();
    assert_eq!(resp, EchoResp::default());

    // The server processed it for its side effect...
    let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, "ping");

    // ...and wrote no reply: the same pooled connection lines up cleanly
    // for the next unary call.
    let resp: EchoResp = client
        .call_unary(
            "echo-service",
            "Echo",
            &EchoReq {
                text: "pong".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.text, "pong");
}

#[tokio::test]
async fn test_shutdown_signal_stops_the_accept_loop() {
    let mut server = Server::new();
    server.register_service(echo_service());
    let bound = server.bind("127.0.0.1:0").await.unwrap();
    let addr = bound.local_addr().unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let serving = tokio::spawn(async move {
        bound
            .serve_with_shutdown(async {
                let _ = rx.await;
            })
            .await
    });

    // Serving normally before the signal.
    let client = json_client(addr).await;
    let resp: EchoResp = client
        .call_unary(
            "echo-service",
            "Echo",
            &EchoReq {
                text: "up".to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.text, "up");

    tx.send(()).unwrap();
    serving.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_calls_share_a_saturated_pool() {
    let served = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&served);
    let mut server = Server::new();
    server.register_service(ServiceStub::new("slow-service").method(
        "Sleep",
        move |_cx, _req: EchoReq| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(EchoResp::default())
            }
        },
    ));
    let addr = serve(server).await;

    let client = Client::builder(addr.to_string())
        .pool_options(PoolOptions {
            init: 0,
            max_idle: 2,
            max_live: 2,
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

    // Three concurrent calls over two connections: the third queues on the
    // pool until one of the first two finishes.
    let mut tasks = Vec::new();
    for _ in 0..3 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            client
                .call_unary::<EchoReq, EchoResp>("slow-service", "Sleep", &EchoReq::default())
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(served.load(Ordering::SeqCst), 3);
}
