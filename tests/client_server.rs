//! RpcClient against an in-process server.

use pipe_rpc::control::Diagnostics;
use pipe_rpc::{
    Envelope, Framing, HandlerError, Protocol, Response, RpcClient, RpcError, Server, TagStyle,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::duplex;
use tokio::task::JoinHandle;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Balance {
    owner: String,
    amount: u64,
}

fn wallet(framing: Framing, envelope: Envelope) -> Server {
    Server::builder()
        .command_sync("add", |(a, b): (i64, i64)| Ok::<_, HandlerError>(a + b))
        .command("balance", |owner: String| async move {
            if owner.is_empty() {
                return Err(HandlerError::new("owner required"));
            }
            Ok(Balance { owner, amount: 100 })
        })
        .command_sync("fail", |v: Value| Err::<Value, _>(HandlerError::from_value(&v)))
        .framing(framing)
        .envelope(envelope)
        .build()
        .unwrap()
}

fn connect(server: Server, protocol: Protocol) -> (RpcClient, JoinHandle<pipe_rpc::Result<()>>) {
    let (client_end, server_end) = duplex(64 * 1024);

    let (server_rx, server_tx) = tokio::io::split(server_end);
    let task = tokio::spawn(async move {
        server
            .serve(server_rx, server_tx, Diagnostics::disabled())
            .await
    });

    let (client_rx, client_tx) = tokio::io::split(client_end);
    (RpcClient::new(client_rx, client_tx, protocol), task)
}

async fn round_trip(framing: Framing, envelope: Envelope) {
    let protocol = Protocol::new(framing, envelope.clone());
    let (mut client, task) = connect(wallet(framing, envelope), protocol);

    let sum: i64 = client.command("add", &(2, 3)).await.unwrap();
    assert_eq!(sum, 5);

    let balance: Balance = client.command("balance", "alice").await.unwrap();
    assert_eq!(
        balance,
        Balance {
            owner: "alice".to_string(),
            amount: 100
        }
    );

    let err = client
        .command::<_, Balance>("balance", "")
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "owner required"));

    let err = client.command::<_, Value>("nope", &1).await.unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == "unknown command: nope"));

    let response = client.call_value(&json!("not a pair")).await.unwrap();
    assert!(matches!(response, Response::Err(ref m) if m.starts_with("malformed command")));

    client.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_round_trip_newline_object_tags() {
    round_trip(Framing::Newline, Envelope::default()).await;
}

#[tokio::test]
async fn test_round_trip_length_prefixed_object_tags() {
    round_trip(Framing::LengthPrefixed, Envelope::default()).await;
}

#[tokio::test]
async fn test_round_trip_newline_pair_tags() {
    round_trip(Framing::Newline, Envelope::Tagged(TagStyle::pair())).await;
}

#[tokio::test]
async fn test_round_trip_length_prefixed_pair_tags() {
    round_trip(Framing::LengthPrefixed, Envelope::Tagged(TagStyle::pair())).await;
}

#[tokio::test]
async fn test_non_string_failure_is_stringified() {
    let (mut client, task) = connect(
        wallet(Framing::Newline, Envelope::default()),
        Protocol::default(),
    );

    let err = client
        .command::<_, Value>("fail", &json!({"code": 7}))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Remote(ref m) if m == r#"{"code":7}"#));

    client.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_raw_mirror_round_trip() {
    let server = Server::builder()
        .handler_sync(|v: Value| Ok::<_, HandlerError>(v))
        .framing(Framing::LengthPrefixed)
        .raw()
        .build()
        .unwrap();
    let (mut client, task) = connect(
        server,
        Protocol::new(Framing::LengthPrefixed, Envelope::Raw),
    );

    let echoed: String = client.call("abc").await.unwrap();
    assert_eq!(echoed, "abc");

    // Unsafe integers travel as strings in both directions.
    let echoed: Value = client.call(&json!([u64::MAX, 1])).await.unwrap();
    assert_eq!(echoed, json!(["18446744073709551615", 1]));

    client.close().await.unwrap();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_server_gone_is_connection_closed() {
    let (client_end, server_end) = duplex(1024);
    drop(server_end);

    let (rx, tx) = tokio::io::split(client_end);
    let mut client = RpcClient::new(rx, tx, Protocol::default());

    let err = client.call::<_, Value>(&json!(1)).await.unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed | RpcError::Io(_)));
}
