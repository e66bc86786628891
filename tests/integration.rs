//! Integration tests for pipe-rpc.
//!
//! These tests drive a whole server over in-memory pipes.

use std::time::Duration;

use pipe_rpc::codec::JsonCodec;
use pipe_rpc::control::Diagnostics;
use pipe_rpc::protocol::{build_frame, FrameBuffer};
use pipe_rpc::{
    Envelope, Framing, HandlerError, ResponseOrder, RpcError, Server, TagStyle,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

/// Server running on its own task.
struct Running {
    input: DuplexStream,
    output: DuplexStream,
    diagnostics: DuplexStream,
    task: JoinHandle<pipe_rpc::Result<()>>,
}

impl Running {
    fn start(server: Server) -> Self {
        let (input, server_in) = duplex(64 * 1024);
        let (server_out, output) = duplex(64 * 1024);
        let (server_diag, diagnostics) = duplex(64 * 1024);

        let task = tokio::spawn(async move {
            server
                .serve(server_in, server_out, Diagnostics::new(server_diag))
                .await
        });

        Self {
            input,
            output,
            diagnostics,
            task,
        }
    }

    /// Write `bytes`, close the input and collect everything written.
    async fn finish(mut self, bytes: &[u8]) -> (pipe_rpc::Result<()>, Vec<u8>, String) {
        self.input.write_all(bytes).await.unwrap();
        let _ = self.input.shutdown().await;

        let result = self.task.await.unwrap();

        let mut output = Vec::new();
        self.output.read_to_end(&mut output).await.unwrap();
        let mut diagnostics = String::new();
        self.diagnostics
            .read_to_string(&mut diagnostics)
            .await
            .unwrap();

        (result, output, diagnostics)
    }
}

fn identity() -> pipe_rpc::ServerBuilder {
    Server::builder().handler_sync(|v: Value| Ok(v))
}

/// Test full frame encode/decode cycle with a JSON payload.
#[test]
fn test_frame_with_json_payload() {
    #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Transfer {
        id: i32,
        memo: String,
    }

    let transfer = Transfer {
        id: 42,
        memo: "Hello, world!".to_string(),
    };

    for framing in [Framing::LengthPrefixed, Framing::Newline] {
        let payload = JsonCodec::encode(&JsonCodec::to_value(&transfer).unwrap()).unwrap();
        let bytes = build_frame(framing, &payload).unwrap();

        let mut buffer = FrameBuffer::new(framing);
        let frames = buffer.push(&bytes).unwrap();
        assert_eq!(frames.len(), 1);

        let decoded: Transfer =
            JsonCodec::from_value(JsonCodec::decode(frames[0].payload()).unwrap()).unwrap();
        assert_eq!(decoded, transfer);
    }
}

/// Length-prefixed raw mirror with an identity handler.
#[tokio::test]
async fn test_length_prefixed_raw_mirror() {
    let server = identity()
        .framing(Framing::LengthPrefixed)
        .raw()
        .build()
        .unwrap();

    let (result, output, diagnostics) = Running::start(server).finish(br#"5|"abc""#).await;

    result.unwrap();
    assert_eq!(output, br#"5|"abc""#);
    assert!(diagnostics.is_empty());
}

/// Newline framing with tagged envelopes; bad JSON does not stop the pump.
#[tokio::test]
async fn test_newline_tagged_wallet() {
    #[derive(Deserialize)]
    enum Command {
        Mint {},
        Burn {},
        SetWalletAddress {},
    }

    let server = Server::builder()
        .handler_sync(|cmd: Command| {
            Ok(match cmd {
                Command::Mint {} => "Mint",
                Command::Burn {} => "Burn",
                Command::SetWalletAddress {} => "SetWalletAddress",
            })
        })
        .build()
        .unwrap();

    let (result, output, _) = Running::start(server)
        .finish(b"{\"Mint\":{}}\nnot json\n{\"Burn\":{}}\n")
        .await;

    result.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "{\"Ok\":\"Mint\"}\n{\"Err\":\"invalid JSON\"}\n{\"Ok\":\"Burn\"}\n"
    );
}

/// Raw mirror: failures go to the diagnostic stream only.
#[tokio::test]
async fn test_raw_mirror_diagnostics() {
    let server = identity().raw().build().unwrap();

    let (result, output, diagnostics) = Running::start(server)
        .finish(b"not json\n\"ok\"\n")
        .await;

    result.unwrap();
    assert_eq!(output, b"\"ok\"\n");
    assert_eq!(diagnostics, "error: invalid JSON\n");
}

/// Unknown command against a table: failure names it, no handler runs.
#[tokio::test]
async fn test_unknown_command_raw() {
    let server = Server::builder()
        .command_sync("add", |(a, b): (i64, i64)| Ok(a + b))
        .raw()
        .build()
        .unwrap();

    let (result, output, diagnostics) = Running::start(server)
        .finish(b"[\"nope\",1]\n[\"add\",[2,3]]\n")
        .await;

    result.unwrap();
    assert_eq!(output, b"5\n");
    assert_eq!(diagnostics, "error: unknown command: nope\n");
}

/// Pair-style tags: `["ok", v]` / `["error", msg]`.
#[tokio::test]
async fn test_pair_tag_style() {
    let server = Server::builder()
        .handler_sync(|v: Value| match v {
            Value::Null => Err(HandlerError::new("null input")),
            other => Ok(other),
        })
        .tagged(TagStyle::pair())
        .build()
        .unwrap();

    let (result, output, _) = Running::start(server)
        .finish(b"{\"a\":1}\nnull\n{\n")
        .await;

    result.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "[\"ok\",{\"a\":1}]\n[\"error\",\"null input\"]\n[\"error\",\"invalid JSON\"]\n"
    );
}

/// Oversized integers come back as exact decimal strings.
#[tokio::test]
async fn test_unsafe_integers_as_strings() {
    let server = identity().build().unwrap();

    let (result, output, _) = Running::start(server)
        .finish(b"[9007199254740991,9007199254740992,123456789012345678901234567890]\n")
        .await;

    result.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        "{\"Ok\":[9007199254740991,\"9007199254740992\",\"123456789012345678901234567890\"]}\n"
    );
}

/// Feeding the stream one byte at a time gives the same responses.
#[tokio::test]
async fn test_byte_at_a_time_delivery() {
    let server = identity()
        .framing(Framing::LengthPrefixed)
        .read_buffer_size(1)
        .build()
        .unwrap();

    let (result, output, _) = Running::start(server)
        .finish(b"7|[1,2,3]0|2|{}")
        .await;

    result.unwrap();
    assert_eq!(
        String::from_utf8(output).unwrap(),
        r#"14|{"Ok":[1,2,3]}22|{"Err":"invalid JSON"}9|{"Ok":{}}"#
    );
}

/// A malformed prefix ends the stream after earlier frames are answered.
#[tokio::test]
async fn test_frame_sync_is_fatal() {
    let server = identity()
        .framing(Framing::LengthPrefixed)
        .raw()
        .build()
        .unwrap();

    let (result, output, _) = Running::start(server)
        .finish(b"2|{}abc|\"ignored\"")
        .await;

    assert!(matches!(result, Err(RpcError::FrameSync(_))));
    assert_eq!(output, b"2|{}");
}

/// A stream ending mid-frame is not an error.
#[tokio::test]
async fn test_partial_tail_is_discarded() {
    let server = identity().build().unwrap();

    let (result, output, _) = Running::start(server).finish(b"1\n[2,").await;

    result.unwrap();
    assert_eq!(output, b"{\"Ok\":1}\n");
}

fn sleepy(order: ResponseOrder) -> Server {
    Server::builder()
        .handler(|ms: u64| async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok::<_, HandlerError>(ms)
        })
        .envelope(Envelope::Raw)
        .response_order(order)
        .build()
        .unwrap()
}

/// Ordered mode answers in request order even if handlers settle out of order.
#[tokio::test]
async fn test_ordered_responses() {
    let (result, output, _) = Running::start(sleepy(ResponseOrder::Ordered))
        .finish(b"150\n0\n")
        .await;

    result.unwrap();
    assert_eq!(output, b"150\n0\n");
}

/// Unordered mode answers first-settled-first.
#[tokio::test]
async fn test_unordered_responses() {
    let (result, output, _) = Running::start(sleepy(ResponseOrder::Unordered))
        .finish(b"150\n0\n")
        .await;

    result.unwrap();
    assert_eq!(output, b"0\n150\n");
}

/// Many concurrent requests each get exactly one response.
#[tokio::test]
async fn test_many_requests_one_response_each() {
    let server = Server::builder()
        .command("double", |n: u64| async move {
            tokio::task::yield_now().await;
            Ok::<_, HandlerError>(n * 2)
        })
        .framing(Framing::LengthPrefixed)
        .build()
        .unwrap();

    let mut input = Vec::new();
    for i in 0..200u64 {
        let payload = JsonCodec::encode(&json!(["double", i])).unwrap();
        input.extend(build_frame(Framing::LengthPrefixed, &payload).unwrap());
    }

    let (result, output, _) = Running::start(server).finish(&input).await;
    result.unwrap();

    let mut buffer = FrameBuffer::new(Framing::LengthPrefixed);
    let frames = buffer.push(&output).unwrap();
    assert_eq!(frames.len(), 200);
    for (i, frame) in frames.iter().enumerate() {
        let value = JsonCodec::decode(frame.payload()).unwrap();
        assert_eq!(value, json!({"Ok": i as u64 * 2}));
    }
}
