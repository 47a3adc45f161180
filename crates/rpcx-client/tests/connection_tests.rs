use std::time::Duration;

use rpcx_client::{ClientOption, ConnectionClient};
use rpcx_share::{Message, MessageStatusType, Metadata, SerializeType, SERVICE_ERROR_KEY};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

async fn start_echo_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        loop {
            let req = match Message::decode(&mut reader).await {
                Ok(m) => m,
                Err(_) => break,
            };
            if req.is_oneway() {
                continue;
            }
            let mut res = req.clone();
            res.payload = SerializeType::MsgPack
                .encode(&(req.payload.len() as i64))
                .unwrap_or_default();
            if let SerializeType::Json = req.serialize_type {
                res.payload = SerializeType::Json
                    .encode(&(req.payload.len() as i64))
                    .unwrap_or_default();
            }
            if write_half.write_all(&res.encode()).await.is_err() {
                break;
            }
        }
    });
    (addr, handle)
}

#[tokio::test]
async fn unary_call_round_trips_through_a_real_socket() {
    let (addr, _server) = start_echo_server().await;
    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();

    let (reply, _meta): (i64, _) = client
        .call("Arith", "Len", Default::default(), &"hello".to_string())
        .await
        .unwrap();

    assert!(reply > 0);
}

#[tokio::test]
async fn oneway_send_does_not_wait_for_a_response() {
    let (addr, _server) = start_echo_server().await;
    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();

    client
        .send_oneway("Arith", "Log", Default::default(), &"fire and forget".to_string())
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_calls_are_matched_back_to_the_right_caller() {
    let (addr, _server) = start_echo_server().await;
    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();

    let c1 = client.clone();
    let c2 = client.clone();
    let a = tokio::spawn(async move {
        let (reply, _): (i64, _) = c1
            .call("Arith", "Len", Default::default(), &"abc".to_string())
            .await
            .unwrap();
        reply
    });
    let b = tokio::spawn(async move {
        let (reply, _): (i64, _) = c2
            .call("Arith", "Len", Default::default(), &"abcdefgh".to_string())
            .await
            .unwrap();
        reply
    });

    let (ra, rb) = tokio::join!(a, b);
    assert!(ra.unwrap() > 0);
    assert!(rb.unwrap() > 0);
}

#[tokio::test]
async fn closing_the_connection_fails_pending_calls_with_shutdown() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    // Accept but never respond, so the call stays pending until close().
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = stream;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();
    let client_for_call = client.clone();
    let call = tokio::spawn(async move {
        client_for_call
            .call::<_, i64>("Arith", "Len", Default::default(), &"abc".to_string())
            .await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().await;

    let result = call.await.unwrap();
    assert!(result.is_err());
    server.abort();
}

#[tokio::test]
async fn server_reported_errors_are_not_decoded_as_a_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let req = Message::decode(&mut reader).await.unwrap();
        let mut res = req.clone();
        res.status = MessageStatusType::Error;
        res.metadata
            .insert(SERVICE_ERROR_KEY.to_string(), "divide by zero".to_string());
        let _ = write_half.write_all(&res.encode()).await;
    });

    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();
    let result: Result<(i64, _), _> = client
        .call("Arith", "Div", Default::default(), &(1, 0))
        .await;
    assert!(result.is_err());
    assert!(result.unwrap_err().is_service_error());
    server.await.unwrap();
}

#[tokio::test]
async fn send_raw_round_trips_the_header_map_bit_exact() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let req = Message::decode(&mut reader).await.unwrap();
        let mut res = req.clone();
        res.message_type = rpcx_share::MessageType::Response;
        res.payload = b"X".to_vec();
        let _ = write_half.write_all(&res.encode()).await;
    });

    let client = ConnectionClient::connect("tcp", &addr.to_string(), ClientOption::default())
        .await
        .unwrap();

    let mut msg = Message::new();
    msg.seq = 42;
    msg.service_path = "S".to_string();
    msg.service_method = "M".to_string();
    msg.serialize_type = SerializeType::Json;

    let raw = client.send_raw(Metadata::new(), msg).await.unwrap();

    assert_eq!(raw.headers.get("X-RPCX-MessageID").unwrap(), "42");
    assert_eq!(raw.headers.get("X-RPCX-ServicePath").unwrap(), "S");
    assert_eq!(raw.headers.get("X-RPCX-MessageStatusType").unwrap(), "Normal");
    assert_eq!(raw.payload, b"X");
    server.await.unwrap();
}
