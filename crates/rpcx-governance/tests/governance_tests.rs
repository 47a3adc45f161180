use std::sync::Arc;
use std::time::Duration;

use rpcx_client::ClientOption;
use rpcx_governance::{CallContext, FailMode, GovernanceClient, GovernanceOption, SelectMode, StaticDiscovery};
use rpcx_share::{Message, MessageStatusType, SerializeType, SERVICE_ERROR_KEY};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
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
            let mut res = req.clone();
            res.payload = SerializeType::MsgPack
                .encode(&(req.payload.len() as i64))
                .unwrap_or_default();
            if write_half.write_all(&res.encode()).await.is_err() {
                break;
            }
        }
    });
    (addr, handle)
}

async fn start_error_server() -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let req = Message::decode(&mut reader).await.unwrap();
        let mut res = req.clone();
        res.status = MessageStatusType::Error;
        res.metadata
            .insert(SERVICE_ERROR_KEY.to_string(), "record not found".to_string());
        let _ = write_half.write_all(&res.encode()).await;
    });
    (addr, handle)
}

async fn start_slow_server(delay: Duration) -> (std::net::SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let req = Message::decode(&mut reader).await.unwrap();
        tokio::time::sleep(delay).await;
        let mut res = req.clone();
        res.payload = SerializeType::MsgPack.encode(&1i64).unwrap_or_default();
        let _ = write_half.write_all(&res.encode()).await;
    });
    (addr, handle)
}

fn unreachable_port() -> String {
    // Bind then immediately drop: the port is free again but nothing listens,
    // so a connect attempt against it is refused quickly and deterministically.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

#[tokio::test]
async fn failover_skips_a_dead_endpoint_and_succeeds_on_the_next() {
    let (good_addr, _server) = start_echo_server().await;
    let dead_addr = unreachable_port();

    let discovery = Arc::new(StaticDiscovery::new(
        "Arith",
        vec![
            (format!("tcp@{dead_addr}"), String::new()),
            (format!("tcp@{good_addr}"), String::new()),
        ],
    ));

    let option = GovernanceOption::builder()
        .fail_mode(FailMode::Failover)
        .select_mode(SelectMode::RoundRobin)
        .retries(3)
        .client_option(ClientOption::builder().connect_timeout(Duration::from_millis(500)).build())
        .build();

    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();
    let (reply, _meta): (i64, _) = client
        .call("Len", CallContext::new(), &"hello".to_string())
        .await
        .unwrap();
    assert!(reply > 0);
}

#[tokio::test]
async fn service_errors_are_never_retried() {
    let (addr, _server) = start_error_server().await;
    let discovery = Arc::new(StaticDiscovery::new("Arith", vec![(format!("tcp@{addr}"), String::new())]));

    let option = GovernanceOption::builder()
        .fail_mode(FailMode::Failtry)
        .retries(5)
        .build();

    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();
    let result = client.call::<_, i64>("Div", CallContext::new(), &(1, 0)).await;
    assert!(result.is_err());
    assert!(result.unwrap_err().is_service_error());
}

#[tokio::test]
async fn failbackup_prefers_whichever_endpoint_answers_first() {
    let (slow_addr, _slow) = start_slow_server(Duration::from_millis(200)).await;
    let (fast_addr, _fast) = start_echo_server().await;

    let discovery = Arc::new(StaticDiscovery::new(
        "Arith",
        vec![(format!("tcp@{slow_addr}"), String::new())],
    ));

    let option = GovernanceOption::builder()
        .fail_mode(FailMode::Failbackup)
        .select_mode(SelectMode::RoundRobin)
        .backup_latency(Duration::from_millis(20))
        .build();

    let client: Arc<GovernanceClient> = GovernanceClient::new("Arith", option, discovery.clone()).await.unwrap();

    // Push the fast server in alongside the slow one once the client is
    // running, so the backup attempt (issued after `backup_latency`) has
    // somewhere else to land.
    discovery.push(vec![
        (format!("tcp@{slow_addr}"), String::new()),
        (format!("tcp@{fast_addr}"), String::new()),
    ]);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let start = tokio::time::Instant::now();
    let (reply, _meta): (i64, _) = client
        .call("Len", CallContext::new(), &"hello".to_string())
        .await
        .unwrap();
    assert!(reply > 0);
    // The fast server should win well before the slow server's 200ms delay.
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test]
async fn broadcast_reports_partial_failure() {
    let (good_addr, _good) = start_echo_server().await;
    let (bad_addr, _bad) = start_error_server().await;

    let discovery = Arc::new(StaticDiscovery::new(
        "Arith",
        vec![(format!("tcp@{good_addr}"), String::new()), (format!("tcp@{bad_addr}"), String::new())],
    ));

    let option = GovernanceOption::builder().build();
    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();

    let result = client
        .broadcast::<_, i64>("Len", CallContext::new(), &"hello".to_string())
        .await;
    assert!(result.is_err());
    match result.unwrap_err() {
        rpcx_governance::GovernanceError::Aggregate(failed, total, _) => {
            assert_eq!(failed, 1);
            assert_eq!(total, 2);
        }
        other => panic!("expected an aggregate error, got {other:?}"),
    }
}

#[tokio::test]
async fn fork_succeeds_as_soon_as_one_endpoint_answers() {
    let (good_addr, _good) = start_echo_server().await;
    let (bad_addr, _bad) = start_error_server().await;

    let discovery = Arc::new(StaticDiscovery::new(
        "Arith",
        vec![(format!("tcp@{good_addr}"), String::new()), (format!("tcp@{bad_addr}"), String::new())],
    ));

    let option = GovernanceOption::builder().build();
    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();

    let (reply, _meta): (i64, _) = client
        .fork("Len", CallContext::new(), &"hello".to_string())
        .await
        .unwrap();
    assert!(reply > 0);
}

#[tokio::test]
async fn round_robin_selection_visits_every_cached_endpoint() {
    let (addr_a, _a) = start_echo_server().await;
    let (addr_b, _b) = start_echo_server().await;

    let discovery = Arc::new(StaticDiscovery::new(
        "Arith",
        vec![(format!("tcp@{addr_a}"), String::new()), (format!("tcp@{addr_b}"), String::new())],
    ));

    let option = GovernanceOption::builder().select_mode(SelectMode::RoundRobin).build();
    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();

    for _ in 0..4 {
        let (reply, _meta): (i64, _) = client
            .call("Len", CallContext::new(), &"hi".to_string())
            .await
            .unwrap();
        assert!(reply > 0);
    }
}

#[tokio::test]
async fn close_stops_accepting_new_calls() {
    let (addr, _server) = start_echo_server().await;
    let discovery = Arc::new(StaticDiscovery::new("Arith", vec![(format!("tcp@{addr}"), String::new())]));
    let option = GovernanceOption::builder().build();
    let client = GovernanceClient::new("Arith", option, discovery).await.unwrap();

    client.close().await;
    let result = client.call::<_, i64>("Len", CallContext::new(), &"hi".to_string()).await;
    assert!(result.is_err());
}
