//! Integration tests — resolver, endpoint, and full client lifecycle
//! against a stub arithmetic service over real TCP on localhost.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use tally_core::{
    ClientOptions, ClientOutput, Connection, ConnectionInfo, Frame, Hello, MessageType, Operation,
    Resolver, RetryPolicy, TallyClient, TallyError, Task, TcpResolver,
};

// ── Stub service ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceMode {
    /// Answer every request.
    Answer,
    /// Accept requests, never answer them.
    Silent,
    /// Swallow the first request per connection, answer the rest.
    DropFirst,
}

/// Handle to a running stub service; `kill` drops the listener and all
/// open connections, simulating a server crash.
struct StubService {
    info: ConnectionInfo,
    shutdown: watch::Sender<bool>,
}

impl StubService {
    async fn spawn(capabilities: Vec<String>, mode: ServiceMode) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let info = ConnectionInfo::new(addr.ip().to_string(), addr.port());
        let (shutdown, shutdown_rx) = watch::channel(false);

        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    accepted = listener.accept() => accepted,
                    _ = wait_shutdown(shutdown_rx.clone()) => break,
                };
                let Ok((stream, _)) = accepted else { break };
                let capabilities = capabilities.clone();
                let shutdown_rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    let conn = Connection::new(stream);
                    tokio::select! {
                        _ = serve(conn, capabilities, mode) => {}
                        _ = wait_shutdown(shutdown_rx) => {}
                    }
                });
            }
        });

        Self { info, shutdown }
    }

    fn host(&self) -> String {
        self.info.host().to_string()
    }

    fn port(&self) -> u16 {
        self.info.port()
    }

    fn kill(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn wait_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn serve(mut conn: Connection, capabilities: Vec<String>, mode: ServiceMode) {
    let hello = Frame::hello(&Hello { capabilities }).unwrap();
    if conn.send(hello).await.is_err() {
        return;
    }
    let mut swallowed = false;
    while let Some(frame) = conn.recv().await {
        if !matches!(frame.message_type(), Ok(MessageType::Request)) {
            continue;
        }
        match mode {
            ServiceMode::Silent => continue,
            ServiceMode::DropFirst if !swallowed => {
                swallowed = true;
                continue;
            }
            _ => {}
        }
        let request = frame.decode_request().unwrap();
        let value = request.op.apply(request.lhs, request.rhs);
        let response = Frame::response(frame.request_id(), value).unwrap();
        if conn.send(response).await.is_err() {
            break;
        }
    }
}

fn full_capabilities() -> Vec<String> {
    vec!["arith.add".to_string(), "arith.sub".to_string()]
}

// ── Output helpers ───────────────────────────────────────────────

async fn next_output(rx: &mut mpsc::UnboundedReceiver<ClientOutput>) -> ClientOutput {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timeout waiting for client output")
        .expect("client output stream closed")
}

async fn next_notice(rx: &mut mpsc::UnboundedReceiver<ClientOutput>) -> String {
    loop {
        if let ClientOutput::Notice(message) = next_output(rx).await {
            return message;
        }
    }
}

async fn next_result(rx: &mut mpsc::UnboundedReceiver<ClientOutput>) -> (Task, i64) {
    loop {
        if let ClientOutput::Result { task, value } = next_output(rx).await {
            return (task, value);
        }
    }
}

// ── Resolver ─────────────────────────────────────────────────────

#[tokio::test]
async fn resolver_accepts_matching_service() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Answer).await;

    let resolved = TcpResolver
        .resolve(&service.host(), service.port())
        .await
        .unwrap();
    assert!(resolved.mismatches.is_empty());
    assert_eq!(resolved.endpoint.handle().addr().port(), service.port());
}

#[tokio::test]
async fn resolver_reports_missing_capabilities() {
    let service = StubService::spawn(vec!["arith.add".to_string()], ServiceMode::Answer).await;

    let resolved = TcpResolver
        .resolve(&service.host(), service.port())
        .await
        .unwrap();
    assert_eq!(resolved.mismatches, vec!["arith.sub".to_string()]);
}

#[tokio::test]
async fn resolver_fails_on_unreachable_address() {
    // Bind and immediately drop a listener to get a dead port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let result = TcpResolver.resolve("127.0.0.1", port).await;
    assert!(result.is_err());
}

// ── Endpoint ─────────────────────────────────────────────────────

#[tokio::test]
async fn endpoint_execute_round_trip() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Answer).await;
    let resolved = TcpResolver
        .resolve(&service.host(), service.port())
        .await
        .unwrap();

    let value = resolved
        .endpoint
        .execute(Operation::Add, 2, 3, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(value, 5);

    let value = resolved
        .endpoint
        .execute(Operation::Subtract, 9, 4, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(value, 5);
    assert_eq!(resolved.endpoint.pending_count().await, 0);
}

#[tokio::test]
async fn endpoint_request_times_out_and_deregisters() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Silent).await;
    let resolved = TcpResolver
        .resolve(&service.host(), service.port())
        .await
        .unwrap();

    let result = resolved
        .endpoint
        .execute(Operation::Add, 1, 1, Duration::from_millis(100))
        .await;
    assert!(matches!(result, Err(TallyError::Timeout(_))));
    assert_eq!(resolved.endpoint.pending_count().await, 0);
}

#[tokio::test]
async fn endpoint_signals_closure_and_fails_pending_fast() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Silent).await;
    let resolved = TcpResolver
        .resolve(&service.host(), service.port())
        .await
        .unwrap();
    let endpoint = resolved.endpoint;

    // A long-deadline request is outstanding when the server dies; it
    // must fail immediately, not wait out its timeout.
    let pending = endpoint.begin(Task::new(Operation::Add, 1, 1)).await.unwrap();
    service.kill();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        pending.wait(Duration::from_secs(60)),
    )
    .await
    .expect("pending wait did not fail fast");
    assert!(matches!(result, Err(TallyError::EndpointClosed)));

    tokio::time::timeout(Duration::from_secs(5), endpoint.closed())
        .await
        .expect("closed() did not fire after server death");
}

// ── Full client lifecycle ────────────────────────────────────────

#[tokio::test]
async fn client_buffers_then_flushes_on_connect() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Answer).await;
    let (client, mut outputs) =
        TallyClient::spawn(Arc::new(TcpResolver), ClientOptions::default());

    // Submitted while Disconnected: buffered, nothing on the wire.
    client.submit(Task::new(Operation::Add, 2, 3)).unwrap();
    client.submit(Task::new(Operation::Subtract, 9, 4)).unwrap();
    client.submit(Task::new(Operation::Add, 10, 20)).unwrap();

    client.connect(service.host(), service.port()).unwrap();
    let notice = next_notice(&mut outputs).await;
    assert!(notice.contains("successfully connected"));

    // All three buffered tasks produce results after the flush.
    let mut values = Vec::new();
    for _ in 0..3 {
        let (_, value) = next_result(&mut outputs).await;
        values.push(value);
    }
    values.sort();
    assert_eq!(values, vec![5, 5, 30]);
}

#[tokio::test]
async fn client_rejects_wrong_service_kind() {
    let service = StubService::spawn(vec!["echo".to_string()], ServiceMode::Answer).await;
    let (client, mut outputs) =
        TallyClient::spawn(Arc::new(TcpResolver), ClientOptions::default());

    client.submit(Task::new(Operation::Add, 2, 3)).unwrap();
    client.connect(service.host(), service.port()).unwrap();

    let notice = next_notice(&mut outputs).await;
    assert!(notice.contains("does not provide"));

    // Not running: nothing may have been dispatched or answered.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(outputs.try_recv().is_err());
}

#[tokio::test]
async fn client_reports_unreachable_server() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (client, mut outputs) =
        TallyClient::spawn(Arc::new(TcpResolver), ClientOptions::default());
    client.connect("127.0.0.1", port).unwrap();

    let notice = next_notice(&mut outputs).await;
    assert!(notice.contains("cannot connect"));
}

#[tokio::test]
async fn client_survives_server_restart_without_losing_work() {
    let first = StubService::spawn(full_capabilities(), ServiceMode::Answer).await;
    let (client, mut outputs) =
        TallyClient::spawn(Arc::new(TcpResolver), ClientOptions::default());

    client.connect(first.host(), first.port()).unwrap();
    assert!(next_notice(&mut outputs).await.contains("successfully connected"));

    client.submit(Task::new(Operation::Add, 2, 3)).unwrap();
    assert_eq!(next_result(&mut outputs).await.1, 5);

    // Server dies; the failure detector resets the client.
    first.kill();
    assert!(next_notice(&mut outputs).await.contains("lost connection"));

    // Work accepted while down buffers instead of being lost.
    client.submit(Task::new(Operation::Subtract, 9, 4)).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(outputs.try_recv().is_err(), "no server, no result yet");

    // A replacement server comes up; reconnect flushes the buffer.
    let second = StubService::spawn(full_capabilities(), ServiceMode::Answer).await;
    client.connect(second.host(), second.port()).unwrap();
    assert!(next_notice(&mut outputs).await.contains("successfully connected"));
    let (task, value) = next_result(&mut outputs).await;
    assert_eq!(task, Task::new(Operation::Subtract, 9, 4));
    assert_eq!(value, 5);
}

#[tokio::test]
async fn client_retries_timed_out_request_until_answered() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::DropFirst).await;
    let options = ClientOptions {
        request_timeout: Duration::from_millis(300),
        retry: RetryPolicy::Unbounded,
    };
    let (client, mut outputs) = TallyClient::spawn(Arc::new(TcpResolver), options);

    client.connect(service.host(), service.port()).unwrap();
    assert!(next_notice(&mut outputs).await.contains("successfully connected"));

    // First dispatch is swallowed; the timeout resubmits it and the
    // second dispatch succeeds. Exactly one result, no duplicates.
    client.submit(Task::new(Operation::Add, 20, 22)).unwrap();
    let (task, value) = next_result(&mut outputs).await;
    assert_eq!(task, Task::new(Operation::Add, 20, 22));
    assert_eq!(value, 42);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(outputs.try_recv().is_err(), "a retried task must report once");
}

#[tokio::test]
async fn client_bounded_retry_gives_up() {
    let service = StubService::spawn(full_capabilities(), ServiceMode::Silent).await;
    let options = ClientOptions {
        request_timeout: Duration::from_millis(100),
        retry: RetryPolicy::Bounded {
            max_attempts: 2,
            backoff: Duration::from_millis(10),
        },
    };
    let (client, mut outputs) = TallyClient::spawn(Arc::new(TcpResolver), options);

    client.connect(service.host(), service.port()).unwrap();
    assert!(next_notice(&mut outputs).await.contains("successfully connected"));

    client.submit(Task::new(Operation::Add, 1, 1)).unwrap();
    let notice = next_notice(&mut outputs).await;
    assert!(notice.contains("giving up"), "got notice: {notice}");
}
