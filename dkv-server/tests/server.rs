use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dkv_server::{launch, ServerConfig, ServerContext};

async fn start(big_map_size: usize) -> dkv_server::Running {
    let config = ServerConfig {
        listen_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        big_map_size,
        window: 60,
        shards: 4,
        tight_loop: false,
    };
    let listener = TcpListener::bind(config.listen_address).await.expect("bind");
    launch(ServerContext::new(config), listener).expect("launch")
}

/// Sends a bare HTTP/1.1 GET and returns (status line, body).
async fn get(addr: SocketAddr, path: &str) -> (String, String) {
    let mut stream = TcpStream::connect(addr).await.expect("connect");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.expect("write");

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .expect("timeout")
        .expect("read");
    let text = String::from_utf8(raw).expect("utf8");
    let (head, body) = text.split_once("\r\n\r\n").expect("header terminator");
    let status = head.lines().next().unwrap_or_default().to_string();
    (status, body.to_string())
}

async fn wait_for_population(running: &dkv_server::Running, target: usize) {
    let progress = running.population.progress();
    for _ in 0..500 {
        if progress.is_done() && progress.inserted() == target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("population did not finish");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn magic_key_is_served() {
    let running = start(100).await;
    let (status, body) = get(running.local_addr, "/query?key=magic").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "key\n");

    let (_, body) = get(running.local_addr, "/%71uery?key=magic&key=nope").await;
    assert_eq!(body, "key\n");
    running.scheduler.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_key_reports_not_found() {
    let running = start(100).await;
    let (status, body) = get(running.local_addr, "/query?key=nope").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body, "nope is not found\n");

    let (_, body) = get(running.local_addr, "/query").await;
    assert!(body.is_empty());
    running.scheduler.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sample_returns_distinct_keys_after_population() {
    let running = start(100).await;
    wait_for_population(&running, 100).await;

    let (_, body) = get(running.local_addr, "/sample?count=5").await;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 5);
    let distinct: HashSet<&str> = lines.iter().copied().collect();
    assert_eq!(distinct.len(), 5);

    let (_, body) = get(running.local_addr, "/sample?count=abc").await;
    assert_eq!(body.lines().count(), 1);

    let (_, body) = get(running.local_addr, "/sample?count=0").await;
    assert_eq!(body.lines().count(), 101);
    running.scheduler.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn statistics_report_contains_memory_usage() {
    let running = start(100).await;
    for path in ["/stat", "/statistics", "/"] {
        let (status, body) = get(running.local_addr, path).await;
        assert_eq!(status, "HTTP/1.1 200 OK");
        assert!(body.contains("MiB"), "{path}: {body}");
        assert!(body.contains("rate_query"));
        assert!(body.contains("latency_query"));
    }
    running.scheduler.abort();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_path_is_empty_200() {
    let running = start(10).await;
    let (status, body) = get(running.local_addr, "/does/not/exist").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert!(body.is_empty());

    // A parameter without a value falls back to the default count.
    let (status, body) = get(running.local_addr, "/sample?count").await;
    assert_eq!(status, "HTTP/1.1 200 OK");
    assert_eq!(body.lines().count(), 1);
    running.scheduler.abort();
}
