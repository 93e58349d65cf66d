mod common;

use common::*;
use sensorcon::config::Config;
use sensorcon::console::{Admission, ConsoleServer, SessionState, REFUSAL_MESSAGE};
use sensorcon::transport::MemoryTransport;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn test_config() -> Config {
    let mut config = Config::default();
    config.console.serial_enabled = false;
    config.network.listen = "127.0.0.1:0".to_string();
    config.network.max_sessions = 1;
    config.console.tick_ms = 5;
    config
}

async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
    let mut collected = Vec::new();
    let mut buf = [0u8; 512];
    let result = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            collected.extend_from_slice(&buf[..n]);
            if String::from_utf8_lossy(&collected).contains(needle) {
                break;
            }
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {needle:?}");
    String::from_utf8_lossy(&collected).into_owned()
}

#[test]
fn serial_trigger_runs_a_measurement_cycle() {
    let h = harness();
    let log = h.log.clone();
    let mut server = ConsoleServer::from_parts(test_config(), h.ctx, Some(h.trigger)).unwrap();
    let (transport, t) = MemoryTransport::pair("serial");
    assert!(server.attach_serial(Box::new(transport)));
    t.take_output();

    t.send_line("s.trig", SERIAL_EOL);
    server.poll_once();
    assert_eq!(t.take_output(), "measurement triggered\n> ");
    assert!(log.contents().contains("measurement cycle (requested)"));

    server.poll_once();
    assert_eq!(log.contents().matches("measurement cycle").count(), 1);
}

#[test]
fn interval_elapsing_runs_a_measurement_cycle() {
    let h = harness();
    let log = h.log.clone();
    let mut server = ConsoleServer::from_parts(test_config(), h.ctx, None).unwrap();
    let (transport, t) = MemoryTransport::pair("serial");
    server.attach_serial(Box::new(transport));
    t.send_line("s.set interval 1", SERIAL_EOL);
    server.poll_once();
    std::thread::sleep(Duration::from_millis(1100));
    server.poll_once();
    assert!(log.contents().contains("measurement cycle (interval)"));
}

#[test]
fn server_pool_refuses_second_connection() {
    let h = harness_with_password();
    let mut server = ConsoleServer::from_parts(test_config(), h.ctx, None).unwrap();
    let (a, _a_t) = MemoryTransport::pair("10.1.1.1:1");
    let (b, b_t) = MemoryTransport::pair("10.1.1.2:1");
    assert_eq!(server.accept(Box::new(a)), Admission::Accepted { slot: 0 });
    assert_eq!(server.accept(Box::new(b)), Admission::Refused);
    assert!(b_t.is_closed());
    assert_eq!(server.pool().live_count(), 1);
    server.shutdown();
    assert_eq!(server.pool().live_count(), 0);
}

#[tokio::test]
async fn telnet_session_end_to_end() {
    let h = harness_with_password();
    let mut server = ConsoleServer::from_parts(test_config(), h.ctx, None).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = server.shutdown_handle();

    let task = tokio::spawn(async move {
        let result = server.run_with_listener(Some(listener)).await;
        (server, result)
    });

    let mut client = TcpStream::connect(addr).await.unwrap();
    let greeting = read_until(&mut client, "Please enter password").await;
    assert!(greeting.contains("Welcome to the sensor node network interface!"));

    client.write_all(b"sensor-secret\r\n").await.unwrap();
    read_until(&mut client, "mqtt-temp-sensor> ").await;

    client.write_all(b"s.set interval 42\r\n").await.unwrap();
    let reply = read_until(&mut client, "mqtt-temp-sensor> ").await;
    assert!(reply.contains("Measurement interval set to 42 seconds"));

    // A second client finds the only slot taken
    let mut second = TcpStream::connect(addr).await.unwrap();
    let refused = read_until(&mut second, "try again later").await;
    assert!(refused.starts_with("too many connections"));

    client.write_all(b"quit\r\n").await.unwrap();
    let bye = read_until(&mut client, "bye").await;
    assert!(bye.contains("bye\n"));

    shutdown.notify_one();
    let (server, result) = task.await.unwrap();
    result.unwrap();
    assert_eq!(server.context().settings.get().measurement_interval_seconds, 42);
    assert_eq!(server.pool().session(0).unwrap().state(), SessionState::Disconnected);
}

async fn spawn_server(
    mut server: ConsoleServer,
) -> (
    std::net::SocketAddr,
    std::sync::Arc<tokio::sync::Notify>,
    tokio::task::JoinHandle<(ConsoleServer, anyhow::Result<()>)>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(async move {
        let result = server.run_with_listener(Some(listener)).await;
        (server, result)
    });
    (addr, shutdown, task)
}

#[tokio::test]
async fn refused_tcp_client_reads_notice_then_eof() {
    let h = harness_with_password();
    let server = ConsoleServer::from_parts(test_config(), h.ctx, None).unwrap();
    let (addr, shutdown, task) = spawn_server(server).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    read_until(&mut first, "Please enter password").await;

    let mut second = TcpStream::connect(addr).await.unwrap();
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), second.read_to_end(&mut received))
        .await
        .expect("refused connection was never closed")
        .unwrap();
    assert_eq!(String::from_utf8_lossy(&received), REFUSAL_MESSAGE);

    shutdown.notify_one();
    let (server, result) = task.await.unwrap();
    result.unwrap();
    assert_eq!(server.pool().live_count(), 0);
}

#[tokio::test]
async fn refused_client_hanging_up_early_does_not_disturb_the_pool() {
    let h = harness_with_password();
    let server = ConsoleServer::from_parts(test_config(), h.ctx, None).unwrap();
    let (addr, shutdown, task) = spawn_server(server).await;

    let mut first = TcpStream::connect(addr).await.unwrap();
    read_until(&mut first, "Please enter password").await;

    // Gone before the refusal can be written
    let second = TcpStream::connect(addr).await.unwrap();
    drop(second);
    tokio::time::sleep(Duration::from_millis(50)).await;

    first.write_all(b"sensor-secret\r\n").await.unwrap();
    read_until(&mut first, "mqtt-temp-sensor> ").await;
    first.write_all(b"s.set interval 7 extra\r\n").await.unwrap();
    let reply = read_until(&mut first, "mqtt-temp-sensor> ").await;
    assert!(reply.contains("unexpected argument \"extra\""));

    let mut third = TcpStream::connect(addr).await.unwrap();
    let refused = read_until(&mut third, "try again later").await;
    assert!(REFUSAL_MESSAGE.starts_with(refused.as_str()));

    shutdown.notify_one();
    let (server, result) = task.await.unwrap();
    result.unwrap();
    assert_eq!(server.context().settings.get().measurement_interval_seconds, 1800);
}
