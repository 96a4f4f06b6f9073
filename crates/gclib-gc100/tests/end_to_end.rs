//! End-to-end scenarios against simulated gateways over real sockets.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use gclib_core::{ConnectorAddress, Error, Notification};
use gclib_gc100::{Command, Gc100Builder, IrComplete, SerialOptions};
use gclib_test_harness::MockTcpServer;

const CYCLES: [u32; 10] = [50, 100, 12, 12, 12, 24, 12, 24, 12, 600];

/// A device that parses every command line and answers via `reply`.
/// Returns the port and the task; the task yields the lines it received.
async fn simulated_device<F>(reply: F) -> (u16, JoinHandle<Vec<String>>)
where
    F: Fn(&Command) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let task = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut seen = Vec::new();
        let mut pending = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return seen,
                Ok(n) => n,
            };
            pending.extend_from_slice(&buf[..n]);
            while let Some(pos) = pending.iter().position(|&b| b == b'\r') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8(line).unwrap();
                let cmd = Command::parse(&line).unwrap();
                seen.push(line);
                let answer = reply(&cmd);
                if !answer.is_empty() {
                    stream.write_all(answer.as_bytes()).await.unwrap();
                }
            }
        }
    });
    (port, task)
}

#[tokio::test]
async fn send_ir_end_to_end() {
    let mut server = MockTcpServer::new().await.unwrap();
    server.expect(
        b"sendir,2:1,1,38000,1,3,50,100,12,12,12,24,12,24,12,600\r",
        b"completeir,2:1,1\r",
    );
    server.start();

    let gc = Gc100Builder::new("127.0.0.1")
        .port(server.port())
        .build()
        .await
        .unwrap();

    let addr: ConnectorAddress = "2:1".parse().unwrap();
    let done = gc.send_ir(addr, 38_000, &CYCLES).await.unwrap();
    assert_eq!(done, IrComplete { addr, id: 1 });

    gc.disconnect().await;
    server.wait().await.unwrap();
}

#[tokio::test]
async fn device_error_then_success() {
    let (port, device) = simulated_device(|cmd| match cmd {
        Command::Blink { .. } => String::new(),
        _ => "ERR,001\r".to_string(),
    })
    .await;

    let gc = Gc100Builder::new("127.0.0.1")
        .port(port)
        .settle_timeout(Duration::from_millis(50))
        .build()
        .await
        .unwrap();

    let addr = ConnectorAddress::new(2, 1);
    let results = [
        gc.send_ir(addr, 38_000, &CYCLES).await.map(|_| ()),
        gc.get_network().await.map(|_| ()),
        gc.get_state(ConnectorAddress::new(3, 1)).await.map(|_| ()),
        gc.get_version(1).await.map(|_| ()),
    ];
    for result in results {
        let err = result.unwrap_err();
        let e = err.command_error().expect("command error");
        assert_eq!(e.raw_code(), "001");
        assert_eq!(e.code(), 1);
    }

    gc.blink(true).await.unwrap();
    gc.disconnect().await;

    let seen = device.await.unwrap();
    assert_eq!(seen.len(), 5);
    assert_eq!(seen[4], "blink,1\r");
}

#[tokio::test]
async fn notification_between_command_and_reply() {
    let (port, device) = simulated_device(|cmd| match cmd {
        Command::GetState { addr } => format!("statechange,4:3,1\rstate,{addr},1\r"),
        _ => String::new(),
    })
    .await;

    let gc = Gc100Builder::new("127.0.0.1").port(port).build().await.unwrap();
    let mut notifications = gc.subscribe();

    let on = gc.get_state(ConnectorAddress::new(3, 1)).await.unwrap();
    assert!(on);

    let n = tokio::time::timeout(Duration::from_secs(1), notifications.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        n,
        Notification::StateChange {
            addr: ConnectorAddress::new(4, 3),
            on: true
        }
    );

    gc.disconnect().await;
    device.await.unwrap();
}

#[tokio::test]
async fn concurrent_facade_calls_are_serialized() {
    let mut server = MockTcpServer::new().await.unwrap();
    server.expect_delayed(
        b"getversion,1\r",
        b"version,1,3.0-12\r",
        Duration::from_millis(120),
    );
    server.expect_delayed(
        b"getversion,2\r",
        b"version,2,3.0-07\r",
        Duration::from_millis(5),
    );
    server.start();

    let gc = Gc100Builder::new("127.0.0.1")
        .port(server.port())
        .build()
        .await
        .unwrap();

    let slow = {
        let gc = gc.clone();
        tokio::spawn(async move { gc.get_version(1).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = gc.get_version(2).await.unwrap();

    assert_eq!(fast, "3.0-07");
    assert_eq!(slow.await.unwrap().unwrap(), "3.0-12");

    gc.disconnect().await;
    server.wait().await.unwrap();
}

#[tokio::test]
async fn serial_echo_alongside_control() {
    let mut control = MockTcpServer::new().await.unwrap();
    control.expect(b"getstate,3:1\r", b"state,3:1,0\r");
    control.start();

    let mut data = MockTcpServer::new().await.unwrap();
    data.start_echo();

    let gc = Gc100Builder::new("127.0.0.1")
        .port(control.port())
        .build()
        .await
        .unwrap();

    let serial = gc.serial_with_options(
        ConnectorAddress::new(1, 1),
        0,
        SerialOptions {
            base_port: data.port(),
            recv_timeout: Some(Duration::from_secs(2)),
            ..SerialOptions::default()
        },
    );
    serial.connect().await.unwrap();
    serial.send(b"hello\r").await.unwrap();

    // The control channel is unaffected by serial traffic.
    assert!(!gc.get_state(ConnectorAddress::new(3, 1)).await.unwrap());

    let mut got = Vec::new();
    while got.len() < 6 {
        got.extend(serial.recv(80).await.unwrap());
    }
    assert_eq!(got, b"hello\r");

    serial.disconnect().await.unwrap();
    gc.disconnect().await;
    data.wait().await.unwrap();
    control.wait().await.unwrap();
}

#[tokio::test]
async fn disconnect_fails_pending_command() {
    // A device that accepts but never answers.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let peer = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut sink = [0u8; 64];
        while let Ok(n) = stream.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    });

    let gc = Gc100Builder::new("127.0.0.1")
        .port(port)
        .command_timeout(Duration::from_secs(10))
        .build()
        .await
        .unwrap();

    let pending = {
        let gc = gc.clone();
        tokio::spawn(async move { gc.get_network().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    gc.disconnect().await;

    let result = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::ConnectionLost)));
    assert!(!gc.is_connected());

    peer.await.unwrap();
}
