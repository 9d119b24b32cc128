//! End-to-end tests: RPC client -> WServer -> fake core node, over loopback ZMQ.

use anyhow::Result;
use serde_json::{json, Value};
use sqlx::Row;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use wserver::{Registry, WServer, WServerConfig};
use wserver_db::Gdb;
use wserver_protocol::{CoreAuth, CoreCall, Message, OpCode, RecordId};
use zeromq::{RepSocket, ReqSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

/// Generate a random port in the ephemeral range to avoid collisions
fn random_test_port() -> u16 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64;
    let pid = std::process::id() as u64;
    ((seed ^ pid) % 10000 + 50000) as u16
}

async fn bind_rep() -> Result<(RepSocket, u16)> {
    let mut last_err = None;
    for _ in 0..25 {
        let mut socket = RepSocket::new();
        let port = random_test_port();
        match socket.bind(&format!("tcp://127.0.0.1:{}", port)).await {
            Ok(_) => return Ok((socket, port)),
            Err(err) => last_err = Some(err),
        }
    }
    Err(anyhow::anyhow!("Failed to bind after multiple attempts: {:?}", last_err))
}

/// Fake core node: accepts any credentials and forwards every call it receives.
fn spawn_core(mut core: RepSocket, calls: mpsc::Sender<(CoreAuth, CoreCall)>) {
    tokio::spawn(async move {
        let mut auth = None;
        while let Ok(multipart) = core.recv().await {
            let frames: Vec<Vec<u8>> = multipart.into_vec().into_iter().map(|b| b.to_vec()).collect();
            let Ok(msg) = Message::unpack(&frames) else { break };

            let (opcode, body) = match msg.header.opcode {
                OpCode::Auth => {
                    auth = msg.decode::<CoreAuth>().ok();
                    (OpCode::Reply, json!({"status": true}))
                }
                OpCode::Call => match (auth.clone(), msg.decode::<CoreCall>()) {
                    (Some(creds), Ok(call)) => {
                        let _ = calls.send((creds, call)).await;
                        (OpCode::Reply, json!({"status": true, "info": msg.header.request_id}))
                    }
                    _ => (OpCode::Err, json!("call before auth")),
                },
                _ => (OpCode::Err, json!("unexpected opcode")),
            };

            let Ok((header, payload)) = Message::json(opcode, msg.header.request_id, &body)
                .and_then(|m| m.pack())
            else {
                break;
            };
            let mut reply = ZmqMessage::from(header);
            reply.push_back(payload.into());
            if core.send(reply).await.is_err() {
                break;
            }
        }
    });
}

struct Harness {
    client: ReqSocket,
    gdb: Gdb,
    stop: Option<oneshot::Sender<()>>,
    _tmp: TempDir,
}

impl Harness {
    async fn start(core_port: u16) -> Result<Self> {
        let tmp = TempDir::new()?;
        let gdb = Gdb::open_memory().await?;

        // Polygon 9 is both a broadcast target and reachable on loopback.
        gdb.try_execute(
            "INSERT INTO duo_polygons (polygon, duo_role) VALUES (?, ?)",
            &[9i64.into(), 1i64.into()],
        )
        .await;
        gdb.try_execute(
            "INSERT INTO users (id, last_ip) VALUES (?, ?)",
            &[9i64.into(), "127.0.0.1".into()],
        )
        .await;

        let mut config = WServerConfig::default();
        config.photos_dir = tmp.path().join("photos");
        config.core.port = core_port;
        config.core.login = "wserver".to_string();
        config.core.password = "secret".to_string();
        config.core.connect_timeout_ms = 1_000;
        config.core.request_timeout_ms = 1_000;

        let mut last_err = None;
        let mut bound = None;
        for _ in 0..25 {
            let addr = format!("tcp://127.0.0.1:{}", random_test_port());
            // bind consumes the registry, so each attempt composes its own
            let registry = Registry::from_config(&config, gdb.clone())?;
            match WServer::bind(&addr, registry).await {
                Ok(server) => {
                    bound = Some((server, addr));
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let (server, addr) = bound.ok_or_else(|| {
            anyhow::anyhow!("Failed to bind WServer: {:?}", last_err)
        })?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        tokio::spawn(server.run_until(async move {
            let _ = stop_rx.await;
        }));

        let mut client = ReqSocket::new();
        client.connect(&addr).await?;

        Ok(Self {
            client,
            gdb,
            stop: Some(stop_tx),
            _tmp: tmp,
        })
    }

    async fn call_raw(&mut self, bytes: Vec<u8>) -> Result<Value> {
        self.client.send(ZmqMessage::from(bytes)).await?;
        let reply = timeout(Duration::from_secs(5), self.client.recv()).await??;
        let frame = reply
            .into_vec()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty reply"))?;
        Ok(serde_json::from_slice(&frame)?)
    }

    async fn call(&mut self, request: Value) -> Result<Value> {
        self.call_raw(serde_json::to_vec(&request)?).await
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

#[tokio::test]
async fn test_set_auto_reaches_core_node() -> Result<()> {
    let (core, core_port) = bind_rep().await?;
    let (calls_tx, mut calls_rx) = mpsc::channel(8);
    spawn_core(core, calls_tx);
    let mut harness = Harness::start(core_port).await?;

    let response = harness
        .call(json!({
            "method": "set_auto",
            "args": {"car_number": "A123BC", "polygon": 9, "id_type": "rfid", "model": 3}
        }))
        .await?;

    let id = response["info"].as_i64().unwrap();
    assert_eq!(
        response,
        json!({
            "status": true,
            "info": id,
            "ar_response": [
                {"destination": 9, "result": {"delivered": {"status": true, "info": id}}}
            ]
        })
    );

    let (creds, call) = timeout(Duration::from_secs(2), calls_rx.recv()).await?.unwrap();
    assert_eq!(creds.password, "secret");
    assert_eq!(
        call,
        CoreCall::AddAuto {
            car_number: "A123BC".to_string(),
            wserver_id: RecordId::new(id),
            model: Some(3),
            rfid_id: None,
            id_type: Some("rfid".to_string()),
            rg_weight: Some(0),
        }
    );

    // Same plate again: local failure, nothing propagated.
    let duplicate = harness
        .call(json!({
            "method": "set_auto",
            "args": {"car_number": "A123BC", "polygon": 9, "id_type": "rfid"}
        }))
        .await?;
    assert_eq!(duplicate["status"], json!(false));
    assert!(duplicate.get("ar_response").is_none());
    assert!(timeout(Duration::from_millis(300), calls_rx.recv()).await.is_err());

    assert_eq!(
        harness.gdb.get_auto_id("A123BC").await?,
        Some(RecordId::new(id))
    );
    Ok(())
}

#[tokio::test]
async fn test_rfid_tag_reaches_core_as_mark_id() -> Result<()> {
    let (core, core_port) = bind_rep().await?;
    let (calls_tx, mut calls_rx) = mpsc::channel(8);
    spawn_core(core, calls_tx);
    let mut harness = Harness::start(core_port).await?;

    let mark = harness
        .call(json!({"method": "set_rfid", "args": {"rfid": "FF00AA"}}))
        .await?;
    let mark_id = mark["info"].as_i64().unwrap();

    let response = harness
        .call(json!({
            "method": "set_auto",
            "args": {"car_number": "B777OP", "polygon": 9, "id_type": "rfid", "rfid": "FF00AA"}
        }))
        .await?;
    assert_eq!(response["status"], json!(true));

    let (_, call) = timeout(Duration::from_secs(2), calls_rx.recv()).await?.unwrap();
    match call {
        CoreCall::AddAuto { rfid_id, .. } => assert_eq!(rfid_id, Some(mark_id)),
        other => panic!("expected add_auto, got {:?}", other),
    }

    let rows = harness
        .gdb
        .try_execute_get("SELECT rfid_id FROM auto WHERE car_number = ?", &["B777OP".into()])
        .await?;
    assert_eq!(rows[0].get::<Option<i64>, _>("rfid_id"), Some(mark_id));
    Ok(())
}

#[tokio::test]
async fn test_broadcast_trash_type_uses_category() -> Result<()> {
    let (core, core_port) = bind_rep().await?;
    let (calls_tx, mut calls_rx) = mpsc::channel(8);
    spawn_core(core, calls_tx);
    let mut harness = Harness::start(core_port).await?;

    let response = harness
        .call(json!({
            "method": "set_trash_type",
            "positional": ["Glass"],
            "args": {"category": 2}
        }))
        .await?;
    assert_eq!(response["status"], json!(true));
    assert_eq!(response["ar_response"][0]["destination"], json!(9));

    let (_, call) = timeout(Duration::from_secs(2), calls_rx.recv()).await?.unwrap();
    assert!(matches!(call, CoreCall::AddTrashType { category: Some(2), .. }));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_core_still_commits() -> Result<()> {
    // Nothing listens on this port.
    let mut harness = Harness::start(random_test_port()).await?;

    let response = harness
        .call(json!({
            "method": "set_company",
            "args": {"name": "EcoTrans", "inn": "7701234567", "kpp": "770101001", "polygon": 9}
        }))
        .await?;

    assert_eq!(response["status"], json!(true));
    assert_eq!(
        response["ar_response"],
        json!([{"destination": 9, "result": "missing"}])
    );
    assert!(harness.gdb.get_company_id("EcoTrans").await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_ping_and_bad_requests() -> Result<()> {
    let mut harness = Harness::start(random_test_port()).await?;

    assert_eq!(
        harness.call(json!({"method": "ping"})).await?,
        json!({"status": true, "info": "pong"})
    );

    let garbage = harness.call_raw(b"not json".to_vec()).await?;
    assert_eq!(garbage["status"], json!(false));

    let unknown = harness.call(json!({"method": "set_everything"})).await?;
    assert_eq!(unknown["status"], json!(false));
    assert_eq!(unknown["info"], json!("Unknown method: set_everything"));

    let missing = harness
        .call(json!({"method": "set_operator", "args": {"full_name": "Ivan Petrov"}}))
        .await?;
    assert_eq!(
        missing,
        json!({"status": false, "info": "Missing required argument: login"})
    );
    Ok(())
}
