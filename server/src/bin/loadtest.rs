//! Load test for the pong server.
//!
//! Spawns pairs of fake WebSocket clients. In each pair:
//! - the host creates a room and the guest joins it
//! - both periodically send player_input messages
//! - both count game_state broadcasts
//!
//! Usage: cargo run --bin loadtest -- [OPTIONS]
//!
//! Options:
//!   --rooms N        Number of rooms (client pairs) to spawn (default: 50)
//!   --duration S     Test duration in seconds (default: 30)
//!   --input-rate R   Inputs per second per client (default: 10)
//!   --url URL        Server URL (default: ws://127.0.0.1:5000/ws)

use futures_util::{SinkExt, StreamExt};
use pong_server::protocol::{ClientMsg, InputWire};
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_tungstenite::{connect_async, tungstenite::Message};

type Ws = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

// === Metrics ===

#[derive(Default)]
struct Metrics {
    connected: AtomicU64,
    rooms_started: AtomicU64,
    messages_received: AtomicU64,
    game_states_received: AtomicU64,
    games_over: AtomicU64,
    inputs_sent: AtomicU64,
    errors: AtomicU64,
}

enum Role {
    Host(oneshot::Sender<String>),
    Guest(oneshot::Receiver<String>),
}

// === Client task ===

async fn next_event(ws: &mut Ws, event: &str, metrics: &Metrics) -> Option<serde_json::Value> {
    let needle = format!("\"type\":\"{event}\"");
    while let Some(msg) = ws.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                if text.contains(&needle) {
                    let value: serde_json::Value = serde_json::from_str(&text).ok()?;
                    return Some(value["data"].clone());
                }
            }
            Ok(Message::Close(_)) | Err(_) => return None,
            _ => {}
        }
    }
    None
}

async fn send_msg(ws: &mut Ws, msg: &ClientMsg) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => ws.send(Message::Text(json.into())).await.is_ok(),
        Err(_) => false,
    }
}

async fn seat(ws: &mut Ws, pair: u32, role: Role, metrics: &Metrics) -> bool {
    match role {
        Role::Host(room_tx) => {
            let name = format!("load-{pair}");
            if !send_msg(ws, &ClientMsg::CreateRoom { room_name: Some(name) }).await {
                return false;
            }
            let Some(reply) = next_event(ws, "room_created", metrics).await else {
                return false;
            };
            match reply["room_id"].as_str() {
                Some(room_id) if reply["success"] == true => room_tx.send(room_id.to_string()).is_ok(),
                _ => false,
            }
        }
        Role::Guest(room_rx) => {
            let Ok(room_id) = room_rx.await else {
                return false;
            };
            if !send_msg(ws, &ClientMsg::JoinRoom { room_id: Some(room_id) }).await {
                return false;
            }
            let joined = matches!(
                next_event(ws, "room_joined", metrics).await,
                Some(reply) if reply["success"] == true
            );
            if joined {
                metrics.rooms_started.fetch_add(1, Ordering::Relaxed);
            }
            joined
        }
    }
}

async fn run_client(
    pair: u32,
    role: Role,
    url: String,
    input_rate: f64,
    duration: Duration,
    metrics: Arc<Metrics>,
) {
    let (mut ws, _) = match connect_async(&url).await {
        Ok(conn) => conn,
        Err(e) => {
            if pair < 3 {
                eprintln!("Pair {} failed to connect: {}", pair, e);
            }
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            return;
        }
    };
    metrics.connected.fetch_add(1, Ordering::Relaxed);

    let seated = tokio::time::timeout(Duration::from_secs(5), async {
        next_event(&mut ws, "connected", &metrics).await.is_some()
            && seat(&mut ws, pair, role, &metrics).await
    })
    .await;
    if !matches!(seated, Ok(true)) {
        if pair < 3 {
            eprintln!("Pair {} failed to get seated", pair);
        }
        metrics.errors.fetch_add(1, Ordering::Relaxed);
        metrics.connected.fetch_sub(1, Ordering::Relaxed);
        return;
    }

    let input_interval = if input_rate > 0.0 {
        Duration::from_secs_f64(1.0 / input_rate)
    } else {
        Duration::from_secs(3600) // Effectively never
    };
    let mut input_timer = tokio::time::interval(input_interval);
    input_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let test_end = Instant::now() + duration;

    loop {
        if Instant::now() >= test_end {
            break;
        }

        tokio::select! {
            _ = input_timer.tick() => {
                let (up, down) = {
                    let mut rng = rand::thread_rng();
                    (rng.gen_bool(0.4), rng.gen_bool(0.4))
                };
                let msg = ClientMsg::PlayerInput {
                    input: InputWire { up: Some(up), down: Some(down) },
                };
                if send_msg(&mut ws, &msg).await {
                    metrics.inputs_sent.fetch_add(1, Ordering::Relaxed);
                } else {
                    metrics.errors.fetch_add(1, Ordering::Relaxed);
                    break;
                }
            }

            msg = ws.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        metrics.messages_received.fetch_add(1, Ordering::Relaxed);
                        if text.contains("\"type\":\"game_state\"") {
                            metrics.game_states_received.fetch_add(1, Ordering::Relaxed);
                        } else if text.contains("\"type\":\"game_over\"") {
                            metrics.games_over.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        if pair < 3 {
                            eprintln!("Pair {} error: {}", pair, e);
                        }
                        metrics.errors.fetch_add(1, Ordering::Relaxed);
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    let _ = ws.close(None).await;
    metrics.connected.fetch_sub(1, Ordering::Relaxed);
}

// === Main ===

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();

    let mut num_rooms: u32 = 50;
    let mut duration_secs: u64 = 30;
    let mut input_rate: f64 = 10.0;
    let mut url = "ws://127.0.0.1:5000/ws".to_string();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--rooms" => {
                i += 1;
                num_rooms = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(50);
            }
            "--duration" => {
                i += 1;
                duration_secs = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(30);
            }
            "--input-rate" => {
                i += 1;
                input_rate = args.get(i).and_then(|s| s.parse().ok()).unwrap_or(10.0);
            }
            "--url" => {
                i += 1;
                url = args.get(i).cloned().unwrap_or(url);
            }
            _ => {}
        }
        i += 1;
    }

    println!("=== Pong Server Load Test ===");
    println!("Rooms: {} ({} clients)", num_rooms, num_rooms * 2);
    println!("Duration: {}s", duration_secs);
    println!("Input rate: {}/s per client", input_rate);
    println!("URL: {}", url);
    println!();

    let metrics = Arc::new(Metrics::default());
    let duration = Duration::from_secs(duration_secs);
    let mut handles = Vec::with_capacity(num_rooms as usize * 2);

    let spawn_start = Instant::now();
    for pair in 0..num_rooms {
        let (room_tx, room_rx) = oneshot::channel();
        for role in [Role::Host(room_tx), Role::Guest(room_rx)] {
            let url = url.clone();
            let metrics = Arc::clone(&metrics);
            handles.push(tokio::spawn(run_client(
                pair, role, url, input_rate, duration, metrics,
            )));
        }

        // Stagger spawns slightly to avoid thundering herd
        if pair % 25 == 24 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    println!("All clients spawned in {:?}", spawn_start.elapsed());
    println!();

    // Print stats periodically
    let metrics_clone = Arc::clone(&metrics);
    let stats_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        let start = Instant::now();
        loop {
            interval.tick().await;
            let elapsed = start.elapsed().as_secs();
            println!(
                "[{:3}s] connected={}, rooms={}, msgs={}, game_states={}, inputs={}, errors={}",
                elapsed,
                metrics_clone.connected.load(Ordering::Relaxed),
                metrics_clone.rooms_started.load(Ordering::Relaxed),
                metrics_clone.messages_received.load(Ordering::Relaxed),
                metrics_clone.game_states_received.load(Ordering::Relaxed),
                metrics_clone.inputs_sent.load(Ordering::Relaxed),
                metrics_clone.errors.load(Ordering::Relaxed),
            );
        }
    });

    for handle in handles {
        let _ = handle.await;
    }
    stats_handle.abort();

    println!();
    println!("=== Final Results ===");
    let msgs = metrics.messages_received.load(Ordering::Relaxed);
    let game_states = metrics.game_states_received.load(Ordering::Relaxed);
    let rooms_started = metrics.rooms_started.load(Ordering::Relaxed);

    println!("Rooms started: {}", rooms_started);
    println!("Total messages received: {}", msgs);
    println!("Total game_state messages: {}", game_states);
    println!("Total game_over messages: {}", metrics.games_over.load(Ordering::Relaxed));
    println!("Total inputs sent: {}", metrics.inputs_sent.load(Ordering::Relaxed));
    println!("Total errors: {}", metrics.errors.load(Ordering::Relaxed));

    let clients = (rooms_started * 2).max(1) as f64;
    let per_client_rate = game_states as f64 / clients / duration_secs.max(1) as f64;
    println!();
    println!("Messages/sec (total): {:.0}", msgs as f64 / duration_secs.max(1) as f64);
    println!("game_state/sec per client: {:.1} (target 60)", per_client_rate);
}
