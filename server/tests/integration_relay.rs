//! Relay-Server ueber echte TCP-Verbindungen auf 127.0.0.1

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use stranded_core::types::PeerId;
use stranded_observability::{HealthState, HealthStatus, RelayMetrics};
use stranded_protocol::{FrameCodec, SignalFrame};
use stranded_relay::{config::RelayConfig, RelayServer};
use stranded_signaling::{CoordinatorHandle, Ereignis, Relay, TcpRelay};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

type Client = Framed<TcpStream, FrameCodec>;

struct Laufend {
    adresse: SocketAddr,
    server: RelayServer,
    metriken: RelayMetrics,
    health: HealthState,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<anyhow::Result<()>>,
}

async fn relay_starten(config: RelayConfig) -> Laufend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let adresse = listener.local_addr().unwrap();
    let metriken = RelayMetrics::neu().unwrap();
    let health = HealthState::neu();
    let server = RelayServer::neu(config, metriken.clone(), health.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(server.clone().betreiben(listener, shutdown_rx));
    Laufend {
        adresse,
        server,
        metriken,
        health,
        shutdown_tx,
        task,
    }
}

async fn verbinden(adresse: SocketAddr) -> Client {
    let stream = TcpStream::connect(adresse).await.unwrap();
    Framed::new(stream, FrameCodec::new())
}

/// Wartet bis `bedingung` erfuellt ist (hoechstens 5 s)
async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

async fn lesen(client: &mut Client) -> Option<String> {
    tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("Kein Frame innerhalb von 5 s")
        .map(|r| r.unwrap())
}

#[tokio::test]
async fn frame_geht_an_alle_einschliesslich_absender() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut a = verbinden(relay.adresse).await;
    let mut b = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 2).await;

    let join = SignalFrame::join(PeerId::from("peer_a"), None).to_json().unwrap();
    a.send(join.clone()).await.unwrap();

    assert_eq!(lesen(&mut a).await.as_deref(), Some(join.as_str()), "Echo an Absender");
    assert_eq!(lesen(&mut b).await.as_deref(), Some(join.as_str()));

    assert_eq!(relay.metriken.frames_total.get(), 1);
    assert_eq!(relay.metriken.bytes_total.get(), join.len() as u64);
    assert_eq!(relay.metriken.clients_connected.get(), 2);
}

#[tokio::test]
async fn payload_wird_nicht_interpretiert() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut a = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 1).await;

    a.send("kein json".to_string()).await.unwrap();
    assert_eq!(lesen(&mut a).await.as_deref(), Some("kein json"));
}

#[tokio::test]
async fn verbindungslimit_weist_weitere_clients_ab() {
    let mut config = RelayConfig::default();
    config.relay.max_clients = 1;
    let relay = relay_starten(config).await;

    let _erster = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 1).await;
    assert_eq!(relay.health.bewerten().1.status, HealthStatus::Degraded);

    let mut zweiter = verbinden(relay.adresse).await;
    assert!(lesen(&mut zweiter).await.is_none(), "Verbindung wird geschlossen");
    assert_eq!(relay.server.clients(), 1);
}

#[tokio::test]
async fn getrennter_client_wird_abgemeldet() {
    let relay = relay_starten(RelayConfig::default()).await;
    let a = verbinden(relay.adresse).await;
    let mut b = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 2).await;

    drop(a);
    warten_bis(|| relay.server.clients() == 1).await;
    assert_eq!(relay.metriken.clients_connected.get(), 1);

    b.send("noch da".to_string()).await.unwrap();
    assert_eq!(lesen(&mut b).await.as_deref(), Some("noch da"));
}

#[tokio::test]
async fn zu_grosser_frame_trennt_nur_den_absender() {
    let mut config = RelayConfig::default();
    config.relay.max_frame_groesse = 16;
    let relay = relay_starten(config).await;

    let mut gross = Framed::new(
        TcpStream::connect(relay.adresse).await.unwrap(),
        FrameCodec::with_max_size(1024),
    );
    let mut klein = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 2).await;

    gross.send("x".repeat(64)).await.unwrap();
    warten_bis(|| relay.server.clients() == 1).await;
    assert_eq!(relay.metriken.frames_total.get(), 0);

    klein.send("ok".to_string()).await.unwrap();
    assert_eq!(lesen(&mut klein).await.as_deref(), Some("ok"));
}

#[tokio::test]
async fn shutdown_beendet_listener_und_verbindungen() {
    let relay = relay_starten(RelayConfig::default()).await;
    let mut a = verbinden(relay.adresse).await;
    warten_bis(|| relay.server.clients() == 1).await;
    assert_eq!(relay.health.bewerten().1.status, HealthStatus::Healthy);

    relay.shutdown_tx.send_replace(true);
    relay.task.await.unwrap().unwrap();

    assert_eq!(relay.health.bewerten().1.status, HealthStatus::Unhealthy);
    assert!(lesen(&mut a).await.is_none(), "Verbindung nach Shutdown geschlossen");
    warten_bis(|| relay.server.clients() == 0).await;
}

// ---------------------------------------------------------------------------
// TcpRelay-Client gegen den Server
// ---------------------------------------------------------------------------

async fn naechster_payload(rx: &mut mpsc::Receiver<Ereignis>) -> String {
    loop {
        let ereignis = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("Kein Ereignis innerhalb von 5 s")
            .expect("Queue geschlossen");
        if let Ereignis::RelayPayload(payload) = ereignis {
            return payload;
        }
    }
}

#[tokio::test]
async fn tcp_relay_clients_tauschen_frames_aus() {
    let relay = relay_starten(RelayConfig::default()).await;
    let max = RelayConfig::default().relay.max_frame_groesse;

    let (handle_a, mut events_a) = CoordinatorHandle::kanal(16);
    let (handle_b, mut events_b) = CoordinatorHandle::kanal(16);
    let client_a = TcpRelay::starten(relay.adresse.to_string(), max, handle_a);
    let client_b = TcpRelay::starten(relay.adresse.to_string(), max, handle_b);
    client_a.ready().await;
    client_b.ready().await;
    assert!(client_a.is_ready());
    warten_bis(|| relay.server.clients() == 2).await;

    let join = SignalFrame::join(PeerId::from("peer_a"), None).to_json().unwrap();
    client_a.publish(join.clone()).await.unwrap();

    assert_eq!(naechster_payload(&mut events_a).await, join, "Absender hoert sich selbst");
    assert_eq!(naechster_payload(&mut events_b).await, join);
}

#[tokio::test]
async fn tcp_relay_meldet_trennung() {
    let relay = relay_starten(RelayConfig::default()).await;
    let (handle, _events) = CoordinatorHandle::kanal(16);
    let client = TcpRelay::starten(relay.adresse.to_string(), 64 * 1024, handle);
    client.ready().await;

    relay.shutdown_tx.send_replace(true);
    relay.task.await.unwrap().unwrap();

    warten_bis(|| !client.is_ready()).await;
    assert!(client.publish("{}".to_string()).await.is_err());
}
