//! Server network layer handling UDP communications and game loop coordination

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::persistence::{Profile, ProfileStore};
use crate::world::{Outbound, World};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::Packet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    /// Serialized once, then sent to each address
    BroadcastPacket {
        packet: Packet,
        addrs: Vec<SocketAddr>,
    },
}

/// Main server coordinating networking and game simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    world: World,
    config: ServerConfig,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: Option<mpsc::UnboundedReceiver<GameMessage>>,
}

impl Server {
    pub async fn new(
        config: ServerConfig,
        store: Arc<dyn ProfileStore>,
    ) -> Result<Self, ServerError> {
        let socket = Arc::new(UdpSocket::bind(&config.bind_addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            world: World::new(&config, store),
            config,
            server_tx,
            server_rx,
            game_tx,
            game_rx: Some(game_rx),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sender that stops `run` when given `ServerMessage::Shutdown`
    pub fn shutdown_handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => match deserialize::<Packet>(&buffer[..len]) {
                        Ok(packet) => {
                            let message = ServerMessage::PacketReceived { packet, addr };
                            if let Err(e) = server_tx.send(message) {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        }
                        Err(e) => warn!("Failed to deserialize packet from {}: {}", addr, e),
                    },
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let Some(mut game_rx) = self.game_rx.take() else {
            return;
        };

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, addrs } => {
                        let data = match serialize(&packet) {
                            Ok(data) => data,
                            Err(e) => {
                                error!("Failed to encode broadcast: {}", e);
                                continue;
                            }
                        };
                        for addr in addrs {
                            if let Err(e) = socket.send_to(&data, addr).await {
                                error!("Failed to send to {}: {}", addr, e);
                            }
                        }
                    }
                }
            }
        });
    }

    fn queue_message(&self, message: GameMessage) {
        if let Err(e) = self.game_tx.send(message) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Carries out everything the world queued during the last event
    fn flush(&mut self) {
        for outbound in self.world.take_outbound() {
            match outbound {
                Outbound::Send { addr, packet } => {
                    self.queue_message(GameMessage::SendPacket { packet, addr });
                }
                Outbound::Broadcast { packet, exclude } => {
                    let addrs: Vec<SocketAddr> = self
                        .world
                        .sessions()
                        .connection_addrs()
                        .into_iter()
                        .filter(|addr| Some(*addr) != exclude)
                        .collect();
                    if !addrs.is_empty() {
                        self.queue_message(GameMessage::BroadcastPacket { packet, addrs });
                    }
                }
                Outbound::Close { addr, reason } => {
                    self.queue_message(GameMessage::SendPacket {
                        packet: Packet::Disconnected { reason },
                        addr,
                    });
                }
                Outbound::Persist { player_id, profile } => self.persist(player_id, profile),
            }
        }
    }

    /// Saves off the loop thread; failures are logged and never retried
    fn persist(&self, player_id: String, profile: Profile) {
        let store = self.world.store();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = store.save(&player_id, &profile) {
                error!("{}", e);
            }
        });
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), ServerError> {
        self.spawn_network_receiver();
        self.spawn_network_sender();

        let mut tick_interval = interval(self.config.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut matchmaking_interval = interval(self.config.matchmaking_interval);
        let mut heartbeat_interval = interval(self.config.heartbeat_check_interval);
        let dt = self.config.tick_duration.as_secs_f32();
        let mut ticks: u64 = 0;

        info!("Server started successfully");

        loop {
            tokio::select! {
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.world.handle_packet(packet, addr, Instant::now());
                        }
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    self.world.tick(dt);
                    ticks += 1;

                    // Periodic performance monitoring
                    if ticks % 200 == 0 {
                        let units = self.world.current_match().map_or(0, |m| m.units.len());
                        debug!(
                            "Tick {}: {} connections, {} queued, {} units",
                            ticks,
                            self.world.sessions().len(),
                            self.world.queue().len(),
                            units
                        );
                    }
                },

                _ = matchmaking_interval.tick() => {
                    self.world.run_matchmaking(Instant::now());
                },

                _ = heartbeat_interval.tick() => {
                    self.world.check_heartbeats(Instant::now());
                },
            }

            self.flush();
        }

        Ok(())
    }
}

async fn send_packet_impl(
    socket: &UdpSocket,
    packet: &Packet,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let data = serialize(packet)?;
    socket.send_to(&data, addr).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryProfileStore;
    use tokio::time::timeout;

    fn test_config() -> ServerConfig {
        ServerConfig {
            bind_addr: "127.0.0.1:0".to_string(),
            ..ServerConfig::default()
        }
    }

    async fn recv_packet(socket: &UdpSocket) -> Packet {
        let mut buffer = vec![0u8; 65536];
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buffer))
            .await
            .expect("timed out waiting for server")
            .unwrap();
        deserialize(&buffer[..len]).unwrap()
    }

    fn register(server: &mut Server, id: &str, addr: SocketAddr) {
        let packet = Packet::Register {
            player_id: id.to_string(),
            trophies: 100,
        };
        server.world.handle_packet(packet, addr, Instant::now());
    }

    #[tokio::test]
    async fn test_flush_broadcast_skips_excluded_sender() {
        let mut server = Server::new(test_config(), Arc::new(MemoryProfileStore::new()))
            .await
            .unwrap();
        let alice: SocketAddr = "127.0.0.1:9101".parse().unwrap();
        let bob: SocketAddr = "127.0.0.1:9102".parse().unwrap();
        register(&mut server, "alice", alice);
        register(&mut server, "bob", bob);
        server.world.take_outbound();

        let emote = Packet::SendEmote {
            emote: "wave".to_string(),
            player_id: "alice".to_string(),
        };
        server.world.handle_packet(emote, alice, Instant::now());
        server.flush();

        let game_rx = server.game_rx.as_mut().unwrap();
        match game_rx.try_recv().unwrap() {
            GameMessage::BroadcastPacket { packet, addrs } => {
                assert_eq!(addrs, vec![bob]);
                assert!(matches!(packet, Packet::Emote { player_id, .. } if player_id == "alice"));
            }
            other => panic!("expected a broadcast, got {:?}", other),
        }
        assert!(game_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flush_turns_close_into_disconnected() {
        let mut server = Server::new(test_config(), Arc::new(MemoryProfileStore::new()))
            .await
            .unwrap();
        let addr: SocketAddr = "127.0.0.1:9103".parse().unwrap();
        register(&mut server, "", addr);
        server.flush();

        match server.game_rx.as_mut().unwrap().try_recv().unwrap() {
            GameMessage::SendPacket {
                packet: Packet::Disconnected { reason },
                addr: to,
            } => {
                assert_eq!(to, addr);
                assert_eq!(reason, "Invalid player id");
            }
            other => panic!("expected a disconnect notice, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_over_udp() {
        let mut server = Server::new(test_config(), Arc::new(MemoryProfileStore::new()))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let register = Packet::Register {
            player_id: "alice".to_string(),
            trophies: 250,
        };
        client
            .send_to(&serialize(&register).unwrap(), server_addr)
            .await
            .unwrap();

        let mut saw_init = false;
        for _ in 0..2 {
            if let Packet::Init { state, player } = recv_packet(&client).await {
                assert!(state.is_none());
                assert_eq!(player.player_id, "alice");
                assert_eq!(player.trophies, 250);
                saw_init = true;
            }
        }
        assert!(saw_init);

        shutdown.send(ServerMessage::Shutdown).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_identity_is_disconnected() {
        let mut server = Server::new(test_config(), Arc::new(MemoryProfileStore::new()))
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();
        let shutdown = server.shutdown_handle();
        let handle = tokio::spawn(async move { server.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let register = Packet::Register {
            player_id: "x".repeat(51),
            trophies: 0,
        };
        client
            .send_to(&serialize(&register).unwrap(), server_addr)
            .await
            .unwrap();

        match recv_packet(&client).await {
            Packet::Disconnected { reason } => assert_eq!(reason, "Invalid player id"),
            other => panic!("expected disconnect, got {:?}", other),
        }

        shutdown.send(ServerMessage::Shutdown).unwrap();
        handle.await.unwrap().unwrap();
    }
}
