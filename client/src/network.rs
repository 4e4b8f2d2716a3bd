use crate::game::BotState;
use bincode::{deserialize, serialize};
use log::{debug, error, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::Packet;
use std::net::SocketAddr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::UdpSocket;
use tokio::time::interval;

/// Headless client that plays matches on its own.
pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    state: BotState,
    spawn_interval: Duration,
    rng: StdRng,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        player_id: &str,
        trophies: u32,
        spawn_interval: Duration,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            state: BotState::new(player_id, trophies),
            spawn_interval,
            rng: StdRng::from_entropy(),
        })
    }

    pub fn state(&self) -> &BotState {
        &self.state
    }

    async fn register(&self) -> Result<(), Box<dyn std::error::Error>> {
        info!("Registering as {}...", self.state.player_id);

        let packet = Packet::Register {
            player_id: self.state.player_id.clone(),
            trophies: self.state.trophies,
        };
        self.send_packet(&packet).await
    }

    async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), Box<dyn std::error::Error>> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_millis() as u64;
        self.send_packet(&Packet::Heartbeat { timestamp }).await
    }

    /// Sends at most one action per interval: the super when charged, else a deployment.
    async fn act(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let action = self
            .state
            .choose_super(&mut self.rng)
            .or_else(|| self.state.choose_deployment(&mut self.rng));

        if let Some(packet) = action {
            debug!("Sending {:?}", packet);
            self.send_packet(&packet).await?;
        }
        Ok(())
    }

    /// Runs until the server disconnects us or the future is dropped.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.register().await?;

        let mut heartbeat_interval = interval(Duration::from_secs(1));
        let mut spawn_interval = interval(self.spawn_interval);

        let mut buffer = vec![0u8; 65536];

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buffer) => {
                    match result {
                        Ok((len, _)) => match deserialize::<Packet>(&buffer[..len]) {
                            Ok(Packet::Disconnected { reason }) => {
                                self.state.handle_packet(Packet::Disconnected { reason });
                                break;
                            }
                            Ok(packet) => {
                                if let Some(reply) = self.state.handle_packet(packet) {
                                    self.send_packet(&reply).await?;
                                }
                            }
                            Err(e) => error!("Failed to decode packet: {}", e),
                        },
                        Err(e) => error!("Error receiving packet: {}", e),
                    }
                },

                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.send_heartbeat().await {
                        error!("Error sending heartbeat: {}", e);
                    }
                },

                _ = spawn_interval.tick() => {
                    if let Err(e) = self.act().await {
                        error!("Error sending action: {}", e);
                    }
                },
            }
        }

        Ok(())
    }

    /// Tells the server we are gone.
    pub async fn disconnect(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.send_packet(&Packet::Disconnect).await
    }
}
