//! TCP process-group transport
//!
//! Rank 0 listens on the coordinator address and accepts one connection
//! from every other rank. Each worker connects, announces its rank with a
//! hello frame, and from then on exchanges length-prefixed CBOR frames with
//! the coordinator only.
//!
//! A single stream carries all four channels. Frames that arrive on a
//! channel nobody is waiting for yet are held per peer until a matching
//! `recv`.

use super::{Rank, Transport, COORDINATOR_RANK};
use crate::errors::{DriverError, Result};
use crate::protocol::{read_frame, write_frame, Channel, Message, DEFAULT_MAX_FRAME_BYTES};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, trace, warn};

/// Configuration for establishing the TCP group
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Address rank 0 listens on and workers connect to
    pub coordinator_addr: String,
    /// How long to wait for the group to form
    pub connect_timeout: Duration,
    /// Delay between worker connection attempts
    pub connect_retry: Duration,
    /// Largest frame accepted or sent
    pub max_frame_bytes: usize,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            coordinator_addr: "127.0.0.1:47000".to_string(),
            connect_timeout: Duration::from_secs(60),
            connect_retry: Duration::from_millis(200),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// What travels on a stream
#[derive(Debug, Serialize, Deserialize)]
enum Frame {
    /// First frame from a worker
    Hello { rank: Rank, world_size: usize },
    Message(Message),
}

struct Peer {
    stream: TcpStream,
    pending: [VecDeque<Message>; 4],
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            pending: Default::default(),
        }
    }
}

/// One process's view of a TCP group
pub struct TcpTransport {
    rank: Rank,
    world_size: usize,
    peers: HashMap<Rank, Peer>,
    max_frame_bytes: usize,
}

impl TcpTransport {
    /// Join the group as `rank`
    ///
    /// Rank 0 binds and accepts; every other rank connects.
    pub async fn establish(
        rank: Rank,
        world_size: usize,
        config: &TcpTransportConfig,
    ) -> Result<Self> {
        if rank == COORDINATOR_RANK {
            let listener = TcpListener::bind(&config.coordinator_addr)
                .await
                .map_err(|e| {
                    DriverError::Transport(format!(
                        "cannot listen on {}: {}",
                        config.coordinator_addr, e
                    ))
                })?;
            Self::accept(listener, world_size, config).await
        } else {
            Self::connect(rank, world_size, config).await
        }
    }

    /// Accept `world_size - 1` workers on an already bound listener
    pub async fn accept(
        listener: TcpListener,
        world_size: usize,
        config: &TcpTransportConfig,
    ) -> Result<Self> {
        let mut transport = Self {
            rank: COORDINATOR_RANK,
            world_size,
            peers: HashMap::new(),
            max_frame_bytes: config.max_frame_bytes,
        };

        let expected = world_size.saturating_sub(1);
        info!(
            addr = ?listener.local_addr().ok(),
            workers = expected,
            "Waiting for workers"
        );

        let formed = timeout(
            config.connect_timeout,
            transport.accept_all(&listener, expected),
        )
        .await;
        match formed {
            Ok(result) => result?,
            Err(_) => {
                return Err(DriverError::Transport(format!(
                    "only {} of {} workers connected within {:?}",
                    transport.peers.len(),
                    expected,
                    config.connect_timeout
                )));
            }
        }

        info!(workers = expected, "Process group formed");
        Ok(transport)
    }

    async fn accept_all(&mut self, listener: &TcpListener, expected: usize) -> Result<()> {
        while self.peers.len() < expected {
            let (mut stream, addr) = listener.accept().await?;
            stream.set_nodelay(true)?;

            let hello: Frame = read_frame(&mut stream, self.max_frame_bytes)
                .await
                .map_err(|e| DriverError::Protocol(format!("bad hello from {}: {}", addr, e)))?;

            let rank = match hello {
                Frame::Hello { rank, world_size } => {
                    if world_size != self.world_size {
                        return Err(DriverError::Protocol(format!(
                            "rank {} at {} expects a group of {}, coordinator has {}",
                            rank, addr, world_size, self.world_size
                        )));
                    }
                    if rank == COORDINATOR_RANK || rank >= self.world_size {
                        return Err(DriverError::Protocol(format!(
                            "{} announced invalid rank {}",
                            addr, rank
                        )));
                    }
                    if self.peers.contains_key(&rank) {
                        return Err(DriverError::Protocol(format!(
                            "rank {} connected twice",
                            rank
                        )));
                    }
                    rank
                }
                Frame::Message(message) => {
                    return Err(DriverError::Protocol(format!(
                        "{} sent {} before hello",
                        addr,
                        message.kind()
                    )));
                }
            };

            debug!(rank, %addr, "Worker connected");
            self.peers.insert(rank, Peer::new(stream));
        }
        Ok(())
    }

    /// Connect to the coordinator as worker `rank`
    pub async fn connect(
        rank: Rank,
        world_size: usize,
        config: &TcpTransportConfig,
    ) -> Result<Self> {
        let deadline = Instant::now() + config.connect_timeout;
        let mut stream = loop {
            match TcpStream::connect(&config.coordinator_addr).await {
                Ok(stream) => break stream,
                Err(e) if Instant::now() + config.connect_retry < deadline => {
                    trace!(error = %e, "Coordinator not reachable yet");
                    sleep(config.connect_retry).await;
                }
                Err(e) => {
                    return Err(DriverError::Transport(format!(
                        "cannot reach coordinator at {}: {}",
                        config.coordinator_addr, e
                    )));
                }
            }
        };
        stream.set_nodelay(true)?;

        write_frame(
            &mut stream,
            &Frame::Hello { rank, world_size },
            config.max_frame_bytes,
        )
        .await
        .map_err(|e| DriverError::Transport(format!("sending hello: {}", e)))?;

        debug!(rank, addr = %config.coordinator_addr, "Connected to coordinator");

        let mut peers = HashMap::new();
        peers.insert(COORDINATOR_RANK, Peer::new(stream));
        Ok(Self {
            rank,
            world_size,
            peers,
            max_frame_bytes: config.max_frame_bytes,
        })
    }

    fn peer(&mut self, other: Rank) -> Result<&mut Peer> {
        let rank = self.rank;
        self.peers.get_mut(&other).ok_or_else(|| {
            DriverError::Protocol(format!("rank {} has no link to rank {}", rank, other))
        })
    }
}

/// Map a failed frame write to `peer`
///
/// `write_frame` only reports `InvalidData` for a message it refused to
/// encode or that is over the frame limit.
fn send_error(peer: Rank, e: io::Error) -> DriverError {
    match e.kind() {
        io::ErrorKind::InvalidData => {
            DriverError::Protocol(format!("frame to rank {} exceeds limit: {}", peer, e))
        }
        _ => DriverError::Transport(format!("sending to rank {}: {}", peer, e)),
    }
}

/// Map a failed frame read from `peer`
fn recv_error(peer: Rank, e: io::Error) -> DriverError {
    match e.kind() {
        io::ErrorKind::InvalidData => {
            DriverError::Protocol(format!("malformed frame from rank {}: {}", peer, e))
        }
        io::ErrorKind::UnexpectedEof => {
            DriverError::Transport(format!("rank {} closed the connection", peer))
        }
        _ => DriverError::Transport(format!("rank {}: {}", peer, e)),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn max_message_bytes(&self) -> Option<usize> {
        Some(self.max_frame_bytes)
    }

    async fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        let max_frame_bytes = self.max_frame_bytes;
        let from = self.rank;
        let peer = self.peer(to)?;

        debug!(from, to, channel = %message.channel(), kind = message.kind(), "send");
        write_frame(&mut peer.stream, &Frame::Message(message), max_frame_bytes)
            .await
            .map_err(|e| send_error(to, e))
    }

    async fn recv(&mut self, from: Rank, channel: Channel) -> Result<Message> {
        let max_frame_bytes = self.max_frame_bytes;
        let peer = self.peer(from)?;

        if let Some(message) = peer.pending[channel.index()].pop_front() {
            return Ok(message);
        }

        loop {
            let frame: Frame = read_frame(&mut peer.stream, max_frame_bytes)
                .await
                .map_err(|e| recv_error(from, e))?;

            match frame {
                Frame::Message(message) if message.channel() == channel => {
                    debug!(from, %channel, kind = message.kind(), "recv");
                    return Ok(message);
                }
                Frame::Message(message) => {
                    debug!(
                        from,
                        waiting_on = %channel,
                        arrived_on = %message.channel(),
                        "Holding message for a later receive"
                    );
                    peer.pending[message.channel().index()].push_back(message);
                }
                Frame::Hello { rank, .. } => {
                    warn!(from, rank, "Hello after group formation");
                    return Err(DriverError::Protocol(format!(
                        "rank {} sent a second hello",
                        from
                    )));
                }
            }
        }
    }
}
