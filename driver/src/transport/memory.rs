//! In-process transport
//!
//! Every ordered pair of endpoints gets one unbounded queue per channel, so
//! tagged receives need no stashing and ordering per (sender, channel) is
//! the queue order.

use super::{Rank, Transport};
use crate::errors::{DriverError, Result};
use crate::protocol::{Channel, Message};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::debug;

/// One endpoint of an in-process group
pub struct MemoryTransport {
    rank: Rank,
    world_size: usize,
    outgoing: HashMap<(Rank, Channel), UnboundedSender<Message>>,
    incoming: HashMap<(Rank, Channel), UnboundedReceiver<Message>>,
}

impl MemoryTransport {
    /// Create `world_size` connected endpoints, indexed by rank
    pub fn group(world_size: usize) -> Vec<MemoryTransport> {
        let mut endpoints: Vec<MemoryTransport> = (0..world_size)
            .map(|rank| MemoryTransport {
                rank,
                world_size,
                outgoing: HashMap::new(),
                incoming: HashMap::new(),
            })
            .collect();

        for from in 0..world_size {
            for to in 0..world_size {
                if from == to {
                    continue;
                }
                for channel in Channel::ALL {
                    let (tx, rx) = unbounded_channel();
                    endpoints[from].outgoing.insert((to, channel), tx);
                    endpoints[to].incoming.insert((from, channel), rx);
                }
            }
        }

        endpoints
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    async fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        let channel = message.channel();
        let sender = self.outgoing.get(&(to, channel)).ok_or_else(|| {
            DriverError::Protocol(format!("rank {} has no link to rank {}", self.rank, to))
        })?;

        debug!(from = self.rank, to, %channel, kind = message.kind(), "send");
        sender
            .send(message)
            .map_err(|_| DriverError::Transport(format!("rank {} has exited", to)))
    }

    async fn recv(&mut self, from: Rank, channel: Channel) -> Result<Message> {
        let rank = self.rank;
        let receiver = self.incoming.get_mut(&(from, channel)).ok_or_else(|| {
            DriverError::Protocol(format!("rank {} has no link from rank {}", rank, from))
        })?;

        let message = receiver.recv().await.ok_or_else(|| {
            DriverError::Transport(format!(
                "rank {} exited before sending on the {} channel",
                from, channel
            ))
        })?;
        debug!(from, to = rank, %channel, kind = message.kind(), "recv");
        Ok(message)
    }
}
