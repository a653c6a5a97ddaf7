//! Point-to-point message transport between the processes of a group
//!
//! The protocol logic only sees the [`Transport`] trait. Two substrates are
//! provided:
//!
//! - [`MemoryTransport`]: in-process endpoints wired with tokio channels
//! - [`TcpTransport`]: one OS process per rank, star topology around rank 0
//!
//! Receives block until a matching message arrives. There is no receive
//! timeout: a send without a matching receive (or the reverse) hangs.

mod memory;
mod tcp;

pub use memory::MemoryTransport;
pub use tcp::{TcpTransport, TcpTransportConfig};

use crate::errors::Result;
use crate::protocol::{Channel, Message};
use async_trait::async_trait;

/// Position of a process in the group; 0 is the coordinator
pub type Rank = usize;

/// Rank of the coordinator process
pub const COORDINATOR_RANK: Rank = 0;

/// Tagged point-to-point messaging
///
/// Messages from one sender on one channel are received in send order.
/// `recv` returns the oldest message from `from` on `channel`; messages on
/// other channels stay queued until asked for.
#[async_trait]
pub trait Transport: Send {
    /// This process's rank
    fn rank(&self) -> Rank;

    /// Number of processes in the group
    fn world_size(&self) -> usize;

    /// Largest encoded message one `send` can carry, if there is a limit
    fn max_message_bytes(&self) -> Option<usize> {
        None
    }

    /// Send `message` to `to` on the message's own channel
    async fn send(&mut self, to: Rank, message: Message) -> Result<()>;

    /// Wait for the next message from `from` on `channel`
    async fn recv(&mut self, from: Rank, channel: Channel) -> Result<Message>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn rank(&self) -> Rank {
        (**self).rank()
    }

    fn world_size(&self) -> usize {
        (**self).world_size()
    }

    fn max_message_bytes(&self) -> Option<usize> {
        (**self).max_message_bytes()
    }

    async fn send(&mut self, to: Rank, message: Message) -> Result<()> {
        (**self).send(to, message).await
    }

    async fn recv(&mut self, from: Rank, channel: Channel) -> Result<Message> {
        (**self).recv(from, channel).await
    }
}
