//! Coordinator and worker roles
//!
//! A process's role follows from its rank, but is passed explicitly into
//! [`run_role`] so each side can be driven on its own in tests.

mod coordinator;
mod worker;

pub use coordinator::Coordinator;
pub use worker::{Assignment, Worker};

use crate::cli::JobPaths;
use crate::compute::ComputeStats;
use crate::config::FailurePolicy;
use crate::errors::{DriverError, Result};
use crate::kernel::PhysicsKernel;
use crate::transport::{Rank, Transport, COORDINATOR_RANK};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Coordinator,
    Worker,
}

impl Role {
    pub fn for_rank(rank: Rank) -> Self {
        if rank == COORDINATOR_RANK {
            Role::Coordinator
        } else {
            Role::Worker
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Run one process's part of the job
///
/// `paths` is only looked at by the coordinator, which turns an `Err` into
/// an EXIT broadcast. A worker needs a transport; a coordinator without one
/// runs the whole job alone.
pub async fn run_role<T: Transport>(
    role: Role,
    transport: Option<T>,
    kernel: &dyn PhysicsKernel,
    on_failure: FailurePolicy,
    paths: impl FnOnce() -> Result<JobPaths>,
) -> Result<ComputeStats> {
    match role {
        Role::Coordinator => {
            Coordinator::new(transport, kernel, on_failure)
                .run(paths())
                .await
        }
        Role::Worker => {
            let transport = transport.ok_or_else(|| {
                DriverError::Config("worker started outside a process group".into())
            })?;
            Worker::new(transport, kernel).run().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_for_rank() {
        assert_eq!(Role::for_rank(0), Role::Coordinator);
        assert_eq!(Role::for_rank(1), Role::Worker);
        assert_eq!(Role::for_rank(7).to_string(), "worker");
    }
}
