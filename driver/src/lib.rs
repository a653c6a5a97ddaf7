pub mod cli;
pub mod compute;
pub mod config;
pub mod errors;
pub mod job;
pub mod kernel;
pub mod observability;
pub mod partition;
pub mod protocol;
pub mod roles;
pub mod transport;

pub use cli::JobPaths;
pub use compute::{compute_range, ComputeStats};
pub use config::{FailurePolicy, GroupConfig, RunConfig};
pub use errors::{DriverError, Result};
pub use kernel::{default_kernel, DipoleKernel, PhysicsKernel};
pub use observability::init_logging;
pub use partition::{partition, Partition};
pub use roles::{run_role, Coordinator, Role, Worker};
pub use transport::{MemoryTransport, Rank, TcpTransport, Transport};
