//! multi-lstar - distributed drift-shell computation
//!
//! Launch one copy per rank (mpirun, srun, or by hand with
//! `MULTI_LSTAR_RANK`/`MULTI_LSTAR_WORLD_SIZE`). Rank 0 reads the job file,
//! hands contiguous sample ranges to the other ranks, computes its own tail
//! and writes the results:
//!
//! ```text
//! multi-lstar <INPUT> <OUTPUT>
//! ```

use multi_lstar::{
    default_kernel, init_logging, run_role, DriverError, GroupConfig, JobPaths, Role, RunConfig,
    TcpTransport,
};
use std::process::ExitCode;
use tracing::{error, info, info_span, Instrument};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(DriverError::Aborted) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("multi-lstar: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run() -> Result<(), DriverError> {
    let group = GroupConfig::from_env()?;
    let role = Role::for_rank(group.rank);

    // A bad settings file must not stop the coordinator from reaching its
    // workers, so it is reported after the group has formed.
    let settings = RunConfig::from_env();
    let config = settings.as_ref().cloned().unwrap_or_default();

    if let Err(e) = init_logging(&config.logging, group.rank) {
        eprintln!("multi-lstar: {}", e);
    }

    let span = info_span!("rank", rank = group.rank);
    async move {
        let transport = if group.world_size > 1 {
            let tcp = config.tcp_transport(&group);
            Some(TcpTransport::establish(group.rank, group.world_size, &tcp).await?)
        } else {
            None
        };

        info!(
            rank = group.rank,
            world_size = group.world_size,
            %role,
            "Starting"
        );

        let kernel = default_kernel();
        let on_failure = config.kernel.on_failure;
        let outcome = run_role(role, transport, kernel.as_ref(), on_failure, || {
            settings?;
            JobPaths::from_args(std::env::args_os())
        })
        .await;

        match &outcome {
            Ok(stats) => info!(samples = stats.samples, failed = stats.failed, "Done"),
            Err(DriverError::Aborted) => info!("Exiting on coordinator request"),
            Err(e) => error!(error = %e, "Run failed"),
        }
        outcome.map(|_| ())
    }
    .instrument(span)
    .await
}
