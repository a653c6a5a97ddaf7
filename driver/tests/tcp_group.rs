//! A full job over a localhost TCP process group

mod common;

use common::{expected_outputs, write_sample_job};
use multi_lstar::job::load_output;
use multi_lstar::transport::TcpTransportConfig;
use multi_lstar::{
    Coordinator, DipoleKernel, DriverError, FailurePolicy, JobPaths, TcpTransport, Worker,
};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

async fn local_group_config() -> (TcpListener, TcpTransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = TcpTransportConfig {
        coordinator_addr: listener.local_addr().unwrap().to_string(),
        connect_timeout: Duration::from_secs(10),
        connect_retry: Duration::from_millis(20),
        ..TcpTransportConfig::default()
    };
    (listener, config)
}

#[tokio::test]
async fn test_tcp_group_matches_single_process() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("job.bin");
    let output = dir.path().join("out.bin");
    let job = write_sample_job(&input, 23);

    let (listener, config) = local_group_config().await;
    let world_size = 4;

    let workers: Vec<_> = (1..world_size)
        .map(|rank| {
            let config = config.clone();
            tokio::spawn(async move {
                let transport = TcpTransport::establish(rank, world_size, &config)
                    .await
                    .unwrap();
                let kernel = DipoleKernel::default();
                Worker::new(transport, &kernel).run().await
            })
        })
        .collect();

    let transport = TcpTransport::accept(listener, world_size, &config)
        .await
        .unwrap();
    let kernel = DipoleKernel::default();
    let stats = Coordinator::new(Some(transport), &kernel, FailurePolicy::Fill)
        .run(JobPaths::new(input, output.clone()))
        .await
        .unwrap();

    // chunk 5, coordinator keeps [15, 23)
    assert_eq!(stats.samples, 8);
    for worker in workers {
        assert_eq!(worker.await.unwrap().unwrap().samples, 5);
    }

    assert_eq!(load_output(&output).unwrap(), expected_outputs(&kernel, &job));
}

#[tokio::test]
async fn test_tcp_abort_reaches_workers() {
    let dir = TempDir::new().unwrap();
    let (listener, config) = local_group_config().await;

    let worker_config = config.clone();
    let worker = tokio::spawn(async move {
        let transport = TcpTransport::establish(1, 2, &worker_config).await.unwrap();
        let kernel = DipoleKernel::default();
        Worker::new(transport, &kernel).run().await
    });

    let transport = TcpTransport::accept(listener, 2, &config).await.unwrap();
    let kernel = DipoleKernel::default();
    let result = Coordinator::new(Some(transport), &kernel, FailurePolicy::Fill)
        .run(JobPaths::new(
            dir.path().join("absent.bin"),
            dir.path().join("out.bin"),
        ))
        .await;

    assert!(result.is_err());
    assert!(matches!(worker.await.unwrap(), Err(DriverError::Aborted)));
}

#[tokio::test]
async fn test_slices_larger_than_a_frame() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("job.bin");
    let output = dir.path().join("out.bin");
    let job = write_sample_job(&input, 400);

    let (listener, mut config) = local_group_config().await;
    // Far below one 200-sample slice
    config.max_frame_bytes = 4096;

    let worker_config = config.clone();
    let worker = tokio::spawn(async move {
        let transport = TcpTransport::establish(1, 2, &worker_config).await.unwrap();
        let kernel = DipoleKernel::default();
        Worker::new(transport, &kernel).run().await
    });

    let transport = TcpTransport::accept(listener, 2, &config).await.unwrap();
    let kernel = DipoleKernel::default();
    let stats = Coordinator::new(Some(transport), &kernel, FailurePolicy::Fill)
        .run(JobPaths::new(input, output.clone()))
        .await
        .unwrap();

    assert_eq!(stats.samples, 200);
    assert_eq!(worker.await.unwrap().unwrap().samples, 200);
    assert_eq!(load_output(&output).unwrap(), expected_outputs(&kernel, &job));
}
