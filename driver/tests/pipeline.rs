//! End-to-end runs of the coordinator and workers over the in-memory transport

mod common;

use common::{expected_outputs, sample_job, write_sample_job, SlowFirstKernel};
use multi_lstar::job::{load_output, write_job, SampleOutput, SampleStatus, FILL_VALUE};
use multi_lstar::protocol::{Channel, Message};
use multi_lstar::{
    run_role, ComputeStats, Coordinator, DipoleKernel, DriverError, FailurePolicy, JobPaths,
    MemoryTransport, PhysicsKernel, Result, Role, Transport, Worker,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct GroupRun {
    coordinator: Result<ComputeStats>,
    workers: Vec<Result<ComputeStats>>,
}

async fn run_group(
    world_size: usize,
    kernel: Arc<dyn PhysicsKernel>,
    on_failure: FailurePolicy,
    paths: Result<JobPaths>,
) -> GroupRun {
    let mut endpoints = MemoryTransport::group(world_size).into_iter();
    let coordinator_end = endpoints.next().unwrap();

    let handles: Vec<_> = endpoints
        .map(|endpoint| {
            let kernel = Arc::clone(&kernel);
            tokio::spawn(async move { Worker::new(endpoint, kernel.as_ref()).run().await })
        })
        .collect();

    let coordinator = Coordinator::new(Some(coordinator_end), kernel.as_ref(), on_failure)
        .run(paths)
        .await;

    let mut workers = Vec::new();
    for handle in handles {
        workers.push(handle.await.unwrap());
    }
    GroupRun {
        coordinator,
        workers,
    }
}

fn job_paths(dir: &TempDir) -> (PathBuf, PathBuf) {
    (dir.path().join("job.bin"), dir.path().join("out.bin"))
}

#[tokio::test]
async fn test_ten_samples_three_processes() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    let job = write_sample_job(&input, 10);
    let kernel: Arc<dyn PhysicsKernel> = Arc::new(DipoleKernel::default());

    let run = run_group(
        3,
        Arc::clone(&kernel),
        FailurePolicy::Fill,
        JobPaths::new(input, output.clone()),
    )
    .await;

    // chunk 3: ranks 1 and 2 take three samples each, the coordinator four
    assert_eq!(run.coordinator.unwrap().samples, 4);
    let worker_samples: Vec<usize> = run.workers.into_iter().map(|w| w.unwrap().samples).collect();
    assert_eq!(worker_samples, vec![3, 3]);

    let written = load_output(&output).unwrap();
    assert_eq!(written.len(), 10);
    assert_eq!(written, expected_outputs(kernel.as_ref(), &job));
}

#[tokio::test]
async fn test_empty_job() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    write_sample_job(&input, 0);

    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::new(input, output.clone()),
    )
    .await;

    assert_eq!(run.coordinator.unwrap().samples, 0);
    for worker in run.workers {
        assert_eq!(worker.unwrap().samples, 0);
    }

    // header only
    assert_eq!(std::fs::metadata(&output).unwrap().len(), 4);
    assert!(load_output(&output).unwrap().is_empty());
}

#[tokio::test]
async fn test_more_processes_than_samples() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    let job = write_sample_job(&input, 2);
    let kernel: Arc<dyn PhysicsKernel> = Arc::new(DipoleKernel::default());

    let run = run_group(
        5,
        Arc::clone(&kernel),
        FailurePolicy::Fill,
        JobPaths::new(input, output.clone()),
    )
    .await;

    // chunk 0: every worker gets an empty slice, the coordinator keeps both
    assert_eq!(run.coordinator.unwrap().samples, 2);
    for worker in run.workers {
        assert_eq!(worker.unwrap().samples, 0);
    }
    assert_eq!(
        load_output(&output).unwrap(),
        expected_outputs(kernel.as_ref(), &job)
    );
}

#[tokio::test]
async fn test_single_process_runs_alone() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    let job = write_sample_job(&input, 7);
    let kernel = DipoleKernel::default();

    let paths = JobPaths::new(input, output.clone());
    let stats = run_role(
        Role::Coordinator,
        None::<MemoryTransport>,
        &kernel,
        FailurePolicy::Fill,
        || paths,
    )
    .await
    .unwrap();

    assert_eq!(stats.samples, 7);
    assert_eq!(load_output(&output).unwrap(), expected_outputs(&kernel, &job));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_order_independent_of_completion() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    write_sample_job(&input, 12);

    // Rank 1 holds the slowest samples and finishes last
    let run = run_group(
        4,
        Arc::new(SlowFirstKernel { ntimes: 12 }),
        FailurePolicy::Fill,
        JobPaths::new(input, output.clone()),
    )
    .await;
    run.coordinator.unwrap();

    let written = load_output(&output).unwrap();
    let expected: Vec<f64> = (0..12).map(|i| i as f64).collect();
    assert_eq!(written.lm, expected);
    assert_eq!(written.lstar, expected);
}

#[tokio::test]
async fn test_missing_input_aborts_workers() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);

    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::new(input, output),
    )
    .await;

    let err = run.coordinator.unwrap_err();
    assert!(matches!(err, DriverError::IoContext { .. }));
    assert_ne!(err.exit_code(), 0);
    for worker in run.workers {
        assert!(matches!(worker, Err(DriverError::Aborted)));
    }
}

#[tokio::test]
async fn test_bad_arguments_abort_workers() {
    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::from_args(["multi-lstar", "only-one.bin"]),
    )
    .await;

    assert!(matches!(run.coordinator, Err(DriverError::Config(_))));
    for worker in run.workers {
        assert!(matches!(worker, Err(DriverError::Aborted)));
    }
}

#[tokio::test]
async fn test_oversize_path_aborts_workers() {
    let dir = TempDir::new().unwrap();
    let long_input = dir.path().join("a".repeat(2048));
    let output = dir.path().join("out.bin");

    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::from_args([
            "multi-lstar".into(),
            long_input.into_os_string(),
            output.clone().into_os_string(),
        ]),
    )
    .await;

    let err = run.coordinator.unwrap_err();
    assert!(matches!(err, DriverError::Config(_)));
    assert_eq!(err.exit_code(), 2);
    for worker in run.workers {
        assert!(matches!(worker, Err(DriverError::Aborted)));
    }
    assert!(!output.exists());
}

#[tokio::test]
async fn test_unwritable_output_aborts_workers() {
    let dir = TempDir::new().unwrap();
    let (input, _) = job_paths(&dir);
    write_sample_job(&input, 4);
    let output = dir.path().join("missing-dir").join("out.bin");

    let run = run_group(
        2,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::new(input, output),
    )
    .await;

    assert!(matches!(run.coordinator, Err(DriverError::IoContext { .. })));
    assert!(matches!(run.workers[0], Err(DriverError::Aborted)));
}

fn job_with_sample_inside_earth(dir: &TempDir, index: usize) -> (PathBuf, PathBuf) {
    let (input, output) = job_paths(dir);
    let mut job = sample_job(10);
    job.inputs.x1[index] = 0.5;
    job.inputs.x2[index] = 0.0;
    job.inputs.x3[index] = 0.0;
    write_job(&input, &job).unwrap();
    (input, output)
}

#[tokio::test]
async fn test_kernel_failure_filled() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_with_sample_inside_earth(&dir, 1);

    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fill,
        JobPaths::new(input, output.clone()),
    )
    .await;

    run.coordinator.unwrap();
    assert_eq!(run.workers[0].as_ref().unwrap().failed, 1);

    let written = load_output(&output).unwrap();
    assert_eq!(written.sample(1), SampleOutput::FILL);
    assert_eq!(written.status[1], SampleStatus::Failed);
    assert_eq!(written.failed_count(), 1);
    assert_ne!(written.lm[0], FILL_VALUE);
}

#[tokio::test]
async fn test_kernel_failure_fails_job() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_with_sample_inside_earth(&dir, 4);

    let run = run_group(
        3,
        Arc::new(DipoleKernel::default()),
        FailurePolicy::Fail,
        JobPaths::new(input, output.clone()),
    )
    .await;

    assert!(matches!(run.coordinator, Err(DriverError::Kernel(_))));
    // Workers always finish their traversal
    for worker in run.workers {
        worker.unwrap();
    }
    // Created during setup, removed when the job failed
    assert!(!output.exists());
}

#[tokio::test]
async fn test_oversized_result_is_protocol_error() {
    let dir = TempDir::new().unwrap();
    let (input, output) = job_paths(&dir);
    write_sample_job(&input, 6);

    let mut endpoints = MemoryTransport::group(2);
    let mut fake_worker = endpoints.pop().unwrap();
    let coordinator_end = endpoints.pop().unwrap();

    let fake = tokio::spawn(async move {
        fake_worker.recv(0, Channel::Control).await.unwrap();
        fake_worker.recv(0, Channel::Common).await.unwrap();
        let slice = match fake_worker.recv(0, Channel::Input).await.unwrap() {
            Message::InputSlice(slice) => slice,
            other => panic!("unexpected {:?}", other),
        };
        let long = multi_lstar::job::OutputColumns::with_len(slice.len() + 1);
        fake_worker
            .send(0, Message::OutputSlice(long))
            .await
            .unwrap();
    });

    let kernel = DipoleKernel::default();
    let result = Coordinator::new(Some(coordinator_end), &kernel, FailurePolicy::Fill)
        .run(JobPaths::new(input, output.clone()))
        .await;
    fake.await.unwrap();

    assert!(matches!(result, Err(DriverError::Protocol(_))));
    assert!(!output.exists());
}
