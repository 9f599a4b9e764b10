use std::time::Duration;

use tokio::time::Instant;

use crate::error::Error;
use crate::http::job::{Job, JobConfiguration, JobReference, JobState, JobType};
use crate::location::Location;
use crate::service::WarehouseService;

/// Submits `job` and blocks until it is DONE.
///
/// The service is polled every `poll_interval`. When `timeout` passes first the call fails with
/// [`Error::Timeout`]; the job itself is left alone and may still finish remotely.
pub(crate) async fn run(
    service: &dyn WarehouseService,
    project_id: &str,
    location: Location,
    job: JobType,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<Job, Error> {
    let job = Job {
        job_reference: JobReference {
            project_id: project_id.to_string(),
            job_id: new_job_id(),
            location: Some(location.to_string()),
        },
        configuration: JobConfiguration {
            job,
            ..Default::default()
        },
        ..Default::default()
    };
    let job = service.insert_job(&job).await?;
    tracing::debug!(job_id = %job.job_reference.job_id, state = ?job.status.state, "job submitted");
    wait(service, job, poll_interval, timeout).await
}

pub(crate) async fn wait(
    service: &dyn WarehouseService,
    job: Job,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<Job, Error> {
    let job_id = job.job_reference.job_id.clone();
    let started = Instant::now();
    let polling = poll(service, job, poll_interval);
    let job = match timeout {
        Some(timeout) => tokio::time::timeout(timeout, polling)
            .await
            .map_err(|_| Error::Timeout {
                job_id: job_id.clone(),
                elapsed: started.elapsed(),
            })??,
        None => polling.await?,
    };
    finish(job)
}

async fn poll(service: &dyn WarehouseService, mut job: Job, poll_interval: Duration) -> Result<Job, Error> {
    let mut state = job.status.state;
    while job.status.state != JobState::Done {
        tokio::time::sleep(poll_interval).await;
        let reference = &job.job_reference;
        job = service
            .get_job(&reference.project_id, &reference.job_id, reference.location.as_deref())
            .await?;
        if job.status.state != state {
            tracing::trace!(job_id = %job.job_reference.job_id, from = ?state, to = ?job.status.state, "job state changed");
            state = job.status.state;
        }
    }
    Ok(job)
}

fn finish(job: Job) -> Result<Job, Error> {
    match job.status.error_result {
        Some(error) => Err(Error::JobFailed {
            job_id: job.job_reference.job_id,
            error,
            errors: job.status.errors.unwrap_or_default(),
        }),
        None => Ok(job),
    }
}

pub(crate) fn new_job_id() -> String {
    format!("warehouse_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use crate::emulator::InMemoryWarehouse;
    use crate::error::Error;
    use crate::http::job::{JobConfigurationQuery, JobState, JobType};
    use crate::job::run;
    use crate::location::Location;

    #[ctor::ctor]
    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn query(text: &str) -> JobType {
        JobType::Query(JobConfigurationQuery {
            query: text.to_string(),
            use_legacy_sql: Some(false),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn waits_until_done() {
        let service = InMemoryWarehouse::new();
        let job = run(
            &service,
            "p",
            Location::Us,
            query("SELECT 1"),
            Duration::from_millis(1),
            None,
        )
        .await
        .unwrap();
        assert_eq!(job.status.state, JobState::Done);
        assert!(job.status.error_result.is_none());
    }

    #[tokio::test]
    async fn failed_job_carries_error_proto() {
        let service = InMemoryWarehouse::new();
        let err = run(
            &service,
            "p",
            Location::Us,
            query("SELECT * FROM missing.people"),
            Duration::from_millis(1),
            None,
        )
        .await
        .unwrap_err();
        match err {
            Error::JobFailed { error, .. } => assert_eq!(error.reason.as_deref(), Some("notFound")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_leaves_job_running() {
        let service = InMemoryWarehouse::new();
        service.stall_jobs(true);
        let err = run(
            &service,
            "p",
            Location::Us,
            query("SELECT 1"),
            Duration::from_millis(5),
            Some(Duration::from_millis(30)),
        )
        .await
        .unwrap_err();
        let Error::Timeout { job_id, elapsed } = err else {
            panic!("expected timeout");
        };
        assert!(elapsed >= Duration::from_millis(30));
        assert_ne!(service.job_state("p", &job_id), Some(JobState::Done));
    }
}
