//! Task submission and polling
//!
//! Every mutating VCD call answers `202 Accepted` with a `Task` document.
//! The poller re-fetches the task's own link until it leaves the in-flight
//! states or the timeout elapses. A timeout is not an error: it yields
//! [`TaskStatus::Running`] and the operation carries on server side.

use super::client::VcdClient;
use super::error::{VcdError, VcdResult};
use super::xml::{error_message, XmlElement};
use std::fmt;
use std::time::{Duration, Instant};

/// Delay between two polls of the same task
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// How long to wait for a task before reporting it as still running
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(60);

/// Status of a VCD task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    PreRunning,
    Running,
    Success,
    Error,
    Canceled,
    Aborted,
    Other(String),
}

impl TaskStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "queued" => Self::Queued,
            "preRunning" => Self::PreRunning,
            "running" => Self::Running,
            "success" => Self::Success,
            "error" => Self::Error,
            "canceled" => Self::Canceled,
            "aborted" => Self::Aborted,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "queued",
            Self::PreRunning => "preRunning",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
            Self::Canceled => "canceled",
            Self::Aborted => "aborted",
            Self::Other(s) => s,
        }
    }

    /// The task has not reached a terminal state yet
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Queued | Self::PreRunning | Self::Running)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A submitted VCD task
#[derive(Debug, Clone)]
pub struct Task {
    pub href: String,
    pub status: TaskStatus,
    pub operation: Option<String>,
}

impl Task {
    pub fn from_document(doc: &XmlElement) -> VcdResult<Self> {
        let href = doc
            .attr("href")
            .ok_or_else(|| VcdError::Xml(format!("{} document has no href", doc.name)))?;

        Ok(Self {
            href: href.to_string(),
            status: status_of(doc),
            operation: doc.attr("operation").map(str::to_string),
        })
    }
}

fn status_of(doc: &XmlElement) -> TaskStatus {
    TaskStatus::parse(doc.attr("status").unwrap_or(""))
}

/// Submits mutating requests and waits for their tasks
#[derive(Debug, Clone)]
pub struct TaskPoller {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for TaskPoller {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

impl TaskPoller {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// POST to `uri` and wait for the resulting task.
    ///
    /// Anything but `202` is a [`VcdError::SubmissionFailed`] and the task is
    /// never polled.
    pub async fn submit(
        &self,
        client: &VcdClient,
        name: &str,
        uri: &str,
        content_type: Option<&str>,
        body: Option<String>,
    ) -> VcdResult<TaskStatus> {
        let response = client.post(uri, content_type, body).await?;
        tracing::debug!("{} Task Submitted: {}", name, response.status);

        if response.status != 202 {
            tracing::error!(
                "{} submission failed: {} - {}",
                name,
                response.status,
                super::http::sanitize_for_log(&response.body)
            );
            return Err(VcdError::SubmissionFailed {
                status: response.status,
                body: response.body,
            });
        }

        let task = Task::from_document(&XmlElement::parse(&response.body)?)?;
        tracing::debug!("{} Running: {}", name, task.href);

        let status = self.wait(client, task).await?;
        tracing::debug!("{} Task Complete. Status: {}", name, status);
        Ok(status)
    }

    /// Poll `task` until it is terminal or the timeout elapses
    pub async fn wait(&self, client: &VcdClient, task: Task) -> VcdResult<TaskStatus> {
        let start = Instant::now();
        let href = task.href;
        let mut status = task.status;

        while status.is_in_flight() {
            let elapsed = start.elapsed();
            tracing::debug!("waiting for task: {:.2}s", elapsed.as_secs_f64());
            if elapsed > self.timeout {
                tracing::warn!("Task {} still {} after {:?}", href, status, self.timeout);
                return Ok(TaskStatus::Running);
            }

            tokio::time::sleep(self.poll_interval).await;
            status = status_of(&client.get(&href).await?);
        }

        Ok(status)
    }
}

/// Result of powering a VM off
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// The undeploy task ran and ended with this status
    Completed(TaskStatus),
    /// VCD refused because the VM was not running
    AlreadyStopped,
}

impl ShutdownOutcome {
    /// Collapse to a task status; an already stopped VM counts as success
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Completed(status) => status.clone(),
            Self::AlreadyStopped => TaskStatus::Success,
        }
    }
}

/// Turn the result of an undeploy submission into a shutdown outcome.
///
/// VCD signals "already off" with a `400` whose `Error` message contains
/// "is not running"; there is no dedicated minor error code for it.
pub fn classify_shutdown(result: VcdResult<TaskStatus>) -> VcdResult<ShutdownOutcome> {
    match result {
        Ok(status) => Ok(ShutdownOutcome::Completed(status)),
        Err(VcdError::SubmissionFailed { status, body }) => {
            let message = error_message(&body).unwrap_or_else(|| body.clone());
            if message.contains("is not running") {
                tracing::debug!("VM appears to be powered off already, continuing");
                Ok(ShutdownOutcome::AlreadyStopped)
            } else {
                Err(VcdError::SubmissionFailed { status, body })
            }
        }
        Err(e) => Err(e),
    }
}
