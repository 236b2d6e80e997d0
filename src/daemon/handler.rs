//! Command handler implementation for the daemon.

use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::CommandHandler;
use crate::service::CoverService;
use std::sync::Arc;
use tokio::sync::Notify;

/// Maps IPC commands onto the cover service.
pub struct DaemonCommandHandler {
    service: Arc<CoverService>,
    shutdown: Arc<Notify>,
}

impl DaemonCommandHandler {
    pub fn new(service: Arc<CoverService>, shutdown: Arc<Notify>) -> Self {
        Self { service, shutdown }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Submit { request } => match self.service.submit(request) {
                Ok(submitted) => Response::Submitted {
                    job: submitted.job,
                    position: submitted.position,
                },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            Command::Status { job } => match self.service.status(job) {
                Some(snapshot) => Response::JobStatus { job: snapshot },
                None => Response::Error {
                    message: format!("Unknown job {}", job),
                },
            },
            Command::QueueDepth => Response::QueueDepth {
                depth: self.service.queue_depth(),
            },
            Command::Skip { guild } => Response::Skipped {
                stopped: self.service.skip(guild),
            },
            Command::Models { query } => Response::Models {
                names: self.service.models(&query),
            },
            Command::Shutdown => {
                // The daemon loop performs the actual teardown
                self.shutdown.notify_one();
                Response::Ok
            }
        }
    }
}
