use crate::config::SlaveConfig;
use crate::error::{Result, SlaveError};
use crate::runner::JobRunner;
use futures::{SinkExt, StreamExt};
use simfarm_core::archive::{self, Bundle};
use simfarm_protocol::{Message, MessageCodec, PayloadFrame, ResultFrame};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Worker process: registers with the manager and runs whatever it is sent,
/// one job at a time.
pub struct Slave {
    name: String,
    runner: Arc<dyn JobRunner>,
    work_dir: Option<PathBuf>,
    codec: MessageCodec,
    keepalives: Arc<AtomicU64>,
    jobs_run: Arc<AtomicU64>,
    shutdown: CancellationToken,
}

impl Slave {
    pub fn new(config: &SlaveConfig, runner: Arc<dyn JobRunner>) -> Self {
        Slave {
            name: config.generate_name(),
            runner,
            work_dir: config.work_dir.clone(),
            codec: MessageCodec::new(config.max_frame_bytes),
            keepalives: Arc::new(AtomicU64::new(0)),
            jobs_run: Arc::new(AtomicU64::new(0)),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keepalives_received(&self) -> u64 {
        self.keepalives.load(Ordering::Relaxed)
    }

    /// Jobs answered with a result frame, failed ones included
    pub fn jobs_run(&self) -> u64 {
        self.jobs_run.load(Ordering::Relaxed)
    }

    /// Cancelling this token makes [`Slave::serve`] return between jobs.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Connect to the manager over TCP and serve until either side stops.
    pub async fn connect(&self, address: &str) -> Result<()> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| SlaveError::Connect {
                address: address.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        info!("Connected to manager at {}", address);
        self.serve(stream).await
    }

    /// Register over an established connection and process frames until the
    /// manager hangs up or shutdown is requested.
    pub async fn serve<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(stream, self.codec);
        framed.send(Message::Hello(self.name.clone())).await?;
        info!(slave = %self.name, "Registered with manager");

        loop {
            let next = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Slave shutting down");
                    return Ok(());
                }
                next = framed.next() => next,
            };

            match next {
                None => {
                    info!("Connection closed by manager");
                    return Ok(());
                }
                Some(Err(e)) => {
                    error!("Protocol error: {}", e);
                    return Err(e.into());
                }
                Some(Ok(Message::Keepalive)) => {
                    debug!("Keepalive");
                    self.keepalives.fetch_add(1, Ordering::Relaxed);
                }
                Some(Ok(Message::Payload(frame))) => {
                    let span = info_span!("job", job = %frame.job_name);
                    let reply = self.handle_payload(frame).instrument(span).await;
                    framed.send(Message::Result(reply)).await?;
                    self.jobs_run.fetch_add(1, Ordering::Relaxed);
                }
                Some(Ok(other)) => {
                    warn!("Unexpected frame from manager: {:?}", other.message_type());
                    return Err(SlaveError::UnexpectedFrame(format!(
                        "{:?}",
                        other.message_type()
                    )));
                }
            }
        }
    }

    async fn handle_payload(&self, frame: PayloadFrame) -> ResultFrame {
        let job_name = frame.job_name.clone();
        info!(bytes = frame.archive.len(), "Job received");
        match self.execute(frame).await {
            Ok(archive) => {
                info!(bytes = archive.len(), "Job finished");
                ResultFrame::success(job_name, archive)
            }
            Err(e) => {
                error!("Job failed: {}", e);
                ResultFrame::failure(job_name, e.to_string())
            }
        }
    }

    /// Unpack into a scratch directory, run, and pack the output.
    async fn execute(&self, frame: PayloadFrame) -> Result<Vec<u8>> {
        let scratch = match &self.work_dir {
            Some(dir) => {
                tokio::fs::create_dir_all(dir).await?;
                tempfile::Builder::new().prefix("sf-job-").tempdir_in(dir)?
            }
            None => tempfile::Builder::new().prefix("sf-job-").tempdir()?,
        };
        let job_dir = scratch.path().join("job");
        tokio::fs::create_dir(&job_dir).await?;

        let dest = job_dir.clone();
        let archive = frame.archive;
        let bundle = tokio::task::spawn_blocking(move || archive::unpack(&archive, &dest))
            .await
            .map_err(|e| SlaveError::Runner(e.to_string()))??;
        debug!(files = bundle.entries.len(), "Inputs unpacked");

        let output = self.runner.run(&frame.job_name, &job_dir).await?;

        let packed = tokio::task::spawn_blocking(move || Bundle::from_dir(&output)?.to_bytes())
            .await
            .map_err(|e| SlaveError::Runner(e.to_string()))??;
        Ok(packed)
    }
}
