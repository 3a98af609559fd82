//! Submission of class photos to workers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Args;
use serde::Serialize;

use rollcall_dispatch::{Dispatcher, FsBlobStore, MqttBroker};

use super::{SessionArgs, output_result, read_file};
use crate::Cli;
use crate::config::Config;

/// Submit a class photo to the workers and wait for the report.
///
/// On timeout the job's outcome is unknown: a worker may still mark
/// attendance for it later.
#[derive(Args)]
pub struct SubmitCommand {
    #[command(flatten)]
    session: SessionArgs,

    /// Class photo (PNG or JPEG)
    image: PathBuf,

    /// Seconds to wait for the report (default from config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Print the correlation ID and return without waiting
    #[arg(long)]
    no_wait: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    correlation_id: String,
}

impl SubmitCommand {
    pub async fn run(&self, cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let image = Bytes::from(read_file(&self.image)?);
        let broker = Arc::new(MqttBroker::connect(cfg.mqtt()).await?);
        let blobs = Arc::new(FsBlobStore::open(cfg.blob_dir()?).await?);
        let dispatcher = Dispatcher::start(broker.clone(), blobs, cfg.dispatch()).await?;

        let id = dispatcher
            .submit(image, &self.session.class_name, &self.session.slot)
            .await?;
        if self.no_wait {
            return output_result(&Submitted { correlation_id: id }, cli);
        }

        let timeout = self
            .timeout
            .map(Duration::from_secs)
            .unwrap_or(dispatcher.config().await_timeout);
        let result = dispatcher.await_result(&id, timeout).await;
        dispatcher.close().await;
        if let Err(e) = broker.close().await {
            tracing::debug!(error = %e, "broker close");
        }

        let report = result?;
        output_result(&report, cli)?;
        if report.is_error() {
            anyhow::bail!("{}", report.message);
        }
        Ok(())
    }
}
