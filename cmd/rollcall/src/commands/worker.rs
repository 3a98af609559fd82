//! Long-running worker.

use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::info;

use rollcall_dispatch::{FsBlobStore, MqttBroker, Worker};

use super::build_pipeline;
use crate::Cli;
use crate::config::Config;

/// Consume submitted photos from the broker until interrupted.
#[derive(Args)]
pub struct WorkerCommand {
    /// Consumer group (default from config)
    #[arg(long)]
    group: Option<String>,

    /// Jobs processed at once (default from config)
    #[arg(long)]
    max_in_flight: Option<usize>,
}

impl WorkerCommand {
    pub async fn run(&self, _cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let mut dispatch = cfg.dispatch();
        if let Some(group) = &self.group {
            dispatch = dispatch.with_worker_group(group);
        }
        if let Some(n) = self.max_in_flight {
            dispatch = dispatch.with_max_in_flight(n);
        }

        let pipeline = Arc::new(build_pipeline(cfg)?);
        let broker = Arc::new(MqttBroker::connect(cfg.mqtt()).await?);
        let blobs = Arc::new(FsBlobStore::open(cfg.blob_dir()?).await?);

        let cancel = CancellationToken::new();
        let handle = Worker::new(broker.clone(), blobs, pipeline, dispatch)
            .start(cancel.clone())
            .await?;

        tokio::signal::ctrl_c().await?;
        info!("interrupt received, finishing in-flight jobs");
        cancel.cancel();
        handle.await?;
        broker.close().await?;
        Ok(())
    }
}
