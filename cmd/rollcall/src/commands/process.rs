//! Local processing of a class photo.

use std::path::PathBuf;

use clap::Args;

use super::{SessionArgs, build_pipeline, output_result, read_file};
use crate::Cli;
use crate::config::Config;

/// Match the faces in a class photo and mark attendance, in process.
#[derive(Args)]
pub struct ProcessCommand {
    #[command(flatten)]
    session: SessionArgs,

    /// Class photo (PNG or JPEG)
    image: PathBuf,
}

impl ProcessCommand {
    pub async fn run(&self, cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let image = read_file(&self.image)?;
        let pipeline = build_pipeline(cfg)?;
        let report = pipeline
            .process(&image, &self.session.class_name, &self.session.slot)
            .await;
        output_result(&report, cli)?;
        if report.is_error() {
            anyhow::bail!("{}", report.message);
        }
        Ok(())
    }
}
