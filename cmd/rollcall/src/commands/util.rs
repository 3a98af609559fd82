//! Helpers shared by the commands.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Args;
use serde::Serialize;

use rollcall_attendance::{FaceModel, HttpFaceModel, SessionPipeline};
use rollcall_roster::RedbRoster;

use crate::Cli;
use crate::config::{Config, ensure_parent};

/// Class session selector.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Class name, e.g. "Math 101"
    #[arg(long = "class")]
    pub class_name: String,

    /// Time slot, e.g. "9AM"
    #[arg(long)]
    pub slot: String,
}

impl SessionArgs {
    pub fn namespace(&self) -> String {
        rollcall_roster::namespace(&self.class_name, &self.slot)
    }
}

pub fn open_store(cfg: &Config) -> anyhow::Result<Arc<RedbRoster>> {
    let path = cfg.db_path()?;
    ensure_parent(&path)?;
    let store = RedbRoster::open(&path).with_context(|| format!("open {}", path.display()))?;
    Ok(Arc::new(store))
}

pub fn face_model(cfg: &Config) -> anyhow::Result<Arc<dyn FaceModel>> {
    Ok(Arc::new(HttpFaceModel::new(cfg.face_model()?)?))
}

pub fn build_pipeline(cfg: &Config) -> anyhow::Result<SessionPipeline> {
    let store = open_store(cfg)?;
    let pipeline = SessionPipeline::new(store.clone(), store, face_model(cfg)?, cfg.pipeline())?;
    Ok(pipeline)
}

pub fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// Write `value` as YAML, or JSON with `--json`, to `--output` or stdout.
pub fn output_result<T: Serialize>(value: &T, cli: &Cli) -> anyhow::Result<()> {
    let text = if cli.json {
        serde_json::to_string_pretty(value)?
    } else {
        serde_yaml::to_string(value)?
    };
    write_output(text.as_bytes(), cli.output.as_deref())
}

pub fn write_output(data: &[u8], file: Option<&str>) -> anyhow::Result<()> {
    match file {
        Some(path) => {
            let mut f = File::create(path).with_context(|| format!("create {path}"))?;
            f.write_all(data)?;
        }
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(data)?;
            if !data.ends_with(b"\n") {
                out.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

/// Parse an embedding given as comma separated numbers or a JSON array.
pub fn parse_embedding(s: &str) -> anyhow::Result<Vec<f32>> {
    let s = s.trim();
    if s.starts_with('[') {
        return Ok(serde_json::from_str(s)?);
    }
    s.split(',')
        .map(|v| {
            v.trim()
                .parse::<f32>()
                .with_context(|| format!("invalid embedding value {v:?}"))
        })
        .collect()
}
