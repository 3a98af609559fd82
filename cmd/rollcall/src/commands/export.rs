//! Attendance export.

use chrono::{Local, NaiveDate};
use clap::{Args, ValueEnum};

use rollcall_attendance::{export_rows, write_csv};

use super::{SessionArgs, open_store, write_output};
use crate::Cli;
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Yaml,
}

/// Export one day's attendance of a session.
#[derive(Args)]
pub struct ExportCommand {
    #[command(flatten)]
    session: SessionArgs,

    /// Date as YYYY-MM-DD (default: today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    format: ExportFormat,
}

impl ExportCommand {
    pub async fn run(&self, cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        let store = open_store(cfg)?;
        let rows = export_rows(store.as_ref(), &self.session.namespace(), date)?;

        // --json overrides the format flag.
        let format = if cli.json { ExportFormat::Json } else { self.format };
        let data = match format {
            ExportFormat::Csv => {
                let mut buf = Vec::new();
                write_csv(&mut buf, &rows)?;
                buf
            }
            ExportFormat::Json => serde_json::to_vec_pretty(&rows)?,
            ExportFormat::Yaml => serde_yaml::to_string(&rows)?.into_bytes(),
        };
        write_output(&data, cli.output.as_deref())
    }
}
