//! Enrollment of face embeddings.

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;
use tracing::info;

use rollcall_attendance::{FaceModel, decode_image};
use rollcall_roster::EmbeddingStore;

use super::{SessionArgs, face_model, open_store, output_result, parse_embedding, read_file};
use crate::Cli;
use crate::config::Config;

/// Enroll one identity's face embedding for a session.
///
/// The embedding is given directly, read from a JSON file, or extracted
/// from a portrait photo by the configured face model.
#[derive(Args)]
pub struct EnrollCommand {
    #[command(flatten)]
    session: SessionArgs,

    /// Identity ID, e.g. a student number
    #[arg(long)]
    id: String,

    /// Embedding as comma separated values or a JSON array
    #[arg(long, conflicts_with_all = ["embedding_file", "image"])]
    embedding: Option<String>,

    /// File holding the embedding as a JSON array
    #[arg(long, conflicts_with = "image")]
    embedding_file: Option<PathBuf>,

    /// Portrait photo with exactly one face
    #[arg(long)]
    image: Option<PathBuf>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Enrolled<'a> {
    identity_id: &'a str,
    collection_name: String,
    dimension: usize,
}

impl EnrollCommand {
    pub async fn run(&self, cli: &Cli, cfg: &Config) -> anyhow::Result<()> {
        let embedding = self.embedding(cfg).await?;
        let ns = self.session.namespace();

        let store = open_store(cfg)?;
        store.put_embedding(&ns, &self.id, &embedding)?;
        info!(namespace = %ns, identity = %self.id, dim = embedding.len(), "enrolled");

        output_result(
            &Enrolled {
                identity_id: &self.id,
                collection_name: ns,
                dimension: embedding.len(),
            },
            cli,
        )
    }

    async fn embedding(&self, cfg: &Config) -> anyhow::Result<Vec<f32>> {
        if let Some(s) = &self.embedding {
            return parse_embedding(s);
        }
        if let Some(path) = &self.embedding_file {
            let data = read_file(path)?;
            return Ok(serde_json::from_slice(&data)?);
        }
        let Some(path) = &self.image else {
            anyhow::bail!("one of --embedding, --embedding-file or --image is required");
        };
        let image = decode_image(&read_file(path)?)?;
        let mut faces = face_model(cfg)?.detect_faces(&image).await?;
        match faces.len() {
            1 => Ok(faces.remove(0)),
            0 => anyhow::bail!("no face found in {}", path.display()),
            n => anyhow::bail!("{n} faces found in {}, expected one", path.display()),
        }
    }
}
