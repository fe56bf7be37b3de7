use std::path::PathBuf;

use anyhow::Context as _;
use bytes::Bytes;
use clap::Args;
use photoid_faceid::PhotoUpload;
use serde::Deserialize;

use super::{load_request, open_resolver};
use crate::Cli;
use crate::output::Output;

#[derive(Args)]
pub struct ResolveCommand {
    /// Upload file (YAML or JSON) with photo_id, descriptors and boxes
    #[arg(short = 'f', long = "file")]
    pub file: String,
}

/// Upload file contents. Thumbnails are given as image paths, relative to
/// the upload file.
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(flatten)]
    pub upload: PhotoUpload,

    #[serde(default)]
    pub thumbnail_files: Vec<PathBuf>,
}

impl ResolveRequest {
    async fn into_upload(self, base: &std::path::Path) -> anyhow::Result<PhotoUpload> {
        let mut upload = self.upload;
        for file in self.thumbnail_files {
            let path = base.join(file);
            let image = tokio::fs::read(&path)
                .await
                .with_context(|| format!("read thumbnail {}", path.display()))?;
            upload.thumbnails.push(Bytes::from(image));
        }
        Ok(upload)
    }
}

impl ResolveCommand {
    pub async fn run(&self, cli: &Cli) -> anyhow::Result<()> {
        let req: ResolveRequest = load_request(&self.file)?;
        let base = std::path::Path::new(&self.file)
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_default();
        let upload = req.into_upload(&base).await?;

        let resolver = open_resolver(cli)?;
        let outcome = resolver.resolve_upload(upload).await?;
        if outcome.is_degraded() {
            tracing::warn!(
                requested = outcome.side_effects_requested,
                succeeded = outcome.side_effects_succeeded,
                "some side effects failed"
            );
        }
        Output::from_cli(cli).write(&outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_reads_thumbnail_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"jpeg-a").unwrap();
        let req: ResolveRequest = serde_yaml::from_str(
            "photo_id: p1\ndescriptors: [[0.1, 0.2]]\nboxes: [{x: 0, y: 0, width: 10, height: 10}]\nthumbnail_files: [a.jpg]\n",
        )
        .unwrap();

        let upload = req.into_upload(dir.path()).await.unwrap();
        assert_eq!(upload.photo_id, "p1");
        assert_eq!(upload.thumbnails, vec![Bytes::from_static(b"jpeg-a")]);
        assert_eq!(upload.into_observations().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_thumbnail_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let req: ResolveRequest = serde_json::from_str(
            r#"{"photo_id":"p1","descriptors":[[0.1]],"boxes":[{"x":0,"y":0,"width":1,"height":1}],"thumbnail_files":["gone.jpg"]}"#,
        )
        .unwrap();
        assert!(req.into_upload(dir.path()).await.is_err());
    }
}
