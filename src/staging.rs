//! Local staging of uploaded files before they are handed to a provider.
//!
//! Each upload lands in its own directory `staging_dir/{uuid}/{file_name}`
//! so providers see the original file name.

use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// A file written to the staging area.
#[derive(Debug)]
pub struct StagedFile {
    pub path: PathBuf,
    pub size: u64,

    /// Hex MD5 of the staged bytes.
    pub md5: String,

    dir: PathBuf,
}

impl StagedFile {
    /// Remove the staged file and its directory. Failures are logged only.
    pub async fn discard(self) {
        if let Err(err) = fs::remove_dir_all(&self.dir).await {
            warn!("Could not remove staging dir {}: {}", self.dir.display(), err);
        }
    }
}

/// Stream `stream` into a fresh staging directory under `staging_dir`.
/// On error nothing is left behind.
pub async fn stage_stream<S>(staging_dir: &Path, file_name: &str, stream: S) -> io::Result<StagedFile>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let dir = staging_dir.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&dir).await?;
    let path = dir.join(file_name);

    let result = async {
        let mut file = File::create(&path).await?;
        let mut size: u64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            digest.consume(&chunk);
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok::<_, io::Error>((size, format!("{:x}", digest.compute())))
    }
    .await;

    match result {
        Ok((size, md5)) => {
            debug!("Staged {} bytes at {}", size, path.display());
            Ok(StagedFile {
                path,
                size,
                md5,
                dir,
            })
        }
        Err(err) => {
            let _ = fs::remove_dir_all(&dir).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tempfile::TempDir;

    #[tokio::test]
    async fn stages_chunks_and_digests() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            Ok(Bytes::from_static(b"plate,")),
            Ok(Bytes::from_static(b"well\n")),
        ];
        let staged = stage_stream(dir.path(), "run.csv", stream::iter(chunks))
            .await
            .unwrap();

        assert_eq!(staged.size, 11);
        assert_eq!(staged.md5, format!("{:x}", md5::compute(b"plate,well\n")));
        assert_eq!(staged.path.file_name().unwrap(), "run.csv");
        assert_eq!(std::fs::read(&staged.path).unwrap(), b"plate,well\n");

        let staged_dir = staged.path.parent().unwrap().to_path_buf();
        staged.discard().await;
        assert!(!staged_dir.exists());
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let chunks = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "client went away")),
        ];
        let err = stage_stream(dir.path(), "x.bin", stream::iter(chunks))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
