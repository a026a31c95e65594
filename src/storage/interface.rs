use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tokio::{fs::File, io::AsyncWriteExt};

use super::StorageError;

/// Disk-backed storage for uploaded images
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;

        Ok(())
    }

    /// Opens a temporary file next to the stored images. It is removed on
    /// drop unless [`StagedFile::persist`] is called.
    pub fn stage(&self) -> Result<StagedFile, StorageError> {
        let temp = tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.root)?;
        let file = File::from_std(temp.reopen()?);

        Ok(StagedFile {
            temp,
            file,
            written: 0,
        })
    }

    /// Only bare file names are accepted, nothing that could leave `root`.
    pub fn path_of(&self, name: &str) -> Result<PathBuf, StorageError> {
        let is_bare_name = !name.starts_with('.')
            && Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);

        if !is_bare_name {
            return Err(StorageError::InvalidFileName(name.to_string()));
        }

        Ok(self.root.join(name))
    }

    pub async fn open(&self, name: &str) -> Result<File, StorageError> {
        Ok(File::open(self.path_of(name)?).await?)
    }

    /// Returns whether a file was actually removed.
    pub async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        match tokio::fs::remove_file(self.path_of(name)?).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }
}

pub struct StagedFile {
    temp: NamedTempFile,
    file: File,
    written: u64,
}

impl StagedFile {
    /// Appends `chunk`, returns the total number of bytes written so far.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<u64, StorageError> {
        self.file.write_all(chunk).await?;
        self.written += chunk.len() as u64;

        Ok(self.written)
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Moves the staged bytes to `name` inside `storage`. Never overwrites
    /// an existing file.
    pub async fn persist(self, storage: &Storage, name: &str) -> Result<PathBuf, StorageError> {
        let StagedFile { temp, mut file, .. } = self;

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        let target = storage.path_of(name)?;
        let destination = target.clone();

        tokio::task::spawn_blocking(move || temp.persist_noclobber(&destination))
            .await
            .map_err(std::io::Error::other)?
            .map_err(|err| err.error)?;

        Ok(target)
    }
}
