//! Directory-backed document store.

use super::{DocumentStore, RejectReason, StorageError, StorageLimits, StorageResult};
use crate::model::submission::DocumentRef;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stores each document as one file named `{stem}_{uuid}.{ext}` directly
/// under `root`. The returned reference is that file name.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
    limits: StorageLimits,
}

impl FsDocumentStore {
    /// Creates the root directory if needed.
    pub fn new(root: impl Into<PathBuf>, limits: StorageLimits) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|err| StorageError::io("create_dir", err))?;
        Ok(Self { root, limits })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, document: &str) -> StorageResult<PathBuf> {
        let valid = !document.is_empty()
            && document
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            && !document.starts_with('.');
        if !valid {
            return Err(StorageError::Rejected(RejectReason::InvalidReference(
                document.to_string(),
            )));
        }
        Ok(self.root.join(document))
    }
}

impl DocumentStore for FsDocumentStore {
    fn store(&self, bytes: &[u8], name_hint: &str) -> StorageResult<DocumentRef> {
        let ext = self.limits.check(bytes, name_hint).map_err(StorageError::Rejected)?;
        let stem = sanitize_stem(name_hint);
        let file_name = format!("{stem}_{}.{ext}", Uuid::new_v4().simple());
        let final_path = self.root.join(&file_name);
        let temp_path = self.root.join(format!(".{file_name}.partial"));

        let written = fs::File::create(&temp_path)
            .and_then(|mut file| {
                file.write_all(bytes)?;
                file.sync_all()
            })
            .and_then(|()| fs::rename(&temp_path, &final_path));
        if let Err(err) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(StorageError::io("write", err));
        }

        log::info!(
            "event=document_store module=storage status=ok document={file_name} size={}",
            bytes.len()
        );
        Ok(file_name)
    }

    fn delete(&self, document: &str) -> StorageResult<()> {
        let path = self.resolve(document)?;
        match fs::remove_file(&path) {
            Ok(()) => {
                log::info!("event=document_delete module=storage status=ok document={document}");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::io("delete", err)),
        }
    }

    fn exists(&self, document: &str) -> StorageResult<bool> {
        let path = self.resolve(document)?;
        path.try_exists()
            .map(|exists| exists && path.is_file())
            .map_err(|err| StorageError::io("stat", err))
    }
}

fn sanitize_stem(name_hint: &str) -> String {
    let stem = name_hint
        .rsplit_once('.')
        .map_or(name_hint, |(stem, _)| stem);
    let cleaned: String = stem
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}
