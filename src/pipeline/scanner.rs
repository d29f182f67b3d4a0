//! Source side of the write pipeline: produces files in the deterministic
//! order the archive stream requires — lexicographic path, directories
//! before their contents.

use std::path::{Path, PathBuf};

use crate::error::{TapeError, TapeResult};

/// One file read into memory, ready for the encoder. Backup sources in this
/// crate's scope are modest enough (per §2 Non-goals: no streaming of
/// multi-gigabyte single files) that holding the whole payload is fine.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub mtime: i64,
    pub payload: Vec<u8>,
}

pub trait SourceScanner: Send {
    fn next_file(&mut self) -> TapeResult<Option<SourceFile>>;
}

/// A scanner over files already materialized in memory, in canonical order.
/// Used by tests and by callers that have already staged their payloads.
pub struct InMemorySourceScanner {
    files: std::vec::IntoIter<SourceFile>,
}

impl InMemorySourceScanner {
    pub fn new(mut files: Vec<SourceFile>) -> Self {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            files: files.into_iter(),
        }
    }
}

impl SourceScanner for InMemorySourceScanner {
    fn next_file(&mut self) -> TapeResult<Option<SourceFile>> {
        Ok(self.files.next())
    }
}

/// Walks a directory tree on the local filesystem, yielding regular files in
/// canonical order with paths relative to `root`. Directories themselves are
/// not archived as separate members (their presence is implied by their
/// children's paths); this matches the archive layer's flat member model.
pub struct FilesystemScanner {
    files: std::vec::IntoIter<PathBuf>,
    root: PathBuf,
}

impl FilesystemScanner {
    pub fn new(root: impl Into<PathBuf>) -> TapeResult<Self> {
        let root = root.into();
        let mut files = Vec::new();
        walk(&root, &mut files)?;
        let mut rel: Vec<(String, PathBuf)> = files
            .into_iter()
            .map(|p| {
                let rel = p
                    .strip_prefix(&root)
                    .unwrap_or(&p)
                    .to_string_lossy()
                    .replace('\\', "/");
                (rel, p)
            })
            .collect();
        rel.sort_by(|a, b| a.0.cmp(&b.0));
        let files = rel.into_iter().map(|(_, p)| p).collect::<Vec<_>>();
        Ok(Self {
            files: files.into_iter(),
            root,
        })
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> TapeResult<()> {
    for entry in std::fs::read_dir(dir).map_err(TapeError::from)? {
        let entry = entry.map_err(TapeError::from)?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(TapeError::from)?;
        if file_type.is_dir() {
            walk(&path, out)?;
        } else if file_type.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

impl SourceScanner for FilesystemScanner {
    fn next_file(&mut self) -> TapeResult<Option<SourceFile>> {
        let Some(path) = self.files.next() else {
            return Ok(None);
        };
        let metadata = std::fs::metadata(&path).map_err(TapeError::from)?;
        let payload = std::fs::read(&path).map_err(TapeError::from)?;
        let rel = path
            .strip_prefix(&self.root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        #[cfg(unix)]
        let (mode, uid, gid, mtime) = {
            use std::os::unix::fs::MetadataExt;
            (metadata.mode(), metadata.uid(), metadata.gid(), metadata.mtime())
        };
        #[cfg(not(unix))]
        let (mode, uid, gid, mtime) = (0o644u32, 0u32, 0u32, 0i64);

        Ok(Some(SourceFile {
            path: rel,
            mode,
            uid,
            gid,
            mtime,
            payload,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_scanner_yields_canonical_order() {
        let files = vec![
            SourceFile {
                path: "b.txt".into(),
                mode: 0,
                uid: 0,
                gid: 0,
                mtime: 0,
                payload: vec![],
            },
            SourceFile {
                path: "a.txt".into(),
                mode: 0,
                uid: 0,
                gid: 0,
                mtime: 0,
                payload: vec![],
            },
        ];
        let mut scanner = InMemorySourceScanner::new(files);
        assert_eq!(scanner.next_file().unwrap().unwrap().path, "a.txt");
        assert_eq!(scanner.next_file().unwrap().unwrap().path, "b.txt");
        assert!(scanner.next_file().unwrap().is_none());
    }
}
