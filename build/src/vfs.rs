//! Virtual filesystem seam between the coordinator and its backing storage.
//!
//! Paths are absolute, `/`-separated virtual paths (`/working/main.cpp`).
//! [`MemoryVfs`] backs tests and the unpacked toolchain bundle; [`DiskVfs`]
//! maps the virtual tree onto a real directory for process-backed tools.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Context;

/// Storage operations the build sequence needs. Implementations are shared
/// across tasks, so everything takes `&self`.
pub trait Vfs: Send + Sync {
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()>;
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;
    fn unlink(&self, path: &str) -> io::Result<()>;
    /// Paths of the direct and nested entries under `dir`.
    fn list(&self, dir: &str) -> io::Result<Vec<String>>;
    fn exists(&self, path: &str) -> bool;
    /// Host-side directory for a virtual `dir`, created if missing, usable
    /// as a process working directory. Backings with no host mapping
    /// return the virtual path unchanged.
    fn host_dir(&self, dir: &str) -> io::Result<PathBuf>;
}

/// In-memory [`Vfs`] over a path-keyed map.
#[derive(Debug, Default)]
pub struct MemoryVfs {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryVfs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Vfs for MemoryVfs {
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.files().insert(path.to_string(), contents.to_vec());
        Ok(())
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}")))
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        self.files().remove(path).map(|_| ()).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {path}"))
        })
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        Ok(self
            .files()
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .cloned()
            .collect())
    }

    fn exists(&self, path: &str) -> bool {
        self.files().contains_key(path)
    }

    fn host_dir(&self, dir: &str) -> io::Result<PathBuf> {
        Ok(PathBuf::from(dir))
    }
}

/// [`Vfs`] rooted at a real directory; virtual `/a/b` becomes `<root>/a/b`.
#[derive(Debug)]
pub struct DiskVfs {
    root: PathBuf,
}

impl DiskVfs {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }

    fn unresolve(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        Some(format!("/{}", relative.to_string_lossy().replace('\\', "/")))
    }

    fn list_into(&self, dir: &Path, out: &mut Vec<String>) -> io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.list_into(&path, out)?;
            } else if let Some(virtual_path) = self.unresolve(&path) {
                out.push(virtual_path);
            }
        }
        Ok(())
    }
}

impl Vfs for DiskVfs {
    fn write(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let real = self.resolve(path);
        if let Some(parent) = real.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(real, contents)
    }

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.resolve(path))
    }

    fn unlink(&self, path: &str) -> io::Result<()> {
        std::fs::remove_file(self.resolve(path))
    }

    fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut out = Vec::new();
        let real = self.resolve(dir);
        if real.is_dir() {
            self.list_into(&real, &mut out)?;
        }
        out.sort();
        Ok(out)
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).exists()
    }

    fn host_dir(&self, dir: &str) -> io::Result<PathBuf> {
        let real = self.resolve(dir);
        std::fs::create_dir_all(&real)?;
        Ok(real)
    }
}

/// Unpack a toolchain bundle into the filesystem.
///
/// The bundle is a JSON object of virtual path → byte array, the same shape
/// the host uses for build inputs. Returns the number of files written.
pub fn unpack_bundle(vfs: &dyn Vfs, bundle: &[u8]) -> anyhow::Result<usize> {
    let files: BTreeMap<String, Vec<u8>> =
        serde_json::from_slice(bundle).context("parsing toolchain bundle")?;
    for (path, contents) in &files {
        vfs.write(path, contents)
            .with_context(|| format!("unpacking {path}"))?;
    }
    tracing::info!(files = files.len(), "toolchain bundle unpacked");
    Ok(files.len())
}
