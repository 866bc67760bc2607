//! Bundle archives: a whole directory tree as one bincode blob.
//!
//! Bundles are what travels between the manager and its slaves. Entries carry
//! `/`-separated relative paths; unpacking refuses anything that would land
//! outside the destination directory.

use crate::{JobError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleEntry {
    pub path: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bundle {
    pub entries: Vec<BundleEntry>,
}

impl Bundle {
    /// Collect every regular file below `root`.
    pub fn from_dir(root: &Path) -> Result<Self> {
        let mut entries = Vec::new();
        collect(root, root, &mut entries)?;
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Bundle { entries })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(JobError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(JobError::from)
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.contents.len() as u64).sum()
    }

    /// Write all entries below `dest`, creating directories as needed.
    pub fn write_to(&self, dest: &Path) -> Result<()> {
        for entry in &self.entries {
            let target = dest.join(safe_relative(&entry.path)?);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, &entry.contents)?;
        }
        Ok(())
    }
}

/// Pack `src` into a bundle file at `dest` and return `dest`.
pub fn pack_dir(src: &Path, dest: &Path) -> Result<PathBuf> {
    if !src.is_dir() {
        return Err(JobError::Packaging(format!(
            "{} is not a directory",
            src.display()
        )));
    }
    let bundle = Bundle::from_dir(src)?;
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(dest, bundle.to_bytes()?)?;
    Ok(dest.to_path_buf())
}

/// Materialise a serialized bundle below `dest`.
pub fn unpack(bytes: &[u8], dest: &Path) -> Result<Bundle> {
    let bundle = Bundle::from_bytes(bytes)?;
    bundle.write_to(dest)?;
    Ok(bundle)
}

/// Relative paths and sizes of every regular file below `root`, sorted by path.
pub fn list_files(root: &Path) -> Result<Vec<(String, u64)>> {
    let mut files = Vec::new();
    walk(root, root, &mut |relative, path| {
        files.push((relative, fs::metadata(path)?.len()));
        Ok(())
    })?;
    files.sort();
    Ok(files)
}

fn collect(root: &Path, dir: &Path, entries: &mut Vec<BundleEntry>) -> Result<()> {
    walk(root, dir, &mut |relative, path| {
        entries.push(BundleEntry {
            path: relative,
            contents: fs::read(path)?,
        });
        Ok(())
    })
}

fn walk(
    root: &Path,
    dir: &Path,
    visit: &mut dyn FnMut(String, &Path) -> Result<()>,
) -> Result<()> {
    for item in fs::read_dir(dir)? {
        let item = item?;
        let path = item.path();
        let file_type = item.file_type()?;
        if file_type.is_dir() {
            walk(root, &path, visit)?;
        } else if file_type.is_file() {
            let relative = path
                .strip_prefix(root)
                .map_err(|e| JobError::Archive(e.to_string()))?;
            visit(to_bundle_path(relative), &path)?;
        }
    }
    Ok(())
}

fn to_bundle_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn safe_relative(path: &str) -> Result<PathBuf> {
    let unsafe_path = || JobError::Archive(format!("unsafe entry path: {}", path));
    if path.starts_with('/') {
        return Err(unsafe_path());
    }

    let mut out = PathBuf::new();
    for part in path.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." || part.contains('\\') || part.contains(':') {
            return Err(unsafe_path());
        }
        out.push(part);
    }
    if out.as_os_str().is_empty() {
        return Err(JobError::Archive("empty entry path".to_string()));
    }
    Ok(out)
}
