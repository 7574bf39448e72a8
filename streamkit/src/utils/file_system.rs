//! Tools for working with the file system.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tar::Archive;
use tokio::fs::{File, OpenOptions};
use uuid::Uuid;
use xz2::read::XzDecoder;
use zip::ZipArchive;

/// Returns the name of the given path.
pub fn try_name(path: impl AsRef<Path>) -> Result<String> {
    let name = path
        .as_ref()
        .file_name()
        .ok_or(Error::Path("Failed to get name".to_string()))?;
    let name = name
        .to_str()
        .ok_or(Error::Path("Failed to convert name".to_string()))?;

    Ok(name.to_string())
}

/// Returns the parent directory of the given path.
pub fn try_parent(path: impl AsRef<Path>) -> Result<PathBuf> {
    let parent = path
        .as_ref()
        .parent()
        .ok_or(Error::Path("Failed to get parent".to_string()))?;

    Ok(parent.to_path_buf())
}

/// Creates (or truncates) a file at the given destination.
///
/// # Arguments
///
/// * `destination` - The path to create the file at.
pub async fn create_file(destination: impl AsRef<Path>) -> Result<File> {
    let mut open_options = OpenOptions::new();
    open_options.write(true);
    open_options.create(true);
    open_options.truncate(true);

    #[cfg(unix)]
    {
        open_options.mode(0o644);
    }

    let file = open_options.open(destination).await?;
    Ok(file)
}

/// Creates a new directory at the given destination.
/// If the directory already exists, nothing is done.
pub fn create_dir(destination: impl AsRef<Path>) -> Result<()> {
    std::fs::create_dir_all(destination)?;
    Ok(())
}

/// Creates the parent directory of the given destination.
/// If the parent directory already exists, nothing is done.
pub fn create_parent_dir(destination: impl AsRef<Path>) -> Result<()> {
    if let Some(parent) = destination.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    Ok(())
}

/// Builds a collision-resistant temporary file path inside `dir`, with the given extension.
///
/// Two calls never return the same path, so concurrent merges can share one directory.
pub fn unique_temp_path(dir: impl AsRef<Path>, extension: &str) -> PathBuf {
    let name = Uuid::new_v4().simple().to_string();
    let extension = extension.trim_start_matches('.');

    if extension.is_empty() {
        dir.as_ref().join(name)
    } else {
        dir.as_ref().join(format!("{name}.{extension}"))
    }
}

/// Extracts a zip file to the given destination.
///
/// # Arguments
///
/// * `zip_path` - The path to the zip file.
/// * `destination` - The path to extract the zip file to.
pub async fn extract_zip(
    zip_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    tracing::debug!(
        "Extracting zip file: {:?} to {:?}",
        zip_path.as_ref(),
        destination.as_ref()
    );

    let zip_path = zip_path.as_ref().to_path_buf();
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(zip_path)?;
        let mut archive = ZipArchive::new(file)?;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let Some(name) = entry.enclosed_name() else {
                continue;
            };
            let target = destination.join(name);

            if entry.is_file() {
                create_parent_dir(&target)?;
                let mut out = std::fs::File::create(&target)?;
                std::io::copy(&mut entry, &mut out)?;
            }
        }

        Ok(())
    })
    .await?
}

/// Extracts a tar.xz file to the given destination.
///
/// # Arguments
///
/// * `tar_path` - The path to the tar.xz file.
/// * `destination` - The path to extract the tar.xz file to.
pub async fn extract_tar_xz(
    tar_path: impl AsRef<Path> + std::fmt::Debug,
    destination: impl AsRef<Path> + std::fmt::Debug,
) -> Result<()> {
    tracing::debug!(
        "Extracting tar.xz file: {:?} to {:?}",
        tar_path.as_ref(),
        destination.as_ref()
    );

    let tar_path = tar_path.as_ref().to_path_buf();
    let destination = destination.as_ref().to_path_buf();

    tokio::task::spawn_blocking(move || -> Result<()> {
        let file = std::fs::File::open(tar_path)?;
        let mut archive = Archive::new(XzDecoder::new(file));
        archive.unpack(destination)?;

        Ok(())
    })
    .await?
}

/// Finds the first file named `name` below `root`, searching breadth-first.
pub fn find_file(root: impl AsRef<Path>, name: &str) -> Option<PathBuf> {
    let mut pending = vec![root.as_ref().to_path_buf()];

    while !pending.is_empty() {
        let mut next = Vec::new();
        for dir in pending {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };

            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    next.push(path);
                } else if path.file_name().is_some_and(|n| n == name) {
                    return Some(path);
                }
            }
        }
        pending = next;
    }

    None
}

/// Sets the executable bit on the given file.
#[cfg(not(target_os = "windows"))]
pub fn set_executable(executable: impl AsRef<Path>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(executable.as_ref())?.permissions();

    perms.set_mode(0o755);
    std::fs::set_permissions(executable, perms)?;

    Ok(())
}

/// No-op on Windows, which doesn't use executable bits.
#[cfg(target_os = "windows")]
pub fn set_executable(_executable: impl AsRef<Path>) -> Result<()> {
    Ok(())
}

/// Removes a temporary file and logs any errors.
/// Does not propagate errors to avoid interrupting the execution flow.
///
/// A file that does not exist counts as removed.
///
/// # Returns
///
/// `true` if the file is gone afterwards, `false` otherwise
pub async fn remove_temp_file(file_path: impl AsRef<Path> + std::fmt::Debug) -> bool {
    match tokio::fs::remove_file(&file_path).await {
        Ok(()) => {
            tracing::debug!("Removed temporary file {:?}", file_path);
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            tracing::warn!("Failed to remove temporary file {:?}: {}", file_path, e);
            false
        }
    }
}
