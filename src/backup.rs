use crate::{
    error::{ManagerError, Result},
    extract::{self, checked_entry_path, open_archive, write_entry},
};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use time::{macros::format_description, OffsetDateTime};
use walkdir::WalkDir;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

pub const SNAPSHOT_MARKER: &str = "_pre_restore_";

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub archive: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub skipped_snapshots: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RestorePlan<'a> {
    pub archive: &'a Path,
    pub target: &'a Path,
    pub target_exists: bool,
    pub entries: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub target: PathBuf,
    pub snapshot: Option<PathBuf>,
    pub extracted: usize,
    pub unsafe_entries: Vec<String>,
}

#[derive(Debug)]
pub enum RestoreOutcome {
    Restored(RestoreReport),
    Declined,
    /// Extraction failed and the target was put back the way it was.
    RolledBack {
        cause: ManagerError,
        snapshot: Option<PathBuf>,
    },
}

pub fn timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    now.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

pub fn default_backup_name(label: &str) -> String {
    format!("Sims4_{label}_Backup_{}.zip", timestamp())
}

pub fn is_snapshot_name(name: &str, root_name: &str) -> bool {
    name.strip_prefix(root_name)
        .is_some_and(|rest| rest.starts_with(SNAPSHOT_MARKER))
}

/// Zips every file under `root` with root-relative names.
///
/// A failure while writing leaves the partial archive on disk; removing it
/// is up to the caller.
pub fn create_backup(root: &Path, archive_path: &Path) -> Result<BackupReport> {
    if !root.is_dir() {
        return Err(ManagerError::NotFound(format!(
            "backup source {} is not a directory",
            root.display()
        )));
    }
    if archive_path.exists() {
        return Err(ManagerError::AlreadyExists(format!(
            "backup archive {} already exists",
            archive_path.display()
        )));
    }
    if let Some(parent) = archive_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|err| ManagerError::io(err, "create backup dir", parent))?;
    }

    info!(
        "Backing up {} to {}",
        root.display(),
        archive_path.display()
    );
    let file = File::create(archive_path)
        .map_err(|err| ManagerError::io(err, "create archive", archive_path))?;
    let output = fs::canonicalize(archive_path).unwrap_or_else(|_| archive_path.to_path_buf());

    match write_backup(root, &output, ZipWriter::new(file)) {
        Ok(report) => {
            info!(
                "Backup complete: {} file(s) in {}",
                report.files,
                archive_path.display()
            );
            Ok(BackupReport {
                archive: archive_path.to_path_buf(),
                ..report
            })
        }
        Err(err) => {
            warn!(
                "Backup failed; partial archive left at {}",
                archive_path.display()
            );
            Err(match err {
                ManagerError::Other(detail) => ManagerError::Other(format!(
                    "{detail} (partial archive left at {})",
                    archive_path.display()
                )),
                other => other,
            })
        }
    }
}

fn write_backup(root: &Path, output: &Path, mut zip: ZipWriter<File>) -> Result<BackupReport> {
    let root_name = root
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut report = BackupReport {
        archive: output.to_path_buf(),
        files: 0,
        directories: 0,
        skipped_snapshots: Vec::new(),
    };
    let base = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            let snapshot = entry.file_type().is_dir()
                && is_snapshot_name(&entry.file_name().to_string_lossy(), &root_name);
            if snapshot {
                debug!("Skipping snapshot {}", entry.path().display());
            }
            !snapshot
        });

    for entry in walker {
        let entry = entry.map_err(|err| {
            let path = err.path().unwrap_or(root).to_path_buf();
            ManagerError::io(io::Error::from(err), "walk", &path)
        })?;
        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .map_err(|_| ManagerError::Other(format!("{} escaped backup root", path.display())))?;
        let name = archive_name(relative);

        if entry.file_type().is_dir() {
            zip.add_directory(format!("{name}/"), base)
                .map_err(|err| ManagerError::Other(format!("add {name}: {err}")))?;
            report.directories += 1;
            continue;
        }
        if entry.path_is_symlink() && path.is_dir() {
            debug!("Not following linked folder {}", path.display());
            continue;
        }
        if is_same_file(path, output) {
            continue;
        }

        let mut source = File::open(path).map_err(|err| ManagerError::io(err, "read", path))?;
        let mut options = base;
        if let Some(modified) = source
            .metadata()
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(extract::zip_time_from_system)
        {
            options = options.last_modified_time(modified);
        }
        zip.start_file(name.as_str(), options)
            .map_err(|err| ManagerError::Other(format!("add {name}: {err}")))?;
        io::copy(&mut source, &mut zip).map_err(|err| ManagerError::io(err, "compress", path))?;
        report.files += 1;
    }

    zip.finish()
        .map_err(|err| ManagerError::Other(format!("finish archive: {err}")))?;

    // Snapshot folders are pruned by the walker; report them separately.
    if let Ok(children) = fs::read_dir(root) {
        for child in children.flatten() {
            let name = child.file_name().to_string_lossy().to_string();
            if child.path().is_dir() && is_snapshot_name(&name, &root_name) {
                report.skipped_snapshots.push(child.path());
            }
        }
    }
    Ok(report)
}

fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn is_same_file(path: &Path, output: &Path) -> bool {
    if path.file_name() != output.file_name() {
        return false;
    }
    fs::canonicalize(path).is_ok_and(|resolved| resolved == output)
}

/// Replaces `target` with the contents of `archive_path`.
///
/// The previous target is moved aside to a timestamped sibling before
/// extraction and is left in place on success. If extraction fails the
/// partial target is removed and the snapshot moved back; if that in turn
/// fails the error is [`ManagerError::Unrecoverable`].
pub fn restore<F>(archive_path: &Path, target: &Path, confirm: F) -> Result<RestoreOutcome>
where
    F: FnOnce(&RestorePlan) -> bool,
{
    restore_with(archive_path, target, confirm, extract_into)
}

fn restore_with<F, X>(
    archive_path: &Path,
    target: &Path,
    confirm: F,
    extract: X,
) -> Result<RestoreOutcome>
where
    F: FnOnce(&RestorePlan) -> bool,
    X: FnOnce(&mut ZipArchive<File>, &Path) -> Result<(usize, Vec<String>)>,
{
    if !archive_path.is_file() {
        return Err(ManagerError::NotFound(format!(
            "backup archive {} not found",
            archive_path.display()
        )));
    }
    let mut archive = open_archive(archive_path)?;

    let plan = RestorePlan {
        archive: archive_path,
        target,
        target_exists: target.exists(),
        entries: archive.len(),
    };
    if !confirm(&plan) {
        info!("Restore of {} declined", target.display());
        return Ok(RestoreOutcome::Declined);
    }

    let snapshot = if plan.target_exists {
        let snapshot = snapshot_path(target)?;
        info!(
            "Moving current {} to {}",
            target.display(),
            snapshot.display()
        );
        fs::rename(target, &snapshot)
            .map_err(|err| ManagerError::io(err, "move aside", target))?;
        Some(snapshot)
    } else {
        None
    };

    info!("Extracting {} into {}", archive_path.display(), target.display());
    match extract(&mut archive, target) {
        Ok((extracted, unsafe_entries)) => {
            info!("Restore complete: {extracted} file(s)");
            Ok(RestoreOutcome::Restored(RestoreReport {
                target: target.to_path_buf(),
                snapshot,
                extracted,
                unsafe_entries,
            }))
        }
        Err(cause) => {
            error!("Restore failed during extraction: {cause}; rolling back");
            match rollback(target, snapshot.as_deref()) {
                Ok(()) => Ok(RestoreOutcome::RolledBack { cause, snapshot }),
                Err(rollback_err) => Err(ManagerError::Unrecoverable(format!(
                    "extraction failed ({cause}) and rollback failed ({rollback_err}); \
                     inspect {} and {} manually",
                    target.display(),
                    snapshot
                        .as_deref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| "<no snapshot>".to_string())
                ))),
            }
        }
    }
}

fn extract_into(archive: &mut ZipArchive<File>, target: &Path) -> Result<(usize, Vec<String>)> {
    fs::create_dir_all(target).map_err(|err| ManagerError::io(err, "create", target))?;

    let mut extracted = 0;
    let mut unsafe_entries = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| ManagerError::Malformed(format!("entry {index}: {err}")))?;
        let name = entry.name().to_string();
        let dest = match checked_entry_path(target, &name) {
            Ok(dest) => dest,
            Err(err) => {
                warn!("Skipping {err}");
                unsafe_entries.push(name);
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|err| ManagerError::io(err, "create", &dest))?;
            continue;
        }
        let modified = entry.last_modified();
        write_entry(&mut entry, &dest, modified)
            .map_err(|err| ManagerError::io(err, "extract", &dest))?;
        extracted += 1;
    }
    Ok((extracted, unsafe_entries))
}

pub(crate) fn rollback(target: &Path, snapshot: Option<&Path>) -> Result<()> {
    if target.exists() {
        if let Err(err) = fs::remove_dir_all(target) {
            warn!("Could not remove partial restore at {}: {err}", target.display());
        }
    }

    let Some(snapshot) = snapshot else {
        info!("Rolled back: removed partial restore (no previous contents)");
        return Ok(());
    };
    if !snapshot.is_dir() {
        return Err(ManagerError::NotFound(format!(
            "snapshot {} is missing",
            snapshot.display()
        )));
    }
    fs::rename(snapshot, target).map_err(|err| ManagerError::io(err, "move back", snapshot))?;
    info!("Rolled back: previous contents restored to {}", target.display());
    Ok(())
}

fn snapshot_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().ok_or_else(|| {
        ManagerError::Other(format!("{} has no parent directory", target.display()))
    })?;
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| ManagerError::Other(format!("{} has no name", target.display())))?;

    let base = format!("{name}{SNAPSHOT_MARKER}{}", timestamp());
    let mut candidate = parent.join(&base);
    let mut counter = 1;
    while candidate.exists() {
        candidate = parent.join(format!("{base}_{counter}"));
        counter += 1;
    }
    Ok(candidate)
}
