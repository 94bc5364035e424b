use crate::{
    error::{ManagerError, Result},
    extract::{checked_entry_path, open_archive, write_entry},
    naming,
};
use filetime::{set_file_times, FileTime};
use log::{debug, info, warn};
use serde::Serialize;
use std::{fs, path::Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceKind {
    Archive,
    ModFile,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: usize,
    pub skipped: Vec<String>,
    pub unsafe_entries: Vec<String>,
}

impl InstallReport {
    pub fn is_noop(&self) -> bool {
        self.installed == 0
    }
}

fn classify_source(path: &Path) -> Option<SourceKind> {
    let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
    if name.ends_with(".zip") {
        return Some(SourceKind::Archive);
    }
    naming::recognized_extension(&name).map(|_| SourceKind::ModFile)
}

/// Adds `source` to `dest_root` without ever replacing existing content.
pub fn install(source: &Path, dest_root: &Path) -> Result<InstallReport> {
    let kind = classify_source(source).ok_or_else(|| {
        ManagerError::Unsupported(format!(
            "don't know how to install {}; only .zip, .package and .ts4script are supported",
            source.display()
        ))
    })?;
    if !source.is_file() {
        return Err(ManagerError::NotFound(format!(
            "{} not found",
            source.display()
        )));
    }

    info!("Installing {} into {}", source.display(), dest_root.display());
    let report = match kind {
        SourceKind::Archive => install_archive(source, dest_root)?,
        SourceKind::ModFile => install_file(source, dest_root)?,
    };
    info!(
        "Installed {} item(s), skipped {}, unsafe {}",
        report.installed,
        report.skipped.len(),
        report.unsafe_entries.len()
    );
    Ok(report)
}

fn install_archive(source: &Path, dest_root: &Path) -> Result<InstallReport> {
    let mut archive = open_archive(source)?;
    fs::create_dir_all(dest_root).map_err(|err| ManagerError::io(err, "create", dest_root))?;

    let mut report = InstallReport::default();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| ManagerError::Malformed(format!("entry {index}: {err}")))?;
        let name = entry.name().to_string();
        let dest = match checked_entry_path(dest_root, &name) {
            Ok(dest) => dest,
            Err(err) => {
                warn!("Skipping {err}");
                report.unsafe_entries.push(name);
                continue;
            }
        };
        if dest.exists() {
            debug!("Already present, skipping {name}");
            report.skipped.push(name);
            continue;
        }

        if entry.is_dir() {
            fs::create_dir_all(&dest).map_err(|err| ManagerError::io(err, "create", &dest))?;
        } else {
            let modified = entry.last_modified();
            write_entry(&mut entry, &dest, modified)
                .map_err(|err| ManagerError::io(err, "extract", &dest))?;
        }
        report.installed += 1;
    }
    Ok(report)
}

fn install_file(source: &Path, dest_root: &Path) -> Result<InstallReport> {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let dest = dest_root.join(&name);
    let mut report = InstallReport::default();
    if dest.exists() {
        debug!("Already present, skipping {name}");
        report.skipped.push(name);
        return Ok(report);
    }

    fs::create_dir_all(dest_root).map_err(|err| ManagerError::io(err, "create", dest_root))?;
    fs::copy(source, &dest).map_err(|err| ManagerError::io(err, "copy", source))?;
    if let Ok(meta) = fs::metadata(source) {
        let atime = FileTime::from_last_access_time(&meta);
        let mtime = FileTime::from_last_modification_time(&meta);
        if let Err(err) = set_file_times(&dest, atime, mtime) {
            warn!("Could not preserve timestamps on {}: {err}", dest.display());
        }
    }
    report.installed = 1;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

    // Names ending in '/' become directory entries.
    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).expect("create zip");
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).expect("add directory");
            } else {
                writer.start_file(*name, options).expect("start entry");
                writer.write_all(data.as_bytes()).expect("write entry");
            }
        }
        writer.finish().expect("finish zip");
    }

    #[test]
    fn archive_install_is_idempotent() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("Mods");
        let source = temp.path().join("Pack.zip");
        write_zip(
            &source,
            &[
                ("CC/", ""),
                ("CC/hair.package", "hair"),
                ("Tuning.ts4script", "tuning"),
            ],
        );

        let first = install(&source, &mods).expect("first install");
        assert_eq!(first.installed, 3);
        assert!(first.skipped.is_empty());
        assert_eq!(
            fs::read(mods.join("CC").join("hair.package")).expect("read"),
            b"hair"
        );

        let second = install(&source, &mods).expect("second install");
        assert_eq!(second.installed, 0);
        assert!(second.is_noop());
        assert_eq!(
            second.skipped,
            vec![
                "CC/".to_string(),
                "CC/hair.package".to_string(),
                "Tuning.ts4script".to_string()
            ]
        );
    }

    #[test]
    fn existing_entries_are_never_overwritten() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("Mods");
        fs::create_dir_all(&mods).expect("create mods");
        fs::write(mods.join("Tuning.ts4script"), b"mine").expect("write existing");
        let source = temp.path().join("update.ZIP");
        write_zip(
            &source,
            &[("Tuning.ts4script", "theirs"), ("New.package", "n")],
        );

        let report = install(&source, &mods).expect("install");
        assert_eq!(report.installed, 1);
        assert_eq!(report.skipped, vec!["Tuning.ts4script".to_string()]);
        assert_eq!(fs::read(mods.join("Tuning.ts4script")).expect("read"), b"mine");
    }

    #[test]
    fn traversal_entries_are_reported_and_not_written() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("user").join("Mods");
        let source = temp.path().join("evil.zip");
        write_zip(
            &source,
            &[("../escape.package", "evil"), ("fine.package", "ok")],
        );

        let report = install(&source, &mods).expect("install");
        assert_eq!(report.unsafe_entries, vec!["../escape.package".to_string()]);
        assert_eq!(report.installed, 1);
        assert!(!temp.path().join("user").join("escape.package").exists());
        assert!(mods.join("fine.package").is_file());
    }

    #[cfg(unix)]
    #[test]
    fn entries_behind_a_link_out_of_the_root_are_unsafe() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("Mods");
        let outside = temp.path().join("outside");
        fs::create_dir_all(&mods).expect("create mods");
        fs::create_dir_all(&outside).expect("create outside");
        std::os::unix::fs::symlink(&outside, mods.join("link")).expect("create link");
        let source = temp.path().join("linked.zip");
        write_zip(
            &source,
            &[("link/evil.package", "evil"), ("fine.package", "ok")],
        );

        let report = install(&source, &mods).expect("install");
        assert_eq!(report.unsafe_entries, vec!["link/evil.package".to_string()]);
        assert_eq!(report.installed, 1);
        assert!(!outside.join("evil.package").exists());
        assert!(mods.join("fine.package").is_file());
    }

    #[test]
    fn single_file_copy_keeps_timestamps() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("Mods");
        let source = temp.path().join("Cheats.package");
        fs::write(&source, b"cheat").expect("write source");
        let stamp = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&source, stamp).expect("set mtime");

        let report = install(&source, &mods).expect("install");
        assert_eq!(report.installed, 1);
        let meta = fs::metadata(mods.join("Cheats.package")).expect("stat copy");
        assert_eq!(FileTime::from_last_modification_time(&meta), stamp);

        let again = install(&source, &mods).expect("install again");
        assert_eq!(again.installed, 0);
        assert_eq!(again.skipped, vec!["Cheats.package".to_string()]);
    }

    #[test]
    fn unsupported_and_malformed_sources_fail_up_front() {
        let temp = tempdir().expect("create tempdir");
        let mods = temp.path().join("Mods");
        let text = temp.path().join("readme.txt");
        fs::write(&text, b"hi").expect("write txt");
        let err = install(&text, &mods).expect_err("unsupported");
        assert!(matches!(err, ManagerError::Unsupported(_)));

        let bogus = temp.path().join("bogus.zip");
        fs::write(&bogus, b"nope").expect("write bogus");
        let err = install(&bogus, &mods).expect_err("malformed");
        assert!(matches!(err, ManagerError::Malformed(_)));
        assert!(!mods.exists());
    }
}
