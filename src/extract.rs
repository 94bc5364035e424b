use crate::error::{ManagerError, Result};
use filetime::{set_file_mtime, FileTime};
use log::warn;
use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
    time::SystemTime,
};
use time::{Date, Month, OffsetDateTime, PrimitiveDateTime, Time as TimeOfDay};
use zip::ZipArchive;

pub fn open_archive(path: &Path) -> Result<ZipArchive<File>> {
    let file = File::open(path).map_err(|err| ManagerError::io(err, "open archive", path))?;
    ZipArchive::new(file).map_err(|err| {
        ManagerError::Malformed(format!("{} is not a valid zip archive: {err}", path.display()))
    })
}

/// Resolves an archive entry name under `root`, or `None` when the entry
/// would land outside it.
pub fn resolve_entry_path(root: &Path, raw_name: &str) -> Option<PathBuf> {
    let normalized = raw_name.replace('\\', "/");
    if normalized.starts_with('/') {
        return None;
    }

    let mut clean = PathBuf::new();
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            part if part.contains(':') => return None,
            part => clean.push(part),
        }
    }
    if clean.as_os_str().is_empty() {
        return None;
    }

    let out = root.join(clean);
    out.starts_with(root).then_some(out)
}

/// Like [`resolve_entry_path`], but also follows links already on disk: an
/// entry whose nearest existing ancestor resolves outside `root` is unsafe.
pub fn checked_entry_path(root: &Path, raw_name: &str) -> Result<PathBuf> {
    let unsafe_entry = || ManagerError::UnsafePath(format!("archive entry '{raw_name}'"));
    let dest = resolve_entry_path(root, raw_name).ok_or_else(unsafe_entry)?;
    if resolves_inside(root, &dest) {
        Ok(dest)
    } else {
        Err(unsafe_entry())
    }
}

fn resolves_inside(root: &Path, dest: &Path) -> bool {
    // Nothing under a missing root can be a link.
    let Ok(real_root) = fs::canonicalize(root) else {
        return true;
    };
    let Some(existing) = dest
        .ancestors()
        .take_while(|ancestor| ancestor.starts_with(root))
        .find(|ancestor| fs::symlink_metadata(ancestor).is_ok())
    else {
        return true;
    };
    // A dangling link fails to canonicalize.
    fs::canonicalize(existing).is_ok_and(|real| real.starts_with(&real_root))
}

/// Writes one file entry to `dest`, creating parents, and stamps the
/// archive's modification time when it carries one.
pub fn write_entry(
    reader: &mut dyn Read,
    dest: &Path,
    modified: Option<zip::DateTime>,
) -> io::Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(reader, &mut out)?;
    drop(out);

    if let Some(mtime) = modified.and_then(zip_time_to_unix) {
        if let Err(err) = set_file_mtime(dest, FileTime::from_unix_time(mtime, 0)) {
            warn!("Could not set modification time on {}: {err}", dest.display());
        }
    }
    Ok(())
}

pub fn zip_time_to_unix(dt: zip::DateTime) -> Option<i64> {
    let month = Month::try_from(dt.month()).ok()?;
    let date = Date::from_calendar_date(dt.year() as i32, month, dt.day()).ok()?;
    let time = TimeOfDay::from_hms(dt.hour(), dt.minute(), dt.second()).ok()?;
    let datetime = PrimitiveDateTime::new(date, time).assume_utc();
    Some(datetime.unix_timestamp())
}

pub fn zip_time_from_system(value: SystemTime) -> Option<zip::DateTime> {
    let stamp = OffsetDateTime::from(value);
    zip::DateTime::from_date_and_time(
        u16::try_from(stamp.year()).ok()?,
        stamp.month() as u8,
        stamp.day(),
        stamp.hour(),
        stamp.minute(),
        stamp.second(),
    )
    .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn traversal_and_absolute_names_are_rejected() {
        let root = PathBuf::from("/tmp/base");
        assert_eq!(
            resolve_entry_path(&root, "Folder/file.package"),
            Some(root.join("Folder").join("file.package"))
        );
        assert_eq!(
            resolve_entry_path(&root, "./a/./b"),
            Some(root.join("a").join("b"))
        );
        assert!(resolve_entry_path(&root, "../evil.package").is_none());
        assert!(resolve_entry_path(&root, "a/../../evil").is_none());
        assert!(resolve_entry_path(&root, "..\\evil.package").is_none());
        assert!(resolve_entry_path(&root, "/etc/passwd").is_none());
        assert!(resolve_entry_path(&root, "C:/Windows/evil").is_none());
        assert!(resolve_entry_path(&root, "").is_none());
        assert!(matches!(
            checked_entry_path(&root, "../evil.package"),
            Err(ManagerError::UnsafePath(_))
        ));
    }

    #[test]
    fn zip_time_round_trips_whole_seconds() {
        let dt = zip::DateTime::from_date_and_time(2024, 3, 9, 14, 30, 12).expect("valid date");
        let unix = zip_time_to_unix(dt).expect("convert");
        let back = zip_time_from_system(
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(unix as u64),
        )
        .expect("convert back");
        assert_eq!(back.year(), 2024);
        assert_eq!(back.month(), 3);
        assert_eq!(back.day(), 9);
        assert_eq!(back.hour(), 14);
        assert_eq!(back.minute(), 30);
        assert_eq!(back.second(), 12);
    }

    #[test]
    fn write_entry_creates_parents_and_sets_mtime() {
        let temp = tempdir().expect("create tempdir");
        let dest = temp.path().join("a").join("b.txt");
        let dt = zip::DateTime::from_date_and_time(2020, 1, 2, 3, 4, 6).expect("valid date");
        let mut reader: &[u8] = b"payload";
        write_entry(&mut reader, &dest, Some(dt)).expect("write entry");
        assert_eq!(fs::read(&dest).expect("read back"), b"payload");
        let meta = fs::metadata(&dest).expect("stat");
        let mtime = FileTime::from_last_modification_time(&meta);
        assert_eq!(Some(mtime.unix_seconds()), zip_time_to_unix(dt));
    }
}
