use serde::Serialize;

pub const DISABLED_MARKER: &str = "_disabled";

/// Extensions that take the marker as an infix (`name_disabled.package`).
pub const RECOGNIZED_EXTENSIONS: [&str; 2] = [".package", ".ts4script"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Directory,
    SingleFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Enabled,
    Disabled,
}

impl ItemStatus {
    pub fn flipped(self) -> Self {
        match self {
            ItemStatus::Enabled => ItemStatus::Disabled,
            ItemStatus::Disabled => ItemStatus::Enabled,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ItemStatus::Enabled => "Enabled",
            ItemStatus::Disabled => "Disabled",
        }
    }
}

/// Returns the recognised extension slice of `name`, keeping its on-disk case.
pub fn recognized_extension(name: &str) -> Option<&str> {
    let lower = name.to_ascii_lowercase();
    RECOGNIZED_EXTENSIONS
        .iter()
        .find(|ext| lower.ends_with(*ext) && lower.len() > ext.len())
        .map(|ext| &name[name.len() - ext.len()..])
}

pub fn derive_status(disk_name: &str, kind: ItemKind) -> (String, ItemStatus) {
    if kind == ItemKind::SingleFile {
        if let Some(ext) = recognized_extension(disk_name) {
            let stem = &disk_name[..disk_name.len() - ext.len()];
            return match strip_file_marker(stem) {
                Some(clean) => (format!("{clean}{ext}"), ItemStatus::Disabled),
                None => (disk_name.to_string(), ItemStatus::Enabled),
            };
        }
    }

    match strip_marker(disk_name) {
        Some(clean) => (clean.to_string(), ItemStatus::Disabled),
        None => (disk_name.to_string(), ItemStatus::Enabled),
    }
}

pub fn derive_target_name(display_name: &str, kind: ItemKind, desired: ItemStatus) -> String {
    if desired == ItemStatus::Enabled {
        return display_name.to_string();
    }

    if kind == ItemKind::SingleFile {
        if let Some(ext) = recognized_extension(display_name) {
            let stem = &display_name[..display_name.len() - ext.len()];
            return format!("{stem}{DISABLED_MARKER}{ext}");
        }
    }

    format!("{display_name}{DISABLED_MARKER}")
}

// Exactly one marker; a bare marker is a name, not a disabled empty name.
fn strip_marker(name: &str) -> Option<&str> {
    name.strip_suffix(DISABLED_MARKER)
        .filter(|clean| !clean.is_empty())
}

// File markers ignore case (`Mod_DISABLED.package`); directory markers don't.
fn strip_file_marker(stem: &str) -> Option<&str> {
    let split = stem.len().checked_sub(DISABLED_MARKER.len())?;
    let (clean, marker) = (stem.get(..split)?, stem.get(split..)?);
    (!clean.is_empty() && marker.eq_ignore_ascii_case(DISABLED_MARKER)).then_some(clean)
}
