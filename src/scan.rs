use crate::naming::{self, ItemKind, ItemStatus};
use log::{debug, warn};
use serde::Serialize;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Category prefixes of official pack folders under the installation root.
pub const PACK_PREFIXES: [&str; 5] = ["EP", "GP", "SP", "FP", "KP"];

/// Pack categories in listing order; anything else sorts after them.
const PACK_PRECEDENCE: [&str; 5] = ["EP", "GP", "SP", "KP", "FP"];

const RESOURCE_CFG: &str = "resource.cfg";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedItem {
    pub display_name: String,
    pub disk_name: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub path: PathBuf,
}

impl ManagedItem {
    pub fn from_entry(root: &Path, disk_name: &str, kind: ItemKind) -> Self {
        let (display_name, status) = naming::derive_status(disk_name, kind);
        Self {
            display_name,
            disk_name: disk_name.to_string(),
            kind,
            status,
            path: root.join(disk_name),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status == ItemStatus::Enabled
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", content = "detail", rename_all = "snake_case")]
pub enum ScanCondition {
    NotFound,
    PermissionDenied(String),
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub items: Vec<ManagedItem>,
    pub condition: Option<ScanCondition>,
}

impl ScanResult {
    fn with_condition(condition: ScanCondition) -> Self {
        Self {
            items: Vec::new(),
            condition: Some(condition),
        }
    }
}

/// Decides which immediate children of a managed root are items, and how
/// the resulting list is ordered.
pub trait ScanFilter {
    fn classify(&self, name: &str, path: &Path, is_dir: bool) -> Option<ItemKind>;
    fn sort(&self, items: &mut [ManagedItem]);
}

/// Official packs: category-prefixed, non-empty folders.
pub struct PackFilter {
    prefixes: Vec<String>,
}

impl PackFilter {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Default for PackFilter {
    fn default() -> Self {
        Self::new(PACK_PREFIXES)
    }
}

impl ScanFilter for PackFilter {
    fn classify(&self, name: &str, path: &Path, is_dir: bool) -> Option<ItemKind> {
        if !is_dir {
            return None;
        }
        let (display, _) = naming::derive_status(name, ItemKind::Directory);
        if !self
            .prefixes
            .iter()
            .any(|prefix| display.starts_with(prefix.as_str()))
        {
            return None;
        }
        if is_empty_dir(path) {
            debug!("Skipping empty pack placeholder {}", path.display());
            return None;
        }
        Some(ItemKind::Directory)
    }

    fn sort(&self, items: &mut [ManagedItem]) {
        items.sort_by(|a, b| {
            pack_rank(&a.display_name)
                .cmp(&pack_rank(&b.display_name))
                .then_with(|| a.display_name.cmp(&b.display_name))
        });
    }
}

/// Top-level entries of the Mods folder: recognised files and any folder.
pub struct ModFilter;

impl ScanFilter for ModFilter {
    fn classify(&self, name: &str, _path: &Path, is_dir: bool) -> Option<ItemKind> {
        if name.eq_ignore_ascii_case(RESOURCE_CFG) {
            return None;
        }
        if is_dir {
            return Some(ItemKind::Directory);
        }
        naming::recognized_extension(name).map(|_| ItemKind::SingleFile)
    }

    fn sort(&self, items: &mut [ManagedItem]) {
        items.sort_by_key(|item| item.disk_name.to_lowercase());
    }
}

pub fn scan(root: &Path, filter: &dyn ScanFilter) -> ScanResult {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) => return failed_scan(root, err),
    };

    let mut items = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => return failed_scan(root, err),
        };
        let name = entry.file_name().to_string_lossy().to_string();
        let path = entry.path();
        let is_dir = path.is_dir();
        if let Some(kind) = filter.classify(&name, &path, is_dir) {
            items.push(ManagedItem::from_entry(root, &name, kind));
        }
    }

    filter.sort(&mut items);
    debug!("Scanned {}: {} item(s)", root.display(), items.len());
    ScanResult {
        items,
        condition: None,
    }
}

fn failed_scan(root: &Path, err: io::Error) -> ScanResult {
    match err.kind() {
        io::ErrorKind::NotFound => {
            warn!("Managed root not found: {}", root.display());
            ScanResult::with_condition(ScanCondition::NotFound)
        }
        io::ErrorKind::PermissionDenied => {
            warn!("Permission denied reading {}", root.display());
            ScanResult::with_condition(ScanCondition::PermissionDenied(format!(
                "{}: {err}",
                root.display()
            )))
        }
        _ => {
            warn!("Scan of {} failed: {err}", root.display());
            ScanResult::with_condition(ScanCondition::Failed(format!(
                "{}: {err}",
                root.display()
            )))
        }
    }
}

fn pack_rank(display_name: &str) -> usize {
    PACK_PRECEDENCE
        .iter()
        .position(|prefix| display_name.starts_with(prefix))
        .unwrap_or(PACK_PRECEDENCE.len())
}

fn is_empty_dir(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}
