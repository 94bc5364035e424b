use crate::{
    error::{ManagerError, Result},
    naming,
    scan::ManagedItem,
};
use log::{error, info};
use std::{fs, path::PathBuf};

/// Renames `item` to its opposite state and returns the new on-disk path.
///
/// `item` is stale after this returns, whatever the outcome; rescan before
/// touching the same root again.
pub fn toggle(item: &ManagedItem) -> Result<PathBuf> {
    let desired = item.status.flipped();
    let target_name = naming::derive_target_name(&item.display_name, item.kind, desired);
    let parent = item.path.parent().ok_or_else(|| {
        ManagerError::Other(format!("{} has no parent directory", item.path.display()))
    })?;
    let target = parent.join(&target_name);

    if !item.path.exists() {
        return Err(ManagerError::NotFound(format!(
            "{} no longer exists; rescan and retry",
            item.path.display()
        )));
    }
    // rename(2) silently replaces files on Unix; a collision must never overwrite.
    if target.exists() {
        error!("Cannot rename {}: {target_name} exists", item.disk_name);
        return Err(ManagerError::AlreadyExists(format!(
            "cannot rename '{}' because '{target_name}' already exists",
            item.disk_name
        )));
    }

    fs::rename(&item.path, &target).map_err(|err| {
        error!("Rename of {} failed: {err}", item.path.display());
        match ManagerError::io(err, "rename", &item.path) {
            ManagerError::NotFound(detail) => ManagerError::Other(detail),
            other => other,
        }
    })?;

    info!(
        "'{}' is now {} ({})",
        item.display_name,
        desired.label(),
        target_name
    );
    Ok(target)
}
