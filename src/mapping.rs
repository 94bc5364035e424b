use crate::error::{ManagerError, Result};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
};

pub const MAPPING_FILE_NAME: &str = "pack_mapping.json";

/// Pack code (`EP01`) to human-readable name. Required at startup.
#[derive(Debug, Clone, Default)]
pub struct PackMapping {
    names: BTreeMap<String, String>,
}

impl PackMapping {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => ManagerError::NotFound(format!(
                "pack mapping file {} not found; place it beside the executable",
                path.display()
            )),
            _ => ManagerError::io(err, "read pack mapping", path),
        })?;
        let names: BTreeMap<String, String> = serde_json::from_str(&raw).map_err(|err| {
            ManagerError::Malformed(format!(
                "could not parse {}; ensure it is a JSON object of code -> name: {err}",
                path.display()
            ))
        })?;
        Ok(Self { names })
    }

    pub fn name_for(&self, code: &str) -> String {
        self.names
            .get(code)
            .cloned()
            .unwrap_or_else(|| format!("Unknown ({code})"))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

pub fn mapping_path(base: &Path) -> PathBuf {
    base.join(MAPPING_FILE_NAME)
}
