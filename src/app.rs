use crate::{
    backup::{self, BackupReport, RestoreOutcome, RestorePlan},
    config::{self, AppConfig},
    error::ManagerError,
    installer::{self, InstallReport},
    mapping::{self, PackMapping},
    saves::{self, SaveSummary},
    scan::{self, ManagedItem, ModFilter, PackFilter, ScanCondition, ScanFilter, ScanResult},
    sims4, toggle,
};
use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataFolder {
    Saves,
    Mods,
}

impl DataFolder {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "saves" => Some(DataFolder::Saves),
            "mods" => Some(DataFolder::Mods),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DataFolder::Saves => "Saves",
            DataFolder::Mods => "Mods",
        }
    }

    pub fn path_in(self, user_dir: &Path) -> PathBuf {
        match self {
            DataFolder::Saves => sims4::saves_dir(user_dir),
            DataFolder::Mods => sims4::mods_dir(user_dir),
        }
    }
}

pub struct App {
    pub base_dir: PathBuf,
    pub config_path: PathBuf,
    pub config: AppConfig,
    pub mapping: PackMapping,
    pub game_root: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let base = config::base_dir()?;
        Self::initialize_in(&base)
    }

    pub fn initialize_in(base: &Path) -> Result<Self> {
        let mapping = PackMapping::load(&mapping::mapping_path(base))?;
        info!("Loaded {} pack names", mapping.len());
        let config_path = config::config_path(base);
        let mut config = AppConfig::load(&config_path);

        let game_root = match config.game_path.clone().filter(|path| path.is_dir()) {
            Some(path) => {
                info!("Using game path from config: {}", path.display());
                Some(path)
            }
            None => {
                info!("Attempting game path auto-detection");
                let detected = sims4::find_game_root();
                if let Some(path) = &detected {
                    config.game_path = Some(path.clone());
                    config.save(&config_path)?;
                } else {
                    warn!("Auto-detect failed; set the game folder with `set-game-path`");
                }
                detected
            }
        };
        if let Some(root) = &game_root {
            if sims4::is_protected_location(root) {
                warn!(
                    "{} is in a protected location; run as Administrator if toggling packs fails",
                    root.display()
                );
            }
        }

        let user_dir = config
            .user_data_path
            .clone()
            .filter(|path| path.is_dir())
            .or_else(sims4::find_user_data_dir);
        if user_dir.is_none() {
            warn!("Could not find the {} user data folder", sims4::GAME_NAME);
        }

        Ok(Self {
            base_dir: base.to_path_buf(),
            config_path,
            config,
            mapping,
            game_root,
            user_dir,
        })
    }

    pub fn game_root(&self) -> Result<&Path> {
        self.game_root
            .as_deref()
            .ok_or_else(|| anyhow!("game path is not set; use `set-game-path <dir>`"))
    }

    pub fn user_dir(&self) -> Result<&Path> {
        self.user_dir
            .as_deref()
            .ok_or_else(|| anyhow!("could not determine the {} user data folder", sims4::GAME_NAME))
    }

    pub fn mods_dir(&self) -> Result<PathBuf> {
        Ok(sims4::mods_dir(self.user_dir()?))
    }

    pub fn scan_packs(&self) -> Result<ScanResult> {
        Ok(scan::scan(self.game_root()?, &PackFilter::default()))
    }

    pub fn scan_mods(&self) -> Result<ScanResult> {
        Ok(scan::scan(&self.mods_dir()?, &ModFilter))
    }

    pub fn toggle_pack(&self, code: &str) -> Result<ManagedItem> {
        toggle_named(self.game_root()?, &PackFilter::default(), code)
    }

    pub fn toggle_mod(&self, name: &str) -> Result<ManagedItem> {
        toggle_named(&self.mods_dir()?, &ModFilter, name)
    }

    pub fn install_mod(&self, source: &Path) -> Result<InstallReport> {
        let mods = self.mods_dir()?;
        Ok(installer::install(source, &mods)?)
    }

    pub fn backup(&self, folder: DataFolder, out: Option<PathBuf>) -> Result<BackupReport> {
        let user_dir = self.user_dir()?;
        let root = folder.path_in(user_dir);
        let archive = out.unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_default()
                .join(backup::default_backup_name(folder.label()))
        });
        Ok(backup::create_backup(&root, &archive)?)
    }

    pub fn restore<F>(&self, folder: DataFolder, archive: &Path, confirm: F) -> Result<RestoreOutcome>
    where
        F: FnOnce(&RestorePlan) -> bool,
    {
        let target = folder.path_in(self.user_dir()?);
        Ok(backup::restore(archive, &target, confirm)?)
    }

    pub fn save_summary(&self) -> Result<Option<SaveSummary>> {
        Ok(saves::summarize(&sims4::saves_dir(self.user_dir()?)))
    }

    /// Persists a new installation root. Returns whether it looks like a
    /// game folder; an unusual folder is still accepted.
    pub fn set_game_path(&mut self, path: &Path) -> Result<bool> {
        if !path.is_dir() {
            bail!("{} is not a directory", path.display());
        }
        let looks_right = sims4::looks_like_game_root(path);
        if !looks_right {
            warn!(
                "{} has no 'Game' subfolder; is this the {} folder?",
                path.display(),
                sims4::GAME_NAME
            );
        }
        self.config.game_path = Some(path.to_path_buf());
        self.config
            .save(&self.config_path)
            .context("save game path")?;
        self.game_root = Some(path.to_path_buf());
        info!("Game path set to {}", path.display());
        Ok(looks_right)
    }
}

/// Fresh scan, toggle the named item, rescan, and return its new state.
fn toggle_named(root: &Path, filter: &dyn ScanFilter, name: &str) -> Result<ManagedItem> {
    let result = scan::scan(root, filter);
    if let Some(condition) = result.condition {
        return Err(condition_error(root, condition).into());
    }
    let item = find_item(&result.items, name)
        .ok_or_else(|| ManagerError::NotFound(format!("no item named '{name}' in {}", root.display())))?;
    toggle::toggle(item)?;

    let display_name = item.display_name.clone();
    scan::scan(root, filter)
        .items
        .into_iter()
        .find(|refreshed| refreshed.display_name == display_name)
        .ok_or_else(|| anyhow!("'{display_name}' vanished after toggling"))
}

fn condition_error(root: &Path, condition: ScanCondition) -> ManagerError {
    match condition {
        ScanCondition::NotFound => {
            ManagerError::NotFound(format!("{} does not exist", root.display()))
        }
        ScanCondition::PermissionDenied(detail) => ManagerError::PermissionDenied(detail),
        ScanCondition::Failed(detail) => ManagerError::Other(detail),
    }
}

fn find_item<'a>(items: &'a [ManagedItem], name: &str) -> Option<&'a ManagedItem> {
    items
        .iter()
        .find(|item| item.display_name == name || item.disk_name == name)
        .or_else(|| {
            items.iter().find(|item| {
                item.display_name.eq_ignore_ascii_case(name)
                    || item.disk_name.eq_ignore_ascii_case(name)
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::ItemStatus;
    use std::fs;
    use tempfile::tempdir;

    struct Fixture {
        _temp: tempfile::TempDir,
        base: PathBuf,
        game: PathBuf,
        user: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = tempdir().expect("create tempdir");
        let base = temp.path().join("bin");
        let game = temp.path().join("The Sims 4");
        let user = temp.path().join("Documents").join("Electronic Arts").join("The Sims 4");
        fs::create_dir_all(&base).expect("create base");
        for pack in ["EP01", "GP02_disabled"] {
            fs::create_dir_all(game.join(pack)).expect("create pack");
            fs::write(game.join(pack).join("Strings.package"), b"s").expect("write pack");
        }
        fs::create_dir_all(game.join("Game")).expect("create Game");
        fs::create_dir_all(user.join("Mods")).expect("create Mods");
        fs::create_dir_all(user.join("saves")).expect("create saves");
        fs::write(
            mapping::mapping_path(&base),
            r#"{"EP01": "Get to Work", "GP02": "Spa Day"}"#,
        )
        .expect("write mapping");
        let config = AppConfig {
            game_path: Some(game.clone()),
            user_data_path: Some(user.clone()),
            ..AppConfig::default()
        };
        config
            .save(&config::config_path(&base))
            .expect("write config");
        Fixture {
            _temp: temp,
            base,
            game,
            user,
        }
    }

    #[test]
    fn missing_mapping_is_fatal() {
        let temp = tempdir().expect("create tempdir");
        let err = App::initialize_in(temp.path()).err().expect("startup fails");
        assert!(matches!(
            err.downcast_ref::<ManagerError>(),
            Some(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn toggling_a_pack_by_code_rescans() {
        let fx = fixture();
        let app = App::initialize_in(&fx.base).expect("initialize");
        assert_eq!(app.game_root.as_deref(), Some(fx.game.as_path()));

        let item = app.toggle_pack("GP02").expect("enable GP02");
        assert_eq!(item.status, ItemStatus::Enabled);
        assert!(fx.game.join("GP02").is_dir());

        let packs = app.scan_packs().expect("scan");
        assert!(packs.items.iter().all(|item| item.is_enabled()));
        assert_eq!(app.mapping.name_for(&packs.items[1].display_name), "Spa Day");
    }

    #[test]
    fn unknown_item_is_not_found() {
        let fx = fixture();
        let app = App::initialize_in(&fx.base).expect("initialize");
        let err = app.toggle_mod("nothing.package").expect_err("no such mod");
        assert!(matches!(
            err.downcast_ref::<ManagerError>(),
            Some(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn toggling_in_a_missing_root_keeps_the_error_kind() {
        let fx = fixture();
        let app = App::initialize_in(&fx.base).expect("initialize");
        fs::remove_dir_all(fx.user.join("Mods")).expect("remove Mods");
        let err = app.toggle_mod("anything.package").expect_err("no Mods folder");
        assert!(matches!(
            err.downcast_ref::<ManagerError>(),
            Some(ManagerError::NotFound(_))
        ));
    }

    #[test]
    fn scan_conditions_map_onto_error_kinds() {
        let root = Path::new("/games/The Sims 4");
        assert!(matches!(
            condition_error(root, ScanCondition::PermissionDenied("denied".to_string())),
            ManagerError::PermissionDenied(detail) if detail == "denied"
        ));
        assert!(condition_error(root, ScanCondition::Failed("odd".to_string()))
            .to_string()
            .contains("odd"));
    }

    #[test]
    fn install_backup_and_restore_through_the_app() {
        let fx = fixture();
        let app = App::initialize_in(&fx.base).expect("initialize");
        let source = fx.base.join("Cheats.package");
        fs::write(&source, b"cheats").expect("write mod");

        let report = app.install_mod(&source).expect("install");
        assert_eq!(report.installed, 1);
        let item = app.toggle_mod("cheats.package").expect("disable");
        assert_eq!(item.disk_name, "Cheats_disabled.package");

        let archive = fx.base.join("mods.zip");
        app.backup(DataFolder::Mods, Some(archive.clone()))
            .expect("backup mods");
        fs::remove_file(fx.user.join("Mods").join("Cheats_disabled.package")).expect("remove");

        let outcome = app
            .restore(DataFolder::Mods, &archive, |_| true)
            .expect("restore");
        assert!(matches!(outcome, RestoreOutcome::Restored(_)));
        assert!(fx.user.join("Mods").join("Cheats_disabled.package").is_file());
    }

    #[test]
    fn set_game_path_persists_and_flags_odd_folders() {
        let fx = fixture();
        let mut app = App::initialize_in(&fx.base).expect("initialize");
        let odd = fx.base.join("elsewhere");
        fs::create_dir_all(&odd).expect("create dir");

        assert!(!app.set_game_path(&odd).expect("set path"));
        let reloaded = AppConfig::load(&app.config_path);
        assert_eq!(reloaded.game_path.as_deref(), Some(odd.as_path()));
        assert!(app.set_game_path(&fx.game).expect("set path"));
        assert!(app.set_game_path(&fx.base.join("missing")).is_err());
    }

    #[test]
    fn data_folder_names() {
        assert_eq!(DataFolder::parse("SAVES"), Some(DataFolder::Saves));
        assert_eq!(DataFolder::parse("mods"), Some(DataFolder::Mods));
        assert_eq!(DataFolder::parse("tray"), None);
        assert_eq!(
            DataFolder::Mods.path_in(Path::new("/u")),
            PathBuf::from("/u/Mods")
        );
    }
}
