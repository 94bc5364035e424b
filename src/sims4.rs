use anyhow::{Context, Result};
use directories::UserDirs;
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub const GAME_NAME: &str = "The Sims 4";
pub const STEAM_APP_ID: &str = "1222670";

pub fn saves_dir(user_dir: &Path) -> PathBuf {
    user_dir.join("saves")
}

pub fn mods_dir(user_dir: &Path) -> PathBuf {
    user_dir.join("Mods")
}

/// Looks through Steam library manifests for an installed copy.
pub fn find_game_root() -> Option<PathBuf> {
    let mut candidates = Vec::new();
    for var in ["ProgramFiles(x86)", "ProgramFiles"] {
        if let Some(dir) = std::env::var_os(var) {
            candidates.push(PathBuf::from(dir).join("Steam"));
        }
    }
    candidates.push(PathBuf::from("C:\\Program Files (x86)\\Steam"));
    if let Some(dirs) = UserDirs::new() {
        candidates.push(dirs.home_dir().join(".local/share/Steam"));
    }

    let mut libraries = Vec::new();
    for base in candidates {
        let vdf = base.join("steamapps").join("libraryfolders.vdf");
        if vdf.exists() {
            match read_steam_libraries(&vdf) {
                Ok(found) => libraries.extend(found),
                Err(err) => debug!("Could not read {}: {err:#}", vdf.display()),
            }
        }
        libraries.push(SteamLibrary {
            lists_game: has_app_manifest(&base),
            path: base,
        });
    }

    // Libraries known to hold the game are checked first.
    libraries.sort_by_key(|lib| !(lib.lists_game || has_app_manifest(&lib.path)));
    for lib in libraries {
        let candidate = lib.path.join("steamapps").join("common").join(GAME_NAME);
        if candidate.is_dir() {
            info!("Found game via Steam library: {}", candidate.display());
            return Some(candidate);
        }
    }

    None
}

fn has_app_manifest(library: &Path) -> bool {
    library
        .join("steamapps")
        .join(format!("appmanifest_{STEAM_APP_ID}.acf"))
        .is_file()
}

/// `Documents/Electronic Arts/The Sims 4`, or the older `Documents/The Sims 4`.
pub fn find_user_data_dir() -> Option<PathBuf> {
    let dirs = UserDirs::new()?;
    let documents = dirs
        .document_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| dirs.home_dir().join("Documents"));

    let primary = documents.join("Electronic Arts").join(GAME_NAME);
    if primary.is_dir() {
        return Some(primary);
    }
    let alternative = documents.join(GAME_NAME);
    if alternative.is_dir() {
        info!("Using alternative user data path {}", alternative.display());
        return Some(alternative);
    }
    None
}

/// One `"path"` block of `libraryfolders.vdf`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SteamLibrary {
    pub path: PathBuf,
    /// The block's `apps` list names the game's app id.
    pub lists_game: bool,
}

pub fn read_steam_libraries(vdf: &Path) -> Result<Vec<SteamLibrary>> {
    let raw = fs::read_to_string(vdf).context("read libraryfolders.vdf")?;
    Ok(parse_steam_libraries(&raw))
}

fn parse_steam_libraries(raw: &str) -> Vec<SteamLibrary> {
    let mut libraries: Vec<SteamLibrary> = Vec::new();
    for tokens in raw.lines().map(quoted_tokens) {
        match tokens.as_slice() {
            ["path", value, ..] => libraries.push(SteamLibrary {
                path: PathBuf::from(value.replace("\\\\", "\\")),
                lists_game: false,
            }),
            [key, ..] if *key == STEAM_APP_ID => {
                if let Some(library) = libraries.last_mut() {
                    library.lists_game = true;
                }
            }
            _ => {}
        }
    }
    libraries
}

// `"key"  "value"` -> ["key", "value"]; braces and bare words are dropped.
fn quoted_tokens(line: &str) -> Vec<&str> {
    line.split('"').skip(1).step_by(2).collect()
}

pub fn looks_like_game_root(path: &Path) -> bool {
    path.join("Game").is_dir()
}

/// Install locations that usually need an elevated process to rename in.
pub fn is_protected_location(path: &Path) -> bool {
    let lower = path.to_string_lossy().to_ascii_lowercase();
    lower.contains("program files") || lower.contains("windows")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn library_blocks_note_which_hold_the_game() {
        let temp = tempdir().expect("create tempdir");
        let vdf = temp.path().join("libraryfolders.vdf");
        fs::write(
            &vdf,
            r#""libraryfolders"
{
	"0"
	{
		"path"		"C:\\Program Files (x86)\\Steam"
		"label"		""
		"apps"
		{
			"228980"		"371545"
		}
	}
	"1"
	{
		"path"		"D:\\SteamLibrary"
		"apps"
		{
			"1222670"		"52187593114"
		}
	}
}
"#,
        )
        .expect("write vdf");

        let libraries = read_steam_libraries(&vdf).expect("parse vdf");
        assert_eq!(
            libraries,
            vec![
                SteamLibrary {
                    path: PathBuf::from("C:\\Program Files (x86)\\Steam"),
                    lists_game: false,
                },
                SteamLibrary {
                    path: PathBuf::from("D:\\SteamLibrary"),
                    lists_game: true,
                },
            ]
        );
    }

    #[test]
    fn stray_lines_are_ignored() {
        assert!(parse_steam_libraries("{\n}\n\"1222670\" \"1\"\n").is_empty());
        assert_eq!(quoted_tokens("\t\"path\"\t\t\"/srv/steam\""), vec!["path", "/srv/steam"]);
    }

    #[test]
    fn game_root_needs_game_folder() {
        let temp = tempdir().expect("create tempdir");
        assert!(!looks_like_game_root(temp.path()));
        fs::create_dir_all(temp.path().join("Game")).expect("create Game");
        assert!(looks_like_game_root(temp.path()));
    }

    #[test]
    fn app_manifest_marks_library() {
        let temp = tempdir().expect("create tempdir");
        assert!(!has_app_manifest(temp.path()));
        fs::create_dir_all(temp.path().join("steamapps")).expect("create steamapps");
        fs::write(
            temp.path().join("steamapps").join("appmanifest_1222670.acf"),
            "\"AppState\" {}",
        )
        .expect("write manifest");
        assert!(has_app_manifest(temp.path()));
    }

    #[test]
    fn protected_locations() {
        assert!(is_protected_location(Path::new(
            "C:\\Program Files\\EA Games\\The Sims 4"
        )));
        assert!(!is_protected_location(Path::new("D:\\Games\\The Sims 4")));
    }
}
