use crate::{
    app::{App, DataFolder},
    backup::{RestoreOutcome, RestorePlan},
    error::ManagerError,
    installer::InstallReport,
    naming::ItemKind,
    saves,
    scan::{ManagedItem, ScanCondition, ScanResult},
};
use anyhow::{bail, Result};
use log::LevelFilter;
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CliVerbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
}

impl CliVerbosity {
    pub fn level(self) -> LevelFilter {
        match self {
            CliVerbosity::Quiet => LevelFilter::Error,
            CliVerbosity::Normal => LevelFilter::Warn,
            CliVerbosity::Verbose => LevelFilter::Info,
            CliVerbosity::Debug => LevelFilter::Debug,
        }
    }
}

#[derive(Debug)]
struct GlobalOptions {
    format: OutputFormat,
    verbosity: CliVerbosity,
}

#[derive(Debug, PartialEq, Eq)]
enum CliCommand {
    PacksList,
    PacksToggle(String),
    ModsList,
    ModsToggle(String),
    ModsInstall(PathBuf),
    SavesInfo,
    Backup {
        folder: DataFolder,
        out: Option<PathBuf>,
    },
    Restore {
        folder: DataFolder,
        archive: PathBuf,
        assume_yes: bool,
    },
    Paths,
    SetGamePath(PathBuf),
    Help,
    Version,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args);
    crate::init_logging(global.verbosity.level());

    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("plumbob v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize()?;
            let result = run_command(&mut app, command, global.format);
            if let Err(err) = &result {
                report_failure(err);
            }
            result
        }
    }
}

fn parse_global_options(args: &[String]) -> (GlobalOptions, Vec<String>) {
    let mut format = OutputFormat::Text;
    let mut verbosity = CliVerbosity::Normal;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            if let Some(parsed) = OutputFormat::parse(value) {
                format = parsed;
            }
            continue;
        }
        match arg.as_str() {
            "--format" => {
                if let Some(parsed) = iter.next().and_then(|value| OutputFormat::parse(value)) {
                    format = parsed;
                }
            }
            "-q" | "--quiet" => verbosity = CliVerbosity::Quiet,
            "--verbose" => verbosity = CliVerbosity::Verbose,
            _ if arg.starts_with("-v") && arg.chars().skip(1).all(|ch| ch == 'v') => {
                let count = arg.chars().filter(|ch| *ch == 'v').count();
                verbosity = if count >= 2 {
                    CliVerbosity::Debug
                } else {
                    CliVerbosity::Verbose
                };
            }
            _ => tokens.push(arg.to_string()),
        }
    }

    (GlobalOptions { format, verbosity }, tokens)
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let words: Vec<&str> = tokens.iter().map(String::as_str).collect();
    let command = match words.as_slice() {
        [] | ["help" | "--help" | "-h", ..] => CliCommand::Help,
        ["version" | "--version" | "-V", ..] => CliCommand::Version,
        ["packs"] | ["packs", "list"] => CliCommand::PacksList,
        ["packs", "toggle", code] => CliCommand::PacksToggle(code.to_string()),
        ["mods"] | ["mods", "list"] => CliCommand::ModsList,
        ["mods", "toggle", name] => CliCommand::ModsToggle(name.to_string()),
        ["mods", "install", path] => CliCommand::ModsInstall(PathBuf::from(*path)),
        ["saves"] | ["saves", "info"] => CliCommand::SavesInfo,
        ["backup", folder, rest @ ..] => {
            let out = match rest {
                [] => None,
                ["--out", path] => Some(PathBuf::from(*path)),
                [flag] if flag.starts_with("--out=") => {
                    Some(PathBuf::from(flag.trim_start_matches("--out=")))
                }
                _ => bail!("backup accepts only --out <file>"),
            };
            CliCommand::Backup {
                folder: parse_folder(folder)?,
                out,
            }
        }
        ["restore", folder, archive, rest @ ..] => {
            let assume_yes = match rest {
                [] => false,
                ["--yes" | "-y"] => true,
                _ => bail!("restore accepts only --yes"),
            };
            CliCommand::Restore {
                folder: parse_folder(folder)?,
                archive: PathBuf::from(*archive),
                assume_yes,
            }
        }
        ["paths"] => CliCommand::Paths,
        ["set-game-path", path] => CliCommand::SetGamePath(PathBuf::from(*path)),
        _ => bail!("Unknown command: {} (see --help)", words.join(" ")),
    };
    Ok(command)
}

fn parse_folder(value: &str) -> Result<DataFolder> {
    match DataFolder::parse(value) {
        Some(folder) => Ok(folder),
        None => bail!("Unknown folder: {value} (use 'saves' or 'mods')"),
    }
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::PacksList => {
            let result = app.scan_packs()?;
            list_packs(app, &result, format)
        }
        CliCommand::PacksToggle(code) => {
            let item = app.toggle_pack(&code)?;
            println!(
                "'{}' ({}) is now {}.",
                item.display_name,
                app.mapping.name_for(&item.display_name),
                item.status.label()
            );
            let result = app.scan_packs()?;
            list_packs(app, &result, format)
        }
        CliCommand::ModsList => {
            let result = app.scan_mods()?;
            list_mods(&result, format)
        }
        CliCommand::ModsToggle(name) => {
            let item = app.toggle_mod(&name)?;
            println!("'{}' is now {}.", item.display_name, item.status.label());
            let result = app.scan_mods()?;
            list_mods(&result, format)
        }
        CliCommand::ModsInstall(path) => {
            let report = app.install_mod(&path)?;
            print_install(&path, &report, format)
        }
        CliCommand::SavesInfo => print_saves(app, format),
        CliCommand::Backup { folder, out } => {
            let report = app.backup(folder, out)?;
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => println!(
                    "{} backed up to {} ({} file(s)).",
                    folder.label(),
                    report.archive.display(),
                    report.files
                ),
            }
            Ok(())
        }
        CliCommand::Restore {
            folder,
            archive,
            assume_yes,
        } => {
            let outcome = app.restore(folder, &archive, |plan| {
                assume_yes || confirm_restore(folder, plan)
            })?;
            print_restore(folder, outcome, format)
        }
        CliCommand::Paths => print_paths(app, format),
        CliCommand::SetGamePath(path) => {
            if !app.set_game_path(&path)? {
                println!(
                    "Warning: {} has no 'Game' subfolder. Saved anyway.",
                    path.display()
                );
            }
            println!("Game path set to {}", path.display());
            Ok(())
        }
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

#[derive(Serialize)]
struct PackListItem<'a> {
    code: &'a str,
    name: String,
    status: &'static str,
    folder: &'a str,
}

fn list_packs(app: &App, result: &ScanResult, format: OutputFormat) -> Result<()> {
    let items: Vec<PackListItem> = result
        .items
        .iter()
        .map(|item| PackListItem {
            code: &item.display_name,
            name: app.mapping.name_for(&item.display_name),
            status: item.status.label(),
            folder: &item.disk_name,
        })
        .collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            print_condition(result.condition.as_ref());
            if items.is_empty() {
                println!("No packs found.");
            }
            let width = items.iter().map(|item| item.code.len()).max().unwrap_or(0);
            for item in items {
                println!(
                    "[{status:<8}] {code:<width$}  {name}",
                    status = item.status,
                    code = item.code,
                    name = item.name,
                    width = width
                );
            }
            let enabled = result.items.iter().filter(|item| item.is_enabled()).count();
            println!("{enabled} of {} packs enabled.", result.items.len());
        }
    }
    Ok(())
}

fn list_mods(result: &ScanResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result.items)?),
        OutputFormat::Text => {
            print_condition(result.condition.as_ref());
            if result.items.is_empty() {
                println!("No mods found.");
            }
            for item in &result.items {
                println!("{}", mod_line(item));
            }
        }
    }
    Ok(())
}

fn mod_line(item: &ManagedItem) -> String {
    let marker = match item.kind {
        ItemKind::Directory => "[F]",
        ItemKind::SingleFile => "[P]",
    };
    format!("{marker} [{:<8}] {}", item.status.label(), item.disk_name)
}

fn print_condition(condition: Option<&ScanCondition>) {
    match condition {
        None => {}
        Some(ScanCondition::NotFound) => println!("Folder not found."),
        Some(ScanCondition::PermissionDenied(detail)) => {
            eprintln!("PERMISSION DENIED: {detail}");
            eprintln!("Try running as Administrator.");
        }
        Some(ScanCondition::Failed(detail)) => eprintln!("Scan failed: {detail}"),
    }
}

fn print_install(path: &std::path::Path, report: &InstallReport, format: OutputFormat) -> Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let label = path.display();
    let count = report.installed;
    match (report.is_noop(), report.skipped.is_empty()) {
        (true, false) => println!("Installation of '{label}' skipped: all contents already exist."),
        (true, true) => println!("No new files were installed from '{label}'."),
        (false, true) => println!("Installed '{label}' ({count} item(s))."),
        (false, false) => {
            println!("Installed '{label}' ({count} item(s)); these already existed and were SKIPPED:");
            for name in &report.skipped {
                println!("  {name}");
            }
        }
    }
    if !report.unsafe_entries.is_empty() {
        println!("Unsafe paths were not extracted:");
        for name in &report.unsafe_entries {
            println!("  {name}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct RestoreJson<'a> {
    status: &'static str,
    report: Option<&'a crate::backup::RestoreReport>,
    error: Option<String>,
}

fn print_restore(folder: DataFolder, outcome: RestoreOutcome, format: OutputFormat) -> Result<()> {
    match outcome {
        RestoreOutcome::Restored(report) => {
            match format {
                OutputFormat::Json => println!(
                    "{}",
                    serde_json::to_string_pretty(&RestoreJson {
                        status: "restored",
                        report: Some(&report),
                        error: None,
                    })?
                ),
                OutputFormat::Text => {
                    println!("{} restored ({} file(s)).", folder.label(), report.extracted);
                    if let Some(snapshot) = &report.snapshot {
                        println!("Previous {} kept in {}", folder.label(), snapshot.display());
                    }
                    for name in &report.unsafe_entries {
                        println!("Skipped unsafe entry: {name}");
                    }
                }
            }
            Ok(())
        }
        RestoreOutcome::Declined => {
            println!("{} restore cancelled.", folder.label());
            Ok(())
        }
        RestoreOutcome::RolledBack { cause, .. } => {
            if format == OutputFormat::Json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&RestoreJson {
                        status: "rolled_back",
                        report: None,
                        error: Some(cause.to_string()),
                    })?
                );
            }
            eprintln!("Restore failed during extraction: {cause}");
            eprintln!("Rolled back: previous {} restored.", folder.label());
            bail!("{} restore failed and was rolled back", folder.label())
        }
    }
}

fn confirm_restore(folder: DataFolder, plan: &RestorePlan) -> bool {
    println!(
        "This will REPLACE your current {} folder:\n  {}",
        folder.label(),
        plan.target.display()
    );
    if plan.target_exists {
        println!("Current contents will be moved to a backup folder first.");
    }
    print!(
        "Restore {} entries from {}? [y/N] ",
        plan.entries,
        plan.archive.display()
    );
    let _ = io::stdout().flush();

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[derive(Serialize)]
struct SavesOutput {
    path: Option<String>,
    save_count: Option<usize>,
    latest_save: Option<String>,
    total_size: Option<String>,
    total_bytes: Option<u64>,
}

fn print_saves(app: &App, format: OutputFormat) -> Result<()> {
    let summary = app.save_summary()?;
    let output = match &summary {
        Some(summary) => SavesOutput {
            path: Some(summary.path.display().to_string()),
            save_count: Some(summary.save_count),
            latest_save: summary.latest_save.and_then(format_timestamp),
            total_size: Some(saves::format_size(summary.total_bytes)),
            total_bytes: Some(summary.total_bytes),
        },
        None => SavesOutput {
            path: None,
            save_count: None,
            latest_save: None,
            total_size: None,
            total_bytes: None,
        },
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            let Some(path) = output.path else {
                println!("Saves folder not found");
                return Ok(());
            };
            println!("Saves folder:      {path}");
            println!(
                "Save files:        {}",
                output.save_count.unwrap_or_default()
            );
            println!(
                "Most recent save:  {}",
                output
                    .latest_save
                    .unwrap_or_else(|| "No .save files found".to_string())
            );
            println!(
                "Total folder size: {}",
                output.total_size.unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn format_timestamp(timestamp: i64) -> Option<String> {
    let date = time::OffsetDateTime::from_unix_timestamp(timestamp).ok()?;
    let date = match time::UtcOffset::current_local_offset() {
        Ok(offset) => date.to_offset(offset),
        Err(_) => date,
    };
    Some(format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        date.year(),
        date.month() as u8,
        date.day(),
        date.hour(),
        date.minute(),
        date.second()
    ))
}

#[derive(Serialize)]
struct PathsOutput {
    base_dir: String,
    config_file: String,
    game_root: Option<String>,
    user_data: Option<String>,
    saves: Option<String>,
    mods: Option<String>,
}

fn print_paths(app: &App, format: OutputFormat) -> Result<()> {
    let display = |path: &PathBuf| path.display().to_string();
    let output = PathsOutput {
        base_dir: display(&app.base_dir),
        config_file: display(&app.config_path),
        game_root: app.game_root.as_ref().map(display),
        user_data: app.user_dir.as_ref().map(display),
        saves: app
            .user_dir
            .as_ref()
            .map(|dir| display(&DataFolder::Saves.path_in(dir))),
        mods: app
            .user_dir
            .as_ref()
            .map(|dir| display(&DataFolder::Mods.path_in(dir))),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            let unset = || "(not found)".to_string();
            println!("Config file: {}", output.config_file);
            println!("Game root:   {}", output.game_root.unwrap_or_else(unset));
            println!("User data:   {}", output.user_data.unwrap_or_else(unset));
            println!("Saves:       {}", output.saves.unwrap_or_else(unset));
            println!("Mods:        {}", output.mods.unwrap_or_else(unset));
        }
    }
    Ok(())
}

fn report_failure(err: &anyhow::Error) {
    let Some(err) = err.downcast_ref::<ManagerError>() else {
        return;
    };
    log::error!("{} failure: {err}", err.kind_label());
    if err.is_unrecoverable() {
        eprintln!("CRITICAL: rollback failed after a restore error.");
        eprintln!("  {err}");
        eprintln!("Check the target folder and its *_pre_restore_* backup manually!");
    } else if err.is_permission() {
        eprintln!("Permission denied. Try running as Administrator.");
    }
}

fn print_help() {
    println!("plumbob v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  plumbob packs list                        List official packs");
    println!("  plumbob packs toggle <code>               Enable/disable a pack");
    println!("  plumbob mods list                         List top-level mods");
    println!("  plumbob mods toggle <name>                Enable/disable a mod");
    println!("  plumbob mods install <file>               Install a .zip/.package/.ts4script");
    println!("  plumbob saves info                        Show save folder details");
    println!("  plumbob backup <saves|mods> [--out <f>]   Back up a folder to a zip");
    println!("  plumbob restore <saves|mods> <zip> [--yes]  Replace a folder from a backup");
    println!("  plumbob paths                             Show resolved paths");
    println!("  plumbob set-game-path <dir>               Set the game install folder");
    println!();
    println!("Global options:");
    println!("  --format <json|text>                      Output format");
    println!("  -q, --quiet                               Errors only");
    println!("  -v, -vv                                   Increase verbosity");
    println!("  -h, --help                                Show help");
    println!("  -V, --version                             Show version");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(line: &str) -> Vec<String> {
        line.split_whitespace().map(str::to_string).collect()
    }

    fn command(line: &str) -> Result<CliCommand> {
        let (_, tokens) = parse_global_options(&args(line));
        parse_command(&tokens)
    }

    #[test]
    fn global_options_are_stripped_anywhere() {
        let (global, tokens) = parse_global_options(&args("mods --format json list -vv"));
        assert_eq!(global.format, OutputFormat::Json);
        assert_eq!(global.verbosity, CliVerbosity::Debug);
        assert_eq!(tokens, args("mods list"));

        let (global, _) = parse_global_options(&args("-q --format=text packs"));
        assert_eq!(global.verbosity, CliVerbosity::Quiet);
        assert_eq!(global.format, OutputFormat::Text);
    }

    #[test]
    fn parses_every_command() {
        assert_eq!(command("").expect("parse"), CliCommand::Help);
        assert_eq!(command("packs").expect("parse"), CliCommand::PacksList);
        assert_eq!(
            command("packs toggle EP01").expect("parse"),
            CliCommand::PacksToggle("EP01".to_string())
        );
        assert_eq!(
            command("mods install Pack.zip").expect("parse"),
            CliCommand::ModsInstall(PathBuf::from("Pack.zip"))
        );
        assert_eq!(
            command("backup saves --out b.zip").expect("parse"),
            CliCommand::Backup {
                folder: DataFolder::Saves,
                out: Some(PathBuf::from("b.zip"))
            }
        );
        assert_eq!(
            command("restore Mods b.zip --yes").expect("parse"),
            CliCommand::Restore {
                folder: DataFolder::Mods,
                archive: PathBuf::from("b.zip"),
                assume_yes: true
            }
        );
        assert_eq!(command("saves info").expect("parse"), CliCommand::SavesInfo);
    }

    #[test]
    fn rejects_unknown_input() {
        assert!(command("backup tray").is_err());
        assert!(command("restore saves").is_err());
        assert!(command("frobnicate").is_err());
    }

    #[test]
    fn mod_lines_mark_kind_and_status() {
        let item = ManagedItem::from_entry(
            std::path::Path::new("/m"),
            "x_disabled.package",
            ItemKind::SingleFile,
        );
        assert_eq!(mod_line(&item), "[P] [Disabled] x_disabled.package");
    }
}
