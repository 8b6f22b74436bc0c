use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormat};
use crate::scan::ScanOptions;

pub const DB_ENV: &str = "DEPRSCAN_DB";

/// Everything the binary needs, resolved from flags, environment and
/// defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub targets: Vec<String>,
    pub class_path: Vec<PathBuf>,
    pub jdk_home: Option<PathBuf>,
    pub db_paths: Vec<PathBuf>,
    pub harvest: Vec<PathBuf>,
    pub options: ScanOptions,
    pub format: OutputFormat,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> Result<Self> {
        Ok(Self {
            targets: cli.targets.clone(),
            class_path: resolve_class_path(cli),
            jdk_home: resolve_jdk_home(cli)?,
            db_paths: resolve_db_paths(cli)?,
            harvest: cli.harvest.clone(),
            options: ScanOptions {
                for_removal_only: cli.for_removal,
            },
            format: cli.format,
        })
    }
}

/// `--class-path` values, each split on the platform path separator.
pub fn resolve_class_path(cli: &Cli) -> Vec<PathBuf> {
    cli.class_path
        .iter()
        .flat_map(|raw| env::split_paths(raw).collect::<Vec<_>>())
        .filter(|p| !p.as_os_str().is_empty())
        .collect()
}

/// `--jdk`, then `JAVA_HOME`, then the `java` launcher on `PATH`.
/// `--no-jdk` turns the runtime image off.
pub fn resolve_jdk_home(cli: &Cli) -> Result<Option<PathBuf>> {
    if cli.no_jdk {
        return Ok(None);
    }

    if let Some(p) = cli.jdk.clone() {
        let home = coerce_to_jdk_home(p.clone()).with_context(|| missing_image_message(&p))?;
        return Ok(Some(home));
    }

    let java_home = env::var_os("JAVA_HOME").map(PathBuf::from);
    let discovered = java_home
        .clone()
        .and_then(coerce_to_jdk_home)
        .or_else(java_home_from_launcher);
    if discovered.is_none() {
        match java_home {
            Some(home) => warn!("{}; platform classes will be unresolved", missing_image_message(&home)),
            None => warn!(
                "no JDK with jmods/ or an exploded modules/ tree found (tried JAVA_HOME and `java` on PATH; \
                 a packed lib/modules image is not read); platform classes will be unresolved"
            ),
        }
    }
    Ok(discovered)
}

/// `--db` values, else `DEPRSCAN_DB`, else the per-user default database
/// when it exists.
pub fn resolve_db_paths(cli: &Cli) -> Result<Vec<PathBuf>> {
    if !cli.db.is_empty() {
        return Ok(cli.db.clone());
    }

    if let Some(raw) = env::var_os(DB_ENV) {
        return Ok(env::split_paths(&raw).filter(|p| !p.as_os_str().is_empty()).collect());
    }

    let default_path = deprscan_home()?.join("deprecated.json");
    if default_path.exists() {
        return Ok(vec![default_path]);
    }
    Ok(Vec::new())
}

/// Logs go to stderr: `debug` with `--verbose`, `warn` otherwise, and
/// `RUST_LOG` wins over both.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn deprscan_home() -> Result<PathBuf> {
    let base = dirs::data_local_dir()
        .or_else(dirs::config_dir)
        .or_else(dirs::home_dir)
        .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
    Ok(base.join("deprscan"))
}

fn missing_image_message(home: &Path) -> String {
    if home.join("lib").join("modules").is_file() {
        format!(
            "JDK home only has a packed lib/modules image, which is not read; \
             point --jdk at a JDK with jmods/ or an exploded modules/ tree: {}",
            home.display()
        )
    } else {
        format!("No jmods/ or modules/ directory under JDK home: {}", home.display())
    }
}

fn has_runtime_image(home: &Path) -> bool {
    home.join("jmods").is_dir() || home.join("modules").is_dir()
}

/// Accepts a JDK home or its `jre/` subdirectory.
fn coerce_to_jdk_home(mut candidate: PathBuf) -> Option<PathBuf> {
    if has_runtime_image(&candidate) {
        return Some(candidate);
    }
    candidate.pop();
    has_runtime_image(&candidate).then_some(candidate)
}

fn java_home_from_launcher() -> Option<PathBuf> {
    java_home_from_settings().or_else(java_home_from_symlink)
}

fn java_home_from_settings() -> Option<PathBuf> {
    let output = Command::new("java")
        .args(["-XshowSettings:properties", "-version"])
        .output()
        .ok()?;

    // The launcher prints settings on stderr.
    let mut combined = String::from_utf8_lossy(&output.stderr).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stdout));
    parse_java_home_property(&combined).and_then(coerce_to_jdk_home)
}

fn parse_java_home_property(settings: &str) -> Option<PathBuf> {
    settings.lines().find_map(|line| {
        let (key, value) = line.trim().split_once('=')?;
        (key.trim() == "java.home").then(|| PathBuf::from(value.trim()))
    })
}

fn java_home_from_symlink() -> Option<PathBuf> {
    let exe_name = if cfg!(windows) { "java.exe" } else { "java" };
    let launcher = env::split_paths(&env::var_os("PATH")?)
        .map(|dir| dir.join(exe_name))
        .find(|candidate| candidate.is_file())?;
    let launcher = launcher.canonicalize().ok()?;
    coerce_to_jdk_home(launcher.parent()?.parent()?.to_path_buf())
}
