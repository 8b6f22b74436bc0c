use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "deprscan")]
#[command(about = "Scan compiled JVM classes for uses of deprecated APIs")]
#[command(version)]
pub struct Cli {
    /// Jar files, class directories or class names to scan
    #[arg(value_name = "TARGET", required = true)]
    pub targets: Vec<String>,

    /// Directories and jars used to resolve referenced classes
    #[arg(long = "class-path", visible_alias = "cp", value_name = "PATH")]
    pub class_path: Vec<String>,

    /// JDK home supplying the runtime image
    #[arg(long, value_name = "DIR", conflicts_with = "no_jdk")]
    pub jdk: Option<PathBuf>,

    /// Resolve without a runtime image
    #[arg(long)]
    pub no_jdk: bool,

    /// Deprecation database file (`.json` or `#jdepr1` CSV)
    #[arg(long, value_name = "FILE")]
    pub db: Vec<PathBuf>,

    /// Jar or directory whose @Deprecated annotations seed the database
    #[arg(long, value_name = "PATH")]
    pub harvest: Vec<PathBuf>,

    /// Report only APIs marked forRemoval
    #[arg(long)]
    pub for_removal: bool,

    #[arg(short = 'f', long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
