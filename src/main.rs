use anyhow::{Context, Result};
use clap::Parser;
use deprscan::classpath::ClassPath;
use deprscan::cli::{Cli, OutputFormat};
use deprscan::config::{Settings, init_logging};
use deprscan::deprecation::DeprecationDb;
use deprscan::report::{JsonSink, ReportSink, TextSink};
use deprscan::runtime::RuntimeImage;
use deprscan::scan::Scanner;
use std::io::{self, BufWriter};
use std::path::Path;
use std::process::ExitCode;
use tracing::{info, warn};

const EXIT_FINDINGS_ERROR: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(EXIT_FINDINGS_ERROR),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_CONFIG_ERROR)
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let settings = Settings::resolve(cli)?;
    let db = load_database(&settings)?;
    let classpath = build_classpath(&settings)?;

    match settings.format {
        OutputFormat::Text => {
            let mut sink = TextSink::new(BufWriter::new(io::stdout().lock()), io::stderr());
            let success = scan_targets(&settings, classpath, &db, &mut sink);
            sink.finish().context("Failed to write report")?;
            Ok(success)
        }
        OutputFormat::Json => {
            let mut sink = JsonSink::new(BufWriter::new(io::stdout().lock()));
            let success = scan_targets(&settings, classpath, &db, &mut sink);
            sink.finish().context("Failed to write report")?;
            Ok(success)
        }
    }
}

fn load_database(settings: &Settings) -> Result<DeprecationDb> {
    let mut db = DeprecationDb::new();
    for path in &settings.db_paths {
        let added = db
            .load(path)
            .with_context(|| format!("Failed to load deprecation database: {}", path.display()))?;
        info!(path = %path.display(), added, "loaded deprecation database");
    }
    for path in &settings.harvest {
        let added = db
            .harvest_path(path)
            .with_context(|| format!("Failed to harvest deprecations from: {}", path.display()))?;
        info!(path = %path.display(), added, "harvested deprecation annotations");
    }
    if db.is_empty() {
        warn!("deprecation database is empty; use --db or --harvest");
    }
    Ok(db)
}

fn build_classpath(settings: &Settings) -> Result<ClassPath> {
    let mut classpath = ClassPath::new();
    if let Some(home) = &settings.jdk_home {
        let image = RuntimeImage::from_java_home(home)
            .with_context(|| format!("No runtime image under JDK home: {}", home.display()))?;
        classpath.set_runtime_image(image);
    }
    for entry in &settings.class_path {
        classpath
            .add_entry(entry)
            .with_context(|| format!("Failed to open class path entry: {}", entry.display()))?;
    }
    Ok(classpath)
}

fn scan_targets(settings: &Settings, classpath: ClassPath, db: &DeprecationDb, sink: &mut dyn ReportSink) -> bool {
    let mut scanner = Scanner::new(classpath, db, sink, settings.options);
    let mut success = true;
    for target in &settings.targets {
        let ok = match target_kind(target) {
            Target::Jar => scanner.scan_jar(Path::new(target)),
            Target::Dir => scanner.scan_dir(Path::new(target)),
            Target::Class => scanner.scan_class_name(target),
        };
        success &= ok;
    }
    success
}

#[derive(Debug, PartialEq, Eq)]
enum Target {
    Jar,
    Dir,
    Class,
}

fn target_kind(target: &str) -> Target {
    if target.ends_with(".jar") {
        Target::Jar
    } else if Path::new(target).is_dir() {
        Target::Dir
    } else {
        Target::Class
    }
}
