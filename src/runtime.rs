//! Runtime image class source.
//!
//! Classes in the runtime image are filed by module, so a lookup first maps
//! the package to its owning module and then reads `<module>/<name>.class`.
//! Two layouts are understood:
//!
//! - a JDK `jmods/` directory, one `<module>.jmod` per module with class
//!   entries under `classes/`;
//! - an exploded image, `<root>/<module>/<package>/<Name>.class`.
//!
//! The package map is built once per handle, on first use.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use ignore::WalkBuilder;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::classpath::ClassSource;
use crate::error::SourceError;

const JMOD_CLASSES_PREFIX: &str = "classes/";
const JAVA_BASE: &str = "java.base";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageLayout {
    Jmods(PathBuf),
    Exploded(PathBuf),
}

pub struct RuntimeImage {
    layout: ImageLayout,
    packages: OnceLock<HashMap<String, String>>,
    jmods: Mutex<HashMap<String, Arc<Archive>>>,
}

impl RuntimeImage {
    pub fn new(layout: ImageLayout) -> Self {
        Self {
            layout,
            packages: OnceLock::new(),
            jmods: Mutex::new(HashMap::new()),
        }
    }

    /// Picks the layout for a JDK home: `jmods/` when present, otherwise an
    /// exploded `modules/` tree.
    pub fn from_java_home(home: &Path) -> Option<Self> {
        let jmods = home.join("jmods");
        if jmods.is_dir() {
            return Some(Self::new(ImageLayout::Jmods(jmods)));
        }
        let modules = home.join("modules");
        if modules.is_dir() {
            return Some(Self::new(ImageLayout::Exploded(modules)));
        }
        None
    }

    pub fn layout(&self) -> &ImageLayout {
        &self.layout
    }

    /// Module owning the package of `internal_name`, if the image has one.
    pub fn module_of(&self, internal_name: &str) -> Option<&str> {
        let (package, _) = internal_name.rsplit_once('/')?;
        self.package_map().get(package).map(String::as_str)
    }

    fn package_map(&self) -> &HashMap<String, String> {
        self.packages.get_or_init(|| {
            let map = match &self.layout {
                ImageLayout::Jmods(dir) => jmod_packages(dir),
                ImageLayout::Exploded(root) => exploded_packages(root),
            };
            debug!(packages = map.len(), layout = ?self.layout, "indexed runtime image");
            map
        })
    }

    fn jmod(&self, dir: &Path, module: &str) -> Result<Arc<Archive>, SourceError> {
        let mut open = self.jmods.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(archive) = open.get(module) {
            return Ok(archive.clone());
        }
        let archive = Arc::new(Archive::open(&dir.join(format!("{module}.jmod")))?);
        open.insert(module.to_string(), archive.clone());
        Ok(archive)
    }
}

impl ClassSource for RuntimeImage {
    fn read_class_bytes(&self, internal_name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let Some(module) = self.module_of(internal_name) else {
            return Ok(None);
        };
        match &self.layout {
            ImageLayout::Jmods(dir) => self
                .jmod(dir, module)?
                .read(&format!("{JMOD_CLASSES_PREFIX}{internal_name}.class")),
            ImageLayout::Exploded(root) => {
                let path = root.join(module).join(format!("{internal_name}.class"));
                match std::fs::read(&path) {
                    Ok(bytes) => Ok(Some(bytes)),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                    Err(source) => Err(SourceError::Io { path, source }),
                }
            }
        }
    }

    fn describe(&self) -> String {
        match &self.layout {
            ImageLayout::Jmods(dir) => format!("runtime image {}", dir.display()),
            ImageLayout::Exploded(root) => format!("exploded runtime image {}", root.display()),
        }
    }
}

/// Module names in lookup order: `java.base` first, then alphabetical.
fn ordered_modules(mut modules: Vec<(String, PathBuf)>) -> Vec<(String, PathBuf)> {
    modules.sort_by(|(a, _), (b, _)| (a != JAVA_BASE, a).cmp(&(b != JAVA_BASE, b)));
    modules
}

fn merge_packages(per_module: Vec<(String, BTreeSet<String>)>) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for (module, packages) in per_module {
        for package in packages {
            map.entry(package).or_insert_with(|| module.clone());
        }
    }
    map
}

fn jmod_packages(dir: &Path) -> HashMap<String, String> {
    let modules: Vec<(String, PathBuf)> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "jmod"))
            .filter_map(|p| Some((p.file_stem()?.to_str()?.to_string(), p)))
            .collect(),
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot list runtime image modules");
            return HashMap::new();
        }
    };

    let per_module: Vec<(String, BTreeSet<String>)> = ordered_modules(modules)
        .into_par_iter()
        .filter_map(|(module, path)| match Archive::open(&path) {
            Ok(archive) => {
                let packages = archive
                    .entry_names()
                    .iter()
                    .filter_map(|name| name.strip_prefix(JMOD_CLASSES_PREFIX))
                    .filter(|name| name.ends_with(".class"))
                    .filter_map(|name| name.rsplit_once('/').map(|(pkg, _)| pkg.to_string()))
                    .collect();
                Some((module, packages))
            }
            Err(e) => {
                warn!(jmod = %path.display(), error = %e, "skipping unreadable module");
                None
            }
        })
        .collect();

    merge_packages(per_module)
}

fn exploded_packages(root: &Path) -> HashMap<String, String> {
    let modules: Vec<(String, PathBuf)> = match std::fs::read_dir(root) {
        Ok(entries) => entries
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| Some((e.file_name().to_str()?.to_string(), e.path())))
            .collect(),
        Err(e) => {
            warn!(dir = %root.display(), error = %e, "cannot list runtime image modules");
            return HashMap::new();
        }
    };

    let per_module: Vec<(String, BTreeSet<String>)> = ordered_modules(modules)
        .into_par_iter()
        .map(|(module, module_dir)| {
            let mut packages = BTreeSet::new();
            for entry in WalkBuilder::new(&module_dir).standard_filters(false).build().flatten() {
                let path = entry.path();
                if !path.extension().is_some_and(|e| e == "class") {
                    continue;
                }
                let Some(package_dir) = path.parent().and_then(|p| p.strip_prefix(&module_dir).ok()) else {
                    continue;
                };
                let package = package_dir.to_string_lossy().replace('\\', "/");
                if !package.is_empty() {
                    packages.insert(package);
                }
            }
            (module, packages)
        })
        .collect();

    merge_packages(per_module)
}
