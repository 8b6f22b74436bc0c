//! Ordered class lookup over directories, jars and the runtime image.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use tracing::{debug, warn};

use crate::archive::{Archive, is_scannable_class};
use crate::classfile::ClassFile;
use crate::error::SourceError;
use crate::runtime::RuntimeImage;

/// Anything that can produce class file bytes for an internal name.
pub trait ClassSource: Send + Sync {
    /// `Ok(None)` when this source does not contain the class.
    fn read_class_bytes(&self, internal_name: &str) -> Result<Option<Vec<u8>>, SourceError>;

    fn describe(&self) -> String;
}

pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ClassSource for DirSource {
    fn read_class_bytes(&self, internal_name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        let path = self.root.join(format!("{internal_name}.class"));
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

pub struct JarSource {
    archive: Archive,
}

impl JarSource {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Ok(Self {
            archive: Archive::open(path)?,
        })
    }
}

impl ClassSource for JarSource {
    fn read_class_bytes(&self, internal_name: &str) -> Result<Option<Vec<u8>>, SourceError> {
        self.archive.read(&format!("{internal_name}.class"))
    }

    fn describe(&self) -> String {
        format!("jar {}", self.archive.path().display())
    }
}

/// Class bytes together with the source they were read from.
pub struct ClassBytes {
    pub bytes: Vec<u8>,
    pub origin: String,
}

/// Sources are searched in registration order, except that the runtime image
/// always comes first. Lookups re-read and re-parse on every call.
#[derive(Default)]
pub struct ClassPath {
    runtime: Option<RuntimeImage>,
    sources: Vec<Box<dyn ClassSource>>,
    registered: HashSet<PathBuf>,
}

impl ClassPath {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_runtime_image(&mut self, image: RuntimeImage) {
        debug!(source = %image.describe(), "using runtime image");
        self.runtime = Some(image);
    }

    pub fn len(&self) -> usize {
        self.sources.len() + usize::from(self.runtime.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push(&mut self, source: Box<dyn ClassSource>) {
        self.sources.push(source);
    }

    /// Appends a directory; registering the same path twice is a no-op.
    pub fn add_dir(&mut self, path: &Path) {
        if self.registered.insert(path.to_path_buf()) {
            self.push(Box::new(DirSource::new(path)));
        }
    }

    /// Appends a jar; registering the same path twice is a no-op.
    pub fn add_jar(&mut self, path: &Path) -> Result<(), SourceError> {
        if self.registered.contains(path) {
            return Ok(());
        }
        let jar = JarSource::open(path)?;
        self.registered.insert(path.to_path_buf());
        self.push(Box::new(jar));
        Ok(())
    }

    /// Appends a user classpath entry, a directory or an archive.
    pub fn add_entry(&mut self, path: &Path) -> Result<(), SourceError> {
        if path.is_dir() {
            self.add_dir(path);
            Ok(())
        } else {
            self.add_jar(path)
        }
    }

    fn sources(&self) -> impl Iterator<Item = &dyn ClassSource> {
        self.runtime
            .iter()
            .map(|r| r as &dyn ClassSource)
            .chain(self.sources.iter().map(|s| s.as_ref() as &dyn ClassSource))
    }

    /// First class in search order that reads and parses successfully.
    pub fn find(&self, internal_name: &str) -> Option<ClassFile> {
        for source in self.sources() {
            match source.read_class_bytes(internal_name) {
                Ok(Some(bytes)) => match ClassFile::parse(&bytes) {
                    Ok(cf) => return Some(cf),
                    Err(e) => {
                        debug!(class = internal_name, source = %source.describe(), error = %e, "unparsable class, trying next source");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    debug!(class = internal_name, source = %source.describe(), error = %e, "read failed, trying next source");
                }
            }
        }
        None
    }

    /// Raw bytes of the first source containing the class, without parsing.
    pub fn read_first(&self, internal_name: &str) -> Option<ClassBytes> {
        for source in self.sources() {
            match source.read_class_bytes(internal_name) {
                Ok(Some(bytes)) => {
                    return Some(ClassBytes {
                        bytes,
                        origin: source.describe(),
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(class = internal_name, source = %source.describe(), error = %e, "read failed, trying next source");
                }
            }
        }
        None
    }
}

/// Class files below `dir`, sorted by path.
pub fn class_files_under(dir: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(dir)
        .hidden(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .build();

    let mut files: Vec<PathBuf> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .map(ignore::DirEntry::into_path)
        .filter(|path| path.to_str().is_some_and(is_scannable_class))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ClassBuilder, temp_path, write_file, write_jar};
    use crate::runtime::ImageLayout;

    #[test]
    fn first_registered_source_wins() {
        let dir = temp_path("cp-dir");
        let jar = temp_path("cp.jar");
        write_file(
            &dir.join("a/Shared.class"),
            &ClassBuilder::new("a/Shared").superclass("from/Dir").build(),
        );
        write_jar(
            &jar,
            &[(
                "a/Shared.class",
                ClassBuilder::new("a/Shared").superclass("from/Jar").build(),
            )],
        );

        let mut cp = ClassPath::new();
        cp.add_dir(&dir);
        cp.add_jar(&jar).unwrap();
        assert_eq!(cp.find("a/Shared").unwrap().super_class.as_deref(), Some("from/Dir"));

        let mut reversed = ClassPath::new();
        reversed.add_jar(&jar).unwrap();
        reversed.add_dir(&dir);
        assert_eq!(reversed.find("a/Shared").unwrap().super_class.as_deref(), Some("from/Jar"));

        let _ = std::fs::remove_dir_all(dir);
        let _ = std::fs::remove_file(jar);
    }

    #[test]
    fn runtime_image_is_searched_before_user_entries() {
        let image_root = temp_path("cp-image");
        let dir = temp_path("cp-user");
        write_file(
            &image_root.join("java.base/java/lang/Thread.class"),
            &ClassBuilder::new("java/lang/Thread").interface("from/Image").build(),
        );
        write_file(
            &dir.join("java/lang/Thread.class"),
            &ClassBuilder::new("java/lang/Thread").interface("from/User").build(),
        );

        let mut cp = ClassPath::new();
        cp.add_dir(&dir);
        cp.set_runtime_image(RuntimeImage::new(ImageLayout::Exploded(image_root.clone())));
        assert_eq!(cp.len(), 2);
        assert_eq!(cp.find("java/lang/Thread").unwrap().interfaces, vec!["from/Image"]);

        let _ = std::fs::remove_dir_all(image_root);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn broken_entry_falls_through_to_next_source() {
        let broken = temp_path("cp-broken");
        let good = temp_path("cp-good");
        write_file(&broken.join("a/B.class"), b"\xCA\xFE\xBA\xBEtruncated");
        write_file(&good.join("a/B.class"), &ClassBuilder::new("a/B").build());

        let mut cp = ClassPath::new();
        cp.add_dir(&broken);
        cp.add_dir(&good);
        assert_eq!(cp.find("a/B").unwrap().this_class, "a/B");
        assert_eq!(cp.read_first("a/B").unwrap().bytes, b"\xCA\xFE\xBA\xBEtruncated".to_vec());
        assert!(cp.find("a/Missing").is_none());

        let _ = std::fs::remove_dir_all(broken);
        let _ = std::fs::remove_dir_all(good);
    }

    #[test]
    fn duplicate_registration_is_ignored_and_missing_jar_is_an_error() {
        let dir = temp_path("cp-dup");
        std::fs::create_dir_all(&dir).unwrap();
        let mut cp = ClassPath::new();
        cp.add_dir(&dir);
        cp.add_dir(&dir);
        assert_eq!(cp.len(), 1);

        assert!(cp.add_jar(&temp_path("nope.jar")).is_err());
        assert_eq!(cp.len(), 1);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn lists_class_files_sorted_without_descriptors() {
        let dir = temp_path("cp-walk");
        write_file(&dir.join("b/Z.class"), b"z");
        write_file(&dir.join("a/Y.class"), b"y");
        write_file(&dir.join("a/package-info.class"), b"p");
        write_file(&dir.join("module-info.class"), b"m");
        write_file(&dir.join(".hidden/H.class"), b"h");
        write_file(&dir.join("a/notes.txt"), b"t");

        let found: Vec<PathBuf> = class_files_under(&dir)
            .into_iter()
            .map(|p| p.strip_prefix(&dir).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            found,
            vec![
                PathBuf::from(".hidden/H.class"),
                PathBuf::from("a/Y.class"),
                PathBuf::from("b/Z.class"),
            ]
        );
        let _ = std::fs::remove_dir_all(dir);
    }
}
