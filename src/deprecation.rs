//! Deprecation facts and the database that answers scanner queries.
//!
//! The in-memory [`DeprecationDb`] can be filled from three places:
//!
//! - a JSON document (`types`, `methods`, `fields`),
//! - the `#jdepr1` CSV listing (`KIND,type,nameAndDescriptor,since,forRemoval`),
//! - `@Deprecated` annotations harvested from class files.
//!
//! Keys are stored in internal (slash-separated) form.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::archive::{Archive, is_scannable_class};
use crate::classfile::ClassFile;
use crate::classpath::class_files_under;
use crate::error::DbError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeprecationFact {
    #[serde(default, rename = "forRemoval")]
    pub for_removal: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

/// Read-only deprecation lookups used by the scanner.
pub trait DeprecationSource {
    fn type_fact(&self, name: &str) -> Option<&DeprecationFact>;
    fn method_fact(&self, owner: &str, name: &str, descriptor: &str) -> Option<&DeprecationFact>;
    fn field_fact(&self, owner: &str, name: &str) -> Option<&DeprecationFact>;
}

#[derive(Debug, Default, Clone)]
pub struct DeprecationDb {
    types: HashMap<String, DeprecationFact>,
    methods: HashMap<(String, String, String), DeprecationFact>,
    fields: HashMap<(String, String), DeprecationFact>,
}

#[derive(Debug, Deserialize)]
struct JsonDb {
    #[serde(default)]
    types: HashMap<String, DeprecationFact>,
    #[serde(default)]
    methods: Vec<JsonMethod>,
    #[serde(default)]
    fields: Vec<JsonField>,
}

#[derive(Debug, Deserialize)]
struct JsonMethod {
    owner: String,
    name: String,
    descriptor: String,
    #[serde(flatten)]
    fact: DeprecationFact,
}

#[derive(Debug, Deserialize)]
struct JsonField {
    owner: String,
    name: String,
    #[serde(flatten)]
    fact: DeprecationFact,
}

fn internal(name: &str) -> String {
    name.replace('.', "/")
}

impl DeprecationDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.types.len() + self.methods.len() + self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add_type(&mut self, name: &str, fact: DeprecationFact) {
        self.types.insert(internal(name), fact);
    }

    pub fn add_method(&mut self, owner: &str, name: &str, descriptor: &str, fact: DeprecationFact) {
        self.methods
            .insert((internal(owner), name.to_string(), descriptor.to_string()), fact);
    }

    pub fn add_field(&mut self, owner: &str, name: &str, fact: DeprecationFact) {
        self.fields.insert((internal(owner), name.to_string()), fact);
    }

    /// Loads a database file, choosing the format by extension
    /// (`.json`, otherwise the `#jdepr1` CSV listing).
    pub fn load(&mut self, path: &Path) -> Result<usize, DbError> {
        let text = std::fs::read_to_string(path).map_err(|source| DbError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let before = self.len();
        if path.extension().is_some_and(|e| e == "json") {
            self.merge_json(path, &text)?;
        } else {
            self.merge_csv(path, &text)?;
        }
        let added = self.len() - before;
        debug!(path = %path.display(), added, "loaded deprecation database");
        Ok(added)
    }

    fn merge_json(&mut self, path: &Path, text: &str) -> Result<(), DbError> {
        let db: JsonDb = serde_json::from_str(text).map_err(|source| DbError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        for (name, fact) in db.types {
            self.add_type(&name, fact);
        }
        for m in db.methods {
            self.add_method(&m.owner, &m.name, &m.descriptor, m.fact);
        }
        for f in db.fields {
            self.add_field(&f.owner, &f.name, f.fact);
        }
        Ok(())
    }

    fn merge_csv(&mut self, path: &Path, text: &str) -> Result<(), DbError> {
        let csv_error = |line: u64, reason: String| DbError::Csv {
            path: path.to_path_buf(),
            line: line as usize,
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(false)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        for record in reader.records() {
            let record = record.map_err(|e| csv_error(e.position().map_or(0, |p| p.line()), e.to_string()))?;
            let line_no = record.position().map_or(0, |p| p.line());
            if record.len() != 5 {
                return Err(csv_error(line_no, format!("expected 5 columns, found {}", record.len())));
            }
            let (kind, type_name, member, since, for_removal) =
                (&record[0], &record[1], &record[2], &record[3], &record[4]);
            let fact = DeprecationFact {
                for_removal: match for_removal {
                    "true" => true,
                    "false" => false,
                    other => return Err(csv_error(line_no, format!("invalid forRemoval value `{other}`"))),
                },
                since: (!since.is_empty()).then(|| since.to_string()),
            };

            match kind {
                "CLASS" | "INTERFACE" | "ENUM" | "ANNOTATION_TYPE" | "RECORD" => self.add_type(type_name, fact),
                "METHOD" | "CONSTRUCTOR" => {
                    let Some(paren) = member.find('(') else {
                        return Err(csv_error(line_no, format!("method without descriptor `{member}`")));
                    };
                    let (name, descriptor) = member.split_at(paren);
                    self.add_method(type_name, name, descriptor, fact);
                }
                "FIELD" | "ENUM_CONSTANT" => self.add_field(type_name, member, fact),
                other => return Err(csv_error(line_no, format!("unknown kind `{other}`"))),
            }
        }
        Ok(())
    }

    /// Harvests every class in a jar or below a directory. Classes that do
    /// not parse are skipped with a warning.
    pub fn harvest_path(&mut self, path: &Path) -> Result<usize, DbError> {
        let mut added = 0usize;
        if path.is_dir() {
            for file in class_files_under(path) {
                let bytes = std::fs::read(&file).map_err(|source| DbError::Io {
                    path: file.clone(),
                    source,
                })?;
                added += self.harvest_bytes(&bytes, &file.display().to_string());
            }
        } else {
            let archive = Archive::open(path)?;
            for entry in archive.entry_names() {
                if !is_scannable_class(&entry) {
                    continue;
                }
                if let Some(bytes) = archive.read(&entry)? {
                    added += self.harvest_bytes(&bytes, &format!("{}!{entry}", path.display()));
                }
            }
        }
        debug!(path = %path.display(), added, "harvested deprecation annotations");
        Ok(added)
    }

    fn harvest_bytes(&mut self, bytes: &[u8], context: &str) -> usize {
        match ClassFile::parse(bytes) {
            Ok(cf) => self.harvest(&cf),
            Err(e) => {
                warn!(class = context, error = %e, "skipping unparsable class while harvesting");
                0
            }
        }
    }

    /// Records the `@Deprecated` markers carried by a class file.
    pub fn harvest(&mut self, cf: &ClassFile) -> usize {
        let mut added = 0usize;
        if let Some(fact) = &cf.deprecated {
            self.add_type(&cf.this_class, fact.clone());
            added += 1;
        }
        for m in &cf.methods {
            if let Some(fact) = &m.deprecated {
                self.add_method(&cf.this_class, &m.name, &m.descriptor, fact.clone());
                added += 1;
            }
        }
        for f in &cf.fields {
            if let Some(fact) = &f.deprecated {
                self.add_field(&cf.this_class, &f.name, fact.clone());
                added += 1;
            }
        }
        added
    }
}

impl DeprecationSource for DeprecationDb {
    fn type_fact(&self, name: &str) -> Option<&DeprecationFact> {
        self.types.get(name)
    }

    fn method_fact(&self, owner: &str, name: &str, descriptor: &str) -> Option<&DeprecationFact> {
        self.methods
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
    }

    fn field_fact(&self, owner: &str, name: &str) -> Option<&DeprecationFact> {
        self.fields.get(&(owner.to_string(), name.to_string()))
    }
}
