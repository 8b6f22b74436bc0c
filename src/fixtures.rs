//! Test fixtures: a minimal class file writer plus temp-path and jar helpers.
//!
//! Kept free of `crate::` paths so the CLI integration tests can include it
//! with `#[path]`.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn temp_path(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!(
        "deprscan_test_{}_{}_{}_{}",
        std::process::id(),
        nanos,
        n,
        name
    ))
}

pub fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    write_archive(path, b"", entries);
}

/// Writes a `.jmod`: the `JM\x01\x00` header followed by a zip archive.
pub fn write_jmod(path: &Path, entries: &[(&str, Vec<u8>)]) {
    write_archive(path, b"JM\x01\x00", entries);
}

fn write_archive(path: &Path, header: &[u8], entries: &[(&str, Vec<u8>)]) {
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(header).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Writes each class to `<dir>/<internal name>.class`.
pub fn write_class_dir(dir: &Path, classes: &[ClassBuilder]) {
    for class in classes {
        write_file(&dir.join(format!("{}.class", class.name())), &class.build());
    }
}

struct MemberDef {
    access_flags: u16,
    name: String,
    descriptor: String,
    deprecated: Option<bool>,
}

enum Extra {
    Class(String),
    FieldRef(String, String, String),
    MethodRef(String, String, String),
    InterfaceMethodRef(String, String, String),
    Long(i64),
    Str(String),
}

pub struct ClassBuilder {
    access_flags: u16,
    this_class: String,
    super_class: Option<String>,
    interfaces: Vec<String>,
    fields: Vec<MemberDef>,
    methods: Vec<MemberDef>,
    extras: Vec<Extra>,
    deprecated: Option<bool>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            access_flags: 0x0021,
            this_class: name.to_string(),
            super_class: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            extras: Vec::new(),
            deprecated: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.this_class
    }

    pub fn access_flags(mut self, flags: u16) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn as_interface(self) -> Self {
        self.access_flags(0x0601)
    }

    pub fn superclass(mut self, name: &str) -> Self {
        self.super_class = Some(name.to_string());
        self
    }

    pub fn no_superclass(mut self) -> Self {
        self.super_class = None;
        self
    }

    pub fn interface(mut self, name: &str) -> Self {
        self.interfaces.push(name.to_string());
        self
    }

    pub fn deprecated(mut self, for_removal: bool) -> Self {
        self.deprecated = Some(for_removal);
        self
    }

    pub fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push(member(0x0001, name, descriptor, None));
        self
    }

    pub fn deprecated_field(mut self, name: &str, descriptor: &str, for_removal: bool) -> Self {
        self.fields.push(member(0x0001, name, descriptor, Some(for_removal)));
        self
    }

    pub fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods.push(member(0x0001, name, descriptor, None));
        self
    }

    pub fn deprecated_method(mut self, name: &str, descriptor: &str, for_removal: bool) -> Self {
        self.methods.push(member(0x0001, name, descriptor, Some(for_removal)));
        self
    }

    pub fn class_ref(mut self, name: &str) -> Self {
        self.extras.push(Extra::Class(name.to_string()));
        self
    }

    pub fn field_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.extras.push(Extra::FieldRef(owner.into(), name.into(), descriptor.into()));
        self
    }

    pub fn method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.extras.push(Extra::MethodRef(owner.into(), name.into(), descriptor.into()));
        self
    }

    pub fn interface_method_ref(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.extras
            .push(Extra::InterfaceMethodRef(owner.into(), name.into(), descriptor.into()));
        self
    }

    pub fn long_constant(mut self, value: i64) -> Self {
        self.extras.push(Extra::Long(value));
        self
    }

    pub fn string_constant(mut self, value: &str) -> Self {
        self.extras.push(Extra::Str(value.to_string()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = PoolWriter::default();
        let mut body = Vec::new();

        let this_index = pool.class(&self.this_class);
        let super_index = self.super_class.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interface_indices: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        for extra in &self.extras {
            match extra {
                Extra::Class(name) => {
                    pool.class(name);
                }
                Extra::FieldRef(o, n, d) => {
                    pool.member_ref(9, o, n, d);
                }
                Extra::MethodRef(o, n, d) => {
                    pool.member_ref(10, o, n, d);
                }
                Extra::InterfaceMethodRef(o, n, d) => {
                    pool.member_ref(11, o, n, d);
                }
                Extra::Long(v) => pool.long(*v),
                Extra::Str(s) => pool.string(s),
            }
        }

        put_u2(&mut body, self.access_flags);
        put_u2(&mut body, this_index);
        put_u2(&mut body, super_index);
        put_u2(&mut body, interface_indices.len() as u16);
        for idx in interface_indices {
            put_u2(&mut body, idx);
        }

        for members in [&self.fields, &self.methods] {
            put_u2(&mut body, members.len() as u16);
            for m in members.iter() {
                put_u2(&mut body, m.access_flags);
                put_u2(&mut body, pool.utf8(&m.name));
                put_u2(&mut body, pool.utf8(&m.descriptor));
                write_deprecation_attributes(&mut body, &mut pool, m.deprecated);
            }
        }
        write_deprecation_attributes(&mut body, &mut pool, self.deprecated);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFEBABEu32.to_be_bytes());
        put_u2(&mut out, 0);
        put_u2(&mut out, 61);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&body);
        out
    }
}

fn member(access_flags: u16, name: &str, descriptor: &str, deprecated: Option<bool>) -> MemberDef {
    MemberDef {
        access_flags,
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        deprecated,
    }
}

fn write_deprecation_attributes(body: &mut Vec<u8>, pool: &mut PoolWriter, deprecated: Option<bool>) {
    let Some(for_removal) = deprecated else {
        put_u2(body, 0);
        return;
    };

    let mut info = Vec::new();
    put_u2(&mut info, 1);
    put_u2(&mut info, pool.utf8("Ljava/lang/Deprecated;"));
    if for_removal {
        put_u2(&mut info, 1);
        put_u2(&mut info, pool.utf8("forRemoval"));
        info.push(b'Z');
        put_u2(&mut info, pool.integer(1));
    } else {
        put_u2(&mut info, 0);
    }

    put_u2(body, 1);
    put_u2(body, pool.utf8("RuntimeVisibleAnnotations"));
    body.extend_from_slice(&(info.len() as u32).to_be_bytes());
    body.extend_from_slice(&info);
}

fn put_u2(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_be_bytes());
}

struct PoolWriter {
    bytes: Vec<u8>,
    next: u16,
    utf8: HashMap<String, u16>,
    classes: HashMap<String, u16>,
}

impl Default for PoolWriter {
    fn default() -> Self {
        Self {
            bytes: Vec::new(),
            next: 1,
            utf8: HashMap::new(),
            classes: HashMap::new(),
        }
    }
}

impl PoolWriter {
    fn push(&mut self, entry: &[u8], slots: u16) -> u16 {
        let index = self.next;
        self.bytes.extend_from_slice(entry);
        self.next += slots;
        index
    }

    fn utf8(&mut self, value: &str) -> u16 {
        if let Some(index) = self.utf8.get(value) {
            return *index;
        }
        let mut entry = vec![1u8];
        put_u2(&mut entry, value.len() as u16);
        entry.extend_from_slice(value.as_bytes());
        let index = self.push(&entry, 1);
        self.utf8.insert(value.to_string(), index);
        index
    }

    fn class(&mut self, name: &str) -> u16 {
        if let Some(index) = self.classes.get(name) {
            return *index;
        }
        let name_index = self.utf8(name);
        let mut entry = vec![7u8];
        put_u2(&mut entry, name_index);
        let index = self.push(&entry, 1);
        self.classes.insert(name.to_string(), index);
        index
    }

    fn member_ref(&mut self, tag: u8, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        let mut nat = vec![12u8];
        put_u2(&mut nat, name_index);
        put_u2(&mut nat, descriptor_index);
        let nat_index = self.push(&nat, 1);

        let mut entry = vec![tag];
        put_u2(&mut entry, class_index);
        put_u2(&mut entry, nat_index);
        self.push(&entry, 1)
    }

    fn integer(&mut self, value: i32) -> u16 {
        let mut entry = vec![3u8];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(&entry, 1)
    }

    fn long(&mut self, value: i64) {
        let mut entry = vec![5u8];
        entry.extend_from_slice(&value.to_be_bytes());
        self.push(&entry, 2);
    }

    fn string(&mut self, value: &str) {
        let utf8 = self.utf8(value);
        let mut entry = vec![8u8];
        put_u2(&mut entry, utf8);
        self.push(&entry, 1);
    }
}
