//! Binary class file reader.
//!
//! Only the parts the scanner needs are kept: the constant pool (with member
//! references resolved to strings), the type header, declared members and
//! `@Deprecated` markers. Everything else is skipped by length.

use std::fmt;

use serde::Serialize;

use crate::deprecation::DeprecationFact;
use crate::error::ClassFileError;

type Result<T> = std::result::Result<T, ClassFileError>;

pub const MAGIC: u32 = 0xCAFEBABE;

pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

const DEPRECATED_ANNOTATION: &str = "Ljava/lang/Deprecated;";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassKind {
    Class,
    Interface,
    Enum,
    Annotation,
}

impl ClassKind {
    pub fn from_access_flags(flags: u16) -> Self {
        if flags & ACC_ANNOTATION != 0 {
            ClassKind::Annotation
        } else if flags & ACC_INTERFACE != 0 {
            ClassKind::Interface
        } else if flags & ACC_ENUM != 0 {
            ClassKind::Enum
        } else {
            ClassKind::Class
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClassKind::Class => "class",
            ClassKind::Interface => "interface",
            ClassKind::Enum => "enum",
            ClassKind::Annotation => "annotation",
        }
    }
}

impl fmt::Display for ClassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A symbolic field or method reference from the constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEntry {
    ClassRef { name: String },
    FieldRef(MemberRef),
    MethodRef(MemberRef),
    InterfaceMethodRef(MemberRef),
    /// Literals, names, handles, dynamic constants and module entries.
    Other { tag: u8 },
    /// Second slot of a `Long` or `Double` constant.
    Unusable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access_flags: u16,
    pub name: String,
    pub descriptor: String,
    pub deprecated: Option<DeprecationFact>,
}

#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access_flags: u16,
    pub this_class: String,
    pub super_class: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    /// Entries for indices `1..constant_pool_count`, in index order.
    pub pool: Vec<PoolEntry>,
    pub deprecated: Option<DeprecationFact>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let magic = reader.read_u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }

        let minor_version = reader.read_u2()?;
        let major_version = reader.read_u2()?;
        let cp = ConstantPool::parse(&mut reader)?;

        let access_flags = reader.read_u2()?;
        let this_class = cp.class_name(reader.read_u2()?)?.to_string();
        let super_index = reader.read_u2()?;
        let super_class = if super_index == 0 {
            None
        } else {
            Some(cp.class_name(super_index)?.to_string())
        };

        let interfaces_count = reader.read_u2()? as usize;
        let mut interfaces = Vec::with_capacity(interfaces_count);
        for _ in 0..interfaces_count {
            interfaces.push(cp.class_name(reader.read_u2()?)?.to_string());
        }

        let fields_count = reader.read_u2()? as usize;
        let mut fields = Vec::with_capacity(fields_count);
        for _ in 0..fields_count {
            fields.push(parse_member(&mut reader, &cp)?);
        }

        let methods_count = reader.read_u2()? as usize;
        let mut methods = Vec::with_capacity(methods_count);
        for _ in 0..methods_count {
            methods.push(parse_member(&mut reader, &cp)?);
        }

        let deprecated = parse_attributes(&mut reader, &cp)?;
        let pool = cp.resolve_entries()?;

        Ok(Self {
            minor_version,
            major_version,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            pool,
            deprecated,
        })
    }

    pub fn kind(&self) -> ClassKind {
        ClassKind::from_access_flags(self.access_flags)
    }

    pub fn field(&self, name: &str) -> Option<&Member> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&Member> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}

fn parse_member(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Member> {
    let access_flags = reader.read_u2()?;
    let name = cp.utf8(reader.read_u2()?)?.to_string();
    let descriptor = cp.utf8(reader.read_u2()?)?.to_string();
    let deprecated = parse_attributes(reader, cp)?;
    Ok(Member {
        access_flags,
        name,
        descriptor,
        deprecated,
    })
}

/// Reads an attribute table, returning the deprecation marker if any.
///
/// `RuntimeVisibleAnnotations` carries `forRemoval`/`since`; a bare
/// `Deprecated` attribute counts as a plain deprecation.
fn parse_attributes(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Option<DeprecationFact>> {
    let count = reader.read_u2()? as usize;
    let mut annotated = None;
    let mut attribute_only = false;
    for _ in 0..count {
        let name = cp.utf8(reader.read_u2()?)?;
        let length = reader.read_u4()? as usize;
        let info = reader.read_bytes(length)?;
        match name {
            "RuntimeVisibleAnnotations" => {
                let mut sub = Reader::new(info);
                if let Some(fact) = parse_deprecated_annotation(&mut sub, cp)? {
                    annotated = Some(fact);
                }
            }
            "Deprecated" => attribute_only = true,
            _ => {}
        }
    }

    Ok(annotated.or_else(|| attribute_only.then(DeprecationFact::default)))
}

fn parse_deprecated_annotation(reader: &mut Reader<'_>, cp: &ConstantPool) -> Result<Option<DeprecationFact>> {
    let num_annotations = reader.read_u2()?;
    let mut found = None;
    for _ in 0..num_annotations {
        let type_name = cp.utf8(reader.read_u2()?)?;
        let num_pairs = reader.read_u2()?;
        let is_deprecated = type_name == DEPRECATED_ANNOTATION;
        let mut fact = DeprecationFact::default();
        for _ in 0..num_pairs {
            let element = cp.utf8(reader.read_u2()?)?;
            let tag = reader.read_u1()?;
            match (is_deprecated, element, tag) {
                (true, "forRemoval", b'Z') => {
                    fact.for_removal = cp.integer(reader.read_u2()?)? != 0;
                }
                (true, "since", b's') => {
                    fact.since = Some(cp.utf8(reader.read_u2()?)?.to_string());
                }
                _ => skip_element_value(reader, tag)?,
            }
        }
        if is_deprecated {
            found = Some(fact);
        }
    }
    Ok(found)
}

fn skip_element_value(reader: &mut Reader<'_>, tag: u8) -> Result<()> {
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => reader.skip(2),
        b'e' => reader.skip(4),
        b'@' => {
            reader.skip(2)?;
            let num_pairs = reader.read_u2()?;
            for _ in 0..num_pairs {
                reader.skip(2)?;
                let tag = reader.read_u1()?;
                skip_element_value(reader, tag)?;
            }
            Ok(())
        }
        b'[' => {
            let num_values = reader.read_u2()?;
            for _ in 0..num_values {
                let tag = reader.read_u1()?;
                skip_element_value(reader, tag)?;
            }
            Ok(())
        }
        other => Err(ClassFileError::UnsupportedConstant(other)),
    }
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Class { name_index: u16 },
    FieldRef { class_index: u16, nat_index: u16 },
    MethodRef { class_index: u16, nat_index: u16 },
    InterfaceMethodRef { class_index: u16, nat_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    Other(u8),
    Unusable,
}

struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.read_u2()? as usize;
        let mut entries = Vec::with_capacity(count.max(1));
        entries.push(Constant::Unusable);

        while entries.len() < count {
            let tag = reader.read_u1()?;
            let entry = match tag {
                1 => {
                    let length = reader.read_u2()? as usize;
                    Constant::Utf8(decode_modified_utf8(reader.read_bytes(length)?)?)
                }
                3 => Constant::Integer(reader.read_u4()? as i32),
                4 => {
                    reader.skip(4)?;
                    Constant::Other(tag)
                }
                5 | 6 => {
                    reader.skip(8)?;
                    entries.push(Constant::Other(tag));
                    Constant::Unusable
                }
                7 => Constant::Class {
                    name_index: reader.read_u2()?,
                },
                8 | 16 | 19 | 20 => {
                    reader.skip(2)?;
                    Constant::Other(tag)
                }
                9 | 10 | 11 => {
                    let class_index = reader.read_u2()?;
                    let nat_index = reader.read_u2()?;
                    match tag {
                        9 => Constant::FieldRef { class_index, nat_index },
                        10 => Constant::MethodRef { class_index, nat_index },
                        _ => Constant::InterfaceMethodRef { class_index, nat_index },
                    }
                }
                12 => Constant::NameAndType {
                    name_index: reader.read_u2()?,
                    descriptor_index: reader.read_u2()?,
                },
                15 => {
                    reader.skip(3)?;
                    Constant::Other(tag)
                }
                17 | 18 => {
                    reader.skip(4)?;
                    Constant::Other(tag)
                }
                other => return Err(ClassFileError::UnsupportedConstant(other)),
            };
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(index as usize) {
            Some(_) if index == 0 => Err(ClassFileError::InvalidConstantIndex(index)),
            Some(entry) => Ok(entry),
            None => Err(ClassFileError::InvalidConstantIndex(index)),
        }
    }

    fn utf8(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Utf8(value) => Ok(value),
            _ => Err(ClassFileError::ConstantTypeMismatch {
                index,
                expected: "Utf8",
            }),
        }
    }

    fn integer(&self, index: u16) -> Result<i32> {
        match self.get(index)? {
            Constant::Integer(value) => Ok(*value),
            _ => Err(ClassFileError::ConstantTypeMismatch {
                index,
                expected: "Integer",
            }),
        }
    }

    fn class_name(&self, index: u16) -> Result<&str> {
        match self.get(index)? {
            Constant::Class { name_index } => self.utf8(*name_index),
            _ => Err(ClassFileError::ConstantTypeMismatch {
                index,
                expected: "Class",
            }),
        }
    }

    fn member_ref(&self, class_index: u16, nat_index: u16) -> Result<MemberRef> {
        let owner = self.class_name(class_index)?.to_string();
        match self.get(nat_index)? {
            Constant::NameAndType {
                name_index,
                descriptor_index,
            } => Ok(MemberRef {
                owner,
                name: self.utf8(*name_index)?.to_string(),
                descriptor: self.utf8(*descriptor_index)?.to_string(),
            }),
            _ => Err(ClassFileError::ConstantTypeMismatch {
                index: nat_index,
                expected: "NameAndType",
            }),
        }
    }

    fn resolve_entries(&self) -> Result<Vec<PoolEntry>> {
        let mut resolved = Vec::with_capacity(self.entries.len().saturating_sub(1));
        for entry in self.entries.iter().skip(1) {
            resolved.push(match entry {
                Constant::Class { name_index } => PoolEntry::ClassRef {
                    name: self.utf8(*name_index)?.to_string(),
                },
                Constant::FieldRef { class_index, nat_index } => {
                    PoolEntry::FieldRef(self.member_ref(*class_index, *nat_index)?)
                }
                Constant::MethodRef { class_index, nat_index } => {
                    PoolEntry::MethodRef(self.member_ref(*class_index, *nat_index)?)
                }
                Constant::InterfaceMethodRef { class_index, nat_index } => {
                    PoolEntry::InterfaceMethodRef(self.member_ref(*class_index, *nat_index)?)
                }
                Constant::Utf8(_) => PoolEntry::Other { tag: 1 },
                Constant::Integer(_) => PoolEntry::Other { tag: 3 },
                Constant::NameAndType { .. } => PoolEntry::Other { tag: 12 },
                Constant::Other(tag) => PoolEntry::Other { tag: *tag },
                Constant::Unusable => PoolEntry::Unusable,
            });
        }
        Ok(resolved)
    }
}

fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if let Ok(s) = std::str::from_utf8(bytes) {
        return Ok(s.to_string());
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    let continuation = |idx: usize| -> Result<u16> {
        match bytes.get(idx) {
            Some(b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u16),
            _ => Err(ClassFileError::InvalidModifiedUtf8),
        }
    };
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(b as u16);
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            units.push((((b & 0x1F) as u16) << 6) | continuation(i + 1)?);
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            units.push((((b & 0x0F) as u16) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?);
            i += 3;
        } else {
            return Err(ClassFileError::InvalidModifiedUtf8);
        }
    }
    Ok(String::from_utf16_lossy(&units))
}

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(ClassFileError::UnexpectedEof)?;
        let slice = self.data.get(self.pos..end).ok_or(ClassFileError::UnexpectedEof)?;
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        self.read_bytes(len).map(|_| ())
    }

    fn read_u1(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_u2(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u4(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::ClassBuilder;

    #[test]
    fn parses_header_members_and_interfaces() {
        let bytes = ClassBuilder::new("com/example/Widget")
            .superclass("com/example/Base")
            .interface("java/lang/Runnable")
            .field("count", "I")
            .method("run", "()V")
            .build();

        let cf = ClassFile::parse(&bytes).unwrap();
        assert_eq!(cf.this_class, "com/example/Widget");
        assert_eq!(cf.super_class.as_deref(), Some("com/example/Base"));
        assert_eq!(cf.interfaces, vec!["java/lang/Runnable"]);
        assert_eq!(cf.kind(), ClassKind::Class);
        assert!(cf.field("count").is_some());
        assert!(cf.method("run", "()V").is_some());
        assert!(cf.method("run", "(I)V").is_none());
        assert!(cf.deprecated.is_none());
    }

    #[test]
    fn root_class_has_no_superclass() {
        let bytes = ClassBuilder::new("java/lang/Object").no_superclass().build();
        let cf = ClassFile::parse(&bytes).unwrap();
        assert!(cf.super_class.is_none());
    }

    #[test]
    fn resolves_member_references_in_pool() {
        let bytes = ClassBuilder::new("a/A")
            .method_ref("a/B", "go", "(I)V")
            .field_ref("a/B", "x", "J")
            .long_constant(7)
            .build();
        let cf = ClassFile::parse(&bytes).unwrap();

        assert!(cf.pool.contains(&PoolEntry::MethodRef(MemberRef {
            owner: "a/B".into(),
            name: "go".into(),
            descriptor: "(I)V".into(),
        })));
        assert!(cf.pool.contains(&PoolEntry::FieldRef(MemberRef {
            owner: "a/B".into(),
            name: "x".into(),
            descriptor: "J".into(),
        })));
        assert!(cf.pool.contains(&PoolEntry::Unusable));
    }

    #[test]
    fn reads_deprecated_annotation_with_for_removal() {
        let bytes = ClassBuilder::new("a/Old")
            .deprecated(true)
            .deprecated_method("stop", "()V", false)
            .build();
        let cf = ClassFile::parse(&bytes).unwrap();
        assert_eq!(cf.deprecated.as_ref().map(|d| d.for_removal), Some(true));
        let stop = cf.method("stop", "()V").unwrap();
        assert_eq!(stop.deprecated.as_ref().map(|d| d.for_removal), Some(false));
    }

    #[test]
    fn derives_kind_from_access_flags() {
        assert_eq!(ClassKind::from_access_flags(ACC_INTERFACE | ACC_ANNOTATION), ClassKind::Annotation);
        assert_eq!(ClassKind::from_access_flags(ACC_INTERFACE), ClassKind::Interface);
        assert_eq!(ClassKind::from_access_flags(ACC_ENUM), ClassKind::Enum);
        assert_eq!(ClassKind::from_access_flags(0x0021), ClassKind::Class);
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert!(matches!(
            ClassFile::parse(&[0, 0, 0, 0, 0, 0, 0, 0]),
            Err(ClassFileError::InvalidMagic(0))
        ));
        let bytes = ClassBuilder::new("a/A").build();
        assert!(matches!(
            ClassFile::parse(&bytes[..bytes.len() - 3]),
            Err(ClassFileError::UnexpectedEof)
        ));
    }

    #[test]
    fn decodes_modified_utf8_null() {
        assert_eq!(decode_modified_utf8(&[b'a', 0xC0, 0x80, b'b']).unwrap(), "a\0b");
    }
}
