use crate::classfile::{ClassFile, MemberRef, PoolEntry};

/// Constant-pool references grouped by kind, each in pool index order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PoolRefs<'a> {
    pub classes: Vec<&'a str>,
    pub field_refs: Vec<&'a MemberRef>,
    pub method_refs: Vec<&'a MemberRef>,
    pub interface_method_refs: Vec<&'a MemberRef>,
}

pub fn classify(cf: &ClassFile) -> PoolRefs<'_> {
    let mut refs = PoolRefs::default();
    for entry in &cf.pool {
        match entry {
            PoolEntry::ClassRef { name } => refs.classes.push(name),
            PoolEntry::FieldRef(r) => refs.field_refs.push(r),
            PoolEntry::MethodRef(r) => refs.method_refs.push(r),
            PoolEntry::InterfaceMethodRef(r) => refs.interface_method_refs.push(r),
            PoolEntry::Other { .. } | PoolEntry::Unusable => {}
        }
    }
    refs
}
