//! JVM-style member lookup.
//!
//! One traversal serves two callers: resolving a symbolic reference from the
//! constant pool (the member must exist) and probing for the declaration a
//! method would override (usually there is none).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::classfile::{ClassFile, MemberRef};
use crate::classpath::ClassPath;
use crate::error::ResolveError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Symbolic reference resolution: the start class is checked and a miss
    /// is an error.
    IncludeStart,
    /// Override probing: only supertypes are checked and a miss is `None`.
    ExcludeStart,
}

pub fn declares(cf: &ClassFile, kind: MemberKind, name: &str, descriptor: &str) -> bool {
    match kind {
        MemberKind::Field => cf.field(name).is_some(),
        MemberKind::Method => cf.method(name, descriptor).is_some(),
    }
}

/// Where a member was found.
///
/// `missing_ancestor` names a superclass that could not be loaded; the chain
/// walk stopped there and the member was found among the interfaces instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Found {
    pub owner: String,
    pub missing_ancestor: Option<String>,
}

impl Found {
    fn at(owner: String, missing_ancestor: Option<String>) -> Self {
        Self {
            owner,
            missing_ancestor,
        }
    }
}

/// Finds the class declaring `name`/`descriptor`, walking the superclass
/// chain of `start` first and then its interfaces breadth-first.
///
/// An ancestor missing from the classpath ends the chain walk but not the
/// interface search. If the member is not found at all, that ancestor is
/// returned as `ClassNotFound`.
pub fn resolve_member(
    classpath: &ClassPath,
    start: &ClassFile,
    kind: MemberKind,
    name: &str,
    descriptor: &str,
    lookup: Lookup,
) -> Result<Option<Found>, ResolveError> {
    if lookup == Lookup::IncludeStart && declares(start, kind, name, descriptor) {
        return Ok(Some(Found::at(start.this_class.clone(), None)));
    }

    let mut chain = HashSet::from([start.this_class.clone()]);
    let mut pending: VecDeque<(String, Option<String>)> =
        start.interfaces.iter().map(|i| (i.clone(), None)).collect();
    let mut missing_ancestor = None;
    let mut next = start.super_class.clone();

    while let Some(class_name) = next {
        if !chain.insert(class_name.clone()) {
            return Err(ResolveError::Cycle(class_name));
        }
        let Some(ancestor) = classpath.find(&class_name) else {
            missing_ancestor = Some(class_name);
            break;
        };
        if declares(&ancestor, kind, name, descriptor) {
            return Ok(Some(Found::at(ancestor.this_class, None)));
        }
        pending.extend(ancestor.interfaces.into_iter().map(|i| (i, None)));
        next = ancestor.super_class;
    }

    // Queue entries carry the interface that listed them as a superinterface.
    // Diamonds are legal and visited once; reaching an interface again from
    // one of its own superinterfaces is a cycle.
    let mut supers: HashMap<String, Vec<String>> = HashMap::new();
    while let Some((interface, via)) = pending.pop_front() {
        if supers.contains_key(&interface) {
            if let Some(via) = via
                && reaches(&supers, &interface, &via)
            {
                return Err(ResolveError::Cycle(interface));
            }
            continue;
        }
        let Some(cf) = classpath.find(&interface) else {
            return Err(ResolveError::ClassNotFound(interface));
        };
        if declares(&cf, kind, name, descriptor) {
            return Ok(Some(Found::at(cf.this_class, missing_ancestor)));
        }
        pending.extend(cf.interfaces.iter().map(|s| (s.clone(), Some(interface.clone()))));
        supers.insert(interface, cf.interfaces);
    }

    if let Some(missing) = missing_ancestor {
        return Err(ResolveError::ClassNotFound(missing));
    }
    match lookup {
        Lookup::IncludeStart => Err(ResolveError::MemberNotFound {
            owner: start.this_class.clone(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
        }),
        Lookup::ExcludeStart => Ok(None),
    }
}

/// Whether `to` is reachable from `from` over the superinterface edges
/// recorded so far.
fn reaches(supers: &HashMap<String, Vec<String>>, from: &str, to: &str) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == to {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = supers.get(current) {
            stack.extend(next.iter().map(String::as_str));
        }
    }
    false
}

/// Resolves a constant-pool reference to its declaring class.
///
/// `current` is the class being scanned; references to it are resolved
/// without another classpath read.
pub fn resolve_reference(
    classpath: &ClassPath,
    current: &ClassFile,
    member: &MemberRef,
    kind: MemberKind,
) -> Result<Found, ResolveError> {
    let loaded;
    let owner = if member.owner == current.this_class {
        current
    } else {
        loaded = classpath
            .find(&member.owner)
            .ok_or_else(|| ResolveError::ClassNotFound(member.owner.clone()))?;
        &loaded
    };

    resolve_member(classpath, owner, kind, &member.name, &member.descriptor, Lookup::IncludeStart)?.ok_or_else(|| {
        ResolveError::MemberNotFound {
            owner: member.owner.clone(),
            name: member.name.clone(),
            descriptor: member.descriptor.clone(),
        }
    })
}

/// Supertype declaring the method `cf` would override, if any.
pub fn find_overridden(
    classpath: &ClassPath,
    cf: &ClassFile,
    name: &str,
    descriptor: &str,
) -> Result<Option<Found>, ResolveError> {
    resolve_member(classpath, cf, MemberKind::Method, name, descriptor, Lookup::ExcludeStart)
}
