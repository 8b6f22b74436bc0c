//! Scan engine: checks class files against a deprecation database and
//! reports every use of a deprecated API.
//!
//! A [`Scanner`] owns its [`ClassPath`]. Each entry point
//! ([`Scanner::scan_class_name`], [`Scanner::scan_dir`],
//! [`Scanner::scan_jar`]) runs in a fresh session and returns whether it
//! completed without reporting an error.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::archive::{Archive, is_scannable_class};
use crate::classfile::{ClassFile, MemberRef};
use crate::classpath::{ClassBytes, ClassPath, class_files_under};
use crate::deprecation::{DeprecationFact, DeprecationSource};
use crate::descriptor::{MethodSignature, class_name_of, class_ref_name};
use crate::error::{DescriptorError, ResolveError};
use crate::pool::classify;
use crate::report::{Diagnostic, DiagnosticKind, ReportSink, Usage, UsageKind};
use crate::resolve::{Found, MemberKind, find_overridden, resolve_reference};

const INSTANCE_INIT: &str = "<init>";
const CLASS_INIT: &str = "<clinit>";

#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Report only APIs marked `forRemoval`.
    pub for_removal_only: bool,
}

/// Per-run state: names already reported missing and the error flag.
#[derive(Debug, Default)]
pub struct Session {
    missing: HashSet<String>,
    error: bool,
    cancelled: bool,
    classes: usize,
    usages: usize,
}

impl Session {
    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn classes_scanned(&self) -> usize {
        self.classes
    }

    pub fn usages_reported(&self) -> usize {
        self.usages
    }
}

pub struct Scanner<'a> {
    classpath: ClassPath,
    db: &'a dyn DeprecationSource,
    sink: &'a mut dyn ReportSink,
    options: ScanOptions,
    session: Session,
    cancel: Arc<AtomicBool>,
}

impl<'a> Scanner<'a> {
    pub fn new(
        classpath: ClassPath,
        db: &'a dyn DeprecationSource,
        sink: &'a mut dyn ReportSink,
        options: ScanOptions,
    ) -> Self {
        Self {
            classpath,
            db,
            sink,
            options,
            session: Session::default(),
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops directory and jar scans before the next class.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn classpath(&self) -> &ClassPath {
        &self.classpath
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Scans one class by dotted or internal name.
    pub fn scan_class_name(&mut self, name: &str) -> bool {
        self.begin();
        let internal = name.replace('.', "/");
        match self.classpath.read_first(&internal) {
            Some(ClassBytes { bytes, origin }) => self.scan_bytes(&bytes, &format!("{internal} ({origin})")),
            None => {
                self.session.missing.insert(internal.clone());
                self.fail(DiagnosticKind::ClassNotFound, None, format!("class not found: {internal}"));
            }
        }
        self.finish(name)
    }

    /// Registers `dir` on the classpath and scans every class file below it,
    /// in path order.
    pub fn scan_dir(&mut self, dir: &Path) -> bool {
        self.begin();
        if !dir.is_dir() {
            self.fail(
                DiagnosticKind::Io,
                Some(dir.display().to_string()),
                "directory not found",
            );
            return self.finish(&dir.display().to_string());
        }
        self.classpath.add_dir(dir);

        for path in class_files_under(dir) {
            if self.check_cancelled() {
                break;
            }
            let context = path.display().to_string();
            match std::fs::read(&path) {
                Ok(bytes) => self.scan_bytes(&bytes, &context),
                Err(e) => self.fail(DiagnosticKind::Io, Some(context), e.to_string()),
            }
        }
        self.finish(&dir.display().to_string())
    }

    /// Registers `jar` on the classpath and scans its class entries in
    /// archive order.
    pub fn scan_jar(&mut self, jar: &Path) -> bool {
        self.begin();
        let label = jar.display().to_string();
        let archive = match Archive::open(jar) {
            Ok(archive) => archive,
            Err(e) => {
                self.fail(DiagnosticKind::Io, Some(label.clone()), e.to_string());
                return self.finish(&label);
            }
        };
        if let Err(e) = self.classpath.add_jar(jar) {
            self.fail(DiagnosticKind::Io, Some(label.clone()), e.to_string());
            return self.finish(&label);
        }

        let entries: Vec<String> = archive
            .entry_names()
            .into_iter()
            .filter(|name| is_scannable_class(name))
            .collect();
        for entry in entries {
            if self.check_cancelled() {
                break;
            }
            let context = format!("{label}!{entry}");
            match archive.read(&entry) {
                Ok(Some(bytes)) => self.scan_bytes(&bytes, &context),
                Ok(None) => {}
                Err(e) => self.fail(DiagnosticKind::Io, Some(context), e.to_string()),
            }
        }
        self.finish(&label)
    }

    /// Runs every check against one parsed class inside the current session.
    ///
    /// Method descriptors are parsed up front, so a malformed one fails the
    /// class before anything is reported for it.
    pub fn scan_class(&mut self, cf: &ClassFile) -> Result<(), DescriptorError> {
        let signatures = cf
            .methods
            .iter()
            .map(|m| MethodSignature::parse(&m.descriptor))
            .collect::<Result<Vec<_>, _>>()?;
        self.session.classes += 1;
        debug!(class = %cf.this_class, "scanning");

        let db = self.db;

        if let Some(super_class) = &cf.super_class
            && let Some(fact) = db.type_fact(super_class)
        {
            self.report(cf, UsageKind::Extends, super_class, None, fact);
        }
        for interface in &cf.interfaces {
            if let Some(fact) = db.type_fact(interface) {
                self.report(cf, UsageKind::Implements, interface, None, fact);
            }
        }

        let refs = classify(cf);
        let mut seen = HashSet::new();
        for name in refs.classes.iter().filter_map(|n| class_ref_name(n)) {
            if !seen.insert(name) {
                continue;
            }
            if let Some(fact) = db.type_fact(name) {
                self.report(cf, UsageKind::UsesType, name, None, fact);
            }
        }

        for member in &refs.method_refs {
            // Methods invoked on arrays (clone and Object's) have no class file.
            if member.owner.starts_with('[') {
                continue;
            }
            if let Some(owner) = self.declaring_class(cf, member, MemberKind::Method)
                && let Some(fact) = db.method_fact(&owner, &member.name, &member.descriptor)
            {
                let detail = format!("{}{}", member.name, member.descriptor);
                self.report(cf, UsageKind::UsesMethod, &owner, Some(detail), fact);
            }
        }
        for member in &refs.interface_method_refs {
            if let Some(owner) = self.declaring_class(cf, member, MemberKind::Method)
                && let Some(fact) = db.method_fact(&owner, &member.name, &member.descriptor)
            {
                let detail = format!("{}{}", member.name, member.descriptor);
                self.report(cf, UsageKind::UsesInterfaceMethod, &owner, Some(detail), fact);
            }
        }
        for member in &refs.field_refs {
            if let Some(owner) = self.declaring_class(cf, member, MemberKind::Field)
                && let Some(fact) = db.field_fact(&owner, &member.name)
            {
                self.report(cf, UsageKind::UsesField, &owner, Some(member.name.clone()), fact);
            }
        }

        for field in &cf.fields {
            if let Some(type_name) = class_name_of(&field.descriptor)
                && let Some(fact) = db.type_fact(type_name)
            {
                self.report(cf, UsageKind::FieldOfType, type_name, Some(field.name.clone()), fact);
            }
        }

        for (method, signature) in cf.methods.iter().zip(&signatures) {
            let detail = format!("{}{}", method.name, method.descriptor);
            for param in &signature.params {
                if let Some(type_name) = class_name_of(param)
                    && let Some(fact) = db.type_fact(type_name)
                {
                    self.report(cf, UsageKind::ParameterOfType, type_name, Some(detail.clone()), fact);
                }
            }
            if let Some(type_name) = class_name_of(&signature.return_type)
                && let Some(fact) = db.type_fact(type_name)
            {
                self.report(cf, UsageKind::ReturnOfType, type_name, Some(detail.clone()), fact);
            }

            if method.name == INSTANCE_INIT || method.name == CLASS_INIT {
                continue;
            }
            match find_overridden(&self.classpath, cf, &method.name, &method.descriptor) {
                Ok(Some(found)) => {
                    let ancestor = self.accept(cf, found);
                    if let Some(fact) = db.method_fact(&ancestor, &method.name, &method.descriptor) {
                        self.report(cf, UsageKind::Overrides, &ancestor, Some(detail), fact);
                    }
                }
                Ok(None) => {}
                Err(e) => self.resolve_failed(cf, e),
            }
        }

        Ok(())
    }

    fn begin(&mut self) {
        self.session = Session::default();
    }

    fn finish(&self, scanned: &str) -> bool {
        let session = &self.session;
        info!(
            scanned,
            classes = session.classes_scanned(),
            usages = session.usages_reported(),
            errors = session.error,
            cancelled = session.cancelled,
            "scan finished"
        );
        !session.error && !session.cancelled
    }

    fn check_cancelled(&mut self) -> bool {
        if self.cancel.load(Ordering::Relaxed) {
            if !self.session.cancelled {
                warn!("scan cancelled");
            }
            self.session.cancelled = true;
        }
        self.session.cancelled
    }

    fn scan_bytes(&mut self, bytes: &[u8], context: &str) {
        let cf = match ClassFile::parse(bytes) {
            Ok(cf) => cf,
            Err(e) => {
                self.fail(DiagnosticKind::Malformed, Some(context.to_string()), e.to_string());
                return;
            }
        };
        if let Err(e) = self.scan_class(&cf) {
            self.fail(DiagnosticKind::Malformed, Some(cf.this_class.clone()), e.to_string());
        }
    }

    fn declaring_class(
        &mut self,
        cf: &ClassFile,
        member: &MemberRef,
        kind: MemberKind,
    ) -> Option<String> {
        match resolve_reference(&self.classpath, cf, member, kind) {
            Ok(found) => Some(self.accept(cf, found)),
            Err(e) => {
                self.resolve_failed(cf, e);
                None
            }
        }
    }

    /// Reports a superclass the lookup had to skip and returns the owner.
    fn accept(&mut self, cf: &ClassFile, found: Found) -> String {
        if let Some(missing) = found.missing_ancestor {
            self.resolve_failed(cf, ResolveError::ClassNotFound(missing));
        }
        found.owner
    }

    fn resolve_failed(&mut self, cf: &ClassFile, error: ResolveError) {
        let kind = match &error {
            ResolveError::ClassNotFound(name) => {
                if !self.session.missing.insert(name.clone()) {
                    self.session.error = true;
                    return;
                }
                DiagnosticKind::ClassNotFound
            }
            ResolveError::MemberNotFound { .. } => DiagnosticKind::MemberNotFound,
            ResolveError::Cycle(_) => DiagnosticKind::Cycle,
        };
        self.fail(kind, Some(cf.this_class.clone()), error.to_string());
    }

    fn fail(&mut self, kind: DiagnosticKind, context: Option<String>, message: impl Into<String>) {
        self.session.error = true;
        self.sink.error(&Diagnostic::new(kind, context, message));
    }

    fn report(
        &mut self,
        cf: &ClassFile,
        kind: UsageKind,
        target: &str,
        detail: Option<String>,
        fact: &DeprecationFact,
    ) {
        if self.options.for_removal_only && !fact.for_removal {
            return;
        }
        self.session.usages += 1;
        self.sink.usage(&Usage {
            kind,
            container_kind: cf.kind(),
            container: cf.this_class.clone(),
            target: target.to_string(),
            detail,
            for_removal: fact.for_removal,
            since: fact.since.clone(),
        });
    }
}
