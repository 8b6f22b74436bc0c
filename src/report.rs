//! Scan findings and the sinks that render them.

use std::fmt;
use std::io::{self, Write};

use serde::Serialize;

use crate::classfile::ClassKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Extends,
    Implements,
    UsesType,
    UsesMethod,
    UsesInterfaceMethod,
    UsesField,
    FieldOfType,
    ParameterOfType,
    ReturnOfType,
    Overrides,
}

/// One use of a deprecated API by a scanned class.
///
/// `target` is the deprecated type, or the declaring type for member uses.
/// `detail` carries the member (`name` or `name(desc)ret`) where one is
/// involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub kind: UsageKind,
    pub container_kind: ClassKind,
    pub container: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub for_removal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<String>,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ", self.container_kind, self.container)?;
        let detail = self.detail.as_deref().unwrap_or_default();
        match self.kind {
            UsageKind::Extends => write!(f, "extends deprecated class {}", self.target)?,
            UsageKind::Implements => write!(f, "implements deprecated interface {}", self.target)?,
            UsageKind::UsesType => write!(f, "uses deprecated class {}", self.target)?,
            UsageKind::UsesMethod => write!(f, "uses deprecated method {}::{detail}", self.target)?,
            UsageKind::UsesInterfaceMethod => {
                write!(f, "uses deprecated interface method {}::{detail}", self.target)?
            }
            UsageKind::UsesField => write!(f, "uses deprecated field {}::{detail}", self.target)?,
            UsageKind::FieldOfType => write!(f, "has field {detail} of deprecated type {}", self.target)?,
            UsageKind::ParameterOfType => {
                write!(f, "has method {detail} with parameter of deprecated type {}", self.target)?
            }
            UsageKind::ReturnOfType => {
                write!(f, "has method {detail} with return of deprecated type {}", self.target)?
            }
            UsageKind::Overrides => write!(f, "overrides deprecated method {}::{detail}", self.target)?,
        }
        if self.for_removal {
            f.write_str(" (for removal)")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    ClassNotFound,
    MemberNotFound,
    Cycle,
    Malformed,
    Io,
}

/// A problem met while scanning. Every diagnostic marks the run as failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Class, file or archive entry being processed, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, context: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "error: {context}: {}", self.message),
            None => write!(f, "error: {}", self.message),
        }
    }
}

pub trait ReportSink {
    fn usage(&mut self, usage: &Usage);
    fn error(&mut self, diagnostic: &Diagnostic);
}

/// Human-readable lines: usages to `out`, diagnostics to `err`.
pub struct TextSink<O: Write, E: Write> {
    out: O,
    err: E,
    failure: Option<io::Error>,
}

impl<O: Write, E: Write> TextSink<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self { out, err, failure: None }
    }

    /// Flushes both streams and returns the first write error, if any.
    pub fn finish(mut self) -> io::Result<()> {
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        self.out.flush()?;
        self.err.flush()
    }
}

impl<O: Write, E: Write> ReportSink for TextSink<O, E> {
    fn usage(&mut self, usage: &Usage) {
        if let Err(e) = writeln!(self.out, "{usage}") {
            self.failure.get_or_insert(e);
        }
    }

    fn error(&mut self, diagnostic: &Diagnostic) {
        if let Err(e) = writeln!(self.err, "{diagnostic}") {
            self.failure.get_or_insert(e);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum Event<'a> {
    Usage(&'a Usage),
    Error(&'a Diagnostic),
}

/// One JSON object per line, usages and diagnostics interleaved.
pub struct JsonSink<W: Write> {
    out: W,
    failure: Option<io::Error>,
}

impl<W: Write> JsonSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, failure: None }
    }

    pub fn finish(mut self) -> io::Result<()> {
        if let Some(e) = self.failure.take() {
            return Err(e);
        }
        self.out.flush()
    }

    fn write(&mut self, event: Event<'_>) {
        let result = serde_json::to_writer(&mut self.out, &event)
            .map_err(io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        if let Err(e) = result {
            self.failure.get_or_insert(e);
        }
    }
}

impl<W: Write> ReportSink for JsonSink<W> {
    fn usage(&mut self, usage: &Usage) {
        self.write(Event::Usage(usage));
    }

    fn error(&mut self, diagnostic: &Diagnostic) {
        self.write(Event::Error(diagnostic));
    }
}

#[derive(Debug, Default)]
pub struct CollectingSink {
    pub usages: Vec<Usage>,
    pub errors: Vec<Diagnostic>,
}

impl ReportSink for CollectingSink {
    fn usage(&mut self, usage: &Usage) {
        self.usages.push(usage.clone());
    }

    fn error(&mut self, diagnostic: &Diagnostic) {
        self.errors.push(diagnostic.clone());
    }
}
