//! # deprscan
//!
//! Finds uses of deprecated APIs in compiled JVM class files, without
//! loading or running them.
//!
//! ## Architecture
//!
//! - **descriptor**: Method and field descriptor parsing
//! - **classfile**: Binary class file reader (constant pool, members, `@Deprecated`)
//! - **pool**: Constant pool references grouped by kind
//! - **archive**: Memory-mapped jar and jmod access
//! - **classpath**: Ordered class lookup over directories, jars and the runtime image
//! - **runtime**: Module-organised runtime image (`jmods/` or exploded)
//! - **resolve**: JVM member lookup across superclasses and interfaces
//! - **deprecation**: Deprecation facts from JSON, `#jdepr1` CSV or annotations
//! - **report**: Usage events and their text, JSON and in-memory sinks
//! - **scan**: Scan engine, sessions and the class/directory/jar entry points
//! - **config**: CLI/environment resolution, JDK discovery and logging setup

pub mod archive;
pub mod classfile;
pub mod classpath;
pub mod cli;
pub mod config;
pub mod deprecation;
pub mod descriptor;
pub mod error;
pub mod pool;
pub mod report;
pub mod resolve;
pub mod runtime;
pub mod scan;

#[cfg(test)]
mod fixtures;
