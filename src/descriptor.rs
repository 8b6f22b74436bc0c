//! JVM descriptor parsing.
//!
//! Method descriptors are decoded by a single left-to-right pass with an
//! explicit mode and a pending array-dimension counter. Parameter and return
//! types are kept in raw descriptor form (`I`, `[Ljava/lang/String;`) since
//! every consumer only needs the class name behind them.

use crate::error::DescriptorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub params: Vec<String>,
    pub return_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Start,
    Params,
    Return,
    Done,
}

impl MethodSignature {
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let bytes = descriptor.as_bytes();
        let mut mode = Mode::Start;
        let mut dims = 0usize;
        let mut params = Vec::new();
        let mut return_type = None;

        let mut pos = 0usize;
        while pos < bytes.len() {
            let c = bytes[pos];
            let type_start = pos - dims;
            let mut type_end = None;

            match (mode, c) {
                (Mode::Start, b'(') => mode = Mode::Params,
                (Mode::Start, _) => {
                    return Err(DescriptorError::new(descriptor, "expected '('"));
                }
                (Mode::Done, _) => {
                    return Err(DescriptorError::new(
                        descriptor,
                        "trailing characters after return type",
                    ));
                }
                (Mode::Params, b')') => {
                    if dims != 0 {
                        return Err(DescriptorError::new(
                            descriptor,
                            "array dimension without element type",
                        ));
                    }
                    mode = Mode::Return;
                }
                (_, b'[') => dims += 1,
                (_, b'L') => {
                    let Some(offset) = descriptor[pos..].find(';') else {
                        return Err(DescriptorError::new(descriptor, "unterminated class type"));
                    };
                    if offset == 1 {
                        return Err(DescriptorError::new(descriptor, "empty class name"));
                    }
                    pos += offset;
                    type_end = Some(pos);
                }
                (_, b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => type_end = Some(pos),
                (Mode::Return, b'V') if dims == 0 => type_end = Some(pos),
                _ => {
                    return Err(DescriptorError::new(descriptor, "unexpected character"));
                }
            }

            if let Some(end) = type_end {
                let ty = descriptor[type_start..=end].to_string();
                dims = 0;
                if mode == Mode::Params {
                    params.push(ty);
                } else {
                    return_type = Some(ty);
                    mode = Mode::Done;
                }
            }
            pos += 1;
        }

        match (mode, return_type) {
            (Mode::Done, Some(return_type)) => Ok(Self {
                params,
                return_type,
            }),
            (Mode::Start, _) => Err(DescriptorError::new(descriptor, "expected '('")),
            (Mode::Params, _) => Err(DescriptorError::new(descriptor, "missing ')'")),
            _ if dims != 0 => Err(DescriptorError::new(
                descriptor,
                "array dimension without element type",
            )),
            _ => Err(DescriptorError::new(descriptor, "missing return type")),
        }
    }
}

/// Class named by a field descriptor, with array dimensions and the
/// `L...;` wrapper stripped. `None` for primitive (and `void`) types.
pub fn class_name_of(descriptor: &str) -> Option<&str> {
    descriptor
        .trim_start_matches('[')
        .strip_prefix('L')?
        .strip_suffix(';')
        .filter(|name| !name.is_empty())
}

/// Class named by a `CONSTANT_Class` entry, which holds either a bare
/// internal name or an array descriptor.
pub fn class_ref_name(name: &str) -> Option<&str> {
    if name.starts_with('[') {
        class_name_of(name)
    } else if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
