use crate::compile::{CompileErrorKind, CompilerError};

/// Size of the scratch buffer each purified name fragment must fit in, terminator included.
pub const SYMBOL_CAPACITY: usize = 64;

/// Maps `name` onto `[A-Za-z0-9_]`, byte for byte.
///
/// Names that would not fit in `capacity` (counting the terminator) are an error; a
/// truncated fragment could collide with another symbol.
pub fn purify(name: &str, capacity: usize) -> Result<String, CompilerError> {
    if name.len() >= capacity {
        return Err(CompilerError::new(
            CompileErrorKind::Symbol,
            format!(
                "name {name:?} is {} bytes, symbol fragments are limited to {}",
                name.len(),
                capacity.saturating_sub(1)
            ),
        ));
    }
    Ok(name
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() {
                b as char
            } else {
                '_'
            }
        })
        .collect())
}

pub(crate) fn c_escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'\\' => out.push_str("\\\\"),
            b'"' => out.push_str("\\\""),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            0x20..=0x7E => out.push(b as char),
            _ => out.push_str(&format!("\\{:03o}", b)),
        }
    }
    out
}
