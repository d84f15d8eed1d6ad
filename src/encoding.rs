//! Exposition format implementations.

use std::fmt::Write;

pub mod text;

/// Writes a sample value.
///
/// Integral values are written without a fractional part, everything else in
/// the shortest representation that round-trips.
pub(crate) fn write_value<W: Write>(writer: &mut W, v: f64) -> Result<(), std::fmt::Error> {
    if v.is_nan() {
        return writer.write_str("NaN");
    }
    if v.is_infinite() {
        return writer.write_str(if v.is_sign_positive() { "+Inf" } else { "-Inf" });
    }

    // Largest magnitude below which every integer is exactly representable.
    const EXACT: f64 = 9_007_199_254_740_992.0;
    if v.fract() == 0.0 && v.abs() < EXACT {
        writer.write_str(itoa::Buffer::new().format(v as i64))
    } else {
        writer.write_str(dtoa::Buffer::new().format(v))
    }
}

/// Writes a label value, escaping backslash, double quote and line feed.
pub(crate) fn write_label_value<W: Write>(writer: &mut W, v: &str) -> Result<(), std::fmt::Error> {
    for c in v.chars() {
        match c {
            '\\' => writer.write_str("\\\\")?,
            '"' => writer.write_str("\\\"")?,
            '\n' => writer.write_str("\\n")?,
            c => writer.write_char(c)?,
        }
    }
    Ok(())
}

/// Writes help text, escaping backslash and line feed.
pub(crate) fn write_help<W: Write>(writer: &mut W, help: &str) -> Result<(), std::fmt::Error> {
    for c in help.chars() {
        match c {
            '\\' => writer.write_str("\\\\")?,
            '\n' => writer.write_str("\\n")?,
            c => writer.write_char(c)?,
        }
    }
    Ok(())
}
