//! Text wire format.
//!
//! One ASCII line per sample, the three accelerometer axes with exactly two
//! decimals: `"<ax>,<ay>,<az>\n"`. Startup diagnostics share the link but
//! never parse as data lines.

use core::fmt::Write as _;

use heapless::String;

use crate::sensor::Vector3;

/// Room for three `-` + 39 digits + `.dd` fields, two commas and the newline:
/// the widest any finite `f32` can print.
pub const LINE_CAPACITY: usize = 136;

pub type Line = String<LINE_CAPACITY>;

pub const FOUND_SUFFIX: &str = " Found!\n";
pub const MISSING_PREFIX: &str = "Failed to find ";
pub const MISSING_SUFFIX: &str = " chip\n";
pub const UNCONFIGURED_PREFIX: &str = "Failed to configure ";
pub const UNCONFIGURED_SUFFIX: &str = "\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    NonFinite,
    Overflow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    FieldCount(usize),
    BadField(usize),
}

pub fn format_accel_line(accel: &Vector3) -> Result<Line, FormatError> {
    if !accel.is_finite() {
        return Err(FormatError::NonFinite);
    }
    let mut line = Line::new();
    writeln!(line, "{:.2},{:.2},{:.2}", accel.x, accel.y, accel.z)
        .map_err(|_| FormatError::Overflow)?;
    Ok(line)
}

/// Decodes one data line. The trailing `\n` or `\r\n` is optional; anything
/// other than three `-?\d+\.\d{2}` fields is rejected.
pub fn parse_line(line: &str) -> Result<Vector3, ParseError> {
    let line = line
        .strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line);

    let mut values = [0.0f32; 3];
    let mut count = 0;
    for (i, field) in line.split(',').enumerate() {
        if i < 3 {
            if !is_fixed_two(field) {
                return Err(ParseError::BadField(i));
            }
            values[i] = field.parse().map_err(|_| ParseError::BadField(i))?;
        }
        count += 1;
    }
    if count != 3 {
        return Err(ParseError::FieldCount(count));
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

fn is_fixed_two(field: &str) -> bool {
    let digits = field.strip_prefix('-').unwrap_or(field);
    match digits.split_once('.') {
        Some((int, frac)) => {
            !int.is_empty()
                && int.bytes().all(|b| b.is_ascii_digit())
                && frac.len() == 2
                && frac.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}
