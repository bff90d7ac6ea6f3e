//! Hand-rolled number formatting and float parsing.
//!
//! Responses from devices already in the field are parsed by existing host
//! software, so the exact byte layout produced here - padding, justification,
//! truncation, and the rounding behaviour of [`NumberWriter::print_float`] -
//! is part of the protocol.  Do not replace these with `core::fmt`.
//!
//! [`NumberWriter`] only needs [`NumberWriter::put_char`] implemented.  It is
//! implemented by [`crate::command::CommandParser`], which adds response
//! prefixes and CRCs, and by the device channels for direct use.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Formatted output, one byte at a time.
pub trait NumberWriter {
    /// Output a single byte.
    fn put_char(&mut self, c: u8);

    /// Output a string.
    fn put_str(&mut self, s: &str) {
        for &c in s.as_bytes() {
            self.put_char(c);
        }
    }

    /// Output a single hex digit, upper case.
    fn put_nibble(&mut self, n: u8) {
        if n < 10 {
            self.put_char(b'0'.wrapping_add(n));
        } else {
            self.put_char(b'A'.wrapping_add(n - 10));
        }
    }

    /// Output a byte as two hex digits.
    fn put_byte_hex(&mut self, b: u8) {
        self.put_nibble(b >> 4);
        self.put_nibble(b & 0x0f);
    }

    /// Output an unsigned number.
    ///
    /// Arguments:
    /// - `value` - The number
    /// - `width` - 0 to size automatically.  Positive right justifies,
    ///   padding with spaces or zeros.  Negative left justifies, padding
    ///   with trailing spaces.
    /// - `leading_zeros` - Pad with zeros rather than spaces
    /// - `base` - 2 to 16
    /// - `num_factors` - Maximum digit count of a `u32` in `base`
    /// - `max_factor` - Place value of the most significant of those digits
    fn put_number(
        &mut self,
        value: u32,
        width: i8,
        leading_zeros: bool,
        base: u8,
        num_factors: u8,
        max_factor: u32,
    ) {
        let base = base as u32;
        let mut value = value;
        let mut width = width as i16;
        let mut num_factors = num_factors as i16;
        let mut factor = max_factor;
        let mut leading_zeros = leading_zeros;

        if width > 0 {
            while width > num_factors {
                width -= 1;
                self.put_char(if leading_zeros { b'0' } else { b' ' });
            }

            // Drop leading digit positions beyond the width, but never
            // significant ones
            while num_factors > width && value < factor {
                num_factors -= 1;
                factor /= base;
            }
        }

        while factor != 0 {
            let digit = value / factor;

            if digit != 0 || leading_zeros || factor == 1 {
                self.put_nibble(digit as u8);
                value -= digit * factor;

                // Every digit after the first significant one is output
                leading_zeros = true;

                if width < 0 {
                    width += 1;
                }
            } else if width > 0 {
                self.put_char(b' ');
            }

            factor /= base;
        }

        while width < 0 {
            self.put_char(b' ');
            width += 1;
        }
    }

    /// Output `0x` followed by upper case hex.
    fn print_hex(&mut self, value: u32, width: i8, leading_zeros: bool) {
        self.put_str("0x");
        self.put_number(value, width, leading_zeros, 16, 8, 0x1000_0000);
    }

    /// Output a signed decimal.  The sign counts towards `width`.
    fn print_decimal(&mut self, value: i32, width: i8, leading_zeros: bool) {
        let mut width = width;
        if value < 0 {
            self.put_char(b'-');

            if width > 0 {
                width -= 1;
            } else if width < 0 {
                width += 1;
            }
        }

        self.put_number(
            value.unsigned_abs(),
            width,
            leading_zeros,
            10,
            10,
            1_000_000_000,
        );
    }

    /// Output an unsigned decimal.
    fn print_unsigned(&mut self, value: u32, width: i8, leading_zeros: bool) {
        self.put_number(value, width, leading_zeros, 10, 10, 1_000_000_000);
    }

    /// Output all 32 bits in binary, or `width` bits if the value fits.
    fn print_binary(&mut self, value: u32, width: i8) {
        self.put_number(value, width, true, 2, 32, 0x8000_0000);
    }

    /// Output a float as `<integer part>[.<decimal_places digits>]`.
    ///
    /// The fraction is scaled up in `f32` and truncated, so large
    /// `decimal_places` show accumulated rounding error in the last digits.
    fn print_float(&mut self, value: f32, decimal_places: i8) {
        let mut value = value;
        if value < 0.0 {
            self.put_char(b'-');
            value = -value;
        }

        let int_part = value as i32;
        self.print_decimal(int_part, 0, false);

        if decimal_places > 0 {
            self.put_char(b'.');

            let mut fract = value - int_part as f32;
            for _ in 0..decimal_places {
                fract *= 10.0;
            }

            self.print_decimal(fract as i32, decimal_places, true);
        }
    }
}

/// Value which can be output by `print_var()` as `name=value`.
pub trait VarValue {
    fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W);
}

macro_rules! signed_var {
    ($($t:ty),*) => {
        $(impl VarValue for $t {
            fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W) {
                out.print_decimal(*self as i32, 0, false);
            }
        })*
    };
}

macro_rules! unsigned_var {
    ($($t:ty),*) => {
        $(impl VarValue for $t {
            fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W) {
                out.print_unsigned(*self as u32, 0, false);
            }
        })*
    };
}

signed_var!(i8, i16, i32);
unsigned_var!(u8, u16, u32);

impl VarValue for i64 {
    fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W) {
        if let Ok(value) = i32::try_from(*self) {
            out.print_decimal(value, 0, false);
            return;
        }

        // Beyond put_number()'s u32 range
        if *self < 0 {
            out.put_char(b'-');
        }
        let mut value = self.unsigned_abs();
        let mut digits = [0u8; 20];
        let mut count = 0;
        while value != 0 {
            digits[count] = (value % 10) as u8;
            value /= 10;
            count += 1;
        }
        for &digit in digits[..count].iter().rev() {
            out.put_nibble(digit);
        }
    }
}

impl VarValue for &str {
    fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W) {
        out.put_str(self);
    }
}

impl VarValue for f32 {
    fn write_value<W: NumberWriter + ?Sized>(&self, out: &mut W) {
        out.print_float(*self, 6);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Integer,
    Fraction,
    Exponent,
}

/// Parse a float from the start of `input`.
///
/// Accepts an optional sign, digits, a `.` fraction and an `e`/`E` exponent
/// with its own optional sign.  Commas are ignored.  A space ends the number
/// and is not consumed.
///
/// Returns the value and the number of bytes consumed, or `None` on any
/// other character.  Empty input parses as zero.  There is no overflow
/// detection.
pub fn parse_float(input: &[u8]) -> Option<(f32, usize)> {
    let mut negative_mantissa = false;
    let mut negative_exponent = false;
    let mut mantissa = 0.0f32;
    let mut place = 1.0f32;
    let mut exponent: i8 = 0;
    let mut stage = Stage::Integer;
    let mut consumed = 0;

    for &c in input {
        match c {
            b'0'..=b'9' => {
                let digit = c - b'0';
                match stage {
                    Stage::Integer => mantissa = mantissa * 10.0 + digit as f32,
                    Stage::Fraction => {
                        place /= 10.0;
                        mantissa += digit as f32 * place;
                    }
                    Stage::Exponent => {
                        exponent = exponent.wrapping_mul(10).wrapping_add(digit as i8)
                    }
                }
            }
            b'-' => match stage {
                Stage::Integer => negative_mantissa = true,
                Stage::Exponent => negative_exponent = true,
                Stage::Fraction => return None,
            },
            b'+' => {
                if stage == Stage::Fraction {
                    return None;
                }
            }
            b'.' if stage == Stage::Integer => stage = Stage::Fraction,
            b'e' | b'E' => {
                if stage == Stage::Exponent {
                    return None;
                }
                stage = Stage::Exponent;
            }
            b',' => {}
            b' ' => break,
            _ => return None,
        }
        consumed += 1;
    }

    if negative_mantissa {
        mantissa = -mantissa;
    }

    let mut result = mantissa;
    while exponent > 0 {
        if negative_exponent {
            result /= 10.0;
        } else {
            result *= 10.0;
        }
        exponent -= 1;
    }

    Some((result, consumed))
}
