//! Fixed-point (IQ) sample formats.
//!
//! A [`DataFormat`] describes a packed array of signed integers where every
//! element carries `i` integer bits and `q` fractional bits. Descriptors are
//! written as `i<N>q<M>`, once per element, so `i16q16i16q16i16q16` describes
//! three q16.16 values. Either half may be omitted (`q15` is `i0q15`).
//!
//! ```
//! use bringup_common::fixed::{DataFormat, FormatOptions, write_values};
//!
//! let format: DataFormat = "i24q8".parse().unwrap();
//! let mut line = heapless::String::<32>::new();
//! write_values(&mut line, &[6400i32 + 128], &format, FormatOptions::new(true, 3)).unwrap();
//! assert_eq!(line, " 25.500");
//! ```

use core::fmt::{self, Write};
use core::str::FromStr;

/// Largest number of fractional digits [`write_values`] prints.
pub const MAX_PRECISION: u8 = 6;

const PRECISION_MULTIPLIER: [u32; MAX_PRECISION as usize + 1] =
    [1, 10, 100, 1_000, 10_000, 100_000, 1_000_000];

/// Shape of one fixed-point sample array.
///
/// The default value `{0, 0, 0}` doubles as the "no format" sentinel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DataFormat {
    i: u8,
    q: u8,
    n: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    Empty,
    /// A byte that is neither `i`, `q` nor a decimal digit, or a digit before
    /// the first `i`/`q`.
    UnexpectedCharacter { position: usize, byte: u8 },
    /// An element whose widths differ from the first element.
    Inconsistent { position: usize },
    /// A width or the element count does not fit in a `u8`.
    Overflow,
    /// `i + q` exceeds 32 bits.
    TooWide,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("empty format descriptor"),
            Self::UnexpectedCharacter { position, byte } => {
                write!(f, "unexpected character {:?} at {}", *byte as char, position)
            }
            Self::Inconsistent { position } => {
                write!(f, "element ending at {} differs from the first", position)
            }
            Self::Overflow => f.write_str("width or count overflow"),
            Self::TooWide => f.write_str("element wider than 32 bits"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    First,
    IValue,
    QValue,
}

impl DataFormat {
    /// Returns `None` when `i + q` exceeds 32 bits.
    pub const fn new(i: u8, q: u8, n: u8) -> Option<Self> {
        if i as u16 + q as u16 > 32 {
            None
        } else {
            Some(Self { i, q, n })
        }
    }

    /// Parses an `i<N>q<M>[i<N>q<M>...]` descriptor.
    pub fn parse(descriptor: &str) -> Result<Self, ParseError> {
        if descriptor.is_empty() {
            return Err(ParseError::Empty);
        }

        let bytes = descriptor.as_bytes();
        let mut state = State::First;
        let mut element = (0u8, 0u8);
        let mut first: Option<(u8, u8)> = None;
        let mut count = 0u8;

        // One extra iteration past the end closes the trailing element.
        for position in 0..=bytes.len() {
            let close = match bytes.get(position).copied() {
                None => true,
                Some(b'i') => {
                    let close = state != State::First;
                    state = State::IValue;
                    close
                }
                Some(b'q') => {
                    let close = state == State::QValue;
                    state = State::QValue;
                    close
                }
                Some(byte @ b'0'..=b'9') => {
                    let width = match state {
                        State::IValue => &mut element.0,
                        State::QValue => &mut element.1,
                        State::First => {
                            return Err(ParseError::UnexpectedCharacter { position, byte })
                        }
                    };
                    *width = width
                        .checked_mul(10)
                        .and_then(|w| w.checked_add(byte - b'0'))
                        .ok_or(ParseError::Overflow)?;
                    false
                }
                Some(byte) => return Err(ParseError::UnexpectedCharacter { position, byte }),
            };

            if close {
                match first {
                    Some(first) if first != element => {
                        return Err(ParseError::Inconsistent { position })
                    }
                    Some(_) => {}
                    None => first = Some(element),
                }
                count = count.checked_add(1).ok_or(ParseError::Overflow)?;
                element = (0, 0);
            }
        }

        let Some((i, q)) = first else {
            return Err(ParseError::Empty);
        };
        trace!("parsed i{}q{} x{}", i, q, count);
        Self::new(i, q, count).ok_or(ParseError::TooWide)
    }

    /// Like [`DataFormat::parse`] but yields the zero sentinel on failure.
    pub fn parse_or_zero(descriptor: &str) -> Self {
        Self::parse(descriptor).unwrap_or_default()
    }

    pub const fn integer_bits(&self) -> u8 {
        self.i
    }

    pub const fn fractional_bits(&self) -> u8 {
        self.q
    }

    /// Number of elements.
    pub const fn count(&self) -> u8 {
        self.n
    }

    /// Bits per element, `i + q`.
    pub const fn width(&self) -> u8 {
        self.i + self.q
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    fn scale(&self) -> u64 {
        1u64 << self.q
    }

    /// Splits `raw` into sign, integer part and the fractional part scaled by
    /// `multiplier` (truncated).
    pub fn to_decimal(&self, raw: i32, multiplier: u32) -> DecimalNumber {
        let absolute = u64::from(raw.unsigned_abs());
        let scale = self.scale();
        DecimalNumber {
            negative: raw < 0,
            integer: (absolute / scale) as u32,
            decimal: ((absolute & (scale - 1)) * u64::from(multiplier) / scale) as u32,
        }
    }

    /// Smallest raw value whose [`DataFormat::to_decimal`] rendering at
    /// `multiplier` is `number`. `None` if it does not fit in an `i32`.
    pub fn from_decimal(&self, number: &DecimalNumber, multiplier: u32) -> Option<i32> {
        let scale = u128::from(self.scale());
        let fraction = match u128::from(multiplier) {
            0 => 0,
            m => (u128::from(number.decimal) * scale + m - 1) / m,
        };
        let absolute = u128::from(number.integer) * scale + fraction;
        let absolute = i64::try_from(absolute).ok()?;
        i32::try_from(if number.negative { -absolute } else { absolute }).ok()
    }

    pub fn to_f32(&self, raw: i32) -> f32 {
        raw as f32 / self.scale() as f32
    }
}

impl FromStr for DataFormat {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// One decoded sample ready for printing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DecimalNumber {
    pub negative: bool,
    pub integer: u32,
    pub decimal: u32,
}

/// Signed integer types that can carry a fixed-point sample.
pub trait Sample: Copy {
    const BITS: u8;

    fn widen(self) -> i32;
}

impl Sample for i8 {
    const BITS: u8 = 8;

    fn widen(self) -> i32 {
        self.into()
    }
}

impl Sample for i16 {
    const BITS: u8 = 16;

    fn widen(self) -> i32 {
        self.into()
    }
}

impl Sample for i32 {
    const BITS: u8 = 32;

    fn widen(self) -> i32 {
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FormatOptions {
    /// Print a sign column (`-` or a space) before every value. Without it
    /// negative values print their magnitude.
    pub sign: bool,
    /// Fractional digits, at most [`MAX_PRECISION`].
    pub precision: u8,
}

impl FormatOptions {
    pub const fn new(sign: bool, precision: u8) -> Self {
        Self { sign, precision }
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self::new(true, 3)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FormatError {
    Precision(u8),
    Width { format: u8, sample: u8 },
    MissingValues { expected: u8, provided: usize },
    /// The sink ran out of space.
    Write,
}

impl From<fmt::Error> for FormatError {
    fn from(_: fmt::Error) -> Self {
        Self::Write
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precision(p) => write!(f, "precision {} above {}", p, MAX_PRECISION),
            Self::Width { format, sample } => {
                write!(f, "{}-bit format for {}-bit samples", format, sample)
            }
            Self::MissingValues { expected, provided } => {
                write!(f, "expected {} values, got {}", expected, provided)
            }
            Self::Write => f.write_str("output full"),
        }
    }
}

struct Counter<'a, W> {
    inner: &'a mut W,
    written: usize,
}

impl<W: Write> Write for Counter<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_str(s)?;
        self.written += s.len();
        Ok(())
    }
}

/// Writes the first `format.count()` samples of `values` as decimal text,
/// separated by single spaces. Returns the number of characters written.
pub fn write_values<T: Sample, W: Write>(
    out: &mut W,
    values: &[T],
    format: &DataFormat,
    options: FormatOptions,
) -> Result<usize, FormatError> {
    if options.precision > MAX_PRECISION {
        return Err(FormatError::Precision(options.precision));
    }
    let width = format.width();
    if !matches!(width, 8 | 16 | 32) || width != T::BITS {
        return Err(FormatError::Width { format: width, sample: T::BITS });
    }
    let count = usize::from(format.count());
    if values.len() < count {
        return Err(FormatError::MissingValues { expected: format.count(), provided: values.len() });
    }

    let multiplier = PRECISION_MULTIPLIER[usize::from(options.precision)];
    let digits = usize::from(options.precision);
    let mut out = Counter { inner: out, written: 0 };

    for (index, value) in values[..count].iter().enumerate() {
        let number = format.to_decimal(value.widen(), multiplier);
        if index > 0 {
            out.write_char(' ')?;
        }
        if options.sign {
            out.write_char(if number.negative { '-' } else { ' ' })?;
        }
        write!(out, "{}", number.integer)?;
        if digits > 0 {
            write!(out, ".{:0digits$}", number.decimal)?;
        }
    }
    Ok(out.written)
}
