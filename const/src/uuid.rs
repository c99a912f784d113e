use std::fmt::{Debug, Display, Formatter};
use std::num::{NonZeroU128, NonZeroU16};
use std::str::FromStr;

use structbuf::Unpack;

const SHIFT: u32 = u128::BITS - u32::BITS;
const BASE: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;
const MASK_16: u128 = !((u16::MAX as u128) << SHIFT);

/// Error returned when parsing a UUID from its text representation.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum UuidError {
    #[error("UUID string should be 4 hex digits or 128 bit, got {0} characters")]
    InvalidLength(usize),
    #[error("invalid UUID character {0:?}")]
    InvalidDigit(char),
    #[error("UUID must not be zero")]
    Zero,
}

/// 16- or 128-bit UUID ([Vol 3] Part B, Section 2.5.1).
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(NonZeroU128);

impl Uuid {
    /// UUID size in bytes.
    pub const BYTES: usize = std::mem::size_of::<Self>();

    /// Creates a UUID from a `u128`.
    #[inline]
    #[must_use]
    pub const fn new(v: u128) -> Option<Self> {
        match NonZeroU128::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns a [`Uuid16`] representation or [`None`] if the UUID is not a
    /// 16-bit SIG UUID.
    #[inline]
    #[must_use]
    pub fn as_uuid16(self) -> Option<Uuid16> {
        self.as_u16().map(uuid16)
    }

    /// Converts a 16-bit Bluetooth SIG UUID to `u16`.
    #[inline]
    #[must_use]
    pub fn as_u16(self) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        let v = (self.0.get() >> SHIFT) as u16;
        (self.0.get() & MASK_16 == BASE && v > 0).then_some(v)
    }

    /// Returns the full 128-bit value.
    #[inline(always)]
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0.get()
    }

    /// Returns the UUID as a little-endian byte array. This is the 128-bit
    /// form used in advertising data, even for 16-bit UUIDs.
    #[inline]
    #[must_use]
    pub const fn to_bytes(self) -> [u8; Self::BYTES] {
        self.0.get().to_le_bytes()
    }
}

impl From<Uuid16> for Uuid {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.as_uuid()
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0.get()
    }
}

impl TryFrom<&[u8]> for Uuid {
    type Error = ();

    #[inline]
    fn try_from(v: &[u8]) -> Result<Self, Self::Error> {
        match v.len() {
            Self::BYTES => Self::new(v.unpack().u128()),
            Uuid16::BYTES => Uuid16::new(v.unpack().u16()).map(Uuid16::as_uuid),
            _ => None,
        }
        .ok_or(())
    }
}

impl FromStr for Uuid {
    type Err = UuidError;

    /// Parses either 4 hex digits (optionally prefixed with `0x`) or a 128-bit
    /// UUID with or without dashes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let short = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if short.len() == 4 {
            #[allow(clippy::cast_possible_truncation)]
            let v = hex(short)? as u16;
            return Uuid16::new(v).map(Uuid16::as_uuid).ok_or(UuidError::Zero);
        }
        let v = match s.len() {
            32 => hex(s)?,
            36 => {
                for (i, c) in s.char_indices() {
                    if matches!(i, 8 | 13 | 18 | 23) != (c == '-') {
                        return Err(UuidError::InvalidDigit(c));
                    }
                }
                hex(&s.replace('-', ""))?
            }
            n => return Err(UuidError::InvalidLength(n)),
        };
        Self::new(v).ok_or(UuidError::Zero)
    }
}

/// Parses a string of hex digits.
fn hex(s: &str) -> Result<u128, UuidError> {
    s.chars().try_fold(0_u128, |v, c| {
        let d = c.to_digit(16).ok_or(UuidError::InvalidDigit(c))?;
        Ok(v << 4 | u128::from(d))
    })
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        #[allow(clippy::cast_possible_truncation)]
        if let Some(v) = self.as_u16() {
            write!(f, "{v:#06X}")
        } else {
            let v = self.0.get();
            write!(
                f,
                "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
                (v >> 96) as u32,
                (v >> 80) as u16,
                (v >> 64) as u16,
                (v >> 48) as u16,
                (v & ((1 << 48) - 1)) as u64
            )
        }
    }
}

impl Display for Uuid {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

/// 16-bit Bluetooth SIG UUID.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Uuid16(NonZeroU16);

impl Uuid16 {
    /// UUID size in bytes.
    pub const BYTES: usize = std::mem::size_of::<Self>();

    /// Creates a 16-bit SIG UUID from a `u16`.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Option<Self> {
        match NonZeroU16::new(v) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Returns 128-bit UUID representation.
    #[inline]
    #[must_use]
    pub const fn as_uuid(self) -> Uuid {
        // SAFETY: Always non-zero
        unsafe { Uuid(NonZeroU128::new_unchecked((self.0.get() as u128) << SHIFT | BASE)) }
    }

    /// Returns the raw 16-bit UUID value.
    #[inline(always)]
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0.get()
    }
}

impl Debug for Uuid16 {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#06X}", self.0.get())
    }
}

impl Display for Uuid16 {
    #[inline(always)]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Uuid16> for u16 {
    #[inline]
    fn from(u: Uuid16) -> Self {
        u.raw()
    }
}

/// Creates a 16-bit SIG UUID from a `u16`.
#[inline]
#[must_use]
pub(crate) const fn uuid16(v: u16) -> Uuid16 {
    // SAFETY: All crate uses guarantee that v != 0
    Uuid16(unsafe { NonZeroU16::new_unchecked(v) })
}
