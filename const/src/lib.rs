//! Bluetooth assigned numbers used by the GATT server bridge.

#![warn(missing_debug_implementations)]
#![warn(non_ascii_idents)]
#![warn(single_use_lifetimes)]
#![warn(unused_crate_dependencies)]
#![warn(unused_extern_crates)]
#![warn(unused_import_braces)]
#![warn(unused_lifetimes)]
#![warn(unused_qualifications)]
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::inline_always)]
#![allow(clippy::module_name_repetitions)]
#![warn(clippy::assertions_on_result_states)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::get_unwrap)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::print_stdout)]
#![warn(clippy::str_to_string)]
#![warn(clippy::todo)]
#![warn(clippy::try_err)]
#![warn(clippy::undocumented_unsafe_blocks)]

pub use uuid::*;

mod uuid;

/// GATT descriptor UUIDs ([Assigned Numbers] Section 3.7).
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Ord,
    PartialEq,
    PartialOrd,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[cfg_attr(test, derive(enum_iterator::Sequence))]
#[non_exhaustive]
#[repr(u16)]
pub enum Descriptor {
    CharacteristicExtendedProperties = 0x2900,
    CharacteristicUserDescription = 0x2901,
    ClientCharacteristicConfiguration = 0x2902,
    ServerCharacteristicConfiguration = 0x2903,
    CharacteristicPresentationFormat = 0x2904,
}

impl Descriptor {
    /// Returns the `Uuid` representation of the variant.
    #[inline]
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        self.uuid16().as_uuid()
    }

    /// Returns the `Uuid16` representation of the variant.
    #[inline(always)]
    #[must_use]
    pub const fn uuid16(self) -> Uuid16 {
        uuid16(self as _)
    }
}

impl std::fmt::Display for Descriptor {
    #[inline(always)]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

impl TryFrom<Uuid16> for Descriptor {
    type Error = num_enum::TryFromPrimitiveError<Self>;

    #[inline]
    fn try_from(u: Uuid16) -> Result<Self, Self::Error> {
        use num_enum::TryFromPrimitive;
        Self::try_from_primitive(u.raw())
    }
}

impl PartialEq<Descriptor> for Uuid {
    #[inline(always)]
    fn eq(&self, rhs: &Descriptor) -> bool {
        *self == rhs.uuid()
    }
}

impl From<Descriptor> for Uuid {
    #[inline]
    fn from(v: Descriptor) -> Self {
        v.uuid()
    }
}

#[cfg(test)]
mod tests {
    use enum_iterator::all;

    use super::*;

    #[test]
    fn descriptor_uuids() {
        for d in all::<Descriptor>() {
            let u = d.uuid();
            assert_eq!(u.as_u16(), Some(u16::from(d)));
            assert_eq!(Descriptor::try_from(d.uuid16()).unwrap(), d);
            assert_eq!(u, d);
        }
        assert_eq!(
            Descriptor::ClientCharacteristicConfiguration.uuid16(),
            Uuid16::new(0x2902).unwrap()
        );
    }
}
