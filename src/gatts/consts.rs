use std::fmt::{Display, Formatter};

use bitflags::bitflags;

/// Default ATT MTU before any exchange ([Vol 3] Part F, Section 3.2.8).
pub const DEFAULT_MTU: u16 = 23;

/// Size of the stack's attribute value response buffer.
pub const MAX_ATTR_LEN: usize = 600;

bitflags! {
    /// Characteristic properties ([Vol 3] Part G, Section 3.3.1.1).
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Prop: u8 {
        /// Permits broadcasts of the characteristic value.
        const BROADCAST = 0x01;
        /// Permits reads of the characteristic value.
        const READ = 0x02;
        /// Permits writes of the characteristic value without response.
        const WRITE_NO_RESP = 0x04;
        /// Permits writes of the characteristic value with response.
        const WRITE = 0x08;
        /// Permits notifications of the characteristic value. Requires a
        /// Client Characteristic Configuration descriptor.
        const NOTIFY = 0x10;
        /// Permits indications of the characteristic value.
        const INDICATE = 0x20;
    }
}

bitflags! {
    /// Attribute permissions in the vendor stack encoding.
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    #[repr(transparent)]
    pub struct Perm: u16 {
        const READ = 1 << 0;
        const WRITE = 1 << 4;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

bitflags! {
    /// Event classes that are logged as they arrive. Mirrors the scripting
    /// runtime's BLE debug level.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
    #[repr(transparent)]
    #[serde(transparent)]
    pub struct DebugFlags: u8 {
        const GATTS = 1 << 0;
        const GATTC = 1 << 1;
        const GAP = 1 << 2;
    }
}

/// GATT status codes reported by stack events.
#[derive(
    Clone, Copy, Debug, Eq, Hash, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive,
)]
#[non_exhaustive]
#[repr(u8)]
pub enum GattStatus {
    Ok = 0x00,
    InvalidHandle = 0x01,
    ReadNotPermit = 0x02,
    WriteNotPermit = 0x03,
    InvalidPdu = 0x04,
    InsufAuthentication = 0x05,
    ReqNotSupported = 0x06,
    InvalidOffset = 0x07,
    InsufAuthorization = 0x08,
    PrepareQFull = 0x09,
    NotFound = 0x0A,
    NotLong = 0x0B,
    InsufKeySize = 0x0C,
    InvalidAttrLen = 0x0D,
    ErrUnlikely = 0x0E,
    InsufEncryption = 0x0F,
    UnsupportGrpType = 0x10,
    InsufResource = 0x11,
    NoResources = 0x80,
    InternalError = 0x81,
    WrongState = 0x82,
    DbFull = 0x83,
    Busy = 0x84,
    Error = 0x85,
    CmdStarted = 0x86,
    IllegalParameter = 0x87,
    Pending = 0x88,
    AuthFail = 0x89,
    More = 0x8A,
    InvalidCfg = 0x8B,
    ServiceStarted = 0x8C,
    EncryptedNoMitm = 0x8D,
    NotEncrypted = 0x8E,
    Congested = 0x8F,
}

impl GattStatus {
    /// Converts a raw status code, mapping unknown codes to [`Self::Error`].
    #[inline]
    #[must_use]
    pub fn from_raw(v: u8) -> Self {
        Self::try_from(v).unwrap_or(Self::Error)
    }

    /// Returns whether the status indicates success.
    #[inline(always)]
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl Display for GattStatus {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}({:#04X})", u8::from(*self))
    }
}

/// GATT server event codes in the vendor stack numbering.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    enum_iterator::Sequence,
    num_enum::IntoPrimitive,
    num_enum::TryFromPrimitive,
)]
#[repr(u8)]
pub enum EventKind {
    Reg = 0,
    Read = 1,
    Write = 2,
    ExecWrite = 3,
    Mtu = 4,
    Conf = 5,
    Unreg = 6,
    Create = 7,
    AddInclSrvc = 8,
    AddChar = 9,
    AddCharDescr = 10,
    Delete = 11,
    Start = 12,
    Stop = 13,
    Connect = 14,
    Disconnect = 15,
    Open = 16,
    CancelOpen = 17,
    Close = 18,
    Listen = 19,
    Congest = 20,
}

impl Display for EventKind {
    #[inline]
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}Evt")
    }
}
