use std::num::NonZeroI32;

use smallvec::SmallVec;

use crate::le::RawAddr;

use super::*;

/// Non-zero error code returned by a synchronous stack call.
#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
#[error("stack call failed with error {0:#X}")]
pub struct StackError(pub NonZeroI32);

/// Result of a synchronous stack call.
pub type StackResult = std::result::Result<(), StackError>;

/// Service identity passed to `create_service`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ServiceId {
    pub uuid: Uuid,
    pub is_primary: bool,
    pub inst_id: u8,
}

/// Attribute value sent in a read response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AttrValue {
    pub handle: u16,
    pub offset: u16,
    pub value: SmallVec<[u8; DEFAULT_MTU as usize]>,
}

/// Imperative interface of the vendor GATT server stack. Every call returns
/// immediately; completion is reported later through an [`Event`].
pub trait Stack {
    fn app_register(&mut self, app_id: u16) -> StackResult;
    fn app_unregister(&mut self, gatts_if: GattIf) -> StackResult;
    fn create_service(&mut self, gatts_if: GattIf, id: ServiceId, num_handles: u16)
        -> StackResult;
    fn start_service(&mut self, service: Handle) -> StackResult;
    fn delete_service(&mut self, service: Handle) -> StackResult;
    fn add_char(&mut self, service: Handle, uuid: Uuid, perm: Perm, props: Prop) -> StackResult;
    fn add_char_descr(&mut self, service: Handle, uuid: Uuid, perm: Perm) -> StackResult;
    fn send_response(
        &mut self,
        gatts_if: GattIf,
        conn_id: ConnId,
        trans_id: u32,
        status: GattStatus,
        rsp: Option<&AttrValue>,
    ) -> StackResult;

    /// Starts GAP advertising. Advertising configuration is owned by the GAP
    /// layer.
    fn start_advertising(&mut self) -> StackResult;
}

/// Peer read request parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReadParams {
    pub conn_id: ConnId,
    pub trans_id: u32,
    pub bda: RawAddr,
    pub handle: u16,
    pub offset: u16,
    pub is_long: bool,
}

/// Peer write request parameters.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WriteParams {
    pub conn_id: ConnId,
    pub trans_id: u32,
    pub bda: RawAddr,
    pub handle: u16,
    pub offset: u16,
    pub need_rsp: bool,
    pub is_prep: bool,
    pub value: Vec<u8>,
}

/// Inbound GATT server event. Raw handles are zero when the stack has none
/// to report.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Event {
    Reg {
        status: GattStatus,
        app_id: u16,
    },
    Read(ReadParams),
    Write(WriteParams),
    ExecWrite,
    Mtu {
        conn_id: ConnId,
        mtu: u16,
    },
    Conf,
    Unreg,
    Create {
        status: GattStatus,
        service_handle: u16,
    },
    AddInclSrvc,
    AddChar {
        status: GattStatus,
        attr_handle: u16,
        service_handle: u16,
        char_uuid: Option<Uuid>,
    },
    AddCharDescr {
        status: GattStatus,
        attr_handle: u16,
        service_handle: u16,
        descr_uuid: Option<Uuid>,
    },
    Delete {
        status: GattStatus,
        service_handle: u16,
    },
    Start {
        status: GattStatus,
        service_handle: u16,
    },
    Stop,
    Connect {
        conn_id: ConnId,
        remote_bda: RawAddr,
    },
    Disconnect {
        conn_id: ConnId,
        remote_bda: RawAddr,
        reason: u16,
    },
    Open,
    CancelOpen,
    Close,
    Listen,
    Congest,
}

impl Event {
    /// Returns the event code.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        use EventKind as K;
        match *self {
            Self::Reg { .. } => K::Reg,
            Self::Read(_) => K::Read,
            Self::Write(_) => K::Write,
            Self::ExecWrite => K::ExecWrite,
            Self::Mtu { .. } => K::Mtu,
            Self::Conf => K::Conf,
            Self::Unreg => K::Unreg,
            Self::Create { .. } => K::Create,
            Self::AddInclSrvc => K::AddInclSrvc,
            Self::AddChar { .. } => K::AddChar,
            Self::AddCharDescr { .. } => K::AddCharDescr,
            Self::Delete { .. } => K::Delete,
            Self::Start { .. } => K::Start,
            Self::Stop => K::Stop,
            Self::Connect { .. } => K::Connect,
            Self::Disconnect { .. } => K::Disconnect,
            Self::Open => K::Open,
            Self::CancelOpen => K::CancelOpen,
            Self::Close => K::Close,
            Self::Listen => K::Listen,
            Self::Congest => K::Congest,
        }
    }
}
