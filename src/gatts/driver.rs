//! Registration state machine.
//!
//! Each step issues one stack call and returns. The completion event for that
//! call advances the walk: service `s` is registered, created, and started,
//! then its characteristics are added in order, each followed by its
//! descriptors, before service `s + 1` is registered. Advertising starts
//! after the last service.

use tracing::{debug, error, warn};

use crate::script::EventTarget;

use super::*;

/// Registration walk position. Indices refer to the attribute tables.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum Phase {
    /// No walk in progress.
    #[default]
    Idle,
    /// Awaiting `REG` for service `0`.
    Registering(usize),
    /// Awaiting `CREATE` for service `0`.
    Creating(usize),
    /// Awaiting `START` for service `0`.
    Starting(usize),
    /// Awaiting `ADD_CHAR` for characteristic `0`.
    AddingChar(usize),
    /// Awaiting `ADD_CHAR_DESCR` for descriptor `0`.
    AddingDescr(usize),
    /// All services were processed and advertising was started.
    Advertising,
    /// A stack call failed. The walk can only be restarted by a reset.
    Stalled,
    /// Services are being removed.
    Deleting,
}

impl<S: Stack, T: EventTarget> GattServer<S, T> {
    /// Registers the application for service `svc` or starts advertising
    /// after the last service.
    pub(super) fn register(&mut self, svc: usize) -> Result<()> {
        let Some(t) = self.tables.as_ref() else {
            return Ok(());
        };
        let Some(s) = t.services().get(svc) else {
            debug!("All services processed, starting advertising");
            self.phase = Phase::Advertising;
            let r = self.stack.start_advertising();
            return self.check(r);
        };
        debug!("Registering service {} as app {}", s.uuid, s.app_id);
        self.phase = Phase::Registering(svc);
        let r = self.stack.app_register(s.app_id);
        self.check(r)
    }

    pub(super) fn on_reg(&mut self, gatts_if: GattIf, status: GattStatus, app_id: u16) -> Result<()> {
        let (Phase::Registering(svc), Some(t)) = (self.phase, self.tables.as_mut()) else {
            if status.is_ok() {
                warn!("Unexpected registration of app {app_id} as {gatts_if}, unregistering");
                self.stack.app_unregister(gatts_if)?;
            }
            return Ok(());
        };
        let s = &mut t.services_mut()[svc];
        if s.app_id != app_id {
            warn!("Ignoring registration of app {app_id} while awaiting {}", s.app_id);
            return Ok(());
        }
        if !status.is_ok() {
            error!("Registration of service {} failed: {status}", s.uuid);
            return self.register(svc + 1);
        }
        s.gatts_if = Some(gatts_if);
        let id = ServiceId {
            uuid: s.uuid,
            is_primary: true,
            inst_id: 0,
        };
        debug!("Creating service {} with {} handles", s.uuid, s.num_handles);
        let n = s.num_handles;
        self.phase = Phase::Creating(svc);
        let r = self.stack.create_service(gatts_if, id, n);
        self.check(r)
    }

    pub(super) fn on_create(
        &mut self,
        gatts_if: GattIf,
        status: GattStatus,
        service_handle: u16,
    ) -> Result<()> {
        let (Phase::Creating(svc), Some(t)) = (self.phase, self.tables.as_mut()) else {
            warn!("Unexpected service creation on {gatts_if}");
            return Ok(());
        };
        let s = &mut t.services_mut()[svc];
        if s.gatts_if != Some(gatts_if) {
            warn!("Ignoring service creation on {gatts_if}");
            return Ok(());
        }
        let h = match Handle::new(service_handle) {
            Some(h) if status.is_ok() => h,
            _ => {
                error!("Creation of service {} failed: {status}", s.uuid);
                return self.register(svc + 1);
            }
        };
        debug!("Starting service {} at {h}", s.uuid);
        s.handle = Some(h);
        self.phase = Phase::Starting(svc);
        let r = self.stack.start_service(h);
        self.check(r)
    }

    pub(super) fn on_start(&mut self, status: GattStatus, service_handle: u16) -> Result<()> {
        let Phase::Starting(svc) = self.phase else {
            warn!("Unexpected start of service {service_handle:#06X}");
            return Ok(());
        };
        if !status.is_ok() {
            error!("Start of service {service_handle:#06X} failed: {status}");
        }
        self.next_char(svc)
    }

    /// Adds the next pending characteristic of service `svc` or moves on to
    /// the next service.
    fn next_char(&mut self, svc: usize) -> Result<()> {
        let Some(t) = self.tables.as_ref() else {
            return Ok(());
        };
        let (Some(i), Some(h)) = (t.next_char(svc), t.services()[svc].handle) else {
            return self.register(svc + 1);
        };
        let c = &t.chars()[i];
        debug!("Adding characteristic {} ({:?}, {:?})", c.uuid, c.props, c.perm);
        self.phase = Phase::AddingChar(i);
        let r = self.stack.add_char(h, c.uuid, c.perm, c.props);
        self.check(r)
    }

    pub(super) fn on_add_char(
        &mut self,
        status: GattStatus,
        attr_handle: u16,
        evt_uuid: Option<Uuid>,
    ) -> Result<()> {
        let (Phase::AddingChar(i), Some(t)) = (self.phase, self.tables.as_mut()) else {
            warn!("Unexpected characteristic {attr_handle:#06X}");
            return Ok(());
        };
        let c = &mut t.chars_mut()[i];
        if evt_uuid.map_or(false, |u| u != c.uuid) {
            warn!("Characteristic UUID mismatch: {evt_uuid:?} != {}", c.uuid);
        }
        c.slot = slot(status, attr_handle);
        let (svc, uuid) = (c.service, c.uuid);
        if let Slot::Added(h) = c.slot {
            debug!("Characteristic {uuid} at {h}");
            self.next_descr(i)
        } else {
            error!("Adding characteristic {uuid} failed: {status}");
            self.next_char(svc)
        }
    }

    /// Adds the next pending descriptor of characteristic `chr` or moves on
    /// to the next characteristic.
    fn next_descr(&mut self, chr: usize) -> Result<()> {
        let Some(t) = self.tables.as_ref() else {
            return Ok(());
        };
        let svc = t.chars()[chr].service;
        let (Some(i), Some(h)) = (t.next_descr(chr), t.services()[svc].handle) else {
            return self.next_char(svc);
        };
        let d = &t.descrs()[i];
        debug!("Adding descriptor {} ({:?})", d.uuid, d.perm);
        self.phase = Phase::AddingDescr(i);
        let r = self.stack.add_char_descr(h, d.uuid, d.perm);
        self.check(r)
    }

    pub(super) fn on_add_descr(
        &mut self,
        status: GattStatus,
        attr_handle: u16,
        evt_uuid: Option<Uuid>,
    ) -> Result<()> {
        let (Phase::AddingDescr(i), Some(t)) = (self.phase, self.tables.as_mut()) else {
            warn!("Unexpected descriptor {attr_handle:#06X}");
            return Ok(());
        };
        let d = &mut t.descrs_mut()[i];
        if evt_uuid.map_or(false, |u| u != d.uuid) {
            warn!("Descriptor UUID mismatch: {evt_uuid:?} != {}", d.uuid);
        }
        d.slot = slot(status, attr_handle);
        match d.slot {
            Slot::Added(h) => debug!("Descriptor {} at {h}", d.uuid),
            _ => error!("Adding descriptor {} failed: {status}", d.uuid),
        }
        let chr = d.chr;
        self.next_descr(chr)
    }

    /// Stalls the walk if a stack call failed.
    fn check(&mut self, r: StackResult) -> Result<()> {
        r.map_err(|e| {
            self.phase = Phase::Stalled;
            e.into()
        })
    }
}

/// Converts an add event status into a slot state.
fn slot(status: GattStatus, attr_handle: u16) -> Slot {
    match Handle::new(attr_handle) {
        Some(h) if status.is_ok() => Slot::Added(h),
        None if status.is_ok() => Slot::Failed(GattStatus::Error),
        _ => Slot::Failed(status),
    }
}
