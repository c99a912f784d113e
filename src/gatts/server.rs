use std::mem;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;
use tracing::{debug, error, info, trace, warn};

use crate::script::{EventTarget, Value};

use super::*;

/// GATT server that registers a service description with the vendor stack
/// and serves peer attribute I/O.
///
/// All methods are expected to run on the stack's callback thread. User
/// callbacks are invoked synchronously and must not call back into the
/// server.
#[derive(Debug)]
pub struct GattServer<S, T> {
    pub(super) stack: S,
    pub(super) target: T,
    pub(super) tables: Option<Tables>,
    pub(super) phase: Phase,
    pub(super) mtu: u16,
    /// Live connections. The stack reports each one to every interface.
    pub(super) peers: SmallVec<[ConnId; 4]>,
    desc: Value,
    options: Value,
    /// Build the current description once the prior tables are released.
    pending: bool,
    remove_values: bool,
    /// Characteristic data kept across a teardown without value removal.
    retained: Vec<CharData>,
    debug: DebugFlags,
}

impl<S: Stack, T: EventTarget> GattServer<S, T> {
    /// Creates an idle server.
    #[must_use]
    pub fn new(stack: S, target: T) -> Self {
        Self {
            stack,
            target,
            tables: None,
            phase: Phase::Idle,
            mtu: DEFAULT_MTU,
            peers: SmallVec::new(),
            desc: Value::Undefined,
            options: Value::Undefined,
            pending: false,
            remove_values: false,
            retained: Vec::new(),
            debug: DebugFlags::empty(),
        }
    }

    /// Defines the service tree and starts registration. The description maps
    /// service UUIDs to objects that map characteristic UUIDs to option
    /// objects. An `undefined`, `null`, or empty description removes all
    /// services.
    ///
    /// The description is validated before any state changes. If a previous
    /// service tree is still registered, it is removed first and the new one
    /// is built after the stack confirms the removal.
    pub fn set_services(&mut self, desc: Value, options: Value) -> Result<()> {
        let n = Tables::count(&desc)?;
        debug!("Setting services: {n:?}");
        self.reset(true);
        self.desc = desc;
        self.options = options;
        if self.tables.is_some() {
            debug!("Deferring build until prior services are unregistered");
            self.pending = true;
            return Ok(());
        }
        self.build()
    }

    /// Removes all registered services. The stack confirms each removal with
    /// `DELETE` and `UNREG` events, and the tables are released after the last
    /// one. Characteristic values and callbacks are kept for the next build
    /// unless `remove_values` is set.
    pub fn reset(&mut self, remove_values: bool) {
        self.remove_values = remove_values;
        let Some(t) = self.tables.as_ref() else {
            if remove_values {
                self.retained.clear();
            }
            return;
        };
        if self.phase == Phase::Deleting {
            debug!("Reset already in progress (remove_values={remove_values})");
            return;
        }
        debug!("Resetting services (remove_values={remove_values})");
        self.phase = Phase::Deleting;
        for s in t.services() {
            let r = match (s.gatts_if, s.handle) {
                (Some(_), Some(h)) => self.stack.delete_service(h),
                (Some(gatts_if), None) => self.stack.app_unregister(gatts_if),
                (None, _) => continue,
            };
            if let Err(e) = r {
                warn!("Failed to remove service {}: {e}", s.uuid);
            }
        }
        if !t.any_registered() {
            self.teardown();
        }
    }

    /// Re-registers the current description, keeping stored values and
    /// callbacks that the description does not replace.
    pub fn restart(&mut self) -> Result<()> {
        self.reset(false);
        if self.tables.is_some() {
            self.pending = true;
            return Ok(());
        }
        self.build()
    }

    /// Handles an inbound stack event for interface `gatts_if`.
    pub fn handle_event(&mut self, gatts_if: GattIf, evt: Event) {
        let kind = evt.kind();
        if self.debug.contains(DebugFlags::GATTS) {
            info!("{kind} on {gatts_if}: {evt:?}");
        }
        let r = match evt {
            Event::Reg { status, app_id } => self.on_reg(gatts_if, status, app_id),
            Event::Create {
                status,
                service_handle,
            } => self.on_create(gatts_if, status, service_handle),
            Event::Start {
                status,
                service_handle,
            } => self.on_start(status, service_handle),
            Event::AddChar {
                status,
                attr_handle,
                char_uuid,
                ..
            } => self.on_add_char(status, attr_handle, char_uuid),
            Event::AddCharDescr {
                status,
                attr_handle,
                descr_uuid,
                ..
            } => self.on_add_descr(status, attr_handle, descr_uuid),
            Event::Read(p) => self.on_read(gatts_if, &p),
            Event::Write(p) => self.on_write(gatts_if, p),
            Event::Mtu { conn_id, mtu } => {
                debug!("MTU for {conn_id:?} is {mtu}");
                self.mtu = mtu.max(DEFAULT_MTU);
                Ok(())
            }
            Event::Delete { status, .. } => self.on_delete(gatts_if, status),
            Event::Unreg => self.on_unreg(gatts_if),
            Event::Connect {
                conn_id,
                remote_bda,
            } => {
                self.on_connect(gatts_if, conn_id, remote_bda);
                Ok(())
            }
            Event::Disconnect {
                conn_id,
                remote_bda,
                reason,
            } => self.on_disconnect(conn_id, remote_bda, reason),
            _ => {
                trace!("Ignoring {kind}");
                Ok(())
            }
        };
        if let Err(e) = r {
            warn!("{kind} on {gatts_if}: {e}");
        }
    }

    /// Returns the `value` of characteristic `chr` of service `service` from
    /// the current description. If `new` is specified, it replaces the value
    /// in the description and in the registered characteristic. Keys match by
    /// UUID, or by string equality for keys that are not UUIDs.
    pub fn char_value(&mut self, service: &str, chr: &str, new: Option<Value>) -> Option<Value> {
        let mut pos = 0;
        let mut found = None;
        for (k, s) in self.desc.as_object_mut()?.iter_mut() {
            let chars = s.as_object_mut()?;
            if !key_matches(k, service) {
                pos += chars.len();
                continue;
            }
            let (i, (_, c)) = (chars.iter_mut().enumerate()).find(|(_, (k, _))| key_matches(k, chr))?;
            found = Some((pos + i, c.as_object_mut()?));
            break;
        }
        let (pos, c) = found?;
        let old = c.get("value").filter(|v| !matches!(v, Value::Undefined)).cloned();
        if let Some(v) = new {
            let b = v.to_bytes();
            c.insert("value", v);
            match self.tables.as_mut() {
                Some(t) if !self.pending => {
                    if let Some(ch) = t.chars_mut().get_mut(pos) {
                        trace!("Updating {} value: {b:02X?}", ch.uuid);
                        ch.data.value = Some(b);
                    }
                }
                _ => {}
            }
        }
        old
    }

    /// Returns the service UUIDs for advertising data, 16 bytes per service in
    /// 128-bit little-endian form. The slice is empty when no services are
    /// defined.
    #[inline]
    #[must_use]
    pub fn adv_service_uuids(&self) -> &[u8] {
        match self.tables {
            Some(ref t) => t.adv_service_uuids(),
            None => &[],
        }
    }

    /// Returns the options passed to the last [`Self::set_services`] call.
    #[inline(always)]
    #[must_use]
    pub const fn options(&self) -> &Value {
        &self.options
    }

    /// Sets the event classes that are logged on arrival.
    #[inline(always)]
    pub fn set_debug(&mut self, f: DebugFlags) {
        self.debug = f;
    }

    /// Returns the event classes that are logged on arrival.
    #[inline(always)]
    #[must_use]
    pub const fn debug(&self) -> DebugFlags {
        self.debug
    }

    /// Returns the attribute tables, if services are defined.
    #[inline(always)]
    #[must_use]
    pub const fn tables(&self) -> Option<&Tables> {
        self.tables.as_ref()
    }

    /// Returns the registration phase.
    #[inline(always)]
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the negotiated ATT MTU of the current connection.
    #[inline(always)]
    #[must_use]
    pub const fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Returns the stack.
    #[inline(always)]
    pub fn stack(&mut self) -> &mut S {
        &mut self.stack
    }

    /// Returns the event target.
    #[inline(always)]
    pub fn target(&mut self) -> &mut T {
        &mut self.target
    }

    /// Allocates the tables for the current description and starts
    /// registration.
    fn build(&mut self) -> Result<()> {
        self.tables = Tables::build(&self.desc, &mut self.retained)?;
        let Some(t) = self.tables.as_ref() else {
            debug!("No services defined");
            return Ok(());
        };
        debug!("Registering {:?}", t.counts());
        if let Err(e) = self.register(0) {
            warn!("Registration stalled: {e}");
        }
        Ok(())
    }

    /// Handles service deletion by unregistering its application.
    fn on_delete(&mut self, gatts_if: GattIf, status: GattStatus) -> Result<()> {
        if !status.is_ok() {
            error!("Service deletion on {gatts_if} failed: {status}");
        }
        let t = self.tables.as_mut().ok_or(Error::UnknownInterface(gatts_if))?;
        let i = t.service_by_if(gatts_if)?;
        t.services_mut()[i].handle = None;
        Ok(self.stack.app_unregister(gatts_if)?)
    }

    /// Handles application unregistration. Releases the tables after the last
    /// live application is gone.
    fn on_unreg(&mut self, gatts_if: GattIf) -> Result<()> {
        let t = self.tables.as_mut().ok_or(Error::UnknownInterface(gatts_if))?;
        let i = t.service_by_if(gatts_if)?;
        let s = &mut t.services_mut()[i];
        (s.gatts_if, s.handle, s.conn_id) = (None, None, None);
        if t.any_registered() {
            return Ok(());
        }
        self.teardown();
        Ok(())
    }

    /// Releases the tables and builds a deferred description.
    fn teardown(&mut self) {
        let Some(t) = self.tables.take() else { return };
        if self.remove_values {
            self.retained.clear();
        } else {
            self.retained = t.into_char_data();
        }
        self.phase = Phase::Idle;
        debug!("Services released ({} values retained)", self.retained.len());
        if mem::take(&mut self.pending) {
            if let Err(e) = self.build() {
                error!("Failed to build deferred services: {e}");
            }
        }
    }
}

/// Returns whether description key `k` names `want`.
fn key_matches(k: &str, want: &str) -> bool {
    match (k.parse::<Uuid>(), want.parse::<Uuid>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => k == want,
    }
}

/// Server shared between the vendor callback trampoline and the runtime.
#[derive(Debug)]
#[repr(transparent)]
pub struct SharedServer<S, T>(Arc<Mutex<GattServer<S, T>>>);

impl<S, T> Clone for SharedServer<S, T> {
    #[inline]
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<S: Stack, T: EventTarget> SharedServer<S, T> {
    /// Wraps a server for shared access.
    #[inline]
    #[must_use]
    pub fn new(srv: GattServer<S, T>) -> Self {
        Self(Arc::new(Mutex::new(srv)))
    }

    /// Locks the server.
    #[inline]
    pub fn lock(&self) -> MutexGuard<GattServer<S, T>> {
        self.0.lock()
    }

    /// Handles an inbound stack event.
    #[inline]
    pub fn handle_event(&self, gatts_if: GattIf, evt: Event) {
        self.0.lock().handle_event(gatts_if, evt);
    }
}
