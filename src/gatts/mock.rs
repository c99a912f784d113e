//! Recording stack and event target that replay completion events in issue
//! order.

use std::num::NonZeroI32;

use crate::script::{Args, EventTarget};

use super::*;

/// Stack call recorded by [`MockStack`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Call {
    AppRegister(u16),
    AppUnregister(GattIf),
    CreateService(GattIf, ServiceId, u16),
    StartService(Handle),
    DeleteService(Handle),
    AddChar(Handle, Uuid, Perm, Prop),
    AddCharDescr(Handle, Uuid, Perm),
    SendResponse {
        gatts_if: GattIf,
        conn_id: ConnId,
        trans_id: u32,
        status: GattStatus,
        rsp: Option<AttrValue>,
    },
    StartAdvertising,
}

/// Stack that records calls. All calls fail while `fail` is set.
#[derive(Debug, Default)]
pub struct MockStack {
    pub calls: Vec<Call>,
    pub fail: bool,
}

impl MockStack {
    fn call(&mut self, c: Call) -> StackResult {
        if self.fail {
            return Err(StackError(NonZeroI32::new(0x103).unwrap()));
        }
        self.calls.push(c);
        Ok(())
    }
}

impl Stack for MockStack {
    fn app_register(&mut self, app_id: u16) -> StackResult {
        self.call(Call::AppRegister(app_id))
    }

    fn app_unregister(&mut self, gatts_if: GattIf) -> StackResult {
        self.call(Call::AppUnregister(gatts_if))
    }

    fn create_service(&mut self, gatts_if: GattIf, id: ServiceId, num_handles: u16) -> StackResult {
        self.call(Call::CreateService(gatts_if, id, num_handles))
    }

    fn start_service(&mut self, service: Handle) -> StackResult {
        self.call(Call::StartService(service))
    }

    fn delete_service(&mut self, service: Handle) -> StackResult {
        self.call(Call::DeleteService(service))
    }

    fn add_char(&mut self, service: Handle, uuid: Uuid, perm: Perm, props: Prop) -> StackResult {
        self.call(Call::AddChar(service, uuid, perm, props))
    }

    fn add_char_descr(&mut self, service: Handle, uuid: Uuid, perm: Perm) -> StackResult {
        self.call(Call::AddCharDescr(service, uuid, perm))
    }

    fn send_response(
        &mut self,
        gatts_if: GattIf,
        conn_id: ConnId,
        trans_id: u32,
        status: GattStatus,
        rsp: Option<&AttrValue>,
    ) -> StackResult {
        self.call(Call::SendResponse {
            gatts_if,
            conn_id,
            trans_id,
            status,
            rsp: rsp.cloned(),
        })
    }

    fn start_advertising(&mut self) -> StackResult {
        self.call(Call::StartAdvertising)
    }
}

/// Event target that records emitted events.
#[derive(Debug)]
pub struct MockTarget {
    pub events: Vec<(String, Args)>,
    pub listening: bool,
}

impl Default for MockTarget {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            listening: true,
        }
    }
}

impl EventTarget for MockTarget {
    fn emit(&mut self, event: &str, args: Args) -> bool {
        self.events.push((event.to_owned(), args));
        self.listening
    }
}

pub type Server = GattServer<MockStack, MockTarget>;

/// Server with a simulated stack that completes recorded calls.
#[derive(Debug)]
pub struct Harness {
    pub srv: Server,
    /// Characteristic and descriptor UUIDs whose add operation is rejected.
    pub reject: Vec<Uuid>,
    /// Number of calls already completed.
    done: usize,
    next_if: u8,
    next_handle: u16,
    svcs: Vec<(Handle, GattIf)>,
}

impl Harness {
    pub fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();
        Self {
            srv: GattServer::new(MockStack::default(), MockTarget::default()),
            reject: Vec::new(),
            done: 0,
            next_if: 3,
            next_handle: 0x28,
            svcs: Vec::new(),
        }
    }

    /// Returns the recorded calls.
    pub fn calls(&mut self) -> &[Call] {
        &self.srv.stack().calls
    }

    /// Completes the next pending call. Returns false if there are none.
    pub fn step(&mut self) -> bool {
        let Some(c) = self.srv.stack().calls.get(self.done).cloned() else {
            return false;
        };
        self.done += 1;
        if let Some((gatts_if, evt)) = self.complete(&c) {
            self.srv.handle_event(gatts_if, evt);
        }
        true
    }

    /// Completes calls until the server is waiting for peer activity.
    pub fn run(&mut self) {
        while self.step() {}
    }

    /// Skips all pending calls without completing them.
    pub fn drop_pending(&mut self) {
        self.done = self.srv.stack().calls.len();
    }

    /// Returns the stack event completing call `c`.
    fn complete(&mut self, c: &Call) -> Option<(GattIf, Event)> {
        let ok = GattStatus::Ok;
        Some(match *c {
            Call::AppRegister(app_id) => {
                let gatts_if = GattIf(self.next_if);
                self.next_if += 1;
                (gatts_if, Event::Reg { status: ok, app_id })
            }
            Call::CreateService(gatts_if, _, _) => {
                let h = self.alloc(1);
                self.svcs.push((Handle::new(h).unwrap(), gatts_if));
                let evt = Event::Create {
                    status: ok,
                    service_handle: h,
                };
                (gatts_if, evt)
            }
            Call::StartService(h) => {
                let evt = Event::Start {
                    status: ok,
                    service_handle: h.into(),
                };
                (self.gatts_if(h), evt)
            }
            Call::AddChar(h, uuid, _, _) => {
                let (status, attr_handle) = self.add(uuid, 2);
                let evt = Event::AddChar {
                    status,
                    attr_handle,
                    service_handle: h.into(),
                    char_uuid: Some(uuid),
                };
                (self.gatts_if(h), evt)
            }
            Call::AddCharDescr(h, uuid, _) => {
                let (status, attr_handle) = self.add(uuid, 1);
                let evt = Event::AddCharDescr {
                    status,
                    attr_handle,
                    service_handle: h.into(),
                    descr_uuid: Some(uuid),
                };
                (self.gatts_if(h), evt)
            }
            Call::DeleteService(h) => {
                let evt = Event::Delete {
                    status: ok,
                    service_handle: h.into(),
                };
                (self.gatts_if(h), evt)
            }
            Call::AppUnregister(gatts_if) => (gatts_if, Event::Unreg),
            Call::SendResponse { .. } | Call::StartAdvertising => return None,
        })
    }

    /// Allocates `n` handles and returns the last one.
    fn alloc(&mut self, n: u16) -> u16 {
        self.next_handle += n;
        self.next_handle - 1
    }

    fn add(&mut self, uuid: Uuid, n: u16) -> (GattStatus, u16) {
        if self.reject.contains(&uuid) {
            (GattStatus::NoResources, 0)
        } else {
            (GattStatus::Ok, self.alloc(n))
        }
    }

    fn gatts_if(&self, h: Handle) -> GattIf {
        (self.svcs.iter().find(|&&(s, _)| s == h))
            .map(|&(_, gatts_if)| gatts_if)
            .unwrap()
    }
}
