use smallvec::smallvec;
use tracing::{debug, warn};

use crate::le::RawAddr;
use crate::script::{EventTarget, Value};

use super::*;

impl<S: Stack, T: EventTarget> GattServer<S, T> {
    /// Records a new peer connection and emits `connect`. The stack reports a
    /// connection to every registered interface, but the event is emitted
    /// once per connection.
    pub(super) fn on_connect(&mut self, gatts_if: GattIf, conn_id: ConnId, bda: RawAddr) {
        if let Some(t) = self.tables.as_mut() {
            match t.service_by_if(gatts_if) {
                Ok(i) => t.services_mut()[i].conn_id = Some(conn_id),
                Err(e) => debug!("Connection not recorded: {e}"),
            }
        }
        if self.peers.contains(&conn_id) {
            return;
        }
        debug!("Connected to {bda} ({conn_id:?})");
        self.peers.push(conn_id);
        self.mtu = DEFAULT_MTU;
        self.emit("connect", bda);
    }

    /// Clears the connection, restarts advertising, and emits `disconnect`.
    /// Copies of the event for the same connection are ignored.
    pub(super) fn on_disconnect(&mut self, conn_id: ConnId, bda: RawAddr, reason: u16) -> Result<()> {
        if let Some(t) = self.tables.as_mut() {
            (t.services_mut().iter_mut())
                .filter(|s| s.conn_id == Some(conn_id))
                .for_each(|s| s.conn_id = None);
        }
        let Some(i) = self.peers.iter().position(|&c| c == conn_id) else {
            return Ok(());
        };
        debug!("Disconnected from {bda} ({conn_id:?}, reason {reason:#06X})");
        self.peers.swap_remove(i);
        self.mtu = DEFAULT_MTU;
        let r = self.stack.start_advertising();
        self.emit("disconnect", bda);
        Ok(r?)
    }

    fn emit(&mut self, event: &str, bda: RawAddr) {
        if !self.target.emit(event, smallvec![Value::from(bda.to_string())]) {
            warn!("No listener for {event}");
        }
    }
}
