use smallvec::SmallVec;
use tracing::{trace, warn};

use crate::script::{EventTarget, Function, Object, Value};

use super::*;

/// Target of a peer write.
#[derive(Debug)]
enum Written {
    Char(Option<Function>),
    Descr,
    Unknown,
}

impl<S: Stack, T: EventTarget> GattServer<S, T> {
    /// Responds to a peer read with the value of the addressed attribute.
    /// Unknown handles get an empty value.
    pub(super) fn on_read(&mut self, gatts_if: GattIf, p: &ReadParams) -> Result<()> {
        let v = self.read_value(p.handle);
        let v = v.get(usize::from(p.offset)..).unwrap_or_default();
        let max = usize::from(self.mtu.saturating_sub(1)).min(MAX_ATTR_LEN);
        let v = if v.len() > max {
            warn!(
                "Truncating read of {:#06X} from {} to {max} bytes",
                p.handle,
                v.len()
            );
            &v[..max]
        } else {
            v
        };
        trace!("Read {:#06X}+{}: {v:02X?}", p.handle, p.offset);
        let rsp = AttrValue {
            handle: p.handle,
            offset: p.offset,
            value: SmallVec::from_slice(v),
        };
        let r = (self.stack).send_response(gatts_if, p.conn_id, p.trans_id, GattStatus::Ok, Some(&rsp));
        Ok(r?)
    }

    /// Stores a peer write and calls the characteristic's write callback.
    pub(super) fn on_write(&mut self, gatts_if: GattIf, p: WriteParams) -> Result<()> {
        trace!("Write {:#06X}: {:02X?}", p.handle, p.value);
        match self.store(p.handle, &p.value) {
            Written::Char(Some(f)) => {
                let evt: Object = [("data", Value::Buffer(p.value))].into_iter().collect();
                f.call(&[evt.into()]);
            }
            Written::Char(None) | Written::Descr => {}
            Written::Unknown => warn!("Write to unknown handle {:#06X}", p.handle),
        }
        let r = (self.stack).send_response(gatts_if, p.conn_id, p.trans_id, GattStatus::Ok, None);
        Ok(r?)
    }

    /// Returns the current value of the attribute with raw handle `h`.
    fn read_value(&self, h: u16) -> Vec<u8> {
        let (Some(t), Some(h)) = (self.tables.as_ref(), Handle::new(h)) else {
            warn!("Read of unknown handle {h:#06X}");
            return Vec::new();
        };
        if let Some(i) = t.char_by_handle(h) {
            let d = &t.chars()[i].data;
            return match d.on_read {
                Some(ref f) => f.call(&[]).to_bytes(),
                None => d.value.clone().unwrap_or_default(),
            };
        }
        if let Some(i) = t.descr_by_handle(h) {
            return t.descrs()[i].value.clone().unwrap_or_default();
        }
        warn!("Read of unknown handle {h}");
        Vec::new()
    }

    /// Stores the value written to raw handle `h`.
    fn store(&mut self, h: u16, v: &[u8]) -> Written {
        let (Some(t), Some(h)) = (self.tables.as_mut(), Handle::new(h)) else {
            return Written::Unknown;
        };
        if let Some(i) = t.char_by_handle(h) {
            let d = &mut t.chars_mut()[i].data;
            d.value = Some(v.to_vec());
            return Written::Char(d.on_write.clone());
        }
        if let Some(i) = t.descr_by_handle(h) {
            t.descrs_mut()[i].value = Some(v.to_vec());
            return Written::Descr;
        }
        Written::Unknown
    }
}
