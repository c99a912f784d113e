use std::mem;

use gattsbridge_const::Descriptor;
use tracing::warn;

use crate::script::{Function, Object, Value};

use super::*;

/// Registration state of a characteristic or descriptor.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Slot {
    /// Not yet added to the stack.
    #[default]
    Pending,
    /// Added with the stack-assigned attribute handle.
    Added(Handle),
    /// The stack rejected the add operation.
    Failed(GattStatus),
}

impl Slot {
    /// Returns the attribute handle, if one was assigned.
    #[inline]
    #[must_use]
    pub const fn handle(self) -> Option<Handle> {
        match self {
            Self::Added(h) => Some(h),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// Returns whether the entry still needs to be added.
    #[inline(always)]
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Service table entry.
#[derive(Clone, Debug)]
pub struct ServiceEntry {
    pub uuid: Uuid,
    /// Application ID passed to `app_register`. Equal to the service index.
    pub app_id: u16,
    /// Application interface, set while the stack holds a registration.
    pub gatts_if: Option<GattIf>,
    /// Service attribute handle, set once the service is created.
    pub handle: Option<Handle>,
    /// Handle reservation: the service declaration plus four per
    /// characteristic (declaration, value, and two descriptors).
    pub num_handles: u16,
    /// Most recent peer connection, valid only while connected.
    pub conn_id: Option<ConnId>,
}

/// Characteristic value and user callbacks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CharData {
    pub value: Option<Vec<u8>>,
    pub on_read: Option<Function>,
    pub on_write: Option<Function>,
}

impl CharData {
    /// Returns whether there is nothing stored.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.value.is_none() && self.on_read.is_none() && self.on_write.is_none()
    }
}

/// Characteristic table entry.
#[derive(Clone, Debug)]
pub struct CharEntry {
    /// Index of the parent service.
    pub service: usize,
    pub uuid: Uuid,
    pub perm: Perm,
    pub props: Prop,
    pub slot: Slot,
    pub data: CharData,
}

/// Descriptor table entry.
#[derive(Clone, Debug)]
pub struct DescrEntry {
    /// Index of the parent characteristic.
    pub chr: usize,
    pub uuid: Uuid,
    pub perm: Perm,
    pub slot: Slot,
    pub value: Option<Vec<u8>>,
}

/// Table sizes computed by the counting pass.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counts {
    pub services: usize,
    pub chars: usize,
    pub descrs: usize,
}

/// Flat service, characteristic, and descriptor tables. Characteristics of a
/// service are contiguous and follow the service order. Descriptors of a
/// characteristic are contiguous and follow the characteristic order.
#[derive(Clone, Debug)]
pub struct Tables {
    services: Vec<ServiceEntry>,
    chars: Vec<CharEntry>,
    descrs: Vec<DescrEntry>,
    adv_uuids: Vec<u8>,
}

impl Tables {
    /// Validates the service description and returns the table sizes.
    pub fn count(desc: &Value) -> std::result::Result<Counts, ConfigError> {
        Ok(Self::tally(&parse(desc)?))
    }

    /// Builds the tables for a service description. Returns `None` if the
    /// description has no services. Values and callbacks missing from the
    /// description are taken from `retained` by characteristic position.
    pub fn build(
        desc: &Value,
        retained: &mut Vec<CharData>,
    ) -> std::result::Result<Option<Self>, ConfigError> {
        let defs = parse(desc)?;
        let n = Self::tally(&defs);
        if n.services == 0 {
            return Ok(None);
        }
        let mut t = Self {
            services: Vec::with_capacity(n.services),
            chars: Vec::with_capacity(n.chars),
            descrs: Vec::with_capacity(n.descrs),
            adv_uuids: Vec::with_capacity(n.services * Uuid::BYTES),
        };
        for (i, s) in defs.into_iter().enumerate() {
            t.adv_uuids.extend_from_slice(&s.uuid.to_bytes());
            t.services.push(ServiceEntry {
                uuid: s.uuid,
                app_id: s.app_id,
                gatts_if: None,
                handle: None,
                num_handles: s.num_handles,
                conn_id: None,
            });
            for c in s.chars {
                let pos = t.chars.len();
                let mut old = retained.get_mut(pos).map(mem::take).unwrap_or_default();
                let data = CharData {
                    value: c.value.map(Value::to_bytes).or(old.value.take()),
                    on_read: c.on_read.cloned().or(old.on_read.take()),
                    on_write: c.on_write.cloned().or(old.on_write.take()),
                };
                if c.props.contains(Prop::NOTIFY) {
                    t.descrs.push(DescrEntry {
                        chr: pos,
                        uuid: Descriptor::ClientCharacteristicConfiguration.uuid(),
                        perm: Perm::READ_WRITE,
                        slot: Slot::Pending,
                        value: None,
                    });
                }
                if let Some(d) = c.description {
                    t.descrs.push(DescrEntry {
                        chr: pos,
                        uuid: Descriptor::CharacteristicUserDescription.uuid(),
                        perm: Perm::READ,
                        slot: Slot::Pending,
                        value: Some(d.to_vec()),
                    });
                }
                t.chars.push(CharEntry {
                    service: i,
                    uuid: c.uuid,
                    perm: c.perm,
                    props: c.props,
                    slot: Slot::Pending,
                    data,
                });
            }
        }
        retained.clear();
        Ok(Some(t))
    }

    fn tally(defs: &[ServiceDef]) -> Counts {
        let mut n = Counts {
            services: defs.len(),
            ..Counts::default()
        };
        for c in defs.iter().flat_map(|s| &s.chars) {
            n.chars += 1;
            n.descrs += usize::from(c.props.contains(Prop::NOTIFY));
            n.descrs += usize::from(c.description.is_some());
        }
        n
    }

    /// Returns the table sizes.
    #[inline]
    #[must_use]
    pub fn counts(&self) -> Counts {
        Counts {
            services: self.services.len(),
            chars: self.chars.len(),
            descrs: self.descrs.len(),
        }
    }

    /// Returns the service table.
    #[inline(always)]
    #[must_use]
    pub fn services(&self) -> &[ServiceEntry] {
        &self.services
    }

    /// Returns the characteristic table.
    #[inline(always)]
    #[must_use]
    pub fn chars(&self) -> &[CharEntry] {
        &self.chars
    }

    /// Returns the descriptor table.
    #[inline(always)]
    #[must_use]
    pub fn descrs(&self) -> &[DescrEntry] {
        &self.descrs
    }

    /// Returns all service UUIDs in 128-bit little-endian form, 16 bytes per
    /// service, for use in advertising data.
    #[inline(always)]
    #[must_use]
    pub fn adv_service_uuids(&self) -> &[u8] {
        &self.adv_uuids
    }

    #[inline(always)]
    pub(super) fn services_mut(&mut self) -> &mut [ServiceEntry] {
        &mut self.services
    }

    #[inline(always)]
    pub(super) fn chars_mut(&mut self) -> &mut [CharEntry] {
        &mut self.chars
    }

    #[inline(always)]
    pub(super) fn descrs_mut(&mut self) -> &mut [DescrEntry] {
        &mut self.descrs
    }

    /// Consumes the tables, returning characteristic data by position.
    pub(super) fn into_char_data(self) -> Vec<CharData> {
        self.chars.into_iter().map(|c| c.data).collect()
    }

    /// Returns the index of the service registered with `gatts_if`.
    pub fn service_by_if(&self, gatts_if: GattIf) -> Result<usize> {
        (self.services.iter())
            .position(|s| s.gatts_if == Some(gatts_if))
            .ok_or(Error::UnknownInterface(gatts_if))
    }

    /// Returns the index of the characteristic with value handle `h`.
    #[must_use]
    pub fn char_by_handle(&self, h: Handle) -> Option<usize> {
        self.chars.iter().position(|c| c.slot.handle() == Some(h))
    }

    /// Returns the index of the descriptor with handle `h`.
    #[must_use]
    pub fn descr_by_handle(&self, h: Handle) -> Option<usize> {
        self.descrs.iter().position(|d| d.slot.handle() == Some(h))
    }

    /// Returns the first characteristic of service `svc` that still needs to
    /// be added.
    #[must_use]
    pub fn next_char(&self, svc: usize) -> Option<usize> {
        (self.chars.iter()).position(|c| c.service == svc && c.slot.is_pending())
    }

    /// Returns the first descriptor of characteristic `chr` that still needs
    /// to be added.
    #[must_use]
    pub fn next_descr(&self, chr: usize) -> Option<usize> {
        (self.descrs.iter()).position(|d| d.chr == chr && d.slot.is_pending())
    }

    /// Returns whether any service still holds a stack registration.
    #[inline]
    #[must_use]
    pub fn any_registered(&self) -> bool {
        self.services.iter().any(|s| s.gatts_if.is_some())
    }
}

/// Parsed service definition borrowing from the description.
#[derive(Debug)]
struct ServiceDef<'a> {
    uuid: Uuid,
    app_id: u16,
    /// Service declaration plus up to four handles per characteristic.
    num_handles: u16,
    chars: Vec<CharDef<'a>>,
}

/// Parsed characteristic definition borrowing from the description.
#[derive(Debug)]
struct CharDef<'a> {
    uuid: Uuid,
    perm: Perm,
    props: Prop,
    description: Option<&'a [u8]>,
    value: Option<&'a Value>,
    on_read: Option<&'a Function>,
    on_write: Option<&'a Function>,
}

/// Parses `serviceUUID -> charUUID -> options` description. `undefined` and
/// `null` describe no services.
fn parse(desc: &Value) -> std::result::Result<Vec<ServiceDef<'_>>, ConfigError> {
    let svcs = match *desc {
        Value::Undefined | Value::Null => return Ok(Vec::new()),
        Value::Object(ref o) => o,
        _ => return Err(ConfigError::InvalidDescription),
    };
    let mut defs = Vec::with_capacity(svcs.len());
    for (i, (key, v)) in svcs.iter().enumerate() {
        let uuid = parse_uuid("service", key)?;
        let app_id = u16::try_from(i).map_err(|_| ConfigError::TooManyServices)?;
        let chars = object("service", key, v)?;
        let num_handles = u16::try_from(chars.len())
            .ok()
            .and_then(|n| n.checked_mul(4))
            .and_then(|n| n.checked_add(1))
            .ok_or(ConfigError::TooManyCharacteristics(uuid))?;
        let chars = (chars.iter())
            .map(|(key, v)| char_def(key, object("characteristic", key, v)?))
            .collect::<std::result::Result<_, _>>()?;
        defs.push(ServiceDef {
            uuid,
            app_id,
            num_handles,
            chars,
        });
    }
    Ok(defs)
}

fn char_def<'a>(key: &str, c: &'a Object) -> std::result::Result<CharDef<'a>, ConfigError> {
    let flag = |name: &str| c.get(name).map_or(false, Value::is_truthy);
    let (mut perm, mut props) = (Perm::empty(), Prop::empty());
    props.set(Prop::BROADCAST, flag("broadcast"));
    props.set(Prop::NOTIFY, flag("notify"));
    props.set(Prop::INDICATE, flag("indicate"));
    if flag("readable") {
        perm |= Perm::READ;
        props |= Prop::READ;
    }
    if flag("writable") {
        perm |= Perm::WRITE;
        props |= Prop::WRITE | Prop::WRITE_NO_RESP;
    }
    Ok(CharDef {
        uuid: parse_uuid("characteristic", key)?,
        perm,
        props,
        description: c.get("description").and_then(Value::as_nonempty_str),
        value: c.get("value").filter(|v| !matches!(v, Value::Undefined)),
        on_read: callback(c, key, "onRead"),
        on_write: callback(c, key, "onWrite"),
    })
}

fn callback<'a>(c: &'a Object, key: &str, name: &str) -> Option<&'a Function> {
    let v = c.get(name)?;
    let f = v.as_function();
    if f.is_none() && !matches!(v, Value::Undefined | Value::Null) {
        warn!("Ignoring non-function {name} of characteristic {key}");
    }
    f
}

fn parse_uuid(what: &'static str, key: &str) -> std::result::Result<Uuid, ConfigError> {
    key.parse().map_err(|source| ConfigError::InvalidUuid {
        what,
        key: key.to_owned(),
        source,
    })
}

fn object<'a>(
    what: &'static str,
    key: &str,
    v: &'a Value,
) -> std::result::Result<&'a Object, ConfigError> {
    v.as_object().ok_or_else(|| ConfigError::NotObject {
        what,
        key: key.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::*;

    fn desc(json: &str) -> Value {
        Value::from_json_str(json).unwrap()
    }

    #[test]
    fn count_and_fill() {
        let d = desc(
            r#"{
                "180A": {"2A29": {"readable": true, "value": "ACME"}},
                "180F": {
                    "2A19": {"notify": true, "readable": true, "value": [100]},
                    "2A1A": {"writable": true, "description": "Level"},
                    "2A1B": {"notify": true, "description": "Both"}
                }
            }"#,
        );
        let n = Tables::count(&d).unwrap();
        assert_eq!(
            n,
            Counts {
                services: 2,
                chars: 4,
                descrs: 4
            }
        );
        let t = Tables::build(&d, &mut Vec::new()).unwrap().unwrap();
        assert_eq!(t.counts(), n);

        let s = t.services();
        assert_eq!((s[0].app_id, s[1].app_id), (0, 1));
        assert_eq!(s[0].num_handles, 5);
        assert_eq!(s[1].num_handles, 1 + 4 * 3);
        assert!(s.iter().all(|s| s.gatts_if.is_none() && s.handle.is_none()));

        let c = t.chars();
        assert_eq!(c.iter().map(|c| c.service).collect::<Vec<_>>(), [0, 1, 1, 1]);
        assert_eq!(c[0].data.value.as_deref(), Some(&b"ACME"[..]));
        assert_eq!(c[1].data.value.as_deref(), Some(&[100][..]));
        assert_eq!(c[1].props, Prop::NOTIFY | Prop::READ);
        assert_eq!(c[1].perm, Perm::READ);
        assert_eq!(c[2].props, Prop::WRITE | Prop::WRITE_NO_RESP);
        assert_eq!(c[2].perm, Perm::WRITE);
        assert_eq!(c[2].data.value, None);

        let d = t.descrs();
        assert_eq!(d.iter().map(|d| d.chr).collect::<Vec<_>>(), [1, 2, 3, 3]);
        assert_eq!(d[0].uuid, Descriptor::ClientCharacteristicConfiguration);
        assert_eq!(d[0].perm, Perm::READ_WRITE);
        assert_eq!(d[1].uuid, Descriptor::CharacteristicUserDescription);
        assert_eq!(d[1].value.as_deref(), Some(&b"Level"[..]));
        assert_eq!(d[2].uuid, Descriptor::ClientCharacteristicConfiguration);
        assert_eq!(d[3].value.as_deref(), Some(&b"Both"[..]));

        let adv = t.adv_service_uuids();
        assert_eq!(adv.len(), 32);
        assert_eq!(&adv[12..14], &[0x0A, 0x18]);
        assert_eq!(&adv[28..30], &[0x0F, 0x18]);
    }

    #[test]
    fn empty_description() {
        for d in [Value::Undefined, Value::Null, desc("{}")] {
            assert_eq!(Tables::count(&d).unwrap(), Counts::default());
            assert!(Tables::build(&d, &mut Vec::new()).unwrap().is_none());
        }
    }

    #[test]
    fn empty_description_string() {
        let d = desc(r#"{"180D": {"2A37": {"description": ""}}}"#);
        assert_eq!(Tables::count(&d).unwrap().descrs, 0);
    }

    #[test]
    fn config_errors() {
        assert_eq!(
            Tables::count(&Value::from("nope")),
            Err(ConfigError::InvalidDescription)
        );
        assert_matches!(
            Tables::count(&desc(r#"{"18X0": {}}"#)),
            Err(ConfigError::InvalidUuid {
                what: "service",
                ..
            })
        );
        assert_matches!(
            Tables::count(&desc(r#"{"180D": {"2A37": {}, "abc": {}}}"#)),
            Err(ConfigError::InvalidUuid {
                what: "characteristic",
                ..
            })
        );
        assert_matches!(
            Tables::count(&desc(r#"{"180D": 5}"#)),
            Err(ConfigError::NotObject {
                what: "service",
                ..
            })
        );
        assert_matches!(
            Tables::count(&desc(r#"{"180D": {"2A37": true}}"#)),
            Err(ConfigError::NotObject {
                what: "characteristic",
                ..
            })
        );
    }

    #[test]
    fn handle_range() {
        let svc = |n: u16| {
            let chars: Object = (0..n)
                .map(|i| (format!("{:04X}", 0x1000 + u32::from(i)), Value::from(Object::new())))
                .collect();
            Value::from(Object::from_iter([("180D", Value::from(chars))]))
        };
        assert_eq!(Tables::count(&svc(16383)).unwrap().chars, 16383);
        assert_eq!(
            Tables::count(&svc(16384)),
            Err(ConfigError::TooManyCharacteristics("180D".parse().unwrap()))
        );
    }

    #[test]
    fn retained_data() {
        let cb = Function::from(|_: &[Value]| Value::from("cb"));
        let mut retained = vec![
            CharData {
                value: Some(b"old".to_vec()),
                on_read: Some(cb.clone()),
                on_write: None,
            },
            CharData {
                value: Some(b"stale".to_vec()),
                ..CharData::default()
            },
        ];
        let d = desc(r#"{"180D": {"2A37": {}, "2A38": {"value": "new"}}}"#);
        let t = Tables::build(&d, &mut retained).unwrap().unwrap();
        assert!(retained.is_empty());
        assert_eq!(t.chars()[0].data.value.as_deref(), Some(&b"old"[..]));
        assert_eq!(t.chars()[0].data.on_read, Some(cb));
        assert_eq!(t.chars()[1].data.value.as_deref(), Some(&b"new"[..]));
    }

    #[test]
    fn lookups() {
        let d = desc(r#"{"180D": {"2A37": {"notify": true}, "2A38": {}}, "180F": {"2A19": {}}}"#);
        let mut t = Tables::build(&d, &mut Vec::new()).unwrap().unwrap();
        assert_eq!(t.next_char(0), Some(0));
        assert_eq!(t.next_char(1), Some(2));
        assert_eq!(t.next_descr(0), Some(0));
        assert_eq!(t.next_descr(1), None);

        let h = Handle::new(0x2A).unwrap();
        t.chars_mut()[0].slot = Slot::Added(h);
        t.chars_mut()[1].slot = Slot::Failed(GattStatus::Error);
        assert_eq!(t.next_char(0), None);
        assert_eq!(t.char_by_handle(h), Some(0));
        assert_eq!(t.descr_by_handle(h), None);

        assert_eq!(t.service_by_if(GattIf(3)), Err(Error::UnknownInterface(GattIf(3))));
        t.services_mut()[1].gatts_if = Some(GattIf(3));
        assert_eq!(t.service_by_if(GattIf(3)), Ok(1));
        assert!(t.any_registered());
    }
}
