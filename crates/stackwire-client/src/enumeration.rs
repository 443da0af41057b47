//! Device discovery.
//!
//! A broadcast enumerate request makes every attached device self-announce
//! through a reserved callback. Announcements land on a dedicated,
//! always-registered queue, distinct from ordinary device callbacks, which
//! the device layer reads to build and tear down device objects.

use stackwire_codec::{base58, decode, CodecError, FieldKind, FieldSpec, Format, Value};

/// Why a device announced itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationKind {
    /// Answer to an explicit enumerate broadcast.
    Available,
    /// The device was just attached.
    Connected,
    /// The device was detached; only its uid remains meaningful.
    Disconnected,
}

impl EnumerationKind {
    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(EnumerationKind::Available),
            1 => Some(EnumerationKind::Connected),
            2 => Some(EnumerationKind::Disconnected),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u8 {
        match self {
            EnumerationKind::Available => 0,
            EnumerationKind::Connected => 1,
            EnumerationKind::Disconnected => 2,
        }
    }
}

/// One device announcement.
///
/// Descriptive fields are `None` when the announcement is a disconnect, and
/// `connected_uid` is `None` for a device attached directly to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateEvent {
    pub uid: u32,
    pub connected_uid: Option<u32>,
    pub position: Option<char>,
    pub hardware_version: Option<[u8; 3]>,
    pub firmware_version: Option<[u8; 3]>,
    pub device_identifier: Option<u16>,
    pub kind: EnumerationKind,
}

impl EnumerateEvent {
    /// The announcement payload layout: base58 uid, base58 parent uid,
    /// position, hardware version, firmware version, device identifier,
    /// enumeration kind.
    pub fn wire_format() -> Format {
        Format::new(vec![
            FieldSpec::Text(8),
            FieldSpec::Text(8),
            FieldSpec::Scalar(FieldKind::Char),
            FieldSpec::Array(FieldKind::U8, 3),
            FieldSpec::Array(FieldKind::U8, 3),
            FieldSpec::Scalar(FieldKind::U16),
            FieldSpec::Scalar(FieldKind::U8),
        ])
    }

    /// Decode an announcement payload.
    ///
    /// `Ok(None)` means the enumeration kind is one this client does not
    /// recognize; the caller drops the announcement with a warning.
    pub fn from_payload(payload: &[u8], format: &Format) -> Result<Option<Self>, CodecError> {
        let values: [Value; 7] = decode(payload, format)?
            .try_into()
            .map_err(|values: Vec<Value>| CodecError::ArityMismatch {
                expected: 7,
                actual: values.len(),
            })?;
        let [uid, connected_uid, position, hardware, firmware, device_identifier, kind] = values;

        let Some(kind) = EnumerationKind::from_wire(u8::try_from(kind)?) else {
            return Ok(None);
        };
        let uid = base58::uid_from_base58(&String::try_from(uid)?)?;

        if kind == EnumerationKind::Disconnected {
            return Ok(Some(Self {
                uid,
                connected_uid: None,
                position: None,
                hardware_version: None,
                firmware_version: None,
                device_identifier: None,
                kind,
            }));
        }

        let connected_uid = match String::try_from(connected_uid)?.as_str() {
            // "0" marks a device attached directly to the root.
            "" | "0" => None,
            parent => Some(base58::uid_from_base58(parent)?),
        };

        Ok(Some(Self {
            uid,
            connected_uid,
            position: Some(char::try_from(position)?),
            hardware_version: Some(version_triple(hardware)?),
            firmware_version: Some(version_triple(firmware)?),
            device_identifier: Some(u16::try_from(device_identifier)?),
            kind,
        }))
    }
}

fn version_triple(value: Value) -> Result<[u8; 3], CodecError> {
    let bytes: Vec<u8> = value.try_into()?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CodecError::ArrayLength {
            expected: 3,
            actual: len,
        })
}

#[cfg(test)]
mod tests {
    use stackwire_codec::encode;

    use super::*;

    fn announcement(
        uid: u32,
        parent: &str,
        position: char,
        device_identifier: u16,
        kind: u8,
    ) -> Vec<u8> {
        let values = vec![
            Value::Text(base58::encode(u64::from(uid))),
            Value::Text(parent.to_string()),
            Value::Char(position),
            Value::Array(vec![Value::U8(1), Value::U8(0), Value::U8(0)]),
            Value::Array(vec![Value::U8(2), Value::U8(0), Value::U8(1)]),
            Value::U16(device_identifier),
            Value::U8(kind),
        ];
        encode(&values, &EnumerateEvent::wire_format())
            .unwrap()
            .to_vec()
    }

    #[test]
    fn available_announcement_decodes() {
        let parent = base58::encode(99);
        let payload = announcement(1_234_567, &parent, 'b', 2113, 0);
        let event = EnumerateEvent::from_payload(&payload, &EnumerateEvent::wire_format())
            .unwrap()
            .unwrap();

        assert_eq!(event.uid, 1_234_567);
        assert_eq!(event.connected_uid, Some(99));
        assert_eq!(event.position, Some('b'));
        assert_eq!(event.hardware_version, Some([1, 0, 0]));
        assert_eq!(event.firmware_version, Some([2, 0, 1]));
        assert_eq!(event.device_identifier, Some(2113));
        assert_eq!(event.kind, EnumerationKind::Available);
    }

    #[test]
    fn root_attached_device_has_no_parent() {
        let payload = announcement(7, "0", 'a', 10, 1);
        let event = EnumerateEvent::from_payload(&payload, &EnumerateEvent::wire_format())
            .unwrap()
            .unwrap();
        assert_eq!(event.connected_uid, None);
        assert_eq!(event.kind, EnumerationKind::Connected);
    }

    #[test]
    fn disconnect_clears_descriptive_fields() {
        let payload = announcement(42, "0", 'a', 10, 2);
        let event = EnumerateEvent::from_payload(&payload, &EnumerateEvent::wire_format())
            .unwrap()
            .unwrap();

        assert_eq!(event.uid, 42);
        assert_eq!(event.kind, EnumerationKind::Disconnected);
        assert_eq!(event.connected_uid, None);
        assert_eq!(event.position, None);
        assert_eq!(event.hardware_version, None);
        assert_eq!(event.firmware_version, None);
        assert_eq!(event.device_identifier, None);
    }

    #[test]
    fn unknown_kind_is_skipped() {
        let payload = announcement(42, "0", 'a', 10, 9);
        let event =
            EnumerateEvent::from_payload(&payload, &EnumerateEvent::wire_format()).unwrap();
        assert!(event.is_none());
    }

    #[test]
    fn truncated_payload_is_a_decoding_error() {
        let err = EnumerateEvent::from_payload(&[1, 2, 3], &EnumerateEvent::wire_format())
            .unwrap_err();
        assert!(matches!(err, CodecError::LengthMismatch { .. }));
    }
}
