//! BACnet/IP 报文编解码（BVLC + NPDU + APDU）
//!
//! 只覆盖轮询与发现需要的子集：ReadProperty(present-value)、
//! Who-Is / I-Am，以及 Error / Reject / Abort 应答。

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub const BVLC_TYPE: u8 = 0x81;
pub const BVLC_FORWARDED_NPDU: u8 = 0x04;
pub const BVLC_ORIGINAL_UNICAST: u8 = 0x0A;
pub const BVLC_ORIGINAL_BROADCAST: u8 = 0x0B;

pub const PROPERTY_PRESENT_VALUE: u32 = 85;

const NPDU_VERSION: u8 = 0x01;
const SERVICE_READ_PROPERTY: u8 = 0x0C;
const SERVICE_I_AM: u8 = 0x00;
const SERVICE_WHO_IS: u8 = 0x08;
/// 最大分段数未指定 / 最大 APDU 1476 字节
const MAX_APDU_1476: u8 = 0x05;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed bacnet frame: {0}")]
pub struct CodecError(pub String);

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError(reason.into())
}

/// 应用层取值。
#[derive(Debug, Clone, PartialEq)]
pub enum ApplicationValue {
    Null,
    Boolean(bool),
    Unsigned(u64),
    Signed(i64),
    Real(f32),
    Double(f64),
    OctetString(Vec<u8>),
    CharacterString(String),
    BitString(Vec<u8>),
    Enumerated(u32),
    Date([u8; 4]),
    Time([u8; 4]),
    ObjectIdentifier { object_type: u16, instance: u32 },
}

/// I-Am 应答内容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IAm {
    pub device_id: u32,
    pub max_apdu: u32,
    pub segmentation: u8,
    pub vendor_id: u32,
}

/// 解码后的 APDU。
#[derive(Debug, Clone, PartialEq)]
pub enum Apdu {
    ReadPropertyAck {
        invoke_id: u8,
        value: ApplicationValue,
    },
    Error {
        invoke_id: u8,
        class: u32,
        code: u32,
    },
    Reject {
        invoke_id: u8,
        reason: u8,
    },
    Abort {
        invoke_id: u8,
        reason: u8,
    },
    IAm(IAm),
    /// 与本客户端无关的报文（其他服务、请求、网络层消息）
    Other,
}

impl Apdu {
    pub fn invoke_id(&self) -> Option<u8> {
        match self {
            Apdu::ReadPropertyAck { invoke_id, .. }
            | Apdu::Error { invoke_id, .. }
            | Apdu::Reject { invoke_id, .. }
            | Apdu::Abort { invoke_id, .. } => Some(*invoke_id),
            Apdu::IAm(_) | Apdu::Other => None,
        }
    }
}

pub fn object_identifier(object_type: u16, instance: u32) -> u32 {
    (u32::from(object_type) << 22) | (instance & 0x3F_FFFF)
}

fn wrap_bvlc(function: u8, npdu_and_apdu: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(4 + npdu_and_apdu.len());
    buf.put_u8(BVLC_TYPE);
    buf.put_u8(function);
    buf.put_u16((4 + npdu_and_apdu.len()) as u16);
    buf.put_slice(npdu_and_apdu);
    buf.freeze()
}

/// 编码 ReadProperty 确认请求。
pub fn encode_read_property(invoke_id: u8, object_type: u16, instance: u32, property: u32) -> Bytes {
    let mut body = BytesMut::with_capacity(20);
    // NPDU：期待应答
    body.put_u8(NPDU_VERSION);
    body.put_u8(0x04);
    // APDU：Confirmed-Request
    body.put_u8(0x00);
    body.put_u8(MAX_APDU_1476);
    body.put_u8(invoke_id);
    body.put_u8(SERVICE_READ_PROPERTY);
    // [0] objectIdentifier
    body.put_u8(0x0C);
    body.put_u32(object_identifier(object_type, instance));
    // [1] propertyIdentifier
    put_context_unsigned(&mut body, 1, property);
    wrap_bvlc(BVLC_ORIGINAL_UNICAST, &body)
}

/// 编码 Who-Is（可选实例范围）。
pub fn encode_who_is(range: Option<(u32, u32)>, broadcast: bool) -> Bytes {
    let mut body = BytesMut::with_capacity(16);
    body.put_u8(NPDU_VERSION);
    body.put_u8(0x00);
    body.put_u8(0x10);
    body.put_u8(SERVICE_WHO_IS);
    if let Some((low, high)) = range {
        put_context_unsigned(&mut body, 0, low);
        put_context_unsigned(&mut body, 1, high);
    }
    let function = if broadcast {
        BVLC_ORIGINAL_BROADCAST
    } else {
        BVLC_ORIGINAL_UNICAST
    };
    wrap_bvlc(function, &body)
}

fn put_context_unsigned(buf: &mut BytesMut, tag: u8, value: u32) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(3).take_while(|b| **b == 0).count();
    let len = 4 - skip;
    buf.put_u8((tag << 4) | 0x08 | len as u8);
    buf.put_slice(&bytes[skip..]);
}

/// 解码一个 BVLC 帧。
pub fn decode_frame(frame: &[u8]) -> Result<Apdu, CodecError> {
    let mut buf = frame;
    if buf.remaining() < 4 {
        return Err(malformed("frame shorter than bvlc header"));
    }
    if buf.get_u8() != BVLC_TYPE {
        return Err(malformed("not a bacnet/ip frame"));
    }
    let function = buf.get_u8();
    let length = usize::from(buf.get_u16());
    if length != frame.len() {
        return Err(malformed(format!(
            "bvlc length {} does not match datagram {}",
            length,
            frame.len()
        )));
    }
    match function {
        BVLC_ORIGINAL_UNICAST | BVLC_ORIGINAL_BROADCAST => {}
        BVLC_FORWARDED_NPDU => {
            if buf.remaining() < 6 {
                return Err(malformed("forwarded npdu without source address"));
            }
            buf.advance(6);
        }
        _ => return Ok(Apdu::Other),
    }
    decode_npdu(buf)
}

fn decode_npdu(mut buf: &[u8]) -> Result<Apdu, CodecError> {
    if buf.remaining() < 2 {
        return Err(malformed("npdu too short"));
    }
    if buf.get_u8() != NPDU_VERSION {
        return Err(malformed("unsupported npdu version"));
    }
    let control = buf.get_u8();
    let has_destination = control & 0x20 != 0;
    if has_destination {
        skip_network_address(&mut buf)?;
    }
    if control & 0x08 != 0 {
        skip_network_address(&mut buf)?;
    }
    if has_destination {
        take(&mut buf, 1)?;
    }
    if control & 0x80 != 0 {
        return Ok(Apdu::Other);
    }
    decode_apdu(buf)
}

fn skip_network_address(buf: &mut &[u8]) -> Result<(), CodecError> {
    take(buf, 2)?;
    let len = take(buf, 1)?[0];
    take(buf, usize::from(len))?;
    Ok(())
}

fn take<'a>(buf: &mut &'a [u8], count: usize) -> Result<&'a [u8], CodecError> {
    if buf.len() < count {
        return Err(malformed("unexpected end of frame"));
    }
    let (head, tail) = buf.split_at(count);
    *buf = tail;
    Ok(head)
}

fn decode_apdu(mut buf: &[u8]) -> Result<Apdu, CodecError> {
    let header = take(&mut buf, 1)?[0];
    match header >> 4 {
        // Unconfirmed-Request
        0x1 => {
            let service = take(&mut buf, 1)?[0];
            if service == SERVICE_I_AM {
                decode_i_am(buf).map(Apdu::IAm)
            } else {
                Ok(Apdu::Other)
            }
        }
        // Complex-ACK
        0x3 => {
            if header & 0x08 != 0 {
                return Err(malformed("segmented responses are not supported"));
            }
            let invoke_id = take(&mut buf, 1)?[0];
            let service = take(&mut buf, 1)?[0];
            if service != SERVICE_READ_PROPERTY {
                return Ok(Apdu::Other);
            }
            let value = decode_read_property_ack(buf)?;
            Ok(Apdu::ReadPropertyAck { invoke_id, value })
        }
        // Error
        0x5 => {
            let invoke_id = take(&mut buf, 1)?[0];
            take(&mut buf, 1)?;
            let class = match read_tag(&mut buf) {
                Ok(tag) => tag_unsigned(&tag, &mut buf).unwrap_or(0),
                Err(_) => 0,
            };
            let code = match read_tag(&mut buf) {
                Ok(tag) => tag_unsigned(&tag, &mut buf).unwrap_or(0),
                Err(_) => 0,
            };
            Ok(Apdu::Error {
                invoke_id,
                class: u32::try_from(class).unwrap_or(u32::MAX),
                code: u32::try_from(code).unwrap_or(u32::MAX),
            })
        }
        0x6 => {
            let invoke_id = take(&mut buf, 1)?[0];
            let reason = take(&mut buf, 1)?[0];
            Ok(Apdu::Reject { invoke_id, reason })
        }
        0x7 => {
            let invoke_id = take(&mut buf, 1)?[0];
            let reason = take(&mut buf, 1)?[0];
            Ok(Apdu::Abort { invoke_id, reason })
        }
        _ => Ok(Apdu::Other),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tag {
    number: u8,
    context: bool,
    /// 长度 / 取值 / 类型字段（打开/关闭标签时为 6/7）
    lvt: u32,
    opening: bool,
    closing: bool,
}

fn read_tag(buf: &mut &[u8]) -> Result<Tag, CodecError> {
    let first = take(buf, 1)?[0];
    let mut number = first >> 4;
    if number == 0x0F {
        number = take(buf, 1)?[0];
    }
    let context = first & 0x08 != 0;
    let raw_lvt = first & 0x07;
    if context && raw_lvt == 6 {
        return Ok(Tag {
            number,
            context,
            lvt: 0,
            opening: true,
            closing: false,
        });
    }
    if context && raw_lvt == 7 {
        return Ok(Tag {
            number,
            context,
            lvt: 0,
            opening: false,
            closing: true,
        });
    }
    let lvt = if raw_lvt == 5 && !(number == 1 && !context) {
        match take(buf, 1)?[0] {
            254 => {
                let bytes = take(buf, 2)?;
                u32::from(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            255 => {
                let bytes = take(buf, 4)?;
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
            }
            len => u32::from(len),
        }
    } else {
        u32::from(raw_lvt)
    };
    Ok(Tag {
        number,
        context,
        lvt,
        opening: false,
        closing: false,
    })
}

fn tag_content<'a>(tag: &Tag, buf: &mut &'a [u8]) -> Result<&'a [u8], CodecError> {
    take(buf, tag.lvt as usize)
}

fn be_unsigned(bytes: &[u8]) -> Result<u64, CodecError> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(malformed("invalid unsigned length"));
    }
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn be_signed(bytes: &[u8]) -> Result<i64, CodecError> {
    if bytes.is_empty() || bytes.len() > 8 {
        return Err(malformed("invalid signed length"));
    }
    let negative = bytes[0] & 0x80 != 0;
    let init: i64 = if negative { -1 } else { 0 };
    Ok(bytes.iter().fold(init, |acc, b| (acc << 8) | i64::from(*b)))
}

fn tag_unsigned(tag: &Tag, buf: &mut &[u8]) -> Result<u64, CodecError> {
    let bytes = tag_content(tag, buf)?;
    be_unsigned(bytes)
}

fn decode_application_value(tag: &Tag, buf: &mut &[u8]) -> Result<ApplicationValue, CodecError> {
    if tag.context || tag.opening || tag.closing {
        return Err(malformed("expected application tag"));
    }
    let value = match tag.number {
        0 => ApplicationValue::Null,
        1 => ApplicationValue::Boolean(tag.lvt != 0),
        2 => ApplicationValue::Unsigned(be_unsigned(tag_content(tag, buf)?)?),
        3 => ApplicationValue::Signed(be_signed(tag_content(tag, buf)?)?),
        4 => {
            let bytes = tag_content(tag, buf)?;
            let bytes: [u8; 4] = bytes
                .try_into()
                .map_err(|_| malformed("real must be 4 bytes"))?;
            ApplicationValue::Real(f32::from_be_bytes(bytes))
        }
        5 => {
            let bytes = tag_content(tag, buf)?;
            let bytes: [u8; 8] = bytes
                .try_into()
                .map_err(|_| malformed("double must be 8 bytes"))?;
            ApplicationValue::Double(f64::from_be_bytes(bytes))
        }
        6 => ApplicationValue::OctetString(tag_content(tag, buf)?.to_vec()),
        7 => {
            let bytes = tag_content(tag, buf)?;
            let (charset, text) = bytes
                .split_first()
                .ok_or_else(|| malformed("empty character string"))?;
            let text = match charset {
                0 => String::from_utf8_lossy(text).into_owned(),
                // ISO 8859-1
                5 => text.iter().map(|b| char::from(*b)).collect(),
                other => return Err(malformed(format!("unsupported charset {}", other))),
            };
            ApplicationValue::CharacterString(text)
        }
        8 => ApplicationValue::BitString(tag_content(tag, buf)?.to_vec()),
        9 => {
            let raw = be_unsigned(tag_content(tag, buf)?)?;
            ApplicationValue::Enumerated(
                u32::try_from(raw).map_err(|_| malformed("enumerated out of range"))?,
            )
        }
        10 | 11 => {
            let bytes = tag_content(tag, buf)?;
            let bytes: [u8; 4] = bytes
                .try_into()
                .map_err(|_| malformed("date/time must be 4 bytes"))?;
            if tag.number == 10 {
                ApplicationValue::Date(bytes)
            } else {
                ApplicationValue::Time(bytes)
            }
        }
        12 => {
            let raw = be_unsigned(tag_content(tag, buf)?)?;
            let raw = u32::try_from(raw).map_err(|_| malformed("object id out of range"))?;
            ApplicationValue::ObjectIdentifier {
                object_type: (raw >> 22) as u16,
                instance: raw & 0x3F_FFFF,
            }
        }
        other => return Err(malformed(format!("unknown application tag {}", other))),
    };
    Ok(value)
}

fn decode_read_property_ack(mut buf: &[u8]) -> Result<ApplicationValue, CodecError> {
    loop {
        let tag = read_tag(&mut buf)?;
        if tag.context && tag.opening && tag.number == 3 {
            break;
        }
        if tag.opening || tag.closing {
            return Err(malformed("unexpected constructed tag before property value"));
        }
        tag_content(&tag, &mut buf)?;
    }
    let tag = read_tag(&mut buf)?;
    if tag.closing {
        return Err(malformed("empty property value"));
    }
    decode_application_value(&tag, &mut buf)
}

fn decode_i_am(mut buf: &[u8]) -> Result<IAm, CodecError> {
    let mut values = Vec::with_capacity(4);
    for _ in 0..4 {
        let tag = read_tag(&mut buf)?;
        values.push(decode_application_value(&tag, &mut buf)?);
    }
    let device_id = match values[0] {
        ApplicationValue::ObjectIdentifier {
            object_type: 8,
            instance,
        } => instance,
        _ => return Err(malformed("i-am must start with a device identifier")),
    };
    let max_apdu = match values[1] {
        ApplicationValue::Unsigned(v) => u32::try_from(v).unwrap_or(u32::MAX),
        _ => return Err(malformed("i-am max apdu must be unsigned")),
    };
    let segmentation = match values[2] {
        ApplicationValue::Enumerated(v) => u8::try_from(v).unwrap_or(u8::MAX),
        _ => return Err(malformed("i-am segmentation must be enumerated")),
    };
    let vendor_id = match values[3] {
        ApplicationValue::Unsigned(v) => u32::try_from(v).unwrap_or(u32::MAX),
        _ => return Err(malformed("i-am vendor id must be unsigned")),
    };
    Ok(IAm {
        device_id,
        max_apdu,
        segmentation,
        vendor_id,
    })
}
