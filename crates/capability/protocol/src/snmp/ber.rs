//! SNMP v1/v2c 报文的 BER 编解码

use bytes::{BufMut, Bytes, BytesMut};

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_NULL: u8 = 0x05;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_IP_ADDRESS: u8 = 0x40;
pub const TAG_COUNTER32: u8 = 0x41;
pub const TAG_GAUGE32: u8 = 0x42;
pub const TAG_TIMETICKS: u8 = 0x43;
pub const TAG_OPAQUE: u8 = 0x44;
pub const TAG_COUNTER64: u8 = 0x46;
pub const TAG_NO_SUCH_OBJECT: u8 = 0x80;
pub const TAG_NO_SUCH_INSTANCE: u8 = 0x81;
pub const TAG_END_OF_MIB_VIEW: u8 = 0x82;

pub const PDU_GET_REQUEST: u8 = 0xA0;
pub const PDU_GET_RESPONSE: u8 = 0xA2;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed snmp message: {0}")]
pub struct BerError(pub String);

fn malformed(reason: impl Into<String>) -> BerError {
    BerError(reason.into())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    OctetString(Vec<u8>),
    Null,
    ObjectId(String),
    IpAddress([u8; 4]),
    Counter32(u32),
    Gauge32(u32),
    TimeTicks(u32),
    Opaque(Vec<u8>),
    Counter64(u64),
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl SnmpValue {
    /// v2c 的异常值（该 OID 读取失败）。
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: String,
    pub value: SnmpValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub tag: u8,
    pub request_id: i32,
    pub error_status: u32,
    pub error_index: u32,
    pub varbinds: Vec<VarBind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// 0 = v1, 1 = v2c
    pub version: i64,
    pub community: Vec<u8>,
    pub pdu: Pdu,
}

// ---------------------------------------------------------------------------
// 编码
// ---------------------------------------------------------------------------

fn put_length(out: &mut BytesMut, len: usize) {
    if len < 0x80 {
        out.put_u8(len as u8);
        return;
    }
    let bytes = (len as u32).to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    out.put_u8(0x80 | (4 - skip) as u8);
    out.put_slice(&bytes[skip..]);
}

fn put_tlv(out: &mut BytesMut, tag: u8, content: &[u8]) {
    out.put_u8(tag);
    put_length(out, content.len());
    out.put_slice(content);
}

fn integer_bytes(value: i64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let mut start = 0;
    while start < 7 {
        let current = bytes[start];
        let next_sign = bytes[start + 1] & 0x80;
        if (current == 0x00 && next_sign == 0) || (current == 0xFF && next_sign != 0) {
            start += 1;
        } else {
            break;
        }
    }
    bytes[start..].to_vec()
}

fn unsigned_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take(7).take_while(|b| **b == 0).count();
    let mut out = bytes[skip..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0);
    }
    out
}

fn put_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut stack = [0u8; 10];
    let mut len = 0;
    loop {
        stack[len] = (value & 0x7F) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(stack[i] | continuation);
    }
}

/// 编码点分 OID。
pub fn oid_bytes(oid: &str) -> Result<Vec<u8>, BerError> {
    let arcs = oid
        .trim_start_matches('.')
        .split('.')
        .map(|arc| arc.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed(format!("invalid oid {}", oid)))?;
    if arcs.len() < 2 || arcs[0] > 2 || (arcs[0] < 2 && arcs[1] >= 40) {
        return Err(malformed(format!("invalid oid {}", oid)));
    }
    let mut out = Vec::with_capacity(arcs.len() + 4);
    put_base128(&mut out, arcs[0] * 40 + arcs[1]);
    for arc in &arcs[2..] {
        put_base128(&mut out, *arc);
    }
    Ok(out)
}

fn put_value(out: &mut BytesMut, value: &SnmpValue) -> Result<(), BerError> {
    match value {
        SnmpValue::Integer(v) => put_tlv(out, TAG_INTEGER, &integer_bytes(*v)),
        SnmpValue::OctetString(v) => put_tlv(out, TAG_OCTET_STRING, v),
        SnmpValue::Null => put_tlv(out, TAG_NULL, &[]),
        SnmpValue::ObjectId(v) => put_tlv(out, TAG_OID, &oid_bytes(v)?),
        SnmpValue::IpAddress(v) => put_tlv(out, TAG_IP_ADDRESS, v),
        SnmpValue::Counter32(v) => put_tlv(out, TAG_COUNTER32, &unsigned_bytes(u64::from(*v))),
        SnmpValue::Gauge32(v) => put_tlv(out, TAG_GAUGE32, &unsigned_bytes(u64::from(*v))),
        SnmpValue::TimeTicks(v) => put_tlv(out, TAG_TIMETICKS, &unsigned_bytes(u64::from(*v))),
        SnmpValue::Opaque(v) => put_tlv(out, TAG_OPAQUE, v),
        SnmpValue::Counter64(v) => put_tlv(out, TAG_COUNTER64, &unsigned_bytes(*v)),
        SnmpValue::NoSuchObject => put_tlv(out, TAG_NO_SUCH_OBJECT, &[]),
        SnmpValue::NoSuchInstance => put_tlv(out, TAG_NO_SUCH_INSTANCE, &[]),
        SnmpValue::EndOfMibView => put_tlv(out, TAG_END_OF_MIB_VIEW, &[]),
    }
    Ok(())
}

/// 编码完整 SNMP 报文。
pub fn encode_message(message: &Message) -> Result<Bytes, BerError> {
    let mut varbinds = BytesMut::new();
    for varbind in &message.pdu.varbinds {
        let mut entry = BytesMut::new();
        put_tlv(&mut entry, TAG_OID, &oid_bytes(&varbind.oid)?);
        put_value(&mut entry, &varbind.value)?;
        put_tlv(&mut varbinds, TAG_SEQUENCE, &entry);
    }

    let mut pdu = BytesMut::new();
    put_tlv(&mut pdu, TAG_INTEGER, &integer_bytes(i64::from(message.pdu.request_id)));
    put_tlv(&mut pdu, TAG_INTEGER, &integer_bytes(i64::from(message.pdu.error_status)));
    put_tlv(&mut pdu, TAG_INTEGER, &integer_bytes(i64::from(message.pdu.error_index)));
    put_tlv(&mut pdu, TAG_SEQUENCE, &varbinds);

    let mut body = BytesMut::new();
    put_tlv(&mut body, TAG_INTEGER, &integer_bytes(message.version));
    put_tlv(&mut body, TAG_OCTET_STRING, &message.community);
    put_tlv(&mut body, message.pdu.tag, &pdu);

    let mut out = BytesMut::with_capacity(body.len() + 4);
    put_tlv(&mut out, TAG_SEQUENCE, &body);
    Ok(out.freeze())
}

/// 编码 GetRequest。
pub fn encode_get_request(
    version: i64,
    community: &str,
    request_id: i32,
    oids: &[&str],
) -> Result<Bytes, BerError> {
    encode_message(&Message {
        version,
        community: community.as_bytes().to_vec(),
        pdu: Pdu {
            tag: PDU_GET_REQUEST,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds: oids
                .iter()
                .map(|oid| VarBind {
                    oid: (*oid).to_string(),
                    value: SnmpValue::Null,
                })
                .collect(),
        },
    })
}

// ---------------------------------------------------------------------------
// 解码
// ---------------------------------------------------------------------------

fn read_tlv<'a>(buf: &mut &'a [u8]) -> Result<(u8, &'a [u8]), BerError> {
    let (&tag, rest) = buf
        .split_first()
        .ok_or_else(|| malformed("unexpected end of message"))?;
    let (&first, mut rest) = rest
        .split_first()
        .ok_or_else(|| malformed("missing length"))?;
    let len = if first & 0x80 == 0 {
        usize::from(first)
    } else {
        let count = usize::from(first & 0x7F);
        if count == 0 || count > 4 || rest.len() < count {
            return Err(malformed("unsupported length encoding"));
        }
        let (bytes, tail) = rest.split_at(count);
        rest = tail;
        bytes.iter().fold(0usize, |acc, b| (acc << 8) | usize::from(*b))
    };
    if rest.len() < len {
        return Err(malformed("truncated value"));
    }
    let (content, tail) = rest.split_at(len);
    *buf = tail;
    Ok((tag, content))
}

fn expect_tlv<'a>(buf: &mut &'a [u8], expected: u8) -> Result<&'a [u8], BerError> {
    let (tag, content) = read_tlv(buf)?;
    if tag != expected {
        return Err(malformed(format!(
            "expected tag {:#04x}, found {:#04x}",
            expected, tag
        )));
    }
    Ok(content)
}

fn decode_integer(content: &[u8]) -> Result<i64, BerError> {
    if content.is_empty() || content.len() > 8 {
        return Err(malformed("invalid integer length"));
    }
    let init: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    Ok(content
        .iter()
        .fold(init, |acc, b| (acc << 8) | i64::from(*b)))
}

fn decode_unsigned(content: &[u8]) -> Result<u64, BerError> {
    let trimmed = match content {
        [0, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if trimmed.is_empty() || trimmed.len() > 8 {
        return Err(malformed("invalid unsigned length"));
    }
    Ok(trimmed.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn decode_u32(content: &[u8]) -> Result<u32, BerError> {
    u32::try_from(decode_unsigned(content)?).map_err(|_| malformed("32-bit value out of range"))
}

/// 解码 OID 为点分字符串。
pub fn decode_oid(content: &[u8]) -> Result<String, BerError> {
    if content.is_empty() {
        return Err(malformed("empty oid"));
    }
    let mut arcs: Vec<u64> = Vec::new();
    let mut current: u64 = 0;
    for (i, byte) in content.iter().enumerate() {
        if current > (u64::MAX >> 7) {
            return Err(malformed("oid arc overflow"));
        }
        current = (current << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            if arcs.is_empty() {
                let (first, second) = match current {
                    0..=39 => (0, current),
                    40..=79 => (1, current - 40),
                    _ => (2, current - 80),
                };
                arcs.push(first);
                arcs.push(second);
            } else {
                arcs.push(current);
            }
            current = 0;
        } else if i == content.len() - 1 {
            return Err(malformed("truncated oid arc"));
        }
    }
    Ok(arcs
        .iter()
        .map(|arc| arc.to_string())
        .collect::<Vec<_>>()
        .join("."))
}

fn decode_value(tag: u8, content: &[u8]) -> Result<SnmpValue, BerError> {
    Ok(match tag {
        TAG_INTEGER => SnmpValue::Integer(decode_integer(content)?),
        TAG_OCTET_STRING => SnmpValue::OctetString(content.to_vec()),
        TAG_NULL => SnmpValue::Null,
        TAG_OID => SnmpValue::ObjectId(decode_oid(content)?),
        TAG_IP_ADDRESS => SnmpValue::IpAddress(
            content
                .try_into()
                .map_err(|_| malformed("ip address must be 4 bytes"))?,
        ),
        TAG_COUNTER32 => SnmpValue::Counter32(decode_u32(content)?),
        TAG_GAUGE32 => SnmpValue::Gauge32(decode_u32(content)?),
        TAG_TIMETICKS => SnmpValue::TimeTicks(decode_u32(content)?),
        TAG_OPAQUE => SnmpValue::Opaque(content.to_vec()),
        TAG_COUNTER64 => SnmpValue::Counter64(decode_unsigned(content)?),
        TAG_NO_SUCH_OBJECT => SnmpValue::NoSuchObject,
        TAG_NO_SUCH_INSTANCE => SnmpValue::NoSuchInstance,
        TAG_END_OF_MIB_VIEW => SnmpValue::EndOfMibView,
        other => return Err(malformed(format!("unsupported value tag {:#04x}", other))),
    })
}

/// 解码完整 SNMP 报文。
pub fn decode_message(datagram: &[u8]) -> Result<Message, BerError> {
    let mut buf = datagram;
    let mut body = expect_tlv(&mut buf, TAG_SEQUENCE)?;
    let version = decode_integer(expect_tlv(&mut body, TAG_INTEGER)?)?;
    let community = expect_tlv(&mut body, TAG_OCTET_STRING)?.to_vec();
    let (tag, mut pdu) = read_tlv(&mut body)?;
    if tag & 0xE0 != 0xA0 {
        return Err(malformed(format!("unexpected pdu tag {:#04x}", tag)));
    }
    let request_id = decode_integer(expect_tlv(&mut pdu, TAG_INTEGER)?)?;
    let request_id =
        i32::try_from(request_id).map_err(|_| malformed("request id out of range"))?;
    let error_status = decode_integer(expect_tlv(&mut pdu, TAG_INTEGER)?)?;
    let error_index = decode_integer(expect_tlv(&mut pdu, TAG_INTEGER)?)?;
    let mut list = expect_tlv(&mut pdu, TAG_SEQUENCE)?;
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        let mut entry = expect_tlv(&mut list, TAG_SEQUENCE)?;
        let oid = decode_oid(expect_tlv(&mut entry, TAG_OID)?)?;
        let (value_tag, content) = read_tlv(&mut entry)?;
        varbinds.push(VarBind {
            oid,
            value: decode_value(value_tag, content)?,
        });
    }
    Ok(Message {
        version,
        community,
        pdu: Pdu {
            tag,
            request_id,
            error_status: u32::try_from(error_status).unwrap_or(u32::MAX),
            error_index: u32::try_from(error_index).unwrap_or(u32::MAX),
            varbinds,
        },
    })
}
