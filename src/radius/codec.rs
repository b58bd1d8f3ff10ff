//! Attribute encoding and decoding.
//!
//! Each pair becomes one top-level attribute. Supported forms:
//!
//! - standard: `type len value`
//! - Vendor-Specific (RFC 2865 §5.26): `26 len vendor(4) vtype vlen value`
//! - extended (RFC 6929): `241 len ext-type value`, with Extended-Vendor-Specific carrying
//!   `vendor(4) evs-type value`
//!
//! Group levels below those are nested TLVs (`tag len value`).

use crate::{
    crypto::DIGEST_LENGTH,
    dictionary::{AttrId, DataType, Dictionary, ATTR_MESSAGE_AUTHENTICATOR},
    pairs::{Pair, PairList},
    value::Value,
};

use super::CodecError;

/// Longest value that fits in a single attribute or TLV.
const MAX_VALUE_LEN: usize = 253;

/// Encoded attributes.
#[derive(Debug)]
pub struct Encoded {
    pub data: Vec<u8>,
    /// Offset of the Message-Authenticator value within `data`, zero filled.
    pub message_authenticator: Option<usize>,
}

/// Decoded attributes.
#[derive(Debug)]
pub struct Decoded {
    pub pairs: PairList,
    /// Offset of the Message-Authenticator value within the attribute data.
    pub message_authenticator: Option<usize>,
}

/// Encodes every pair in list order.
pub fn encode_pairs(dict: &Dictionary, pairs: &PairList) -> Result<Encoded, CodecError> {
    let mut data = Vec::new();
    let mut message_authenticator = None;
    for pair in pairs {
        if is_message_authenticator(dict, pair.attr) {
            data.extend_from_slice(&[ATTR_MESSAGE_AUTHENTICATOR as u8, (DIGEST_LENGTH + 2) as u8]);
            message_authenticator = Some(data.len());
            data.extend_from_slice(&[0; DIGEST_LENGTH]);
            continue;
        }
        data.extend_from_slice(&encode_pair(dict, pair)?);
    }
    Ok(Encoded {
        data,
        message_authenticator,
    })
}

fn is_message_authenticator(dict: &Dictionary, attr: AttrId) -> bool {
    dict.attr(attr).parent() == Some(dict.root()) && dict.attr(attr).num() == ATTR_MESSAGE_AUTHENTICATOR
}

/// Encodes a single pair as a top-level attribute.
fn encode_pair(dict: &Dictionary, pair: &Pair) -> Result<Vec<u8>, CodecError> {
    let leaf = dict.attr(pair.attr);
    if leaf.data_type().is_structural() {
        return Err(CodecError::Unencodable(leaf.name().to_string()));
    }
    let too_long = || CodecError::AttributeTooLong(leaf.name().to_string());
    let unencodable = || CodecError::Unencodable(leaf.name().to_string());

    let lineage = dict.lineage(pair.attr);
    let top = dict.attr(lineage[0]);
    let value = pair.value.to_wire();
    if value.len() > MAX_VALUE_LEN {
        return Err(too_long());
    }

    let body = match top.data_type() {
        DataType::Vsa => {
            // 26 . vendor . vendor-type [. tlv ...]
            let (vendor, rest) = vendor_and_rest(dict, &lineage[1..]).ok_or_else(unencodable)?;
            let mut body = vendor.to_be_bytes().to_vec();
            body.extend_from_slice(&nest(dict, rest, value).ok_or_else(too_long)?);
            body
        }
        DataType::Extended => {
            let ext = *lineage.get(1).ok_or_else(unencodable)?;
            let mut body = vec![tag(dict, ext).ok_or_else(unencodable)?];
            match dict.attr(ext).data_type() {
                DataType::Evs => {
                    // 241 . 26 . vendor . evs-type [. tlv ...]
                    let (vendor, rest) = vendor_and_rest(dict, &lineage[2..]).ok_or_else(unencodable)?;
                    let (evs_type, rest) = rest.split_first().ok_or_else(unencodable)?;
                    body.extend_from_slice(&vendor.to_be_bytes());
                    body.push(tag(dict, *evs_type).ok_or_else(unencodable)?);
                    body.extend_from_slice(&nest(dict, rest, value).ok_or_else(too_long)?);
                }
                DataType::Tlv => {
                    body.extend_from_slice(&nest(dict, &lineage[2..], value).ok_or_else(too_long)?);
                }
                _ if lineage.len() == 2 => body.extend_from_slice(&value),
                _ => return Err(unencodable()),
            }
            body
        }
        DataType::Tlv => nest(dict, &lineage[1..], value).ok_or_else(too_long)?,
        _ if lineage.len() == 1 => value,
        _ => return Err(unencodable()),
    };

    wrap(tag(dict, lineage[0]).ok_or_else(unencodable)?, &body).ok_or_else(too_long)
}

/// Splits `[vendor, rest..]`, checking that the first node is a vendor.
fn vendor_and_rest<'a>(dict: &Dictionary, lineage: &'a [AttrId]) -> Option<(u32, &'a [AttrId])> {
    let (vendor, rest) = lineage.split_first()?;
    let attr = dict.attr(*vendor);
    (attr.data_type() == DataType::Vendor && !rest.is_empty()).then_some((attr.num(), rest))
}

/// Wraps `value` in one TLV header per node of `path`, innermost last.
fn nest(dict: &Dictionary, path: &[AttrId], value: Vec<u8>) -> Option<Vec<u8>> {
    path.iter()
        .rev()
        .try_fold(value, |inner, node| wrap(tag(dict, *node)?, &inner))
}

fn tag(dict: &Dictionary, node: AttrId) -> Option<u8> {
    u8::try_from(dict.attr(node).num()).ok()
}

fn wrap(tag: u8, body: &[u8]) -> Option<Vec<u8>> {
    if body.len() > MAX_VALUE_LEN {
        return None;
    }
    let mut out = Vec::with_capacity(body.len() + 2);
    out.push(tag);
    out.push((body.len() + 2) as u8);
    out.extend_from_slice(body);
    Some(out)
}

/// Decodes attribute data, flattening nested attributes depth first.
///
/// Attributes missing from the dictionary are skipped.
pub fn decode_attributes(dict: &Dictionary, data: &[u8]) -> Result<Decoded, CodecError> {
    let mut pairs = PairList::new();
    let mut message_authenticator = None;
    for (offset, typ, value) in split_tlvs(data)? {
        if u32::from(typ) == ATTR_MESSAGE_AUTHENTICATOR {
            if value.len() != DIGEST_LENGTH {
                return Err(CodecError::Malformed(format!(
                    "Message-Authenticator has length {}",
                    value.len()
                )));
            }
            message_authenticator = Some(offset + 2);
        }
        match dict.child_by_num(dict.root(), u32::from(typ)) {
            Some(attr) => decode_attr(dict, attr, value, &mut pairs)?,
            None => log::debug!("Skipping unknown attribute {}", typ),
        }
    }
    Ok(Decoded {
        pairs,
        message_authenticator,
    })
}

fn decode_attr(dict: &Dictionary, attr: AttrId, data: &[u8], pairs: &mut PairList) -> Result<(), CodecError> {
    let entry = dict.attr(attr);
    match entry.data_type() {
        DataType::Vsa => {
            let (vendor, rest) = split_vendor(entry.name(), data)?;
            match dict.child_by_num(attr, vendor) {
                Some(node) => decode_children(dict, node, rest, pairs),
                None => {
                    log::debug!("Skipping attribute of unknown vendor {}", vendor);
                    Ok(())
                }
            }
        }
        DataType::Extended => {
            let (ext, rest) = data
                .split_first()
                .ok_or_else(|| CodecError::Malformed(format!("{} is empty", entry.name())))?;
            match dict.child_by_num(attr, u32::from(*ext)) {
                Some(node) => decode_attr(dict, node, rest, pairs),
                None => {
                    log::debug!("Skipping unknown attribute {}.{}", entry.num(), ext);
                    Ok(())
                }
            }
        }
        DataType::Evs => {
            let (vendor, rest) = split_vendor(entry.name(), data)?;
            let (evs_type, rest) = rest
                .split_first()
                .ok_or_else(|| CodecError::Malformed(format!("{} has no vendor type", entry.name())))?;
            match dict
                .child_by_num(attr, vendor)
                .and_then(|node| dict.child_by_num(node, u32::from(*evs_type)))
            {
                Some(node) => decode_attr(dict, node, rest, pairs),
                None => {
                    log::debug!("Skipping unknown vendor attribute {}.{}", vendor, evs_type);
                    Ok(())
                }
            }
        }
        DataType::Tlv | DataType::Vendor => decode_children(dict, attr, data, pairs),
        leaf => {
            let value = Value::from_wire(leaf, data).map_err(|source| CodecError::Value {
                attr: entry.name().to_string(),
                source,
            })?;
            pairs.push(Pair::new(attr, value));
            Ok(())
        }
    }
}

fn decode_children(dict: &Dictionary, parent: AttrId, data: &[u8], pairs: &mut PairList) -> Result<(), CodecError> {
    for (_, tag, value) in split_tlvs(data)? {
        match dict.child_by_num(parent, u32::from(tag)) {
            Some(child) => decode_attr(dict, child, value, pairs)?,
            None => log::debug!("Skipping unknown child {} of {}", tag, dict.attr(parent).name()),
        }
    }
    Ok(())
}

fn split_vendor<'a>(name: &str, data: &'a [u8]) -> Result<(u32, &'a [u8]), CodecError> {
    if data.len() < 4 {
        return Err(CodecError::Malformed(format!("{} is too short for a vendor id", name)));
    }
    let vendor = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    Ok((vendor, &data[4..]))
}

/// Splits `tag len value` records, returning each record's offset, tag and value.
fn split_tlvs(data: &[u8]) -> Result<Vec<(usize, u8, &[u8])>, CodecError> {
    let mut records = Vec::new();
    let mut offset = 0;
    while offset < data.len() {
        if data.len() - offset < 2 {
            return Err(CodecError::Malformed(format!("Truncated header at offset {}", offset)));
        }
        let tag = data[offset];
        let len = data[offset + 1] as usize;
        if len < 2 || offset + len > data.len() {
            return Err(CodecError::Malformed(format!(
                "Attribute {} at offset {} has invalid length {}",
                tag, offset, len
            )));
        }
        records.push((offset, tag, &data[offset + 2..offset + len]));
        offset += len;
    }
    Ok(records)
}
