//! OID text to attribute value pairs.

use crate::{
    dictionary::{AttrId, DataType, Dictionary},
    oid::{parse_components, OidError, OidErrorKind},
    pairs::{Pair, PairList},
    value::Value,
};

/// Translates an agent OID (and an optional `set` value) into request pairs.
///
/// Components are resolved beneath `root`. A component with no matching child is either the
/// trailing `.0` of a scalar instance, or a table index: it is then emitted as the value of
/// the level's index attribute (tag 0) and resolution continues beneath the entry attribute
/// (tag 1). Index pairs precede the leaf pair, shallowest first.
///
/// # Errors
/// Returns `OidError` with the byte offset of the offending component. Value parse failures
/// are reported at the end of the OID.
pub fn pairs_from_oid(
    dict: &Dictionary,
    root: AttrId,
    oid: &str,
    value: Option<&str>,
) -> Result<PairList, OidError> {
    let components = parse_components(oid)?;
    let nums: Vec<u32> = components.iter().map(|c| c.num).collect();

    let mut pairs = PairList::new();
    let mut node = root;
    let mut pos = 0;
    loop {
        let (reached, consumed) = dict.resolve_path(node, &nums[pos..]);
        node = reached;
        pos += consumed;
        if pos == nums.len() {
            break;
        }

        let component = components[pos];
        if pos + 1 == nums.len() && component.num == 0 {
            break;
        }
        let (index, entry) = index_and_entry(dict, node).map_err(|kind| OidError::new(component.offset, kind))?;
        pairs.push(Pair::new(index, Value::Integer(component.num)));
        node = entry;
        pos += 1;
    }

    let leaf = dict.attr(node);
    let last_offset = components.last().map(|c| c.offset).unwrap_or_default();
    if node == root || leaf.data_type().is_structural() {
        return Err(OidError::new(
            last_offset,
            OidErrorKind::NotLeaf {
                name: leaf.name().to_string(),
                data_type: leaf.data_type().to_string(),
            },
        ));
    }

    let leaf_value = match value {
        Some(text) => Value::parse(leaf, text),
        None => Value::placeholder(leaf.data_type()),
    }
    .map_err(|e| OidError::new(oid.len(), OidErrorKind::Value(e)))?;
    pairs.push(Pair::new(node, leaf_value));
    Ok(pairs)
}

/// Checks the table convention beneath `table`.
fn index_and_entry(dict: &Dictionary, table: AttrId) -> Result<(AttrId, AttrId), OidErrorKind> {
    let index = dict.child_by_num(table, 0).ok_or(OidErrorKind::NoIndex)?;
    if dict.attr(index).data_type() != DataType::Integer {
        return Err(OidErrorKind::IndexNotInteger);
    }
    let entry = dict.child_by_num(table, 1).ok_or(OidErrorKind::NoEntry)?;
    if dict.attr(entry).data_type() != DataType::Tlv {
        return Err(OidErrorKind::EntryNotTlv);
    }
    Ok((index, entry))
}
