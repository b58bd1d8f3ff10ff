//! Attribute value pairs to pass_persist response text.

use thiserror::Error;

use crate::{
    dictionary::{AttrId, DataType, Dictionary},
    oid::Oid,
    pairs::PairList,
    value::Value,
};

/// Written when a query produced no varbinds.
pub const RESPONSE_NONE: &str = "NONE";
/// Written for a `set` the server accepted.
pub const RESPONSE_DONE: &str = "DONE";

/// Errors produced while turning a reply into varbinds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResponseError {
    #[error("Out of order index attributes.  \"{attr}\" is not a child of \"{anchor}\"")]
    OutOfOrder { attr: String, anchor: String },

    #[error("Index attribute \"{0}\" is not of type \"integer\"")]
    IndexNotInteger(String),

    #[error("No {0} found in response, or occurred after value attribute")]
    MissingType(String),
}

/// Text for a `get`/`getnext` response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Varbinds {
    /// Bytes to write to the agent, `NONE\n` when `count` is zero.
    pub text: Vec<u8>,
    pub count: usize,
}

/// Converts reply pairs into `OID\nTYPE\nVALUE\n` blocks.
///
/// `root` is the first attribute included in rendered OIDs and `type_attr` the attribute
/// whose value names the SNMP type of the next leaf. Pairs outside `root` are ignored. The
/// pairs of one varbind must be contiguous: the type, then index attributes shallowest
/// first, then the leaf.
///
/// # Errors
/// Fails on ordering violations, non-integer index attributes and leaves with no preceding
/// type. Nothing is produced on failure.
pub fn get_response(
    dict: &Dictionary,
    root: AttrId,
    type_attr: AttrId,
    pairs: &PairList,
) -> Result<Varbinds, ResponseError> {
    // Starting above the root keeps the root's own number at the front of every OID.
    let base = dict.attr(root).parent().unwrap_or(root);

    let mut text = Vec::new();
    let mut count = 0;
    let mut anchor = base;
    let mut oid = Oid::default();
    let mut type_label: Option<String> = None;

    for pair in pairs {
        let attr = dict.attr(pair.attr);
        if pair.attr == type_attr {
            type_label = Some(pair.value.render(attr));
            continue;
        }
        if !dict.is_ancestor(root, pair.attr) {
            continue;
        }

        let Some(path) = dict.path_between(anchor, pair.attr) else {
            return Err(ResponseError::OutOfOrder {
                attr: attr.name().to_string(),
                anchor: dict.attr(anchor).name().to_string(),
            });
        };

        if let Some(table) = index_table(dict, pair.attr) {
            let (DataType::Integer, Value::Integer(index)) = (attr.data_type(), &pair.value) else {
                return Err(ResponseError::IndexNotInteger(attr.name().to_string()));
            };
            // Drop the index attribute's own number, the value stands in for it.
            oid.extend_from_slice(&path[..path.len() - 1]);
            oid.push(*index);
            anchor = dict.child_by_num(table, 1).unwrap_or(table);
            continue;
        }

        let Some(label) = type_label.take() else {
            return Err(ResponseError::MissingType(dict.attr(type_attr).name().to_string()));
        };
        oid.extend_from_slice(&path);

        text.extend_from_slice(oid.to_string().as_bytes());
        text.push(b'\n');
        text.extend_from_slice(label.as_bytes());
        text.push(b'\n');
        text.extend_from_slice(&pair.value.agent_bytes(attr));
        text.push(b'\n');
        count += 1;

        anchor = base;
        oid.clear();
    }

    if count == 0 {
        text = format!("{}\n", RESPONSE_NONE).into_bytes();
    }
    Ok(Varbinds { text, count })
}

/// Returns the table an index attribute belongs to, or `None` for anything else.
fn index_table(dict: &Dictionary, attr: AttrId) -> Option<AttrId> {
    let entry = dict.attr(attr);
    if entry.num() != 0 {
        return None;
    }
    entry.parent().filter(|parent| dict.attr(*parent).data_type().is_structural())
}

/// Converts reply pairs into the response to a `set`.
///
/// `DONE` unless the reply carries `failure_attr`, whose rendered value is returned instead.
pub fn set_response(dict: &Dictionary, failure_attr: AttrId, pairs: &PairList) -> Vec<u8> {
    let line = match pairs.find(failure_attr) {
        Some(pair) => pair.value.render(dict.attr(failure_attr)),
        None => RESPONSE_DONE.to_string(),
    };
    format!("{}\n", line).into_bytes()
}
