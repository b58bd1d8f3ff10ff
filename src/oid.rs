//! Numeric object identifiers as exchanged with the SNMP agent.

use std::fmt;

use thiserror::Error;

use crate::value::ValueError;

/// Reason an OID could not be translated.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OidErrorKind {
    #[error("Empty OID")]
    Empty,

    #[error("Expected a numeric OID component")]
    BadComponent,

    #[error("Unknown OID component: No index attribute at this level")]
    NoIndex,

    #[error("Index is not a \"integer\"")]
    IndexNotInteger,

    #[error("Unknown OID component: No entry attribute at this level")]
    NoEntry,

    #[error("Entry is not \"tlv\"")]
    EntryNotTlv,

    #[error("OID must specify a leaf, \"{name}\" is a \"{data_type}\"")]
    NotLeaf { name: String, data_type: String },

    #[error("Failed parsing value: {0}")]
    Value(ValueError),
}

/// An OID translation failure at a byte offset of the OID text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}")]
pub struct OidError {
    pub offset: usize,
    pub kind: OidErrorKind,
}

impl OidError {
    pub fn new(offset: usize, kind: OidErrorKind) -> Self {
        OidError { offset, kind }
    }
}

/// One numeric component and where it starts in the source text.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Component {
    pub num: u32,
    pub offset: usize,
}

/// Splits dotted OID text into components.
///
/// A single leading `.` is accepted. Offsets refer to the text as given.
pub fn parse_components(text: &str) -> Result<Vec<Component>, OidError> {
    let (body, skipped) = match text.strip_prefix('.') {
        Some(rest) => (rest, 1),
        None => (text, 0),
    };
    if body.is_empty() {
        return Err(OidError::new(0, OidErrorKind::Empty));
    }

    let mut components = Vec::new();
    let mut offset = skipped;
    for part in body.split('.') {
        let num = part
            .parse::<u32>()
            .ok()
            .filter(|_| part.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| OidError::new(offset, OidErrorKind::BadComponent))?;
        components.push(Component { num, offset });
        offset += part.len() + 1;
    }
    Ok(components)
}

/// An SNMP object identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Oid(pub Vec<u32>);

impl Oid {
    pub fn extend_from_slice(&mut self, subs: &[u32]) {
        self.0.extend_from_slice(subs);
    }

    pub fn push(&mut self, sub: u32) {
        self.0.push(sub);
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, ".{}", parts.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_and_offsets() {
        let components = parse_components(".1.3.60.7").unwrap();
        let offsets: Vec<(u32, usize)> = components.iter().map(|c| (c.num, c.offset)).collect();
        assert_eq!(offsets, vec![(1, 1), (3, 3), (60, 5), (7, 8)]);

        let components = parse_components("1.3").unwrap();
        assert_eq!(components[1].offset, 2);
    }

    #[test]
    fn test_component_errors() {
        assert_eq!(parse_components(""), Err(OidError::new(0, OidErrorKind::Empty)));
        assert_eq!(parse_components("."), Err(OidError::new(0, OidErrorKind::Empty)));
        assert_eq!(
            parse_components(".1..3"),
            Err(OidError::new(3, OidErrorKind::BadComponent))
        );
        assert_eq!(
            parse_components(".1.x"),
            Err(OidError::new(3, OidErrorKind::BadComponent))
        );
        assert_eq!(
            parse_components(".1.+3"),
            Err(OidError::new(3, OidErrorKind::BadComponent))
        );
        assert_eq!(
            parse_components(".1.3."),
            Err(OidError::new(5, OidErrorKind::BadComponent))
        );
    }

    #[test]
    fn test_building() {
        let mut oid = Oid::default();
        oid.extend_from_slice(&[1, 3]);
        oid.push(7);
        assert_eq!(oid.to_string(), ".1.3.7");
        oid.clear();
        assert_eq!(oid, Oid::default());
        oid.push(1);
        assert_eq!(oid.to_string(), ".1");
    }
}
