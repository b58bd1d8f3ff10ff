//! Dictionary attributes radsnmp cannot run without.

use thiserror::Error;

use crate::dictionary::{
    AttrId, Dictionary, ATTR_EXTENDED_ATTRIBUTE_1, ATTR_MESSAGE_AUTHENTICATOR, ATTR_VENDOR_SPECIFIC,
    VENDORPEC_FREERADIUS,
};

pub const SNMP_OPERATION: &str = "FreeRADIUS-SNMP-Operation";
pub const SNMP_TYPE: &str = "FreeRADIUS-SNMP-Type";
pub const SNMP_FAILURE: &str = "FreeRADIUS-SNMP-Failure";

/// A required dictionary definition is missing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Incomplete dictionary: Missing definition for {0}")]
pub struct StartupError(pub String);

/// Handles to the attributes used on every request cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SnmpAttributes {
    /// FreeRADIUS vendor node below Extended-Attribute-1.Vendor-Specific; OIDs resolve from here.
    pub snmp_root: AttrId,
    /// First attribute included in OIDs written back to the agent (FreeRADIUS-Iso).
    pub oid_root: AttrId,
    pub operation: AttrId,
    pub snmp_type: AttrId,
    pub failure: AttrId,
    pub message_authenticator: AttrId,
}

impl SnmpAttributes {
    /// Looks up every required attribute.
    ///
    /// # Errors
    /// Returns `StartupError` naming the first missing definition.
    pub fn resolve(dict: &Dictionary) -> Result<Self, StartupError> {
        let extended = dict
            .child_by_num(dict.root(), ATTR_EXTENDED_ATTRIBUTE_1)
            .ok_or_else(|| StartupError("Extended-Attribute-1".to_string()))?;
        let evs = dict.child_by_num(extended, ATTR_VENDOR_SPECIFIC).ok_or_else(|| {
            StartupError(format!(
                "Extended-Attribute-1({}).Vendor-Specific({})",
                ATTR_EXTENDED_ATTRIBUTE_1, ATTR_VENDOR_SPECIFIC
            ))
        })?;
        let snmp_root = dict.child_by_num(evs, VENDORPEC_FREERADIUS).ok_or_else(|| {
            StartupError(format!(
                "Extended-Attribute-1({}).Vendor-Specific({}).FreeRADIUS({})",
                ATTR_EXTENDED_ATTRIBUTE_1, ATTR_VENDOR_SPECIFIC, VENDORPEC_FREERADIUS
            ))
        })?;
        let oid_root = dict.child_by_num(snmp_root, 1).ok_or_else(|| {
            StartupError(format!(
                "Extended-Attribute-1({}).Vendor-Specific({}).FreeRADIUS({}).FreeRADIUS-Iso(1)",
                ATTR_EXTENDED_ATTRIBUTE_1, ATTR_VENDOR_SPECIFIC, VENDORPEC_FREERADIUS
            ))
        })?;

        let by_name = |name: &str| {
            dict.attr_by_name(name)
                .ok_or_else(|| StartupError(format!("\"{}\"", name)))
        };

        Ok(SnmpAttributes {
            snmp_root,
            oid_root,
            operation: by_name(SNMP_OPERATION)?,
            snmp_type: by_name(SNMP_TYPE)?,
            failure: by_name(SNMP_FAILURE)?,
            message_authenticator: dict
                .child_by_num(dict.root(), ATTR_MESSAGE_AUTHENTICATOR)
                .ok_or_else(|| StartupError("Message-Authenticator".to_string()))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::DataType;

    #[test]
    fn test_resolve_builtin() {
        let dict = Dictionary::builtin().unwrap();
        let attrs = SnmpAttributes::resolve(&dict).unwrap();
        assert_eq!(dict.attr(attrs.snmp_root).name(), "FreeRADIUS");
        assert_eq!(dict.attr(attrs.oid_root).name(), "FreeRADIUS-Iso");
        assert_eq!(dict.attr(attrs.snmp_type).name(), SNMP_TYPE);
        assert_eq!(dict.attr(attrs.message_authenticator).num(), 80);
    }

    #[test]
    fn test_missing_definitions() {
        let mut dict = Dictionary::new();
        assert_eq!(
            SnmpAttributes::resolve(&dict).unwrap_err().to_string(),
            "Incomplete dictionary: Missing definition for Extended-Attribute-1"
        );

        let root = dict.root();
        let ext = dict.add_attr(root, 241, "Extended-Attribute-1", DataType::Extended).unwrap();
        let evs = dict.add_attr(ext, 26, "Extended-Vendor-Specific-1", DataType::Evs).unwrap();
        assert_eq!(
            SnmpAttributes::resolve(&dict).unwrap_err(),
            StartupError("Extended-Attribute-1(241).Vendor-Specific(26).FreeRADIUS(11344)".to_string())
        );

        let vendor = dict.add_attr(evs, 11344, "FreeRADIUS", DataType::Vendor).unwrap();
        dict.add_attr(vendor, 1, "FreeRADIUS-Iso", DataType::Tlv).unwrap();
        assert_eq!(
            SnmpAttributes::resolve(&dict).unwrap_err(),
            StartupError("\"FreeRADIUS-SNMP-Operation\"".to_string())
        );
    }
}
