//! Translation between agent OIDs and RADIUS attributes.
//!
//! The FreeRADIUS dictionary mirrors the SNMP OID tree beneath the FreeRADIUS vendor
//! attribute. Tables follow a fixed convention: beneath a table attribute, tag 0 is an
//! integer index attribute and tag 1 the entry whose children are the columns. An OID such as
//! `<table>.<row>.<column>` therefore becomes an index pair carrying `<row>` followed by the
//! column pair.

pub mod forward;
pub mod response;

pub use forward::pairs_from_oid;
pub use response::{get_response, set_response, ResponseError, Varbinds, RESPONSE_DONE, RESPONSE_NONE};
