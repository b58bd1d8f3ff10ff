//! radsnmp - net-snmp pass_persist bridge backed by a RADIUS server.
//!
//! snmpd hands every query below the FreeRADIUS subtree to this process on stdin. Each query
//! is translated into attributes of the FreeRADIUS vendor tree, sent to the server in a signed
//! RADIUS request, and the reply attributes are translated back into varbinds on stdout.
//!
//! # Usage
//!
//! In `snmpd.conf`:
//! ```text
//! pass_persist .1.3.6.1.2.1.67 /usr/bin/radsnmp -S /etc/raddb/snmp_secret 127.0.0.1 status
//! ```

/// Command-line configuration and validation.
pub mod configuration;
/// pass_persist request cycle.
pub mod controller;
/// Shared secret, packet digests and Message-Authenticator.
pub mod crypto;
/// Attribute dictionary tree and its file format.
pub mod dictionary;
/// OID text parsing.
pub mod oid;
/// Attribute/value pairs.
pub mod pairs;
/// RADIUS packet encoding, signing and verification.
pub mod radius;
/// Lookup of the attributes every cycle depends on.
pub mod schema;
/// Request identifier allocation.
pub mod session;
/// Stop signalling.
pub mod shutdown;
/// OID to attribute translation and back.
pub mod translate;
/// UDP and TCP connections to the server.
pub mod transport;
/// Typed attribute values.
pub mod value;
