//! RADIUS packets.
//!
//! Layout (RFC 2865 §3):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                                                               |
//! |                         Authenticator                         |
//! |                                                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Attributes ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-
//! ```

pub mod codec;

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::{
    crypto::{Secret, DIGEST_LENGTH},
    dictionary::Dictionary,
    pairs::PairList,
    value::ValueError,
};

pub const HEADER_SIZE: usize = 20;
pub const MAX_PACKET_SIZE: usize = 4096;
const AUTHENTICATOR_RANGE: std::ops::Range<usize> = 4..HEADER_SIZE;

/// Errors raised while encoding or decoding packets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Packet too short ({0} bytes)")]
    TooShort(usize),

    #[error("Packet length {0} exceeds the maximum of {MAX_PACKET_SIZE} bytes")]
    TooLong(usize),

    #[error("Header length {header} does not match received length {received}")]
    LengthMismatch { header: usize, received: usize },

    #[error("Malformed attribute: {0}")]
    Malformed(String),

    #[error("Attribute \"{0}\" is too long to encode")]
    AttributeTooLong(String),

    #[error("Attribute \"{0}\" cannot be encoded")]
    Unencodable(String),

    #[error("Invalid value for \"{attr}\": {source}")]
    Value {
        attr: String,
        #[source]
        source: ValueError,
    },

    #[error("Received Id {received} does not match request Id {expected}")]
    IdMismatch { expected: u8, received: u8 },

    #[error("Response authenticator is invalid (shared secret mismatch?)")]
    BadAuthenticator,

    #[error("Message-Authenticator is invalid")]
    BadMessageAuthenticator,
}

/// RADIUS packet code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Code(pub u8);

impl Code {
    pub const ACCESS_REQUEST: Code = Code(1);
    pub const ACCESS_ACCEPT: Code = Code(2);
    pub const ACCESS_REJECT: Code = Code(3);
    pub const ACCOUNTING_REQUEST: Code = Code(4);
    pub const ACCOUNTING_RESPONSE: Code = Code(5);
    pub const ACCESS_CHALLENGE: Code = Code(11);
    pub const STATUS_SERVER: Code = Code(12);
    pub const DISCONNECT_REQUEST: Code = Code(40);
    pub const DISCONNECT_ACK: Code = Code(41);
    pub const DISCONNECT_NAK: Code = Code(42);
    pub const COA_REQUEST: Code = Code(43);
    pub const COA_ACK: Code = Code(44);
    pub const COA_NAK: Code = Code(45);

    /// Destination port used when the server address does not name one.
    pub fn default_port(self) -> u16 {
        match self {
            Code::ACCOUNTING_REQUEST => 1813,
            Code::COA_REQUEST | Code::DISCONNECT_REQUEST => 3799,
            _ => 1812,
        }
    }

    /// Requests whose authenticator is random rather than a digest of the packet.
    pub fn has_random_authenticator(self) -> bool {
        matches!(self, Code::ACCESS_REQUEST | Code::STATUS_SERVER)
    }

    pub fn name(self) -> Option<&'static str> {
        let name = match self {
            Code::ACCESS_REQUEST => "Access-Request",
            Code::ACCESS_ACCEPT => "Access-Accept",
            Code::ACCESS_REJECT => "Access-Reject",
            Code::ACCOUNTING_REQUEST => "Accounting-Request",
            Code::ACCOUNTING_RESPONSE => "Accounting-Response",
            Code::ACCESS_CHALLENGE => "Access-Challenge",
            Code::STATUS_SERVER => "Status-Server",
            Code::DISCONNECT_REQUEST => "Disconnect-Request",
            Code::DISCONNECT_ACK => "Disconnect-ACK",
            Code::DISCONNECT_NAK => "Disconnect-NAK",
            Code::COA_REQUEST => "CoA-Request",
            Code::COA_ACK => "CoA-ACK",
            Code::COA_NAK => "CoA-NAK",
            _ => return None,
        };
        Some(name)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// A request type given on the command line could not be recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unrecognised request type \"{0}\"")]
pub struct UnknownCode(pub String);

impl FromStr for Code {
    type Err = UnknownCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Code::ACCESS_REQUEST),
            "acct" => Ok(Code::ACCOUNTING_REQUEST),
            "status" => Ok(Code::STATUS_SERVER),
            "disconnect" => Ok(Code::DISCONNECT_REQUEST),
            "coa" => Ok(Code::COA_REQUEST),
            other => other
                .parse::<u8>()
                .ok()
                .filter(|code| *code != 0)
                .map(Code)
                .ok_or_else(|| UnknownCode(s.to_string())),
        }
    }
}

/// A RADIUS packet with its attributes decoded against a dictionary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub code: Code,
    pub id: u8,
    pub authenticator: [u8; DIGEST_LENGTH],
    pub pairs: PairList,
}

impl Packet {
    pub fn new(code: Code, id: u8, pairs: PairList) -> Self {
        Packet {
            code,
            id,
            authenticator: [0; DIGEST_LENGTH],
            pairs,
        }
    }

    /// Encodes and signs a request.
    ///
    /// A Message-Authenticator pair is filled in with HMAC-MD5 over the packet. The request
    /// authenticator is random for Access-Request and Status-Server and the MD5 digest of the
    /// packet otherwise. The authenticator used is stored in `self` for reply verification.
    ///
    /// # Errors
    /// Returns `CodecError` if an attribute cannot be encoded or the packet is too long.
    pub fn encode_request(&mut self, dict: &Dictionary, secret: &Secret) -> Result<Vec<u8>, CodecError> {
        let initial = if self.code.has_random_authenticator() {
            rand::random::<[u8; DIGEST_LENGTH]>()
        } else {
            [0; DIGEST_LENGTH]
        };
        let (mut data, message_authenticator) = self.assemble(dict, &initial)?;

        if let Some(offset) = message_authenticator {
            let mac = secret.message_authenticator(&data);
            data[offset..offset + DIGEST_LENGTH].copy_from_slice(&mac);
        }
        if !self.code.has_random_authenticator() {
            let digest = secret.packet_digest(&data);
            data[AUTHENTICATOR_RANGE].copy_from_slice(&digest);
        }
        self.authenticator.copy_from_slice(&data[AUTHENTICATOR_RANGE]);
        Ok(data)
    }

    /// Encodes and signs a reply to a request carrying `request_authenticator`.
    pub fn encode_reply(
        &self,
        dict: &Dictionary,
        request_authenticator: &[u8; DIGEST_LENGTH],
        secret: &Secret,
    ) -> Result<Vec<u8>, CodecError> {
        let (mut data, message_authenticator) = self.assemble(dict, request_authenticator)?;
        if let Some(offset) = message_authenticator {
            let mac = secret.message_authenticator(&data);
            data[offset..offset + DIGEST_LENGTH].copy_from_slice(&mac);
        }
        let digest = secret.packet_digest(&data);
        data[AUTHENTICATOR_RANGE].copy_from_slice(&digest);
        Ok(data)
    }

    /// Header plus attributes with the given authenticator and a zeroed Message-Authenticator.
    fn assemble(
        &self,
        dict: &Dictionary,
        authenticator: &[u8; DIGEST_LENGTH],
    ) -> Result<(Vec<u8>, Option<usize>), CodecError> {
        let encoded = codec::encode_pairs(dict, &self.pairs)?;
        let len = HEADER_SIZE + encoded.data.len();
        if len > MAX_PACKET_SIZE {
            return Err(CodecError::TooLong(len));
        }

        let mut data = Vec::with_capacity(len);
        data.push(self.code.0);
        data.push(self.id);
        data.extend_from_slice(&(len as u16).to_be_bytes());
        data.extend_from_slice(authenticator);
        data.extend_from_slice(&encoded.data);
        Ok((data, encoded.message_authenticator.map(|offset| offset + HEADER_SIZE)))
    }

    /// Decodes and verifies a reply to `request`.
    ///
    /// # Errors
    /// Fails if the packet is malformed, its Id does not match, or either authenticator
    /// does not verify with `secret`.
    pub fn decode_reply(
        dict: &Dictionary,
        data: &[u8],
        request: &Packet,
        secret: &Secret,
    ) -> Result<Packet, CodecError> {
        let data = checked_length(data)?;
        if data[1] != request.id {
            return Err(CodecError::IdMismatch {
                expected: request.id,
                received: data[1],
            });
        }

        let mut signed = data.to_vec();
        signed[AUTHENTICATOR_RANGE].copy_from_slice(&request.authenticator);
        if !secret.verify_packet_digest(&signed, &data[AUTHENTICATOR_RANGE]) {
            return Err(CodecError::BadAuthenticator);
        }

        let decoded = codec::decode_attributes(dict, &data[HEADER_SIZE..])?;
        if let Some(offset) = decoded.message_authenticator {
            verify_message_authenticator(&mut signed, offset + HEADER_SIZE, secret)?;
        }

        let mut authenticator = [0; DIGEST_LENGTH];
        authenticator.copy_from_slice(&data[AUTHENTICATOR_RANGE]);
        Ok(Packet {
            code: Code(data[0]),
            id: data[1],
            authenticator,
            pairs: decoded.pairs,
        })
    }

    /// Decodes a request as a server would, verifying whatever the code allows.
    pub fn decode_request(dict: &Dictionary, data: &[u8], secret: &Secret) -> Result<Packet, CodecError> {
        let data = checked_length(data)?;
        let code = Code(data[0]);
        let decoded = codec::decode_attributes(dict, &data[HEADER_SIZE..])?;

        let mut authenticator = [0; DIGEST_LENGTH];
        authenticator.copy_from_slice(&data[AUTHENTICATOR_RANGE]);

        let mut unsigned = data.to_vec();
        if !code.has_random_authenticator() {
            unsigned[AUTHENTICATOR_RANGE].fill(0);
        }
        if let Some(offset) = decoded.message_authenticator {
            verify_message_authenticator(&mut unsigned, offset + HEADER_SIZE, secret)?;
        }
        if !code.has_random_authenticator() && !secret.verify_packet_digest(&unsigned, &authenticator) {
            return Err(CodecError::BadAuthenticator);
        }

        Ok(Packet {
            code,
            id: data[1],
            authenticator,
            pairs: decoded.pairs,
        })
    }
}

/// Checks the header length against the data and trims any trailing bytes.
fn checked_length(data: &[u8]) -> Result<&[u8], CodecError> {
    if data.len() < HEADER_SIZE {
        return Err(CodecError::TooShort(data.len()));
    }
    let header = u16::from_be_bytes([data[2], data[3]]) as usize;
    if header > MAX_PACKET_SIZE {
        return Err(CodecError::TooLong(header));
    }
    if header < HEADER_SIZE || header > data.len() {
        return Err(CodecError::LengthMismatch {
            header,
            received: data.len(),
        });
    }
    Ok(&data[..header])
}

/// Checks the Message-Authenticator at `offset`, zeroing it in `data` in the process.
fn verify_message_authenticator(data: &mut [u8], offset: usize, secret: &Secret) -> Result<(), CodecError> {
    let received = data[offset..offset + DIGEST_LENGTH].to_vec();
    data[offset..offset + DIGEST_LENGTH].fill(0);
    let valid = secret.verify_message_authenticator(data, &received);
    data[offset..offset + DIGEST_LENGTH].copy_from_slice(&received);
    if valid {
        Ok(())
    } else {
        Err(CodecError::BadMessageAuthenticator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dictionary::ATTR_MESSAGE_AUTHENTICATOR,
        pairs::Pair,
        value::Value,
    };

    fn dict() -> Dictionary {
        Dictionary::builtin().unwrap()
    }

    fn request_pairs(dict: &Dictionary) -> PairList {
        let ma = dict.child_by_num(dict.root(), ATTR_MESSAGE_AUTHENTICATOR).unwrap();
        PairList::from(vec![
            Pair::new(dict.attr_by_name("User-Name").unwrap(), Value::String(b"bob".to_vec())),
            Pair::new(ma, Value::Octets(vec![0; DIGEST_LENGTH])),
        ])
    }

    #[test]
    fn test_code_parsing() {
        assert_eq!("auth".parse::<Code>().unwrap(), Code::ACCESS_REQUEST);
        assert_eq!("acct".parse::<Code>().unwrap(), Code::ACCOUNTING_REQUEST);
        assert_eq!("status".parse::<Code>().unwrap(), Code::STATUS_SERVER);
        assert_eq!("disconnect".parse::<Code>().unwrap(), Code::DISCONNECT_REQUEST);
        assert_eq!("coa".parse::<Code>().unwrap(), Code::COA_REQUEST);
        assert_eq!("50".parse::<Code>().unwrap(), Code(50));
        assert!("0".parse::<Code>().is_err());
        assert_eq!(
            "bogus".parse::<Code>().unwrap_err().to_string(),
            "Unrecognised request type \"bogus\""
        );
    }

    #[test]
    fn test_code_ports_and_names() {
        assert_eq!(Code::ACCESS_REQUEST.default_port(), 1812);
        assert_eq!(Code::STATUS_SERVER.default_port(), 1812);
        assert_eq!(Code::ACCOUNTING_REQUEST.default_port(), 1813);
        assert_eq!(Code::COA_REQUEST.default_port(), 3799);
        assert_eq!(Code::DISCONNECT_REQUEST.default_port(), 3799);
        assert_eq!(Code::STATUS_SERVER.to_string(), "Status-Server");
        assert_eq!(Code(99).to_string(), "99");
    }

    #[test]
    fn test_request_header() {
        let dict = dict();
        let secret = Secret::default();
        let mut packet = Packet::new(Code::ACCOUNTING_REQUEST, 42, request_pairs(&dict));
        let data = packet.encode_request(&dict, &secret).unwrap();

        assert_eq!(data[0], 4);
        assert_eq!(data[1], 42);
        assert_eq!(u16::from_be_bytes([data[2], data[3]]) as usize, data.len());
        assert_eq!(&data[4..20], &packet.authenticator);
    }

    #[test]
    fn test_digest_authenticator_verifies() {
        let dict = dict();
        let secret = Secret::default();
        let mut packet = Packet::new(Code::COA_REQUEST, 7, request_pairs(&dict));
        let data = packet.encode_request(&dict, &secret).unwrap();

        let decoded = Packet::decode_request(&dict, &data, &secret).unwrap();
        assert_eq!(decoded.code, Code::COA_REQUEST);
        assert_eq!(decoded.pairs.len(), 2);

        let wrong = Packet::decode_request(&dict, &data, &Secret::new("wrong"));
        assert!(matches!(
            wrong,
            Err(CodecError::BadMessageAuthenticator) | Err(CodecError::BadAuthenticator)
        ));
    }

    #[test]
    fn test_random_authenticator_with_message_authenticator() {
        let dict = dict();
        let secret = Secret::default();
        let mut packet = Packet::new(Code::STATUS_SERVER, 1, request_pairs(&dict));
        let data = packet.encode_request(&dict, &secret).unwrap();

        assert!(Packet::decode_request(&dict, &data, &secret).is_ok());

        let mut tampered = data.clone();
        tampered[5] ^= 0xff;
        assert_eq!(
            Packet::decode_request(&dict, &tampered, &secret),
            Err(CodecError::BadMessageAuthenticator)
        );
    }

    #[test]
    fn test_reply_verification() {
        let dict = dict();
        let secret = Secret::default();
        let mut request = Packet::new(Code::STATUS_SERVER, 9, request_pairs(&dict));
        request.encode_request(&dict, &secret).unwrap();

        let reply = Packet::new(Code::ACCESS_ACCEPT, 9, request_pairs(&dict));
        let data = reply.encode_reply(&dict, &request.authenticator, &secret).unwrap();
        let decoded = Packet::decode_reply(&dict, &data, &request, &secret).unwrap();
        assert_eq!(decoded.code, Code::ACCESS_ACCEPT);
        assert_eq!(decoded.pairs.len(), 2);

        assert_eq!(
            Packet::decode_reply(&dict, &data, &request, &Secret::new("other")),
            Err(CodecError::BadAuthenticator)
        );

        let mut other = request.clone();
        other.id = 10;
        assert_eq!(
            Packet::decode_reply(&dict, &data, &other, &secret),
            Err(CodecError::IdMismatch {
                expected: 10,
                received: 9
            })
        );
    }

    #[test]
    fn test_length_checks() {
        let dict = dict();
        let secret = Secret::default();
        let request = Packet::new(Code::STATUS_SERVER, 0, PairList::new());

        assert_eq!(
            Packet::decode_reply(&dict, &[2, 0, 0], &request, &secret),
            Err(CodecError::TooShort(3))
        );

        let mut data = vec![2u8, 0, 0, 30];
        data.extend_from_slice(&[0; 16]);
        assert_eq!(
            Packet::decode_reply(&dict, &data, &request, &secret),
            Err(CodecError::LengthMismatch {
                header: 30,
                received: 20
            })
        );
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let dict = dict();
        let name = dict.attr_by_name("Reply-Message").unwrap();
        let pairs: Vec<Pair> = (0..20)
            .map(|_| Pair::new(name, Value::String(vec![b'x'; 250])))
            .collect();
        let mut packet = Packet::new(Code::ACCESS_REQUEST, 0, PairList::from(pairs));
        assert!(matches!(
            packet.encode_request(&dict, &Secret::default()),
            Err(CodecError::TooLong(_))
        ));
    }
}
