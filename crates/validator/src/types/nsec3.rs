use std::fmt;

use vigil_dns_domain::{RecordType, ValidationError};

use super::{bitmap_contains, parse_type_bitmap};

pub const NSEC3_HASH_SHA1: u8 = 1;
pub const NSEC3_FLAG_OPTOUT: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nsec3Record {
    pub hash_algorithm: u8,
    pub flags: u8,
    pub iterations: u16,
    pub salt: Vec<u8>,
    pub next_hashed: Vec<u8>,
    pub type_bitmap: Vec<(u8, Vec<u8>)>,
}

impl Nsec3Record {
    pub fn parse(data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() < 5 {
            return Err(ValidationError::BadRecord("NSEC3 record too short".into()));
        }
        let hash_algorithm = data[0];
        let flags = data[1];
        let iterations = u16::from_be_bytes([data[2], data[3]]);
        let salt_len = data[4] as usize;
        let mut pos = 5;
        if pos + salt_len + 1 > data.len() {
            return Err(ValidationError::BadRecord("NSEC3 salt truncated".into()));
        }
        let salt = data[pos..pos + salt_len].to_vec();
        pos += salt_len;
        let hash_len = data[pos] as usize;
        pos += 1;
        if hash_len == 0 || pos + hash_len > data.len() {
            return Err(ValidationError::BadRecord("NSEC3 next hash truncated".into()));
        }
        let next_hashed = data[pos..pos + hash_len].to_vec();
        pos += hash_len;
        let type_bitmap =
            parse_type_bitmap(&data[pos..]).map_err(ValidationError::BadRecord)?;
        Ok(Self {
            hash_algorithm,
            flags,
            iterations,
            salt,
            next_hashed,
            type_bitmap,
        })
    }

    pub fn opt_out(&self) -> bool {
        self.flags & NSEC3_FLAG_OPTOUT != 0
    }

    pub fn type_present(&self, rtype: RecordType) -> bool {
        bitmap_contains(&self.type_bitmap, rtype)
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(6 + self.salt.len() + self.next_hashed.len());
        wire.push(self.hash_algorithm);
        wire.push(self.flags);
        wire.extend_from_slice(&self.iterations.to_be_bytes());
        wire.push(self.salt.len() as u8);
        wire.extend_from_slice(&self.salt);
        wire.push(self.next_hashed.len() as u8);
        wire.extend_from_slice(&self.next_hashed);
        for (window, bits) in &self.type_bitmap {
            wire.push(*window);
            wire.push(bits.len() as u8);
            wire.extend_from_slice(bits);
        }
        wire
    }
}

impl fmt::Display for Nsec3Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NSEC3(alg={}, iterations={}, optout={})",
            self.hash_algorithm,
            self.iterations,
            self.opt_out()
        )
    }
}
