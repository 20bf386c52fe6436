pub mod dnskey;
pub mod ds;
pub mod nsec;
pub mod nsec3;
pub mod rrsig;

pub use dnskey::DnskeyRecord;
pub use ds::DsRecord;
pub use nsec::NsecRecord;
pub use nsec3::Nsec3Record;
pub use rrsig::RrsigRecord;

use vigil_dns_domain::RecordType;

/// Shared parser for the NSEC/NSEC3 type bitmap wire form
/// (window number, octet count, bitmap octets).
pub(crate) fn parse_type_bitmap(data: &[u8]) -> Result<Vec<(u8, Vec<u8>)>, String> {
    let mut windows = Vec::new();
    let mut pos = 0usize;
    while pos < data.len() {
        if pos + 2 > data.len() {
            return Err("truncated type bitmap header".into());
        }
        let window = data[pos];
        let len = data[pos + 1] as usize;
        pos += 2;
        if len == 0 || len > 32 {
            return Err(format!("bad type bitmap length: {len}"));
        }
        if pos + len > data.len() {
            return Err("truncated type bitmap".into());
        }
        windows.push((window, data[pos..pos + len].to_vec()));
        pos += len;
    }
    Ok(windows)
}

pub(crate) fn bitmap_contains(windows: &[(u8, Vec<u8>)], rtype: RecordType) -> bool {
    let value = rtype.to_u16();
    let window = (value >> 8) as u8;
    let offset = (value & 0xFF) as usize;
    windows.iter().any(|(w, bits)| {
        *w == window
            && bits
                .get(offset >> 3)
                .map(|byte| byte & (0x80 >> (offset & 7)) != 0)
                .unwrap_or(false)
    })
}
