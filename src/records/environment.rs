//! Environment record: card holder and application identity.
//!
//! ## Layout (232 bits)
//!
//! | Field | Bits |
//! |-------|------|
//! | version | 8 |
//! | country (BCD) | 12 |
//! | network | 8 |
//! | issuer | 8 |
//! | application id | 32 |
//! | issuing date | 16 |
//! | end date | 16 |
//! | holder birth date (BCD `YYYYMMDD`) | 32 |
//! | holder company | 8 |
//! | holder id | 24 |
//! | profile code (3 nibbles) | 12 |
//! | profile expirations | 3 × 16 |
//! | padding | 8 |

use crate::codec::{BitBuffer, CompactDate, Enumerated, WireEnum};
use crate::error::ParseError;
use crate::records::{FileId, ProfileType, Record, RECORD_SIZE};

/// Number of profile nibbles.
pub const PROFILE_COUNT: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Environment {
    pub version: u8,
    /// BCD country code (0x484 = Mexico)
    pub country: u16,
    pub network: u8,
    pub issuer: u8,
    pub application_id: u32,
    pub issuing_date: CompactDate,
    pub end_date: CompactDate,
    /// BCD `YYYYMMDD`
    pub holder_birth_date: u32,
    pub holder_company: u8,
    pub holder_id: u32,
    /// Three 4-bit [`ProfileType`] codes, most significant first
    pub profile_code: u16,
    pub profile_expirations: [CompactDate; PROFILE_COUNT],
    pub padding: u8,
}

impl Environment {
    /// Profile in nibble `index` (0..3).
    pub fn profile(&self, index: usize) -> Enumerated<ProfileType> {
        let shift = 4 * (PROFILE_COUNT - 1 - index.min(PROFILE_COUNT - 1));
        Enumerated::from_raw(u32::from((self.profile_code >> shift) & 0xF))
    }

    /// Replace the profile at `index` together with its expiration.
    pub fn set_profile(&mut self, index: usize, profile: ProfileType, expires: CompactDate) {
        if index >= PROFILE_COUNT {
            return;
        }
        let shift = 4 * (PROFILE_COUNT - 1 - index);
        let nibble = ((profile.wire() & 0xF) as u16) << shift;
        self.profile_code = (self.profile_code & !(0xF << shift)) | nibble;
        self.profile_expirations[index] = expires;
    }
}

impl Record for Environment {
    const FILE: FileId = FileId::Environment;

    fn slot(&self) -> u8 {
        1
    }

    fn pack(&self) -> Result<Vec<u8>, ParseError> {
        let mut buf = BitBuffer::new(RECORD_SIZE);
        buf.write("version", u64::from(self.version), 8)?;
        buf.write("country", u64::from(self.country), 12)?;
        buf.write("network", u64::from(self.network), 8)?;
        buf.write("issuer", u64::from(self.issuer), 8)?;
        buf.write("application_id", u64::from(self.application_id), 32)?;
        buf.write("issuing_date", u64::from(self.issuing_date.wire()), 16)?;
        buf.write("end_date", u64::from(self.end_date.wire()), 16)?;
        buf.write("holder_birth_date", u64::from(self.holder_birth_date), 32)?;
        buf.write("holder_company", u64::from(self.holder_company), 8)?;
        buf.write("holder_id", u64::from(self.holder_id), 24)?;
        buf.write("profile_code", u64::from(self.profile_code), 12)?;
        for expiration in &self.profile_expirations {
            buf.write("profile_expiration", u64::from(expiration.wire()), 16)?;
        }
        buf.write("padding", u64::from(self.padding), 8)?;
        buf.finish()
    }

    fn unpack(_slot: u8, bytes: &[u8]) -> Result<Self, ParseError> {
        let mut buf = BitBuffer::from_bytes(bytes, RECORD_SIZE)?;
        let mut env = Environment {
            version: buf.read(8)? as u8,
            country: buf.read(12)? as u16,
            network: buf.read(8)? as u8,
            issuer: buf.read(8)? as u8,
            application_id: buf.read(32)? as u32,
            issuing_date: CompactDate::from_wire(buf.read(16)? as u16),
            end_date: CompactDate::from_wire(buf.read(16)? as u16),
            holder_birth_date: buf.read(32)? as u32,
            holder_company: buf.read(8)? as u8,
            holder_id: buf.read(24)? as u32,
            profile_code: buf.read(12)? as u16,
            ..Default::default()
        };
        for expiration in env.profile_expirations.iter_mut() {
            *expiration = CompactDate::from_wire(buf.read(16)? as u16);
        }
        env.padding = buf.read(8)? as u8;
        buf.expect_consumed()?;
        Ok(env)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Environment {
        Environment {
            version: 1,
            country: 0x484,
            network: 0x01,
            issuer: 0x02,
            application_id: 0xA000_0004,
            issuing_date: CompactDate::from_wire(10_000),
            end_date: CompactDate::from_wire(13_650),
            holder_birth_date: 0x1990_0415,
            holder_company: 7,
            holder_id: 0x00AB_CDEF,
            profile_code: 0x100,
            profile_expirations: [
                CompactDate::from_wire(12_000),
                CompactDate::from_wire(0),
                CompactDate::from_wire(0),
            ],
            padding: 0,
        }
    }

    #[test]
    fn test_environment_roundtrip() {
        let env = sample();
        let bytes = env.pack().unwrap();
        assert_eq!(bytes.len(), RECORD_SIZE);
        assert_eq!(Environment::unpack(1, &bytes).unwrap(), env);
        assert_eq!(&bytes[..3], &[0x01, 0x48, 0x40]);
    }

    #[test]
    fn test_environment_bytes_roundtrip() {
        let bytes: Vec<u8> = (0..RECORD_SIZE as u8).map(|b| b.wrapping_mul(37)).collect();
        let env = Environment::unpack(1, &bytes).unwrap();
        assert_eq!(env.pack().unwrap(), bytes);
    }

    #[test]
    fn test_environment_rejects_short_input() {
        assert!(matches!(
            Environment::unpack(1, &[0; 10]),
            Err(ParseError::Length { expected: 29, actual: 10 })
        ));
    }

    #[test]
    fn test_profiles() {
        let mut env = sample();
        assert_eq!(env.profile(0).decode(), ProfileType::Student);
        assert_eq!(env.profile(1).decode(), ProfileType::General);

        env.set_profile(2, ProfileType::Senior, CompactDate::from_wire(20_000));
        assert_eq!(env.profile_code, 0x102);
        assert_eq!(env.profile(2).decode(), ProfileType::Senior);
        assert_eq!(env.profile_expirations[2], CompactDate::from_wire(20_000));
    }

    #[test]
    fn test_country_overflow_rejected() {
        let mut env = sample();
        env.country = 0x1484;
        assert!(matches!(
            env.pack(),
            Err(ParseError::FieldOverflow { field: "country", .. })
        ));
    }
}
