//! Software SAM backed by SHA-256.
//!
//! Not a real cryptographic scheme. It gives deterministic MACs and
//! contract authenticators so signed records can be checked end to end.

use sha2::{Digest, Sha256};

use crate::error::ProtocolError;
use crate::session::{SamSession, SignedFields};

#[derive(Debug, Clone)]
pub struct MemorySam {
    id: u32,
    secret: Vec<u8>,
    unlocked: bool,
    sale_counter: u16,
}

impl MemorySam {
    /// Locked SAM that opens with `secret`.
    pub fn new(id: u32, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            secret: secret.into(),
            unlocked: false,
            sale_counter: 0,
        }
    }

    /// SAM that needs no unlock.
    pub fn unlocked(id: u32) -> Self {
        Self {
            unlocked: true,
            ..Self::new(id, Vec::new())
        }
    }

    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    pub fn sale_counter(&self) -> u16 {
        self.sale_counter
    }

    fn digest(&self, domain: &[u8], data: &[u8]) -> Result<[u8; 32], ProtocolError> {
        if !self.unlocked {
            return Err(ProtocolError::SamLocked);
        }
        let mut hasher = Sha256::new();
        hasher.update(self.id.to_be_bytes());
        hasher.update(domain);
        hasher.update(data);
        Ok(hasher.finalize().into())
    }
}

impl SamSession for MemorySam {
    fn unlock(&mut self, secret: &[u8]) -> Result<(), ProtocolError> {
        if secret != self.secret.as_slice() {
            return Err(ProtocolError::Sam("unlock secret rejected".into()));
        }
        self.unlocked = true;
        Ok(())
    }

    fn sam_id(&self) -> u32 {
        self.id
    }

    fn next_sale_counter(&mut self) -> Result<u16, ProtocolError> {
        if !self.unlocked {
            return Err(ProtocolError::SamLocked);
        }
        self.sale_counter = self.sale_counter.wrapping_add(1);
        Ok(self.sale_counter)
    }

    fn compute_mac(&mut self, fields: &SignedFields) -> Result<[u8; 4], ProtocolError> {
        let digest = self.digest(b"event", &fields.to_bytes())?;
        Ok([digest[0], digest[1], digest[2], digest[3]])
    }

    fn sign_contract(&mut self, data: &[u8]) -> Result<u16, ProtocolError> {
        let digest = self.digest(b"contract", data)?;
        Ok(u16::from_be_bytes([digest[0], digest[1]]))
    }

    fn verify_contract(&mut self, data: &[u8], authenticator: u16) -> Result<bool, ProtocolError> {
        Ok(self.sign_contract(data)? == authenticator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_until_unlocked() {
        let mut sam = MemorySam::new(1, b"secret".to_vec());
        assert_eq!(sam.sign_contract(b"x"), Err(ProtocolError::SamLocked));
        assert!(sam.unlock(b"wrong").is_err());
        sam.unlock(b"secret").unwrap();
        assert!(sam.sign_contract(b"x").is_ok());
    }

    #[test]
    fn test_contract_signature() {
        let mut sam = MemorySam::unlocked(7);
        let auth = sam.sign_contract(b"contract bytes").unwrap();
        assert!(sam.verify_contract(b"contract bytes", auth).unwrap());
        assert!(!sam.verify_contract(b"contract bytez", auth).unwrap());

        // Another SAM id yields another key
        let mut other = MemorySam::unlocked(8);
        assert_ne!(other.sign_contract(b"contract bytes").unwrap(), auth);
    }

    #[test]
    fn test_sale_counter() {
        let mut sam = MemorySam::unlocked(1);
        assert_eq!(sam.next_sale_counter().unwrap(), 1);
        assert_eq!(sam.next_sale_counter().unwrap(), 2);
        assert_eq!(sam.sale_counter(), 2);
    }
}
