//! Raw wire codes resolved against a closed set of named constants.
//!
//! Cards in circulation may carry codes written by newer equipment. An
//! [`Enumerated`] keeps the raw code as read, so decoding never fails
//! (unknown codes resolve to the set's RFU constant) and re-packing a
//! record reproduces the original bytes.
//!
//! ```
//! use cdmx_card::codec::Enumerated;
//! use cdmx_card::records::ContractStatus;
//!
//! let known = Enumerated::<ContractStatus>::from_raw(0x01);
//! assert_eq!(known.decode(), ContractStatus::PartlyUsed);
//!
//! let future = Enumerated::<ContractStatus>::from_raw(0x42);
//! assert_eq!(future.decode(), ContractStatus::Rfu);
//! assert_eq!(future.raw(), 0x42);
//! ```

use std::fmt;
use std::marker::PhantomData;

/// A closed set of constants with fixed wire codes.
pub trait WireEnum: Copy + Eq + fmt::Debug {
    /// Fallback for codes outside the set.
    const RFU: Self;

    /// Resolve a wire code; `None` when the code is not in the set.
    fn from_wire(code: u32) -> Option<Self>;

    /// Wire code of this constant.
    fn wire(self) -> u32;
}

/// Raw wire code tagged with the constant set it belongs to.
pub struct Enumerated<E> {
    raw: u32,
    _set: PhantomData<E>,
}

impl<E: WireEnum> Enumerated<E> {
    /// Wire code meaning "not set".
    pub const UNSET: u32 = 0;

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _set: PhantomData,
        }
    }

    /// Wrap a known constant.
    #[inline]
    pub fn of(constant: E) -> Self {
        Self::from_raw(constant.wire())
    }

    /// Raw code as read from (or to be written to) the card.
    #[inline]
    pub fn raw(&self) -> u32 {
        self.raw
    }

    /// Resolve to a constant, falling back to `E::RFU`.
    pub fn decode(&self) -> E {
        E::from_wire(self.raw).unwrap_or(E::RFU)
    }

    /// `true` when the raw code is outside the known set.
    pub fn is_rfu(&self) -> bool {
        E::from_wire(self.raw).is_none()
    }

    /// Raw code, or `default` when the field is unset.
    pub fn value_or(&self, default: u32) -> u32 {
        if self.raw == Self::UNSET {
            default
        } else {
            self.raw
        }
    }

    pub fn set(&mut self, constant: E) {
        self.raw = constant.wire();
    }
}

impl<E> Clone for Enumerated<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for Enumerated<E> {}

impl<E> PartialEq for Enumerated<E> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<E> Eq for Enumerated<E> {}

impl<E> Default for Enumerated<E> {
    fn default() -> Self {
        Self {
            raw: 0,
            _set: PhantomData,
        }
    }
}

impl<E: WireEnum> fmt::Debug for Enumerated<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({:#04x})", self.decode(), self.raw)
    }
}

impl<E: WireEnum> From<E> for Enumerated<E> {
    fn from(constant: E) -> Self {
        Self::of(constant)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Red,
        Green,
        Rfu,
    }

    impl WireEnum for Light {
        const RFU: Self = Light::Rfu;

        fn from_wire(code: u32) -> Option<Self> {
            match code {
                1 => Some(Light::Red),
                2 => Some(Light::Green),
                _ => None,
            }
        }

        fn wire(self) -> u32 {
            match self {
                Light::Red => 1,
                Light::Green => 2,
                Light::Rfu => 0xF,
            }
        }
    }

    #[test]
    fn test_decode_known() {
        let e = Enumerated::<Light>::from_raw(2);
        assert_eq!(e.decode(), Light::Green);
        assert!(!e.is_rfu());
    }

    #[test]
    fn test_decode_unknown_is_rfu() {
        let e = Enumerated::<Light>::from_raw(7);
        assert_eq!(e.decode(), Light::Rfu);
        assert!(e.is_rfu());
        // Raw code survives untouched
        assert_eq!(e.raw(), 7);
    }

    #[test]
    fn test_reencode_known() {
        for code in [1u32, 2] {
            let decoded = Enumerated::<Light>::from_raw(code).decode();
            assert_eq!(Enumerated::of(decoded).raw(), code);
        }
    }

    #[test]
    fn test_value_or() {
        assert_eq!(Enumerated::<Light>::default().value_or(2), 2);
        assert_eq!(Enumerated::<Light>::from_raw(1).value_or(2), 1);
    }

    #[test]
    fn test_set() {
        let mut e = Enumerated::<Light>::default();
        e.set(Light::Red);
        assert_eq!(e.raw(), 1);
        assert_eq!(e, Enumerated::from(Light::Red));
    }

    #[test]
    fn test_debug_format() {
        let e = Enumerated::<Light>::from_raw(2);
        assert_eq!(format!("{:?}", e), "Green(0x02)");
    }
}
