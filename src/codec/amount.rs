//! Stored-value amount helpers.
//!
//! ## Overview
//!
//! The card purse counts centavos as a signed 24-bit integer. Amounts are
//! never handled as floating point; display as pesos goes through
//! `rust_decimal`.
//!
//! ## Examples
//!
//! ```
//! use cdmx_card::codec::amount::format_pesos;
//!
//! assert_eq!(format_pesos(1_250), "$12.50");
//! assert_eq!(format_pesos(-75), "-$0.75");
//! ```

use rust_decimal::Decimal;

/// Largest magnitude a signed 24-bit purse field can hold.
pub const SV_LIMIT: i64 = (1 << 23) - 1;

/// Centavos as a Decimal peso value.
pub fn to_decimal(centavos: i64) -> Decimal {
    Decimal::new(centavos, 2)
}

/// Render centavos as `$P.CC` (with a leading `-` when negative).
pub fn format_pesos(centavos: i64) -> String {
    let value = to_decimal(centavos);
    if value.is_sign_negative() {
        format!("-${:.2}", value.abs())
    } else {
        format!("${:.2}", value)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
