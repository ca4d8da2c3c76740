//! Normalization of on-chain values into their stored string form.

use alloy::hex;
use alloy::primitives::U256;

/// Every pool denomination is expressed with 18 decimals, native or ERC20.
pub const DENOMINATION_DECIMALS: u8 = 18;

/// Formats a raw unit amount as a decimal string with trailing fractional zeros trimmed.
pub fn format_amount(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    let decimals = usize::from(decimals);

    let (whole, fraction) = if digits.len() > decimals {
        let (whole, fraction) = digits.split_at(digits.len() - decimals);
        (whole.to_string(), fraction.to_string())
    } else {
        ("0".to_string(), format!("{digits:0>decimals$}"))
    };

    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Lower-case `0x` hex of an address, hash or byte payload.
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode_prefixed(bytes)
}
