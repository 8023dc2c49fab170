//! Widening fixed-point arithmetic.
//!
//! Amounts are `u128`; products of two 18-decimal values need up to 256
//! bits before the dividing scale is applied, so intermediates go
//! through [`U256`]. Division truncates toward zero everywhere — the
//! protocol deliberately rounds down and several downstream values
//! depend on that direction.

use primitive_types::U256;

use crate::error::MathError;

/// Compute `a * b / denom` with a 256-bit intermediate.
///
/// Truncating division. Fails on a zero denominator or when the result
/// does not fit back into `u128`.
pub fn mul_div(a: u128, b: u128, denom: u128) -> Result<u128, MathError> {
    if denom == 0 {
        return Err(MathError::DivisionByZero);
    }
    // 128-bit x 128-bit always fits in 256 bits.
    let wide = U256::from(a) * U256::from(b);
    let out = wide / U256::from(denom);
    if out > U256::from(u128::MAX) {
        return Err(MathError::Overflow);
    }
    Ok(out.as_u128())
}
