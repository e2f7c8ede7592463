// This file is part of NUTS Finance.

// Copyright (C) 2017-2021 Parity Technologies (UK) Ltd.
// SPDX-License-Identifier: Apache-2.0

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// 	http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Natural logarithm, exponential and power for 18 decimal fixed point numbers.
//!
//! Intermediate results are kept at 36 decimals so `pow` stays well inside
//! `fixed_point::MAX_POW_RELATIVE_ERROR`.

use crate::fixed_point::{MathError, MathResult, ONE};
use sp_core::U256;

const ONE_36: u128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;
const LN_2_36: u128 = 693_147_180_559_945_309_417_232_121_458_176_568;

/// Largest `y * ln(x)` accepted, `e^130` still fits comfortably.
const MAX_NATURAL_EXPONENT: u128 = 130 * ONE_36;
/// Largest magnitude of a negative `y * ln(x)`, `e^-41` is below one unit.
const MIN_NATURAL_EXPONENT: u128 = 41 * ONE_36;

const MAX_SERIES_TERMS: u32 = 100;

/// `x ^ y` for fixed point `x` and `y`.
pub fn pow(x: U256, y: U256) -> MathResult<U256> {
	if y.is_zero() {
		return Ok(U256::from(ONE));
	}
	if x.is_zero() {
		return Ok(U256::zero());
	}

	let (negative, ln_x) = ln_36(x)?;
	let exponent = ln_x.checked_mul(y).ok_or(MathError::ExponentOutOfBounds)? / U256::from(ONE);

	if negative {
		if exponent > U256::from(MIN_NATURAL_EXPONENT) {
			return Err(MathError::ExponentOutOfBounds);
		}
		let denominator = exp_36(exponent)?;
		Ok(U256::from(ONE_36) / denominator)
	} else {
		if exponent > U256::from(MAX_NATURAL_EXPONENT) {
			return Err(MathError::ExponentOutOfBounds);
		}
		exp_36(exponent)
	}
}

/// `|ln(x)|` at 36 decimals, together with its sign (`true` when negative).
pub fn ln_36(x: U256) -> MathResult<(bool, U256)> {
	if x.is_zero() {
		return Err(MathError::ExponentOutOfBounds);
	}
	let one = U256::from(ONE);
	let (negative, value) = if x >= one { (false, x) } else { (true, U256::from(ONE_36) / x) };

	// value = m * 2^k with m in [1, 2)
	let k = (value / one).bits() - 1;
	let mantissa = value.checked_mul(one).ok_or(MathError::Overflow)? >> k;

	// ln(m) = 2 * atanh((m - 1) / (m + 1))
	let one_36 = U256::from(ONE_36);
	let z = (mantissa - one_36) * one_36 / (mantissa + one_36);
	let z_squared = z * z / one_36;
	let mut term = z;
	let mut sum = z;
	for n in 1..MAX_SERIES_TERMS {
		term = term * z_squared / one_36;
		if term.is_zero() {
			break;
		}
		sum += term / U256::from(2 * n + 1);
	}

	let ln = U256::from(k) * U256::from(LN_2_36) + sum * 2;
	Ok((negative, ln))
}

/// `e^x` for a non-negative 36 decimal `x`, returned at 18 decimals.
pub fn exp_36(x: U256) -> MathResult<U256> {
	let ln_2 = U256::from(LN_2_36);
	let k = x / ln_2;
	if k > U256::from(255u32) {
		return Err(MathError::Overflow);
	}
	let remainder = x - k * ln_2;

	let one_36 = U256::from(ONE_36);
	let mut term = one_36;
	let mut sum = one_36;
	for n in 1..MAX_SERIES_TERMS {
		term = term * remainder / one_36 / U256::from(n);
		if term.is_zero() {
			break;
		}
		sum += term;
	}

	let scale = U256::one() << (k.low_u64() as usize);
	(sum / U256::from(ONE)).checked_mul(scale).ok_or(MathError::Overflow)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn assert_close(actual: U256, expected: u128, tolerance: u128) {
		let expected = U256::from(expected);
		let diff = if actual > expected { actual - expected } else { expected - actual };
		assert!(diff <= U256::from(tolerance), "{} not within {} of {}", actual, tolerance, expected);
	}

	#[test]
	fn pow_of_integer_exponent_is_exact() {
		assert_eq!(pow(U256::from(2 * ONE), U256::from(3 * ONE)).unwrap(), U256::from(8 * ONE));
	}

	#[test]
	fn pow_of_fractional_values() {
		// 0.5 ^ 0.5
		assert_close(pow(U256::from(ONE / 2), U256::from(ONE / 2)).unwrap(), 707_106_781_186_547_524, 10);
		// 1.5 ^ 2.5
		assert_close(
			pow(U256::from(3 * ONE / 2), U256::from(5 * ONE / 2)).unwrap(),
			2_755_675_960_631_075_360,
			1_000,
		);
	}

	#[test]
	fn pow_trivial_cases() {
		assert_eq!(pow(U256::from(12345u32), U256::zero()).unwrap(), U256::from(ONE));
		assert_eq!(pow(U256::zero(), U256::from(ONE)).unwrap(), U256::zero());
	}

	#[test]
	fn pow_rejects_out_of_domain_exponent() {
		let big = U256::from(ONE) * U256::from(1_000_000_000_000u128);
		assert_eq!(pow(big, U256::from(100 * ONE)), Err(MathError::ExponentOutOfBounds));
		assert_eq!(
			pow(U256::one(), U256::from(100 * ONE)),
			Err(MathError::ExponentOutOfBounds)
		);
	}

	#[test]
	fn ln_of_one_is_zero() {
		assert_eq!(ln_36(U256::from(ONE)).unwrap(), (false, U256::zero()));
		let (negative, ln_half) = ln_36(U256::from(ONE / 2)).unwrap();
		assert!(negative);
		assert_close(ln_half / U256::from(ONE), 693_147_180_559_945_309, 1);
	}
}
