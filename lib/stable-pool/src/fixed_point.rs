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


//! 18 decimal fixed point arithmetic on `U256`.
//!
//! Every operation is checked. Rounding direction is explicit: amounts owed to a pool round up,
//! amounts owed to a user round down.

use crate::log_exp;
use sp_core::U256;

pub const ONE: u128 = 1_000_000_000_000_000_000;
const TWO: u128 = 2 * ONE;

/// Relative error bound of `log_exp::pow`, as a fixed point number (1e-14).
pub const MAX_POW_RELATIVE_ERROR: u128 = 10_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MathError {
	Overflow,
	Underflow,
	DivisionByZero,
	/// A balance handed to a solver is zero.
	ZeroBalance,
	ZeroInvariant,
	InvariantDidNotConverge,
	BalanceDidNotConverge,
	MaxInRatio,
	MaxOutRatio,
	MaxInvariantRatio,
	MinInvariantRatio,
	/// `pow` input outside the domain where `exp` is defined.
	ExponentOutOfBounds,
}

pub type MathResult<T> = Result<T, MathError>;

pub fn one() -> U256 {
	U256::from(ONE)
}

pub trait FixedPoint: Sized {
	fn safe_add(self, other: Self) -> MathResult<Self>;
	fn safe_sub(self, other: Self) -> MathResult<Self>;
	/// Plain integer product.
	fn safe_mul(self, other: Self) -> MathResult<Self>;
	/// Plain integer quotient, rounded down.
	fn safe_div(self, other: Self) -> MathResult<Self>;
	/// Plain integer quotient, rounded up.
	fn safe_div_up(self, other: Self) -> MathResult<Self>;

	fn mul_down(self, other: Self) -> MathResult<Self>;
	fn mul_up(self, other: Self) -> MathResult<Self>;
	fn div_down(self, other: Self) -> MathResult<Self>;
	fn div_up(self, other: Self) -> MathResult<Self>;
	/// `1 - x`, clamped at zero.
	fn complement(self) -> Self;
	fn pow_down(self, exp: Self) -> MathResult<Self>;
	fn pow_up(self, exp: Self) -> MathResult<Self>;
}

impl FixedPoint for U256 {
	fn safe_add(self, other: U256) -> MathResult<U256> {
		self.checked_add(other).ok_or(MathError::Overflow)
	}

	fn safe_sub(self, other: U256) -> MathResult<U256> {
		self.checked_sub(other).ok_or(MathError::Underflow)
	}

	fn safe_mul(self, other: U256) -> MathResult<U256> {
		self.checked_mul(other).ok_or(MathError::Overflow)
	}

	fn safe_div(self, other: U256) -> MathResult<U256> {
		self.checked_div(other).ok_or(MathError::DivisionByZero)
	}

	fn safe_div_up(self, other: U256) -> MathResult<U256> {
		if other.is_zero() {
			return Err(MathError::DivisionByZero);
		}
		if self.is_zero() {
			return Ok(U256::zero());
		}
		Ok((self - 1) / other + 1)
	}

	fn mul_down(self, other: U256) -> MathResult<U256> {
		Ok(self.safe_mul(other)? / one())
	}

	fn mul_up(self, other: U256) -> MathResult<U256> {
		let product = self.safe_mul(other)?;
		if product.is_zero() {
			Ok(product)
		} else {
			Ok((product - 1) / one() + 1)
		}
	}

	fn div_down(self, other: U256) -> MathResult<U256> {
		if other.is_zero() {
			return Err(MathError::DivisionByZero);
		}
		Ok(self.safe_mul(one())? / other)
	}

	fn div_up(self, other: U256) -> MathResult<U256> {
		if other.is_zero() {
			return Err(MathError::DivisionByZero);
		}
		if self.is_zero() {
			return Ok(self);
		}
		Ok((self.safe_mul(one())? - 1) / other + 1)
	}

	fn complement(self) -> U256 {
		one().checked_sub(self).unwrap_or_default()
	}

	fn pow_down(self, exp: U256) -> MathResult<U256> {
		if exp == one() {
			return Ok(self);
		}
		if exp == U256::from(TWO) {
			return self.mul_down(self);
		}
		let raw = log_exp::pow(self, exp)?;
		let max_error = raw.mul_up(U256::from(MAX_POW_RELATIVE_ERROR))?.safe_add(U256::one())?;
		Ok(raw.checked_sub(max_error).unwrap_or_default())
	}

	fn pow_up(self, exp: U256) -> MathResult<U256> {
		if exp == one() {
			return Ok(self);
		}
		if exp == U256::from(TWO) {
			return self.mul_up(self);
		}
		let raw = log_exp::pow(self, exp)?;
		let max_error = raw.mul_up(U256::from(MAX_POW_RELATIVE_ERROR))?.safe_add(U256::one())?;
		raw.safe_add(max_error)
	}
}
