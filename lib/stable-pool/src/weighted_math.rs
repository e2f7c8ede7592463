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


//! Weighted constant product math. Weights are normalized fixed point fractions.

use crate::fixed_point::{one, FixedPoint, MathError, MathResult, ONE};
use sp_core::U256;
use sp_std::prelude::*;

pub const MIN_WEIGHT: u128 = ONE / 100;

// Swap limits: amounts in and out can't exceed a percentage of the balance.
const MAX_IN_RATIO: u128 = ONE * 3 / 10;
const MAX_OUT_RATIO: u128 = ONE * 3 / 10;

// Single token joins and exits are bounded by invariant ratios.
const MAX_INVARIANT_RATIO: u128 = 3 * ONE;
const MIN_INVARIANT_RATIO: u128 = ONE * 7 / 10;

/// Lowest base the protocol fee power is evaluated at.
const MIN_POW_BASE_FREE_EXPONENT: u128 = ONE * 7 / 10;

/// `prod(balance_i ^ weight_i)`, rounded down.
pub fn calculate_invariant(normalized_weights: &[U256], balances: &[U256]) -> MathResult<U256> {
	let mut invariant = one();
	for (weight, balance) in normalized_weights.iter().zip(balances) {
		invariant = invariant.mul_down(balance.pow_down(*weight)?)?;
	}
	if invariant.is_zero() {
		return Err(MathError::ZeroInvariant);
	}
	Ok(invariant)
}

pub fn calc_out_given_in(
	balance_in: U256,
	weight_in: U256,
	balance_out: U256,
	weight_out: U256,
	amount_in: U256,
) -> MathResult<U256> {
	if amount_in > balance_in.mul_down(U256::from(MAX_IN_RATIO))? {
		return Err(MathError::MaxInRatio);
	}

	let denominator = balance_in.safe_add(amount_in)?;
	let base = balance_in.div_up(denominator)?;
	let exponent = weight_in.div_down(weight_out)?;
	let power = base.pow_up(exponent)?;

	balance_out.mul_down(power.complement())
}

pub fn calc_in_given_out(
	balance_in: U256,
	weight_in: U256,
	balance_out: U256,
	weight_out: U256,
	amount_out: U256,
) -> MathResult<U256> {
	if amount_out > balance_out.mul_down(U256::from(MAX_OUT_RATIO))? {
		return Err(MathError::MaxOutRatio);
	}

	let base = balance_out.div_up(balance_out.safe_sub(amount_out)?)?;
	let exponent = weight_out.div_up(weight_in)?;
	let power = base.pow_up(exponent)?;

	balance_in.mul_up(power.safe_sub(one())?)
}

pub fn calc_bpt_out_given_exact_tokens_in(
	balances: &[U256],
	normalized_weights: &[U256],
	amounts_in: &[U256],
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let mut balance_ratios_with_fee = Vec::with_capacity(balances.len());
	let mut invariant_ratio_with_fees = U256::zero();
	for i in 0..balances.len() {
		let ratio = balances[i].safe_add(amounts_in[i])?.div_down(balances[i])?;
		invariant_ratio_with_fees = invariant_ratio_with_fees.safe_add(ratio.mul_down(normalized_weights[i])?)?;
		balance_ratios_with_fee.push(ratio);
	}

	let mut invariant_ratio = one();
	for i in 0..balances.len() {
		let amount_in_without_fee = if balance_ratios_with_fee[i] > invariant_ratio_with_fees {
			let non_taxable_amount = balances[i].mul_down(invariant_ratio_with_fees.safe_sub(one())?)?;
			let taxable_amount = amounts_in[i].safe_sub(non_taxable_amount)?;
			non_taxable_amount.safe_add(taxable_amount.mul_down(swap_fee.complement())?)?
		} else {
			amounts_in[i]
		};

		let balance_ratio = balances[i].safe_add(amount_in_without_fee)?.div_down(balances[i])?;
		invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(normalized_weights[i])?)?;
	}

	if invariant_ratio >= one() {
		bpt_total_supply.mul_down(invariant_ratio - one())
	} else {
		Ok(U256::zero())
	}
}

pub fn calc_token_in_given_exact_bpt_out(
	balance: U256,
	normalized_weight: U256,
	bpt_amount_out: U256,
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let invariant_ratio = bpt_total_supply.safe_add(bpt_amount_out)?.div_up(bpt_total_supply)?;
	if invariant_ratio > U256::from(MAX_INVARIANT_RATIO) {
		return Err(MathError::MaxInvariantRatio);
	}

	let balance_ratio = invariant_ratio.pow_up(one().div_up(normalized_weight)?)?;
	let amount_in_without_fee = balance.mul_up(balance_ratio.safe_sub(one())?)?;

	let taxable_amount = amount_in_without_fee.mul_up(normalized_weight.complement())?;
	let non_taxable_amount = amount_in_without_fee.safe_sub(taxable_amount)?;

	non_taxable_amount.safe_add(taxable_amount.div_up(swap_fee.complement())?)
}

pub fn calc_bpt_in_given_exact_tokens_out(
	balances: &[U256],
	normalized_weights: &[U256],
	amounts_out: &[U256],
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let mut balance_ratios_without_fee = Vec::with_capacity(balances.len());
	let mut invariant_ratio_without_fees = U256::zero();
	for i in 0..balances.len() {
		let ratio = balances[i].safe_sub(amounts_out[i])?.div_up(balances[i])?;
		invariant_ratio_without_fees =
			invariant_ratio_without_fees.safe_add(ratio.mul_up(normalized_weights[i])?)?;
		balance_ratios_without_fee.push(ratio);
	}

	let mut invariant_ratio = one();
	for i in 0..balances.len() {
		let amount_out_with_fee = if invariant_ratio_without_fees > balance_ratios_without_fee[i] {
			let non_taxable_amount = balances[i].mul_down(invariant_ratio_without_fees.complement())?;
			let taxable_amount = amounts_out[i].safe_sub(non_taxable_amount)?;
			non_taxable_amount.safe_add(taxable_amount.div_up(swap_fee.complement())?)?
		} else {
			amounts_out[i]
		};

		let balance_ratio = balances[i].safe_sub(amount_out_with_fee)?.div_down(balances[i])?;
		invariant_ratio = invariant_ratio.mul_down(balance_ratio.pow_down(normalized_weights[i])?)?;
	}

	bpt_total_supply.mul_up(invariant_ratio.complement())
}

pub fn calc_token_out_given_exact_bpt_in(
	balance: U256,
	normalized_weight: U256,
	bpt_amount_in: U256,
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let invariant_ratio = bpt_total_supply.safe_sub(bpt_amount_in)?.div_up(bpt_total_supply)?;
	if invariant_ratio < U256::from(MIN_INVARIANT_RATIO) {
		return Err(MathError::MinInvariantRatio);
	}

	let balance_ratio = invariant_ratio.pow_up(one().div_down(normalized_weight)?)?;
	let amount_out_without_fee = balance.mul_down(balance_ratio.complement())?;

	let taxable_amount = amount_out_without_fee.mul_up(normalized_weight.complement())?;
	let non_taxable_amount = amount_out_without_fee.safe_sub(taxable_amount)?;

	non_taxable_amount.safe_add(taxable_amount.mul_down(swap_fee.complement())?)
}

pub fn calc_tokens_out_given_exact_bpt_in(
	balances: &[U256],
	bpt_amount_in: U256,
	bpt_total_supply: U256,
) -> MathResult<Vec<U256>> {
	let bpt_ratio = bpt_amount_in.div_down(bpt_total_supply)?;
	balances.iter().map(|b| b.mul_down(bpt_ratio)).collect()
}

/// Protocol share of the invariant growth between `previous_invariant` and `current_invariant`,
/// expressed in a single token.
pub fn calc_due_token_protocol_swap_fee_amount(
	balance: U256,
	normalized_weight: U256,
	previous_invariant: U256,
	current_invariant: U256,
	protocol_swap_fee: U256,
) -> MathResult<U256> {
	if current_invariant <= previous_invariant {
		return Ok(U256::zero());
	}

	let base = previous_invariant
		.div_up(current_invariant)?
		.max(U256::from(MIN_POW_BASE_FREE_EXPONENT));
	let exponent = one().div_down(normalized_weight)?;
	let power = base.pow_up(exponent)?;

	let token_accrued_fees = balance.mul_down(power.complement())?;
	token_accrued_fees.mul_down(protocol_swap_fee)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn fp(x: u128) -> U256 {
		U256::from(x) * one()
	}

	fn half() -> U256 {
		U256::from(ONE / 2)
	}

	fn within(actual: U256, expected: U256, tolerance: U256) -> bool {
		let diff = if actual > expected { actual - expected } else { expected - actual };
		diff <= tolerance
	}

	#[test]
	fn invariant_of_equal_weights_is_geometric_mean() {
		let invariant = calculate_invariant(&[half(), half()], &[fp(100), fp(400)]).unwrap();
		assert!(within(invariant, fp(200), U256::from(100_000_000u128)));
		assert!(invariant <= fp(200));
	}

	#[test]
	fn invariant_rejects_empty_product() {
		assert_eq!(
			calculate_invariant(&[half(), half()], &[U256::zero(), fp(1)]),
			Err(MathError::ZeroInvariant)
		);
	}

	#[test]
	fn out_given_in_for_equal_weights() {
		// 1000 * (1 - 1000 / 1100)
		let out = calc_out_given_in(fp(1000), half(), fp(1000), half(), fp(100)).unwrap();
		let expected = U256::from(90_909_090_909_090_909_090u128);
		assert!(out < expected);
		assert!(within(out, expected, U256::from(10_000_000u128)));
	}

	#[test]
	fn in_given_out_for_uneven_weights() {
		let weight_in = U256::from(ONE * 8 / 10);
		let weight_out = U256::from(ONE * 2 / 10);
		let amount_in = calc_in_given_out(fp(800), weight_in, fp(200), weight_out, fp(20)).unwrap();
		let out = calc_out_given_in(fp(800), weight_in, fp(200), weight_out, amount_in).unwrap();
		assert!(within(out, fp(20), U256::from(100_000_000u128)));
	}

	#[test]
	fn swap_ratio_limits() {
		assert_eq!(
			calc_out_given_in(fp(1000), half(), fp(1000), half(), fp(301)),
			Err(MathError::MaxInRatio)
		);
		assert_eq!(
			calc_in_given_out(fp(1000), half(), fp(1000), half(), fp(301)),
			Err(MathError::MaxOutRatio)
		);
	}

	#[test]
	fn proportional_join_mints_proportional_shares() {
		let shares = calc_bpt_out_given_exact_tokens_in(
			&[fp(1000), fp(1000)],
			&[half(), half()],
			&[fp(100), fp(100)],
			fp(1000),
			U256::from(ONE / 100),
		)
		.unwrap();
		assert!(shares <= fp(100));
		assert!(within(shares, fp(100), U256::from(100_000_000u128)));
	}

	#[test]
	fn single_token_liquidity_bounds() {
		assert_eq!(
			calc_token_in_given_exact_bpt_out(fp(1000), half(), fp(2500), fp(1000), U256::zero()),
			Err(MathError::MaxInvariantRatio)
		);
		assert_eq!(
			calc_token_out_given_exact_bpt_in(fp(1000), half(), fp(400), fp(1000), U256::zero()),
			Err(MathError::MinInvariantRatio)
		);

		// doubling the supply with a 0.5 weight needs four times the balance
		let token_in = calc_token_in_given_exact_bpt_out(fp(1000), half(), fp(1000), fp(1000), U256::zero()).unwrap();
		assert!(within(token_in, fp(3000), U256::from(1_000_000u128)));
	}

	#[test]
	fn exact_tokens_out_burns_shares() {
		let shares = calc_bpt_in_given_exact_tokens_out(
			&[fp(1000), fp(1000)],
			&[half(), half()],
			&[fp(100), U256::zero()],
			fp(1000),
			U256::from(ONE / 100),
		)
		.unwrap();
		// 1 - sqrt(0.8995) after the fee on the imbalanced part
		assert!(shares > fp(51));
		assert!(shares < fp(52));
	}

	#[test]
	fn protocol_fee_is_zero_without_growth() {
		assert_eq!(
			calc_due_token_protocol_swap_fee_amount(fp(1000), half(), fp(500), fp(500), half()).unwrap(),
			U256::zero()
		);
		let fee = calc_due_token_protocol_swap_fee_amount(fp(1000), half(), fp(500), fp(505), half()).unwrap();
		// 1000 * (1 - (500/505)^2) / 2
		assert!(fee > fp(9));
		assert!(fee < fp(10));
	}
}
