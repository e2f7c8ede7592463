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


//! Stable swap invariant math.
//!
//! Balances are upscaled to 18 decimals. `amp` is the amplification parameter multiplied by
//! [`AMP_PRECISION`].

use crate::fixed_point::{one, FixedPoint, MathError, MathResult};
use sp_core::U256;
use sp_std::prelude::*;

pub const MIN_AMP: u128 = 1;
pub const MAX_AMP: u128 = 5000;
pub const AMP_PRECISION: u128 = 1000;
pub const MAX_STABLE_TOKENS: usize = 5;

const NUMBER_OF_ITERATIONS_TO_CONVERGE: usize = 255;

fn converged(current: U256, previous: U256) -> bool {
	if current > previous {
		current - previous <= U256::one()
	} else {
		previous - current <= U256::one()
	}
}

fn sum_of(balances: &[U256]) -> MathResult<U256> {
	balances.iter().try_fold(U256::zero(), |acc, b| acc.safe_add(*b))
}

/// Invariant `D` of the stable swap curve, rounded down.
pub fn calculate_invariant(amp: U256, balances: &[U256]) -> MathResult<U256> {
	let sum = sum_of(balances)?;
	if sum.is_zero() {
		return Ok(U256::zero());
	}
	if balances.iter().any(|b| b.is_zero()) {
		return Err(MathError::ZeroBalance);
	}

	let n = U256::from(balances.len());
	let precision = U256::from(AMP_PRECISION);
	let ann = amp.safe_mul(n)?;
	let mut d = sum;

	for _ in 0..NUMBER_OF_ITERATIONS_TO_CONVERGE {
		let mut d_p = d;
		for balance in balances {
			d_p = d_p.safe_mul(d)?.safe_div(balance.safe_mul(n)?)?;
		}
		let prev_d = d;
		let numerator = ann
			.safe_mul(sum)?
			.safe_div(precision)?
			.safe_add(d_p.safe_mul(n)?)?
			.safe_mul(d)?;
		let denominator = ann
			.safe_sub(precision)?
			.safe_mul(d)?
			.safe_div(precision)?
			.safe_add(n.safe_add(U256::one())?.safe_mul(d_p)?)?;
		d = numerator.safe_div(denominator)?;

		if converged(d, prev_d) {
			return Ok(d);
		}
	}

	log::debug!(target: crate::LOG_TARGET, "invariant did not converge, amp {:?}, balances {:?}", amp, balances);
	Err(MathError::InvariantDidNotConverge)
}

/// Balance of `token_index` that keeps `invariant` with every other balance fixed, rounded up.
///
/// The current value of `balances[token_index]` is ignored.
pub fn get_token_balance_given_invariant_and_all_other_balances(
	amp: U256,
	balances: &[U256],
	invariant: U256,
	token_index: usize,
) -> MathResult<U256> {
	let n = U256::from(balances.len());
	let precision = U256::from(AMP_PRECISION);
	let ann = amp.safe_mul(n)?;

	// divide by one balance per step so c stays near D in magnitude
	let mut sum = U256::zero();
	let mut c = invariant;
	for (j, balance) in balances.iter().enumerate() {
		if j == token_index {
			continue;
		}
		sum = sum.safe_add(*balance)?;
		c = c.safe_mul(invariant)?.safe_div(balance.safe_mul(n)?)?;
	}
	let c = c
		.safe_mul(invariant)?
		.safe_mul(precision)?
		.safe_div_up(ann.safe_mul(n)?)?;
	let b = sum.safe_add(invariant.safe_mul(precision)?.safe_div(ann)?)?;

	let mut token_balance = invariant;
	for _ in 0..NUMBER_OF_ITERATIONS_TO_CONVERGE {
		let prev_token_balance = token_balance;
		token_balance = token_balance
			.safe_mul(token_balance)?
			.safe_add(c)?
			.safe_div_up(token_balance.safe_mul(U256::from(2))?.safe_add(b)?.safe_sub(invariant)?)?;

		if converged(token_balance, prev_token_balance) {
			return Ok(token_balance);
		}
	}

	log::debug!(
		target: crate::LOG_TARGET,
		"balance did not converge, amp {:?}, balances {:?}, token {}",
		amp,
		balances,
		token_index
	);
	Err(MathError::BalanceDidNotConverge)
}

/// Amount of `index_out` received for `amount_in` of `index_in`, rounded down.
pub fn calc_out_given_in(
	amp: U256,
	balances: &[U256],
	index_in: usize,
	index_out: usize,
	amount_in: U256,
) -> MathResult<U256> {
	let invariant = calculate_invariant(amp, balances)?;
	let mut new_balances = balances.to_vec();
	new_balances[index_in] = new_balances[index_in].safe_add(amount_in)?;

	let final_balance_out =
		get_token_balance_given_invariant_and_all_other_balances(amp, &new_balances, invariant, index_out)?;

	log::trace!(
		target: crate::LOG_TARGET,
		"out given in: invariant {:?}, final balance out {:?}",
		invariant,
		final_balance_out
	);

	balances[index_out].safe_sub(final_balance_out)?.safe_sub(U256::one())
}

/// Amount of `index_in` required to receive `amount_out` of `index_out`, rounded up.
pub fn calc_in_given_out(
	amp: U256,
	balances: &[U256],
	index_in: usize,
	index_out: usize,
	amount_out: U256,
) -> MathResult<U256> {
	let invariant = calculate_invariant(amp, balances)?;
	let mut new_balances = balances.to_vec();
	new_balances[index_out] = new_balances[index_out].safe_sub(amount_out)?;
	if new_balances[index_out].is_zero() {
		return Err(MathError::ZeroBalance);
	}

	let final_balance_in =
		get_token_balance_given_invariant_and_all_other_balances(amp, &new_balances, invariant, index_in)?;

	final_balance_in.safe_sub(balances[index_in])?.safe_add(U256::one())
}

/// Pool shares minted for `amounts_in`. The part of each amount beyond the proportional join is
/// charged `swap_fee`.
pub fn calc_bpt_out_given_exact_tokens_in(
	amp: U256,
	balances: &[U256],
	amounts_in: &[U256],
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let current_invariant = calculate_invariant(amp, balances)?;
	let sum = sum_of(balances)?;

	let mut balance_ratios_with_fee = Vec::with_capacity(balances.len());
	let mut invariant_ratio_with_fees = U256::zero();
	for (balance, amount_in) in balances.iter().zip(amounts_in) {
		let current_weight = balance.div_down(sum)?;
		let ratio = balance.safe_add(*amount_in)?.div_down(*balance)?;
		invariant_ratio_with_fees = invariant_ratio_with_fees.safe_add(ratio.mul_down(current_weight)?)?;
		balance_ratios_with_fee.push(ratio);
	}

	let mut new_balances = Vec::with_capacity(balances.len());
	for i in 0..balances.len() {
		let amount_in_without_fee = if balance_ratios_with_fee[i] > invariant_ratio_with_fees {
			let non_taxable_amount = balances[i].mul_down(invariant_ratio_with_fees.safe_sub(one())?)?;
			let taxable_amount = amounts_in[i].safe_sub(non_taxable_amount)?;
			non_taxable_amount.safe_add(taxable_amount.mul_down(swap_fee.complement())?)?
		} else {
			amounts_in[i]
		};
		new_balances.push(balances[i].safe_add(amount_in_without_fee)?);
	}

	let new_invariant = calculate_invariant(amp, &new_balances)?;
	let invariant_ratio = new_invariant.div_down(current_invariant)?;
	if invariant_ratio > one() {
		bpt_total_supply.mul_down(invariant_ratio - one())
	} else {
		Ok(U256::zero())
	}
}

/// Amount of `token_index` needed to mint exactly `bpt_amount_out` shares.
pub fn calc_token_in_given_exact_bpt_out(
	amp: U256,
	balances: &[U256],
	token_index: usize,
	bpt_amount_out: U256,
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let current_invariant = calculate_invariant(amp, balances)?;
	let new_invariant = bpt_total_supply
		.safe_add(bpt_amount_out)?
		.div_up(bpt_total_supply)?
		.mul_up(current_invariant)?;

	let new_balance =
		get_token_balance_given_invariant_and_all_other_balances(amp, balances, new_invariant, token_index)?;
	let amount_in_without_fee = new_balance.safe_sub(balances[token_index])?;

	let current_weight = balances[token_index].div_down(sum_of(balances)?)?;
	let taxable_amount = amount_in_without_fee.mul_up(current_weight.complement())?;
	let non_taxable_amount = amount_in_without_fee.safe_sub(taxable_amount)?;

	non_taxable_amount.safe_add(taxable_amount.div_up(swap_fee.complement())?)
}

/// Pool shares burned to withdraw exactly `amounts_out`.
pub fn calc_bpt_in_given_exact_tokens_out(
	amp: U256,
	balances: &[U256],
	amounts_out: &[U256],
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let current_invariant = calculate_invariant(amp, balances)?;
	let sum = sum_of(balances)?;

	let mut balance_ratios_without_fee = Vec::with_capacity(balances.len());
	let mut invariant_ratio_without_fees = U256::zero();
	for (balance, amount_out) in balances.iter().zip(amounts_out) {
		let current_weight = balance.div_up(sum)?;
		let ratio = balance.safe_sub(*amount_out)?.div_up(*balance)?;
		invariant_ratio_without_fees = invariant_ratio_without_fees.safe_add(ratio.mul_up(current_weight)?)?;
		balance_ratios_without_fee.push(ratio);
	}

	let mut new_balances = Vec::with_capacity(balances.len());
	for i in 0..balances.len() {
		let amount_out_with_fee = if invariant_ratio_without_fees > balance_ratios_without_fee[i] {
			let non_taxable_amount = balances[i].mul_down(invariant_ratio_without_fees.complement())?;
			let taxable_amount = amounts_out[i].safe_sub(non_taxable_amount)?;
			non_taxable_amount.safe_add(taxable_amount.div_up(swap_fee.complement())?)?
		} else {
			amounts_out[i]
		};
		new_balances.push(balances[i].safe_sub(amount_out_with_fee)?);
	}

	let new_invariant = calculate_invariant(amp, &new_balances)?;
	let invariant_ratio = new_invariant.div_down(current_invariant)?;
	bpt_total_supply.mul_up(invariant_ratio.complement())
}

/// Amount of `token_index` received for burning exactly `bpt_amount_in` shares.
pub fn calc_token_out_given_exact_bpt_in(
	amp: U256,
	balances: &[U256],
	token_index: usize,
	bpt_amount_in: U256,
	bpt_total_supply: U256,
	swap_fee: U256,
) -> MathResult<U256> {
	let current_invariant = calculate_invariant(amp, balances)?;
	let new_invariant = bpt_total_supply
		.safe_sub(bpt_amount_in)?
		.div_up(bpt_total_supply)?
		.mul_up(current_invariant)?;

	let new_balance =
		get_token_balance_given_invariant_and_all_other_balances(amp, balances, new_invariant, token_index)?;
	let amount_out_without_fee = balances[token_index].safe_sub(new_balance)?;

	let current_weight = balances[token_index].div_down(sum_of(balances)?)?;
	let taxable_amount = amount_out_without_fee.mul_up(current_weight.complement())?;
	let non_taxable_amount = amount_out_without_fee.safe_sub(taxable_amount)?;

	non_taxable_amount.safe_add(taxable_amount.mul_down(swap_fee.complement())?)
}

/// Proportional exit. Fee free.
pub fn calc_tokens_out_given_exact_bpt_in(
	balances: &[U256],
	bpt_amount_in: U256,
	bpt_total_supply: U256,
) -> MathResult<Vec<U256>> {
	let bpt_ratio = bpt_amount_in.div_down(bpt_total_supply)?;
	balances.iter().map(|b| b.mul_down(bpt_ratio)).collect()
}

/// Protocol share of the swap fees collected since `last_invariant`, paid in `token_index`.
pub fn calc_due_token_protocol_swap_fee_amount(
	amp: U256,
	balances: &[U256],
	last_invariant: U256,
	token_index: usize,
	protocol_swap_fee: U256,
) -> MathResult<U256> {
	let final_balance_fee_token =
		get_token_balance_given_invariant_and_all_other_balances(amp, balances, last_invariant, token_index)?;

	if balances[token_index] <= final_balance_fee_token {
		return Ok(U256::zero());
	}
	let accumulated_token_swap_fees = balances[token_index] - final_balance_fee_token;
	accumulated_token_swap_fees.mul_down(protocol_swap_fee)
}
