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


//! Pool state machine shared by stable and weighted pools.
//!
//! A [`Pool`] receives raw token balances from the ledger, upscales them, asks its
//! [`InvariantStrategy`] for quotes and hands back raw amounts for the ledger to settle.

use crate::fixed_point::{FixedPoint, MathError};
use crate::user_data::{ExitKind, JoinKind};
use crate::{stable_math, weighted_math};
use frame_support::pallet_prelude::*;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};
use sp_core::U256;
use sp_std::{prelude::*, vec};

/// Shares minted on initialization that stay locked in the pool account forever.
pub const MINIMUM_SHARES: u128 = 1_000_000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PoolError {
	Math(MathError),
	Paused,
	/// The pool has no shares yet and the join is not `Init`.
	Uninitialized,
	UnhandledJoinKind,
	InvalidUserData,
	InputLengthMismatch,
	TokenIndexOutOfBounds,
	SameToken,
	SharesOutBelowMin,
	SharesInAboveMax,
	MinimumShares,
	AmpOutOfBounds,
	AmpEndTimeTooClose,
	AmpOngoingUpdate,
	AmpNoOngoingUpdate,
	AmpChangeTooLarge,
	InvestablePercentTooHigh,
	InvestmentExceedsTarget,
	WithdrawalBelowTarget,
	InsufficientShares,
	/// Manager shares are outstanding but the managed assets are worth nothing.
	WorthlessShares,
}

impl From<MathError> for PoolError {
	fn from(e: MathError) -> Self {
		PoolError::Math(e)
	}
}

#[derive(Encode, Decode, Clone, Copy, PartialEq, Eq, Debug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub enum SwapKind {
	GivenIn,
	GivenOut,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SwapRequest {
	pub kind: SwapKind,
	/// Amount in for `GivenIn`, amount out for `GivenOut`, in raw token units.
	pub amount: U256,
}

/// Result of a join or exit, in raw token units.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct JoinExitAmounts {
	/// Shares minted on join, burned on exit.
	pub shares: U256,
	pub amounts: Vec<U256>,
	pub protocol_fees: Vec<U256>,
}

/// Curve specific math used by [`Pool`]. Balances and amounts are upscaled.
pub trait InvariantStrategy {
	fn invariant(&self, balances: &[U256]) -> Result<U256, MathError>;

	fn out_given_in(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_in: U256,
	) -> Result<U256, MathError>;

	fn in_given_out(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_out: U256,
	) -> Result<U256, MathError>;

	fn bpt_out_given_exact_tokens_in(
		&self,
		balances: &[U256],
		amounts_in: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError>;

	fn token_in_given_exact_bpt_out(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_out: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError>;

	fn bpt_in_given_exact_tokens_out(
		&self,
		balances: &[U256],
		amounts_out: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError>;

	fn token_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_in: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError>;

	fn tokens_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		bpt_in: U256,
		total_supply: U256,
	) -> Result<Vec<U256>, MathError>;

	/// Protocol fees owed on the invariant growth since `last_invariant`.
	fn due_protocol_fee_amounts(
		&self,
		balances: &[U256],
		last_invariant: U256,
		protocol_swap_fee: U256,
	) -> Result<Vec<U256>, MathError>;
}

fn index_of_max(values: &[U256]) -> usize {
	let mut chosen = 0;
	for (i, v) in values.iter().enumerate().skip(1) {
		if *v > values[chosen] {
			chosen = i;
		}
	}
	chosen
}

/// Stable swap curve at a given amplification.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StableStrategy {
	pub amp: U256,
	/// Amplification the last invariant was computed with.
	pub last_invariant_amp: U256,
}

impl InvariantStrategy for StableStrategy {
	fn invariant(&self, balances: &[U256]) -> Result<U256, MathError> {
		stable_math::calculate_invariant(self.amp, balances)
	}

	fn out_given_in(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_in: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_out_given_in(self.amp, balances, index_in, index_out, amount_in)
	}

	fn in_given_out(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_out: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_in_given_out(self.amp, balances, index_in, index_out, amount_out)
	}

	fn bpt_out_given_exact_tokens_in(
		&self,
		balances: &[U256],
		amounts_in: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_bpt_out_given_exact_tokens_in(self.amp, balances, amounts_in, total_supply, swap_fee)
	}

	fn token_in_given_exact_bpt_out(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_out: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_token_in_given_exact_bpt_out(self.amp, balances, token_index, bpt_out, total_supply, swap_fee)
	}

	fn bpt_in_given_exact_tokens_out(
		&self,
		balances: &[U256],
		amounts_out: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_bpt_in_given_exact_tokens_out(self.amp, balances, amounts_out, total_supply, swap_fee)
	}

	fn token_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_in: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		stable_math::calc_token_out_given_exact_bpt_in(self.amp, balances, token_index, bpt_in, total_supply, swap_fee)
	}

	fn tokens_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		bpt_in: U256,
		total_supply: U256,
	) -> Result<Vec<U256>, MathError> {
		stable_math::calc_tokens_out_given_exact_bpt_in(balances, bpt_in, total_supply)
	}

	fn due_protocol_fee_amounts(
		&self,
		balances: &[U256],
		last_invariant: U256,
		protocol_swap_fee: U256,
	) -> Result<Vec<U256>, MathError> {
		let mut due = vec![U256::zero(); balances.len()];
		if protocol_swap_fee.is_zero() || last_invariant.is_zero() {
			return Ok(due);
		}
		// paid in the token with the largest balance
		let chosen = index_of_max(balances);
		due[chosen] = stable_math::calc_due_token_protocol_swap_fee_amount(
			self.last_invariant_amp,
			balances,
			last_invariant,
			chosen,
			protocol_swap_fee,
		)?;
		Ok(due)
	}
}

/// Weighted constant product curve.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WeightedStrategy {
	pub weights: Vec<U256>,
}

impl InvariantStrategy for WeightedStrategy {
	fn invariant(&self, balances: &[U256]) -> Result<U256, MathError> {
		weighted_math::calculate_invariant(&self.weights, balances)
	}

	fn out_given_in(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_in: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_out_given_in(
			balances[index_in],
			self.weights[index_in],
			balances[index_out],
			self.weights[index_out],
			amount_in,
		)
	}

	fn in_given_out(
		&self,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
		amount_out: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_in_given_out(
			balances[index_in],
			self.weights[index_in],
			balances[index_out],
			self.weights[index_out],
			amount_out,
		)
	}

	fn bpt_out_given_exact_tokens_in(
		&self,
		balances: &[U256],
		amounts_in: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_bpt_out_given_exact_tokens_in(balances, &self.weights, amounts_in, total_supply, swap_fee)
	}

	fn token_in_given_exact_bpt_out(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_out: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_token_in_given_exact_bpt_out(
			balances[token_index],
			self.weights[token_index],
			bpt_out,
			total_supply,
			swap_fee,
		)
	}

	fn bpt_in_given_exact_tokens_out(
		&self,
		balances: &[U256],
		amounts_out: &[U256],
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_bpt_in_given_exact_tokens_out(balances, &self.weights, amounts_out, total_supply, swap_fee)
	}

	fn token_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		token_index: usize,
		bpt_in: U256,
		total_supply: U256,
		swap_fee: U256,
	) -> Result<U256, MathError> {
		weighted_math::calc_token_out_given_exact_bpt_in(
			balances[token_index],
			self.weights[token_index],
			bpt_in,
			total_supply,
			swap_fee,
		)
	}

	fn tokens_out_given_exact_bpt_in(
		&self,
		balances: &[U256],
		bpt_in: U256,
		total_supply: U256,
	) -> Result<Vec<U256>, MathError> {
		weighted_math::calc_tokens_out_given_exact_bpt_in(balances, bpt_in, total_supply)
	}

	fn due_protocol_fee_amounts(
		&self,
		balances: &[U256],
		last_invariant: U256,
		protocol_swap_fee: U256,
	) -> Result<Vec<U256>, MathError> {
		let mut due = vec![U256::zero(); balances.len()];
		if protocol_swap_fee.is_zero() || last_invariant.is_zero() {
			return Ok(due);
		}
		// paid in the token with the largest weight
		let chosen = index_of_max(&self.weights);
		let current_invariant = self.invariant(balances)?;
		due[chosen] = weighted_math::calc_due_token_protocol_swap_fee_amount(
			balances[chosen],
			self.weights[chosen],
			last_invariant,
			current_invariant,
			protocol_swap_fee,
		)?;
		Ok(due)
	}
}

/// Hooks the ledger calls into. Balances are raw token balances of the pool.
pub trait BasePool {
	fn on_swap(
		&self,
		request: SwapRequest,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
	) -> Result<U256, PoolError>;

	/// Returns the initial shares and the amounts to pull in.
	fn on_initialize_pool(&mut self, user_data: &[u8]) -> Result<(U256, Vec<U256>), PoolError>;

	fn on_join_pool(
		&mut self,
		balances: &[U256],
		total_supply: U256,
		protocol_swap_fee: U256,
		user_data: &[u8],
	) -> Result<JoinExitAmounts, PoolError>;

	fn on_exit_pool(
		&mut self,
		balances: &[U256],
		total_supply: U256,
		protocol_swap_fee: U256,
		user_data: &[u8],
	) -> Result<JoinExitAmounts, PoolError>;

	/// Invariant as of the last initialization, join or exit.
	fn last_invariant(&self) -> U256;

	/// Invariant per share.
	fn rate(&self, balances: &[U256], total_supply: U256) -> Result<U256, PoolError>;
}

pub struct Pool<S> {
	strategy: S,
	scaling_factors: Vec<U256>,
	swap_fee: U256,
	last_invariant: U256,
	paused: bool,
}

impl<S: InvariantStrategy> Pool<S> {
	pub fn new(strategy: S, scaling_factors: Vec<U256>, swap_fee: U256, last_invariant: U256, paused: bool) -> Self {
		Self {
			strategy,
			scaling_factors,
			swap_fee,
			last_invariant,
			paused,
		}
	}

	fn total_tokens(&self) -> usize {
		self.scaling_factors.len()
	}

	fn ensure_length(&self, len: usize) -> Result<(), PoolError> {
		ensure!(len == self.total_tokens(), PoolError::InputLengthMismatch);
		Ok(())
	}

	fn token_index(&self, index: u32) -> Result<usize, PoolError> {
		let index = index as usize;
		ensure!(index < self.total_tokens(), PoolError::TokenIndexOutOfBounds);
		Ok(index)
	}

	fn upscale_array<A: Copy + Into<U256>>(&self, amounts: &[A]) -> Result<Vec<U256>, PoolError> {
		self.ensure_length(amounts.len())?;
		amounts
			.iter()
			.zip(&self.scaling_factors)
			.map(|(a, f)| (*a).into().safe_mul(*f).map_err(Into::into))
			.collect()
	}

	fn downscale_down_array(&self, amounts: &[U256]) -> Result<Vec<U256>, PoolError> {
		amounts
			.iter()
			.zip(&self.scaling_factors)
			.map(|(a, f)| a.safe_div(*f).map_err(Into::into))
			.collect()
	}

	fn downscale_up_array(&self, amounts: &[U256]) -> Result<Vec<U256>, PoolError> {
		amounts
			.iter()
			.zip(&self.scaling_factors)
			.map(|(a, f)| a.safe_div_up(*f).map_err(Into::into))
			.collect()
	}

	/// Upscaled balances with the due protocol fees already taken out.
	fn balances_after_protocol_fees(
		&self,
		balances: &mut [U256],
		protocol_swap_fee: U256,
	) -> Result<Vec<U256>, PoolError> {
		let due = self
			.strategy
			.due_protocol_fee_amounts(balances, self.last_invariant, protocol_swap_fee)?;
		for (balance, fee) in balances.iter_mut().zip(&due) {
			*balance = balance.safe_sub(*fee)?;
		}
		Ok(due)
	}
}

impl<S: InvariantStrategy> BasePool for Pool<S> {
	fn on_swap(
		&self,
		request: SwapRequest,
		balances: &[U256],
		index_in: usize,
		index_out: usize,
	) -> Result<U256, PoolError> {
		ensure!(!self.paused, PoolError::Paused);
		ensure!(
			index_in < self.total_tokens() && index_out < self.total_tokens(),
			PoolError::TokenIndexOutOfBounds
		);
		ensure!(index_in != index_out, PoolError::SameToken);
		let balances = self.upscale_array(balances)?;

		match request.kind {
			SwapKind::GivenIn => {
				let fee_amount = request.amount.mul_up(self.swap_fee)?;
				let amount_in = request
					.amount
					.safe_sub(fee_amount)?
					.safe_mul(self.scaling_factors[index_in])?;
				let amount_out = self
					.strategy
					.out_given_in(&balances, index_in, index_out, amount_in)?;
				Ok(amount_out.safe_div(self.scaling_factors[index_out])?)
			}
			SwapKind::GivenOut => {
				let amount_out = request.amount.safe_mul(self.scaling_factors[index_out])?;
				let amount_in = self
					.strategy
					.in_given_out(&balances, index_in, index_out, amount_out)?;
				let amount_in = amount_in.safe_div_up(self.scaling_factors[index_in])?;
				Ok(amount_in.div_up(self.swap_fee.complement())?)
			}
		}
	}

	fn on_initialize_pool(&mut self, user_data: &[u8]) -> Result<(U256, Vec<U256>), PoolError> {
		ensure!(!self.paused, PoolError::Paused);
		let amounts_in = match JoinKind::from_user_data(user_data)? {
			JoinKind::Init { amounts_in } => amounts_in,
			_ => return Err(PoolError::Uninitialized),
		};

		let upscaled = self.upscale_array(&amounts_in)?;
		let invariant = self.strategy.invariant(&upscaled)?;
		ensure!(invariant >= U256::from(MINIMUM_SHARES), PoolError::MinimumShares);

		self.last_invariant = invariant;
		Ok((invariant, amounts_in.into_iter().map(U256::from).collect()))
	}

	fn on_join_pool(
		&mut self,
		balances: &[U256],
		total_supply: U256,
		protocol_swap_fee: U256,
		user_data: &[u8],
	) -> Result<JoinExitAmounts, PoolError> {
		ensure!(!self.paused, PoolError::Paused);
		let kind = JoinKind::from_user_data(user_data)?;
		let mut balances = self.upscale_array(balances)?;
		let due = self.balances_after_protocol_fees(&mut balances, protocol_swap_fee)?;

		let (shares_out, amounts_in) = match kind {
			JoinKind::Init { .. } => return Err(PoolError::UnhandledJoinKind),
			JoinKind::ExactTokensInForSharesOut {
				amounts_in,
				min_shares_out,
			} => {
				let amounts_in = self.upscale_array(&amounts_in)?;
				let shares_out =
					self.strategy
						.bpt_out_given_exact_tokens_in(&balances, &amounts_in, total_supply, self.swap_fee)?;
				ensure!(shares_out >= U256::from(min_shares_out), PoolError::SharesOutBelowMin);
				(shares_out, amounts_in)
			}
			JoinKind::TokenInForExactSharesOut {
				shares_out,
				token_index,
			} => {
				let index = self.token_index(token_index)?;
				let shares_out = U256::from(shares_out);
				let amount_in = self.strategy.token_in_given_exact_bpt_out(
					&balances,
					index,
					shares_out,
					total_supply,
					self.swap_fee,
				)?;
				let mut amounts_in = vec![U256::zero(); self.total_tokens()];
				amounts_in[index] = amount_in;
				(shares_out, amounts_in)
			}
		};

		let mut new_balances = Vec::with_capacity(balances.len());
		for (balance, amount) in balances.iter().zip(&amounts_in) {
			new_balances.push(balance.safe_add(*amount)?);
		}
		let new_invariant = self.strategy.invariant(&new_balances)?;

		let result = JoinExitAmounts {
			shares: shares_out,
			amounts: self.downscale_up_array(&amounts_in)?,
			protocol_fees: self.downscale_down_array(&due)?,
		};
		self.last_invariant = new_invariant;
		Ok(result)
	}

	fn on_exit_pool(
		&mut self,
		balances: &[U256],
		total_supply: U256,
		protocol_swap_fee: U256,
		user_data: &[u8],
	) -> Result<JoinExitAmounts, PoolError> {
		let kind = ExitKind::from_user_data(user_data)?;
		let mut balances = self.upscale_array(balances)?;
		// no protocol fees while paused
		let due = if self.paused {
			vec![U256::zero(); self.total_tokens()]
		} else {
			self.balances_after_protocol_fees(&mut balances, protocol_swap_fee)?
		};

		let (shares_in, amounts_out) = match kind {
			ExitKind::ExactSharesInForAllTokensOut { shares_in } => {
				let shares_in = U256::from(shares_in);
				let amounts_out = self
					.strategy
					.tokens_out_given_exact_bpt_in(&balances, shares_in, total_supply)?;
				(shares_in, amounts_out)
			}
			ExitKind::ExactSharesInForOneTokenOut { shares_in, token_index } => {
				ensure!(!self.paused, PoolError::Paused);
				let index = self.token_index(token_index)?;
				let shares_in = U256::from(shares_in);
				let amount_out = self.strategy.token_out_given_exact_bpt_in(
					&balances,
					index,
					shares_in,
					total_supply,
					self.swap_fee,
				)?;
				let mut amounts_out = vec![U256::zero(); self.total_tokens()];
				amounts_out[index] = amount_out;
				(shares_in, amounts_out)
			}
			ExitKind::SharesInForExactTokensOut {
				amounts_out,
				max_shares_in,
			} => {
				ensure!(!self.paused, PoolError::Paused);
				let amounts_out = self.upscale_array(&amounts_out)?;
				let shares_in = self.strategy.bpt_in_given_exact_tokens_out(
					&balances,
					&amounts_out,
					total_supply,
					self.swap_fee,
				)?;
				ensure!(shares_in <= U256::from(max_shares_in), PoolError::SharesInAboveMax);
				(shares_in, amounts_out)
			}
		};

		let mut new_balances = Vec::with_capacity(balances.len());
		for (balance, amount) in balances.iter().zip(&amounts_out) {
			new_balances.push(balance.safe_sub(*amount)?);
		}
		let new_invariant = self.strategy.invariant(&new_balances)?;

		let result = JoinExitAmounts {
			shares: shares_in,
			amounts: self.downscale_down_array(&amounts_out)?,
			protocol_fees: self.downscale_down_array(&due)?,
		};
		self.last_invariant = new_invariant;
		Ok(result)
	}

	fn last_invariant(&self) -> U256 {
		self.last_invariant
	}

	fn rate(&self, balances: &[U256], total_supply: U256) -> Result<U256, PoolError> {
		let balances = self.upscale_array(balances)?;
		let invariant = self.strategy.invariant(&balances)?;
		Ok(invariant.div_down(total_supply)?)
	}
}
