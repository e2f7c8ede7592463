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


//! Share based ledger of capital an asset manager has taken out of pools to invest.

use crate::fixed_point::{MathError, ONE};
use crate::pool::PoolError;
use crate::PoolId;
use frame_support::pallet_prelude::*;
use sp_core::U256;
use sp_std::collections::btree_map::BTreeMap;

#[derive(Encode, Decode, Clone, Default, PartialEq, Eq, Debug, TypeInfo)]
pub struct AssetManagerInfo {
	/// Value of everything invested, as of the last sync with the strategy.
	pub total_aum: u128,
	pub total_supply: u128,
	pub shares: BTreeMap<PoolId, u128>,
	/// Fraction of a pool's balance that may be invested, 18 decimals.
	pub investable_percent: BTreeMap<PoolId, u128>,
}

fn mul_div(a: u128, b: u128, c: u128) -> Result<u128, MathError> {
	if c == 0 {
		return Err(MathError::DivisionByZero);
	}
	let result = U256::from(a) * U256::from(b) / U256::from(c);
	u128::try_from(result).map_err(|_| MathError::Overflow)
}

fn signed(value: u128) -> Result<i128, MathError> {
	i128::try_from(value).map_err(|_| MathError::Overflow)
}

impl AssetManagerInfo {
	pub fn shares_of(&self, pool_id: PoolId) -> u128 {
		self.shares.get(&pool_id).copied().unwrap_or_default()
	}

	pub fn investable_percent_of(&self, pool_id: PoolId) -> u128 {
		self.investable_percent.get(&pool_id).copied().unwrap_or_default()
	}

	/// Managed balance of a pool, rounded down.
	pub fn balance_of(&self, pool_id: PoolId) -> Result<u128, MathError> {
		if self.total_supply == 0 {
			return Ok(0);
		}
		mul_div(self.shares_of(pool_id), self.total_aum, self.total_supply)
	}

	pub fn set_investable_percent(&mut self, pool_id: PoolId, percent: u128) -> Result<(), PoolError> {
		ensure!(percent <= ONE, PoolError::InvestablePercentTooHigh);
		self.investable_percent.insert(pool_id, percent);
		Ok(())
	}

	/// How much more of a pool's balance may be invested. Negative when the pool is over its
	/// target.
	pub fn max_investable_balance(&self, pool_id: PoolId, cash: u128) -> Result<i128, MathError> {
		let managed = self.balance_of(pool_id)?;
		let total = cash.checked_add(managed).ok_or(MathError::Overflow)?;
		let target = mul_div(total, self.investable_percent_of(pool_id), ONE)?;
		Ok(signed(target)? - signed(managed)?)
	}

	/// Accounts `amount` taken from a pool holding `cash`. Returns the shares minted.
	pub fn capital_in(&mut self, pool_id: PoolId, amount: u128, cash: u128) -> Result<u128, PoolError> {
		let headroom = self.max_investable_balance(pool_id, cash)?;
		ensure!(signed(amount)? <= headroom, PoolError::InvestmentExceedsTarget);

		let shares = if self.total_supply == 0 {
			amount
		} else {
			// outstanding shares backed by nothing cannot price new capital
			ensure!(self.total_aum > 0, PoolError::WorthlessShares);
			mul_div(amount, self.total_supply, self.total_aum)?
		};

		self.total_supply = self.total_supply.checked_add(shares).ok_or(MathError::Overflow)?;
		self.total_aum = self.total_aum.checked_add(amount).ok_or(MathError::Overflow)?;
		let pool_shares = self.shares_of(pool_id).checked_add(shares).ok_or(MathError::Overflow)?;
		self.shares.insert(pool_id, pool_shares);
		Ok(shares)
	}

	/// Burns `shares` of a pool holding `cash`. Returns the tokens owed to the pool.
	pub fn capital_out(&mut self, pool_id: PoolId, shares: u128, cash: u128) -> Result<u128, PoolError> {
		let pool_shares = self.shares_of(pool_id);
		ensure!(shares <= pool_shares, PoolError::InsufficientShares);

		let amount = mul_div(shares, self.total_aum, self.total_supply)?;
		let headroom = self.max_investable_balance(pool_id, cash)?;
		ensure!(signed(amount)? <= -headroom, PoolError::WithdrawalBelowTarget);

		self.total_supply -= shares;
		self.total_aum = self.total_aum.checked_sub(amount).ok_or(MathError::Underflow)?;
		if pool_shares == shares {
			self.shares.remove(&pool_id);
		} else {
			self.shares.insert(pool_id, pool_shares - shares);
		}
		Ok(amount)
	}

	pub fn realize_gains(&mut self, aum: u128) {
		self.total_aum = aum;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn manager(percent: u128) -> AssetManagerInfo {
		let mut info = AssetManagerInfo::default();
		info.set_investable_percent(0, percent).unwrap();
		info.set_investable_percent(1, percent).unwrap();
		info
	}

	#[test]
	fn shares_track_aum() {
		let mut info = manager(ONE);
		assert_eq!(info.capital_in(0, 100, 1000), Ok(100));
		info.realize_gains(150);
		assert_eq!(info.balance_of(0), Ok(150));

		assert_eq!(info.capital_in(1, 150, 1000), Ok(100));
		assert_eq!(info.balance_of(0), Ok(150));
		assert_eq!(info.balance_of(1), Ok(150));
		assert_eq!(info.total_aum, 300);
		assert_eq!(info.total_supply, 200);
	}

	#[test]
	fn investment_into_fully_lost_capital_is_rejected() {
		let mut info = manager(ONE);
		assert_eq!(info.capital_in(0, 100, 1000), Ok(100));
		info.realize_gains(0);
		assert_eq!(info.balance_of(0), Ok(0));

		assert_eq!(info.capital_in(1, 100, 1000), Err(PoolError::WorthlessShares));
		assert_eq!(info.shares_of(1), 0);
		assert_eq!(info.total_supply, 100);
		assert_eq!(info.total_aum, 0);
	}

	#[test]
	fn investment_is_capped_by_target() {
		let mut info = manager(ONE / 2);
		assert_eq!(info.max_investable_balance(0, 1000), Ok(500));
		assert_eq!(info.capital_in(0, 600, 1000), Err(PoolError::InvestmentExceedsTarget));
		assert_eq!(info.capital_in(0, 500, 1000), Ok(500));
		// 500 cash and 500 managed left
		assert_eq!(info.max_investable_balance(0, 500), Ok(0));
	}

	#[test]
	fn withdrawal_is_capped_by_negative_headroom() {
		let mut info = manager(ONE / 2);
		info.capital_in(0, 500, 1000).unwrap();
		info.set_investable_percent(0, ONE / 5).unwrap();
		assert_eq!(info.max_investable_balance(0, 500), Ok(-300));

		assert_eq!(info.capital_out(0, 400, 500), Err(PoolError::WithdrawalBelowTarget));
		assert_eq!(info.capital_out(0, 600, 500), Err(PoolError::InsufficientShares));
		assert_eq!(info.capital_out(0, 300, 500), Ok(300));
		assert_eq!(info.balance_of(0), Ok(200));
		assert_eq!(info.capital_out(1, 1, 500), Err(PoolError::InsufficientShares));
	}

	#[test]
	fn investable_percent_is_bounded() {
		let mut info = AssetManagerInfo::default();
		assert_eq!(info.set_investable_percent(0, ONE + 1), Err(PoolError::InvestablePercentTooHigh));
		assert_eq!(info.max_investable_balance(0, 1000), Ok(0));
	}
}
