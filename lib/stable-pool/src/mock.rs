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


use crate as stable_pool;
use crate::traits::{Assets, InvestmentStrategy, ValidateAssetId};
use core::time::Duration;
use frame_support::{
	derive_impl,
	dispatch::DispatchResult,
	parameter_types,
	traits::{ConstU32, UnixTime},
	PalletId,
};
use frame_system::EnsureRoot;
use sp_runtime::{BuildStorage, DispatchError};
use std::cell::RefCell;
use std::collections::HashMap;

type Block = frame_system::mocking::MockBlock<Test>;

frame_support::construct_runtime!(
	pub enum Test {
		System: frame_system,
		Balances: pallet_balances,
		StablePool: stable_pool,
	}
);

pub type AccountId = u64;
pub type Balance = u128;
pub type AssetId = i64;

pub const ALICE: AccountId = 1;
pub const BOB: AccountId = 2;
pub const FEE_COLLECTOR: AccountId = 99;

#[derive_impl(frame_system::config_preludes::TestDefaultConfig)]
impl frame_system::Config for Test {
	type Block = Block;
	type AccountData = pallet_balances::AccountData<u64>;
}

#[derive_impl(pallet_balances::config_preludes::TestDefaultConfig)]
impl pallet_balances::Config for Test {
	type AccountStore = System;
}

pub struct Asset {
	total: Balance,
	balances: HashMap<AccountId, Balance>,
}

thread_local! {
	static ASSETS: RefCell<Vec<Asset>> = RefCell::new(Vec::new());
	static AUM: RefCell<HashMap<AssetId, Balance>> = RefCell::new(HashMap::new());
	static NOW: RefCell<u64> = RefCell::new(0);
}

pub trait CreateAssets<AssetId> {
	fn create_asset() -> Result<AssetId, DispatchError>;
}

pub struct TestAssets;
impl CreateAssets<AssetId> for TestAssets {
	fn create_asset() -> Result<AssetId, DispatchError> {
		ASSETS.with(|d| -> Result<AssetId, DispatchError> {
			let mut d = d.borrow_mut();
			let id = AssetId::try_from(d.len()).map_err(|_| DispatchError::Other("Too large id"))?;
			d.push(Asset {
				total: 0,
				balances: HashMap::new(),
			});

			Ok(id)
		})
	}
}

impl Assets<AssetId, Balance, AccountId> for TestAssets {
	fn mint(asset: AssetId, dest: &AccountId, amount: Balance) -> DispatchResult {
		ASSETS.with(|d| -> DispatchResult {
			let i = usize::try_from(asset).map_err(|_| DispatchError::Other("Index out of range"))?;
			let mut d = d.borrow_mut();
			let a = d.get_mut(i).ok_or(DispatchError::Other("Index out of range"))?;

			let x = a.balances.entry(*dest).or_insert(0);
			*x = x.checked_add(amount).ok_or(DispatchError::Other("Overflow"))?;
			a.total = a.total.checked_add(amount).ok_or(DispatchError::Other("Overflow"))?;

			Ok(())
		})
	}

	fn burn(asset: AssetId, dest: &AccountId, amount: Balance) -> DispatchResult {
		ASSETS.with(|d| -> DispatchResult {
			let i = usize::try_from(asset).map_err(|_| DispatchError::Other("Index out of range"))?;
			let mut d = d.borrow_mut();
			let a = d.get_mut(i).ok_or(DispatchError::Other("Index out of range"))?;

			let x = a.balances.get_mut(dest).ok_or(DispatchError::Other("Not found"))?;
			*x = x.checked_sub(amount).ok_or(DispatchError::Other("Insufficient balance"))?;
			a.total = a.total.checked_sub(amount).ok_or(DispatchError::Other("Underflow"))?;

			Ok(())
		})
	}

	fn transfer(asset: AssetId, source: &AccountId, dest: &AccountId, amount: Balance) -> DispatchResult {
		Self::burn(asset, source, amount)?;
		Self::mint(asset, dest, amount)
	}

	fn balance(asset: AssetId, who: &AccountId) -> Balance {
		ASSETS
			.with(|d| -> Option<Balance> {
				let i = usize::try_from(asset).ok()?;
				let d = d.borrow();
				d.get(i)?.balances.get(who).copied()
			})
			.unwrap_or(0)
	}

	fn total_issuance(asset: AssetId) -> Balance {
		ASSETS
			.with(|d| -> Option<Balance> {
				let i = usize::try_from(asset).ok()?;
				Some(d.borrow().get(i)?.total)
			})
			.unwrap_or(0)
	}
}

/// Keeps invested tokens in the manager account and reports their value.
pub struct TestStrategy;
impl TestStrategy {
	pub fn set_aum(asset: AssetId, aum: Balance) {
		AUM.with(|a| a.borrow_mut().insert(asset, aum));
	}
}

impl InvestmentStrategy<AssetId, Balance> for TestStrategy {
	fn read_aum(asset: AssetId) -> Balance {
		AUM.with(|a| a.borrow().get(&asset).copied().unwrap_or(0))
	}

	fn invest(asset: AssetId, amount: Balance) -> Result<Balance, DispatchError> {
		AUM.with(|a| {
			let mut a = a.borrow_mut();
			let aum = a.entry(asset).or_insert(0);
			*aum = aum.checked_add(amount).ok_or(DispatchError::Other("Overflow"))?;
			Ok(*aum)
		})
	}

	fn divest(asset: AssetId, amount: Balance) -> Result<Balance, DispatchError> {
		AUM.with(|a| {
			let mut a = a.borrow_mut();
			let aum = a.entry(asset).or_insert(0);
			*aum = aum.checked_sub(amount).ok_or(DispatchError::Other("Not enough invested"))?;
			Ok(amount)
		})
	}
}

pub struct MockTime;
impl MockTime {
	pub fn set(secs: u64) {
		NOW.with(|n| *n.borrow_mut() = secs);
	}

	pub fn now_secs() -> u64 {
		NOW.with(|n| *n.borrow())
	}

	pub fn advance(secs: u64) {
		NOW.with(|n| *n.borrow_mut() += secs);
	}
}

impl UnixTime for MockTime {
	fn now() -> Duration {
		Duration::from_secs(NOW.with(|n| *n.borrow()))
	}
}

pub struct EnsurePoolAssetId;
impl ValidateAssetId<AssetId> for EnsurePoolAssetId {
	fn validate(a: AssetId) -> bool {
		a >= 0
	}
}

parameter_types! {
	pub const StablePoolPalletId: PalletId = PalletId(*b"nuts/stp");
	pub const ProtocolFeeCollector: AccountId = FEE_COLLECTOR;
}

impl stable_pool::Config for Test {
	type RuntimeEvent = RuntimeEvent;
	type AssetId = AssetId;
	type Assets = TestAssets;
	type InvestmentStrategy = TestStrategy;
	type TimeProvider = MockTime;
	type PalletId = StablePoolPalletId;
	type PoolAssetLimit = ConstU32<5>;
	type ProtocolFeeCollector = ProtocolFeeCollector;
	type WeightInfo = ();
	type EnsurePoolAssetId = EnsurePoolAssetId;
	type AdminOrigin = EnsureRoot<AccountId>;
}

#[derive(Default)]
pub struct ExtBuilder {
	protocol_swap_fee_percentage: u128,
}

impl ExtBuilder {
	pub fn protocol_swap_fee(mut self, fee: u128) -> Self {
		self.protocol_swap_fee_percentage = fee;
		self
	}

	pub fn build(self) -> sp_io::TestExternalities {
		let mut t = frame_system::GenesisConfig::<Test>::default()
			.build_storage()
			.expect("system genesis builds");
		stable_pool::GenesisConfig::<Test> {
			protocol_swap_fee_percentage: self.protocol_swap_fee_percentage,
			_phantom: Default::default(),
		}
		.assimilate_storage(&mut t)
		.expect("pallet genesis builds");

		ASSETS.with(|d| d.borrow_mut().clear());
		AUM.with(|a| a.borrow_mut().clear());
		MockTime::set(1_000_000);

		let mut ext = sp_io::TestExternalities::new(t);
		ext.execute_with(|| System::set_block_number(1));
		ext
	}
}

// Build genesis storage according to the mock runtime.
pub fn new_test_ext() -> sp_io::TestExternalities {
	ExtBuilder::default().build()
}
