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


#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::type_complexity)]
#![allow(clippy::too_many_arguments)]

pub use pallet::*;

#[cfg(test)]
mod mock;


pub mod amplification;
pub mod asset_manager;
pub mod fixed_point;
pub mod log_exp;
pub mod pool;
pub mod stable_math;
pub mod user_data;
pub mod weighted_math;
pub mod weights;

pub use weights::WeightInfo;

use crate::amplification::AmplificationData;
use crate::fixed_point::{MathError, ONE};
use crate::pool::{BasePool, Pool, PoolError, StableStrategy, WeightedStrategy};
use frame_support::dispatch::DispatchResult;
use frame_support::ensure;
use frame_support::pallet_prelude::*;
use sp_core::U256;
use sp_runtime::{traits::AccountIdConversion, ArithmeticError, DispatchError};
use sp_std::prelude::*;

pub type PoolId = u32;

pub type PoolTokenIndex = u32;

pub type Balance = u128;

pub const LOG_TARGET: &str = "runtime::stable-pool";

pub const MIN_SWAP_FEE: u128 = ONE / 1_000_000;
pub const MAX_SWAP_FEE: u128 = ONE / 10;
pub const MAX_PROTOCOL_SWAP_FEE: u128 = ONE / 2;
const MAX_TOKEN_DECIMALS: u8 = 18;

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, TypeInfo)]
pub enum PoolKind {
	Stable {
		amplification: AmplificationData,
		/// Amplification `last_invariant` was computed with.
		last_invariant_amp: u128,
	},
	Weighted {
		weights: Vec<u128>,
	},
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, TypeInfo)]
pub struct PoolInfo<AssetId, AccountId> {
	pub pool_asset: AssetId,
	pub assets: Vec<AssetId>,
	/// `10^(18 - decimals)` per asset.
	pub scaling_factors: Vec<u128>,
	pub swap_fee: u128,
	pub last_invariant: U256,
	pub kind: PoolKind,
	pub paused: bool,
	pub account_id: AccountId,
}

pub mod traits {
	use frame_support::dispatch::DispatchResult;
	use sp_runtime::DispatchError;

	pub trait ValidateAssetId<AssetId> {
		fn validate(a: AssetId) -> bool;
	}

	/// Ledger holding every pool's tokens.
	pub trait Assets<AssetId, Balance, AccountId> {
		fn mint(asset: AssetId, dest: &AccountId, amount: Balance) -> DispatchResult;
		fn burn(asset: AssetId, dest: &AccountId, amount: Balance) -> DispatchResult;
		fn transfer(asset: AssetId, source: &AccountId, dest: &AccountId, amount: Balance) -> DispatchResult;
		fn balance(asset: AssetId, who: &AccountId) -> Balance;
		fn total_issuance(asset: AssetId) -> Balance;
	}

	/// Where an asset manager puts the capital it takes out of pools.
	pub trait InvestmentStrategy<AssetId, Balance> {
		/// Live value of everything invested in `asset`.
		fn read_aum(asset: AssetId) -> Balance;
		/// Invests `amount`, already held by the manager account. Returns the AUM afterwards.
		fn invest(asset: AssetId, amount: Balance) -> Result<Balance, DispatchError>;
		/// Withdraws `amount` back to the manager account. Returns the amount withdrawn.
		fn divest(asset: AssetId, amount: Balance) -> Result<Balance, DispatchError>;
	}
}

#[frame_support::pallet]
pub mod pallet {
	use super::*;
	use crate::asset_manager::AssetManagerInfo;
	use crate::pool::{SwapKind, SwapRequest};
	use crate::traits::{Assets, InvestmentStrategy, ValidateAssetId};
	use frame_support::{
		traits::{EnsureOrigin, UnixTime},
		transactional, PalletId,
	};
	use frame_system::pallet_prelude::*;

	#[pallet::config]
	pub trait Config: frame_system::Config {
		type RuntimeEvent: From<Event<Self>> + IsType<<Self as frame_system::Config>::RuntimeEvent>;

		type AssetId: Parameter + Ord + Copy;
		type Assets: Assets<Self::AssetId, Balance, Self::AccountId>;
		type InvestmentStrategy: InvestmentStrategy<Self::AssetId, Balance>;
		type TimeProvider: UnixTime;
		#[pallet::constant]
		type PalletId: Get<PalletId>;
		#[pallet::constant]
		type PoolAssetLimit: Get<u32>;
		/// Receives the protocol share of swap fees.
		type ProtocolFeeCollector: Get<Self::AccountId>;
		type WeightInfo: WeightInfo;
		type EnsurePoolAssetId: ValidateAssetId<Self::AssetId>;

		/// The origin which may create pools and change their parameters.
		type AdminOrigin: EnsureOrigin<Self::RuntimeOrigin>;
	}

	#[pallet::pallet]
	#[pallet::without_storage_info]
	pub struct Pallet<T>(_);

	#[pallet::storage]
	pub type PoolCount<T: Config> = StorageValue<_, PoolId, ValueQuery>;

	#[pallet::storage]
	pub type Pools<T: Config> = StorageMap<_, Blake2_128Concat, PoolId, PoolInfo<T::AssetId, T::AccountId>>;

	#[pallet::storage]
	pub type ProtocolSwapFeePercentage<T: Config> = StorageValue<_, u128, ValueQuery>;

	#[pallet::storage]
	pub type AssetManagers<T: Config> = StorageMap<_, Blake2_128Concat, T::AssetId, AssetManagerInfo, ValueQuery>;

	#[pallet::genesis_config]
	#[derive(frame_support::DefaultNoBound)]
	pub struct GenesisConfig<T: Config> {
		pub protocol_swap_fee_percentage: u128,
		#[serde(skip)]
		pub _phantom: PhantomData<T>,
	}

	#[pallet::genesis_build]
	impl<T: Config> BuildGenesisConfig for GenesisConfig<T> {
		fn build(&self) {
			assert!(
				self.protocol_swap_fee_percentage <= MAX_PROTOCOL_SWAP_FEE,
				"protocol swap fee percentage above maximum"
			);
			ProtocolSwapFeePercentage::<T>::put(self.protocol_swap_fee_percentage);
		}
	}

	#[pallet::event]
	#[pallet::generate_deposit(pub(super) fn deposit_event)]
	pub enum Event<T: Config> {
		/// A new pool was created.
		PoolCreated {
			pool_id: PoolId,
			pool_asset: T::AssetId,
			assets: Vec<T::AssetId>,
			account_id: T::AccountId,
		},
		/// The first liquidity was added to a pool.
		PoolInitialized {
			pool_id: PoolId,
			who: T::AccountId,
			shares: Balance,
			amounts_in: Vec<Balance>,
		},
		Joined {
			pool_id: PoolId,
			who: T::AccountId,
			shares: Balance,
			amounts_in: Vec<Balance>,
			protocol_fees: Vec<Balance>,
		},
		Exited {
			pool_id: PoolId,
			who: T::AccountId,
			shares: Balance,
			amounts_out: Vec<Balance>,
			protocol_fees: Vec<Balance>,
		},
		Swapped {
			pool_id: PoolId,
			who: T::AccountId,
			asset_in: T::AssetId,
			asset_out: T::AssetId,
			amount_in: Balance,
			amount_out: Balance,
		},
		AmplificationUpdateStarted {
			pool_id: PoolId,
			start_value: u128,
			end_value: u128,
			start_time: u64,
			end_time: u64,
		},
		AmplificationUpdateStopped {
			pool_id: PoolId,
			current_value: u128,
		},
		SwapFeePercentageChanged {
			pool_id: PoolId,
			swap_fee: u128,
		},
		ProtocolSwapFeePercentageChanged {
			protocol_swap_fee: u128,
		},
		PausedStateChanged {
			pool_id: PoolId,
			paused: bool,
		},
		InvestablePercentSet {
			pool_id: PoolId,
			asset: T::AssetId,
			percent: u128,
		},
		/// Pool capital was handed to the asset manager.
		CapitalIn {
			pool_id: PoolId,
			asset: T::AssetId,
			amount: Balance,
			shares: u128,
		},
		/// Invested capital was returned to the pool.
		CapitalOut {
			pool_id: PoolId,
			asset: T::AssetId,
			amount: Balance,
			shares: u128,
		},
		GainsRealized {
			asset: T::AssetId,
			total_aum: Balance,
		},
	}

	#[pallet::error]
	pub enum Error<T> {
		InvalidPoolAsset,
		ArgumentsMismatch,
		ArgumentsError,
		PoolNotFound,
		NotStablePool,
		InvalidDecimals,
		InvalidWeights,
		MinWeight,
		SwapFeeOutOfBounds,
		ProtocolSwapFeeTooHigh,
		SwapUnderMin,
		SwapOverMax,
		JoinAboveMax,
		ExitBelowMin,
		ZeroBalance,
		ZeroInvariant,
		InvariantDidNotConverge,
		BalanceDidNotConverge,
		MaxInRatio,
		MaxOutRatio,
		MaxInvariantRatio,
		MinInvariantRatio,
		ExponentOutOfBounds,
		Paused,
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
		WorthlessShares,
	}

	#[pallet::call]
	impl<T: Config> Pallet<T> {
		#[pallet::call_index(0)]
		#[pallet::weight(T::WeightInfo::create_pool())]
		#[transactional]
		pub fn create_stable_pool(
			origin: OriginFor<T>,
			pool_asset: T::AssetId,
			assets: Vec<T::AssetId>,
			decimals: Vec<u8>,
			swap_fee: u128,
			amplification: u128,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			ensure!(
				assets.len() <= stable_math::MAX_STABLE_TOKENS,
				Error::<T>::ArgumentsError
			);
			let amplification = AmplificationData::new(amplification, Self::now()).map_err(Self::pool_error)?;
			let kind = PoolKind::Stable {
				amplification,
				last_invariant_amp: amplification.initial_value,
			};
			Self::do_create_pool(pool_asset, assets, decimals, swap_fee, kind)
		}

		#[pallet::call_index(1)]
		#[pallet::weight(T::WeightInfo::create_pool())]
		#[transactional]
		pub fn create_weighted_pool(
			origin: OriginFor<T>,
			pool_asset: T::AssetId,
			assets: Vec<T::AssetId>,
			decimals: Vec<u8>,
			weights: Vec<u128>,
			swap_fee: u128,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			ensure!(weights.len() == assets.len(), Error::<T>::ArgumentsMismatch);
			let mut sum: u128 = 0;
			for weight in weights.iter() {
				ensure!(*weight >= weighted_math::MIN_WEIGHT, Error::<T>::MinWeight);
				sum = sum.checked_add(*weight).ok_or(Error::<T>::InvalidWeights)?;
			}
			ensure!(sum == ONE, Error::<T>::InvalidWeights);
			Self::do_create_pool(pool_asset, assets, decimals, swap_fee, PoolKind::Weighted { weights })
		}

		#[pallet::call_index(2)]
		#[pallet::weight(T::WeightInfo::swap())]
		#[transactional]
		pub fn swap(
			origin: OriginFor<T>,
			pool_id: PoolId,
			index_in: PoolTokenIndex,
			index_out: PoolTokenIndex,
			kind: SwapKind,
			amount: Balance,
			limit: Balance,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::do_swap(&who, pool_id, index_in, index_out, kind, amount, limit)
		}

		#[pallet::call_index(3)]
		#[pallet::weight(T::WeightInfo::join_pool())]
		#[transactional]
		pub fn join_pool(
			origin: OriginFor<T>,
			pool_id: PoolId,
			user_data: Vec<u8>,
			max_amounts_in: Vec<Balance>,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::do_join(&who, pool_id, &user_data, max_amounts_in)
		}

		#[pallet::call_index(4)]
		#[pallet::weight(T::WeightInfo::exit_pool())]
		#[transactional]
		pub fn exit_pool(
			origin: OriginFor<T>,
			pool_id: PoolId,
			user_data: Vec<u8>,
			min_amounts_out: Vec<Balance>,
		) -> DispatchResult {
			let who = ensure_signed(origin)?;
			Self::do_exit(&who, pool_id, &user_data, min_amounts_out)
		}

		#[pallet::call_index(5)]
		#[pallet::weight(T::WeightInfo::update_amplification())]
		#[transactional]
		pub fn start_amplification_update(
			origin: OriginFor<T>,
			pool_id: PoolId,
			end_value: u128,
			end_time: u64,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			let now = Self::now();
			Pools::<T>::try_mutate_exists(pool_id, |maybe_pool_info| -> DispatchResult {
				let pool_info = maybe_pool_info.as_mut().ok_or(Error::<T>::PoolNotFound)?;
				let PoolKind::Stable { amplification, .. } = &mut pool_info.kind else {
					return Err(Error::<T>::NotStablePool.into());
				};
				amplification
					.start_update(end_value, end_time, now)
					.map_err(Self::pool_error)?;
				Self::deposit_event(Event::AmplificationUpdateStarted {
					pool_id,
					start_value: amplification.initial_value,
					end_value: amplification.target_value,
					start_time: now,
					end_time,
				});
				Ok(())
			})
		}

		#[pallet::call_index(6)]
		#[pallet::weight(T::WeightInfo::update_amplification())]
		#[transactional]
		pub fn stop_amplification_update(origin: OriginFor<T>, pool_id: PoolId) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			let now = Self::now();
			Pools::<T>::try_mutate_exists(pool_id, |maybe_pool_info| -> DispatchResult {
				let pool_info = maybe_pool_info.as_mut().ok_or(Error::<T>::PoolNotFound)?;
				let PoolKind::Stable { amplification, .. } = &mut pool_info.kind else {
					return Err(Error::<T>::NotStablePool.into());
				};
				let current_value = amplification.stop_update(now).map_err(Self::pool_error)?;
				Self::deposit_event(Event::AmplificationUpdateStopped { pool_id, current_value });
				Ok(())
			})
		}

		#[pallet::call_index(7)]
		#[pallet::weight(T::WeightInfo::set_parameter())]
		#[transactional]
		pub fn set_swap_fee_percentage(origin: OriginFor<T>, pool_id: PoolId, swap_fee: u128) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			ensure!(
				(MIN_SWAP_FEE..=MAX_SWAP_FEE).contains(&swap_fee),
				Error::<T>::SwapFeeOutOfBounds
			);
			Pools::<T>::try_mutate_exists(pool_id, |maybe_pool_info| -> DispatchResult {
				let pool_info = maybe_pool_info.as_mut().ok_or(Error::<T>::PoolNotFound)?;
				pool_info.swap_fee = swap_fee;
				Self::deposit_event(Event::SwapFeePercentageChanged { pool_id, swap_fee });
				Ok(())
			})
		}

		#[pallet::call_index(8)]
		#[pallet::weight(T::WeightInfo::set_parameter())]
		#[transactional]
		pub fn set_protocol_swap_fee_percentage(origin: OriginFor<T>, protocol_swap_fee: u128) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			ensure!(
				protocol_swap_fee <= MAX_PROTOCOL_SWAP_FEE,
				Error::<T>::ProtocolSwapFeeTooHigh
			);
			ProtocolSwapFeePercentage::<T>::put(protocol_swap_fee);
			Self::deposit_event(Event::ProtocolSwapFeePercentageChanged { protocol_swap_fee });
			Ok(())
		}

		#[pallet::call_index(9)]
		#[pallet::weight(T::WeightInfo::set_parameter())]
		#[transactional]
		pub fn set_paused(origin: OriginFor<T>, pool_id: PoolId, paused: bool) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			Pools::<T>::try_mutate_exists(pool_id, |maybe_pool_info| -> DispatchResult {
				let pool_info = maybe_pool_info.as_mut().ok_or(Error::<T>::PoolNotFound)?;
				pool_info.paused = paused;
				Self::deposit_event(Event::PausedStateChanged { pool_id, paused });
				Ok(())
			})
		}

		#[pallet::call_index(10)]
		#[pallet::weight(T::WeightInfo::set_parameter())]
		#[transactional]
		pub fn set_investable_percent(
			origin: OriginFor<T>,
			pool_id: PoolId,
			asset_index: PoolTokenIndex,
			percent: u128,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			let pool_info = Self::pool(pool_id)?;
			let asset = Self::asset_at(&pool_info, asset_index)?;
			AssetManagers::<T>::try_mutate(asset, |manager| {
				manager.set_investable_percent(pool_id, percent).map_err(Self::pool_error)
			})?;
			Self::deposit_event(Event::InvestablePercentSet { pool_id, asset, percent });
			Ok(())
		}

		#[pallet::call_index(11)]
		#[pallet::weight(T::WeightInfo::capital_in())]
		#[transactional]
		pub fn capital_in(
			origin: OriginFor<T>,
			pool_id: PoolId,
			asset_index: PoolTokenIndex,
			amount: Balance,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			Self::do_capital_in(pool_id, asset_index, amount)
		}

		#[pallet::call_index(12)]
		#[pallet::weight(T::WeightInfo::capital_out())]
		#[transactional]
		pub fn capital_out(
			origin: OriginFor<T>,
			pool_id: PoolId,
			asset_index: PoolTokenIndex,
			shares: u128,
		) -> DispatchResult {
			T::AdminOrigin::ensure_origin(origin)?;
			Self::do_capital_out(pool_id, asset_index, shares)
		}

		#[pallet::call_index(13)]
		#[pallet::weight(T::WeightInfo::realize_gains())]
		#[transactional]
		pub fn realize_gains(origin: OriginFor<T>, asset: T::AssetId) -> DispatchResult {
			ensure_signed(origin)?;
			let total_aum = T::InvestmentStrategy::read_aum(asset);
			AssetManagers::<T>::mutate(asset, |manager| manager.realize_gains(total_aum));
			log::debug!(target: LOG_TARGET, "asset manager for {:?} synced to aum {}", asset, total_aum);
			Self::deposit_event(Event::GainsRealized { asset, total_aum });
			Ok(())
		}
	}

	impl<T: Config> Pallet<T> {
		pub(crate) fn now() -> u64 {
			T::TimeProvider::now().as_secs()
		}

		pub fn pool(pool_id: PoolId) -> Result<PoolInfo<T::AssetId, T::AccountId>, DispatchError> {
			Pools::<T>::get(pool_id).ok_or_else(|| Error::<T>::PoolNotFound.into())
		}

		pub fn pool_count() -> PoolId {
			PoolCount::<T>::get()
		}

		pub fn protocol_swap_fee_percentage() -> u128 {
			ProtocolSwapFeePercentage::<T>::get()
		}

		pub fn asset_manager(asset: T::AssetId) -> AssetManagerInfo {
			AssetManagers::<T>::get(asset)
		}

		/// Account holding the tokens an asset manager took out of pools.
		pub fn manager_account(asset: T::AssetId) -> T::AccountId {
			T::PalletId::get().into_sub_account_truncating((b"manager", asset))
		}

		/// Current amplification of a stable pool, whether it is ramping, and its precision.
		pub fn amplification_parameter(pool_id: PoolId) -> Result<(u128, bool, u128), DispatchError> {
			let pool_info = Self::pool(pool_id)?;
			let PoolKind::Stable { amplification, .. } = pool_info.kind else {
				return Err(Error::<T>::NotStablePool.into());
			};
			let (value, updating) = amplification
				.value_at(Self::now())
				.map_err(|e| Self::pool_error(e.into()))?;
			Ok((value, updating, stable_math::AMP_PRECISION))
		}

		/// Invariant per pool share.
		pub fn rate(pool_id: PoolId) -> Result<U256, DispatchError> {
			let pool_info = Self::pool(pool_id)?;
			let total_supply = T::Assets::total_issuance(pool_info.pool_asset);
			let balances = Self::total_balances(pool_id, &pool_info)?;
			let pool = Self::build_pool(&pool_info)?;
			pool.rate(&balances, U256::from(total_supply)).map_err(Self::pool_error)
		}

		/// Cash held by the pool account plus the pool's managed capital, per asset.
		pub fn pool_balances(pool_id: PoolId) -> Result<Vec<Balance>, DispatchError> {
			let pool_info = Self::pool(pool_id)?;
			Self::total_balances(pool_id, &pool_info)?
				.into_iter()
				.map(Self::to_balance)
				.collect()
		}

		fn total_balances(
			pool_id: PoolId,
			pool_info: &PoolInfo<T::AssetId, T::AccountId>,
		) -> Result<Vec<U256>, DispatchError> {
			let mut balances = Vec::with_capacity(pool_info.assets.len());
			for asset in pool_info.assets.iter() {
				let cash = T::Assets::balance(*asset, &pool_info.account_id);
				let managed = AssetManagers::<T>::get(asset)
					.balance_of(pool_id)
					.map_err(|e| Self::pool_error(e.into()))?;
				let total = cash.checked_add(managed).ok_or(ArithmeticError::Overflow)?;
				balances.push(U256::from(total));
			}
			Ok(balances)
		}

		fn build_pool(pool_info: &PoolInfo<T::AssetId, T::AccountId>) -> Result<Box<dyn BasePool>, DispatchError> {
			let scaling_factors = pool_info.scaling_factors.iter().map(|f| U256::from(*f)).collect();
			let swap_fee = U256::from(pool_info.swap_fee);
			match &pool_info.kind {
				PoolKind::Stable {
					amplification,
					last_invariant_amp,
				} => {
					let (amp, _) = amplification
						.value_at(Self::now())
						.map_err(|e| Self::pool_error(e.into()))?;
					let strategy = StableStrategy {
						amp: U256::from(amp),
						last_invariant_amp: U256::from(*last_invariant_amp),
					};
					Ok(Box::new(Pool::new(
						strategy,
						scaling_factors,
						swap_fee,
						pool_info.last_invariant,
						pool_info.paused,
					)))
				}
				PoolKind::Weighted { weights } => {
					let strategy = WeightedStrategy {
						weights: weights.iter().map(|w| U256::from(*w)).collect(),
					};
					Ok(Box::new(Pool::new(
						strategy,
						scaling_factors,
						swap_fee,
						pool_info.last_invariant,
						pool_info.paused,
					)))
				}
			}
		}

		/// Stores the invariant left by a join or exit, with the amplification it was computed at.
		fn record_invariant(
			pool_info: &mut PoolInfo<T::AssetId, T::AccountId>,
			invariant: U256,
		) -> Result<(), DispatchError> {
			pool_info.last_invariant = invariant;
			if let PoolKind::Stable {
				amplification,
				last_invariant_amp,
			} = &mut pool_info.kind
			{
				let (amp, _) = amplification
					.value_at(Self::now())
					.map_err(|e| Self::pool_error(e.into()))?;
				*last_invariant_amp = amp;
			}
			Ok(())
		}

		fn asset_at(
			pool_info: &PoolInfo<T::AssetId, T::AccountId>,
			index: PoolTokenIndex,
		) -> Result<T::AssetId, DispatchError> {
			pool_info
				.assets
				.get(index as usize)
				.copied()
				.ok_or_else(|| Error::<T>::TokenIndexOutOfBounds.into())
		}

		fn to_balance(value: U256) -> Result<Balance, DispatchError> {
			Balance::try_from(value).map_err(|_| ArithmeticError::Overflow.into())
		}

		fn to_balances(values: Vec<U256>) -> Result<Vec<Balance>, DispatchError> {
			values.into_iter().map(Self::to_balance).collect()
		}

		pub(crate) fn pool_error(e: PoolError) -> DispatchError {
			let error = match e {
				PoolError::Math(MathError::Overflow) => return ArithmeticError::Overflow.into(),
				PoolError::Math(MathError::Underflow) => return ArithmeticError::Underflow.into(),
				PoolError::Math(MathError::DivisionByZero) => return ArithmeticError::DivisionByZero.into(),
				PoolError::Math(MathError::ZeroBalance) => Error::<T>::ZeroBalance,
				PoolError::Math(MathError::ZeroInvariant) => Error::<T>::ZeroInvariant,
				PoolError::Math(MathError::InvariantDidNotConverge) => Error::<T>::InvariantDidNotConverge,
				PoolError::Math(MathError::BalanceDidNotConverge) => Error::<T>::BalanceDidNotConverge,
				PoolError::Math(MathError::MaxInRatio) => Error::<T>::MaxInRatio,
				PoolError::Math(MathError::MaxOutRatio) => Error::<T>::MaxOutRatio,
				PoolError::Math(MathError::MaxInvariantRatio) => Error::<T>::MaxInvariantRatio,
				PoolError::Math(MathError::MinInvariantRatio) => Error::<T>::MinInvariantRatio,
				PoolError::Math(MathError::ExponentOutOfBounds) => Error::<T>::ExponentOutOfBounds,
				PoolError::Paused => Error::<T>::Paused,
				PoolError::Uninitialized => Error::<T>::Uninitialized,
				PoolError::UnhandledJoinKind => Error::<T>::UnhandledJoinKind,
				PoolError::InvalidUserData => Error::<T>::InvalidUserData,
				PoolError::InputLengthMismatch => Error::<T>::InputLengthMismatch,
				PoolError::TokenIndexOutOfBounds => Error::<T>::TokenIndexOutOfBounds,
				PoolError::SameToken => Error::<T>::SameToken,
				PoolError::SharesOutBelowMin => Error::<T>::SharesOutBelowMin,
				PoolError::SharesInAboveMax => Error::<T>::SharesInAboveMax,
				PoolError::MinimumShares => Error::<T>::MinimumShares,
				PoolError::AmpOutOfBounds => Error::<T>::AmpOutOfBounds,
				PoolError::AmpEndTimeTooClose => Error::<T>::AmpEndTimeTooClose,
				PoolError::AmpOngoingUpdate => Error::<T>::AmpOngoingUpdate,
				PoolError::AmpNoOngoingUpdate => Error::<T>::AmpNoOngoingUpdate,
				PoolError::AmpChangeTooLarge => Error::<T>::AmpChangeTooLarge,
				PoolError::InvestablePercentTooHigh => Error::<T>::InvestablePercentTooHigh,
				PoolError::InvestmentExceedsTarget => Error::<T>::InvestmentExceedsTarget,
				PoolError::WithdrawalBelowTarget => Error::<T>::WithdrawalBelowTarget,
				PoolError::InsufficientShares => Error::<T>::InsufficientShares,
				PoolError::WorthlessShares => Error::<T>::WorthlessShares,
			};
			error.into()
		}

		fn do_create_pool(
			pool_asset: T::AssetId,
			assets: Vec<T::AssetId>,
			decimals: Vec<u8>,
			swap_fee: u128,
			kind: PoolKind,
		) -> DispatchResult {
			ensure!(
				T::EnsurePoolAssetId::validate(pool_asset),
				Error::<T>::InvalidPoolAsset
			);
			ensure!(
				assets.len() >= 2 && assets.len() <= T::PoolAssetLimit::get() as usize,
				Error::<T>::ArgumentsError
			);
			ensure!(decimals.len() == assets.len(), Error::<T>::ArgumentsMismatch);
			ensure!(
				(MIN_SWAP_FEE..=MAX_SWAP_FEE).contains(&swap_fee),
				Error::<T>::SwapFeeOutOfBounds
			);
			for (i, asset) in assets.iter().enumerate() {
				ensure!(
					*asset != pool_asset && !assets[..i].contains(asset),
					Error::<T>::ArgumentsError
				);
			}
			let mut scaling_factors = Vec::with_capacity(decimals.len());
			for d in decimals.iter() {
				ensure!(*d <= MAX_TOKEN_DECIMALS, Error::<T>::InvalidDecimals);
				scaling_factors.push(10u128.pow(u32::from(MAX_TOKEN_DECIMALS - *d)));
			}

			let pool_id = PoolCount::<T>::get();
			let account_id: T::AccountId = T::PalletId::get().into_sub_account_truncating(pool_id);
			PoolCount::<T>::put(pool_id.checked_add(1).ok_or(ArithmeticError::Overflow)?);
			Pools::<T>::insert(
				pool_id,
				PoolInfo {
					pool_asset,
					assets: assets.clone(),
					scaling_factors,
					swap_fee,
					last_invariant: U256::zero(),
					kind,
					paused: false,
					account_id: account_id.clone(),
				},
			);

			log::debug!(target: LOG_TARGET, "created pool {} for {:?}", pool_id, assets);
			Self::deposit_event(Event::PoolCreated {
				pool_id,
				pool_asset,
				assets,
				account_id,
			});
			Ok(())
		}

		fn do_swap(
			who: &T::AccountId,
			pool_id: PoolId,
			index_in: PoolTokenIndex,
			index_out: PoolTokenIndex,
			kind: SwapKind,
			amount: Balance,
			limit: Balance,
		) -> DispatchResult {
			ensure!(amount > 0, Error::<T>::ArgumentsError);
			let pool_info = Self::pool(pool_id)?;
			ensure!(
				T::Assets::total_issuance(pool_info.pool_asset) > 0,
				Error::<T>::Uninitialized
			);
			let asset_in = Self::asset_at(&pool_info, index_in)?;
			let asset_out = Self::asset_at(&pool_info, index_out)?;

			let balances = Self::total_balances(pool_id, &pool_info)?;
			let pool = Self::build_pool(&pool_info)?;
			let request = SwapRequest {
				kind,
				amount: U256::from(amount),
			};
			let calculated = pool
				.on_swap(request, &balances, index_in as usize, index_out as usize)
				.map_err(Self::pool_error)?;
			let calculated = Self::to_balance(calculated)?;

			let (amount_in, amount_out) = match kind {
				SwapKind::GivenIn => {
					ensure!(calculated >= limit, Error::<T>::SwapUnderMin);
					(amount, calculated)
				}
				SwapKind::GivenOut => {
					ensure!(calculated <= limit, Error::<T>::SwapOverMax);
					(calculated, amount)
				}
			};

			T::Assets::transfer(asset_in, who, &pool_info.account_id, amount_in)?;
			T::Assets::transfer(asset_out, &pool_info.account_id, who, amount_out)?;

			log::trace!(
				target: LOG_TARGET,
				"pool {} swapped {} of {:?} for {} of {:?}",
				pool_id,
				amount_in,
				asset_in,
				amount_out,
				asset_out
			);
			Self::deposit_event(Event::Swapped {
				pool_id,
				who: who.clone(),
				asset_in,
				asset_out,
				amount_in,
				amount_out,
			});
			Ok(())
		}

		fn collect_protocol_fees(
			pool_info: &PoolInfo<T::AssetId, T::AccountId>,
			protocol_fees: &[Balance],
		) -> DispatchResult {
			let collector = T::ProtocolFeeCollector::get();
			for (asset, fee) in pool_info.assets.iter().zip(protocol_fees) {
				if *fee > 0 {
					T::Assets::transfer(*asset, &pool_info.account_id, &collector, *fee)?;
				}
			}
			Ok(())
		}

		fn do_join(
			who: &T::AccountId,
			pool_id: PoolId,
			user_data: &[u8],
			max_amounts_in: Vec<Balance>,
		) -> DispatchResult {
			let mut pool_info = Self::pool(pool_id)?;
			ensure!(
				max_amounts_in.len() == pool_info.assets.len(),
				Error::<T>::ArgumentsMismatch
			);
			let total_supply = T::Assets::total_issuance(pool_info.pool_asset);
			let mut pool = Self::build_pool(&pool_info)?;

			if total_supply == 0 {
				let (shares, amounts_in) = pool.on_initialize_pool(user_data).map_err(Self::pool_error)?;
				let shares = Self::to_balance(shares)?;
				let amounts_in = Self::to_balances(amounts_in)?;
				for (amount, max) in amounts_in.iter().zip(&max_amounts_in) {
					ensure!(amount <= max, Error::<T>::JoinAboveMax);
				}

				Self::record_invariant(&mut pool_info, pool.last_invariant())?;
				Pools::<T>::insert(pool_id, &pool_info);

				for (asset, amount) in pool_info.assets.iter().zip(&amounts_in) {
					T::Assets::transfer(*asset, who, &pool_info.account_id, *amount)?;
				}
				let minimum = pool::MINIMUM_SHARES;
				T::Assets::mint(pool_info.pool_asset, &pool_info.account_id, minimum)?;
				T::Assets::mint(
					pool_info.pool_asset,
					who,
					shares.checked_sub(minimum).ok_or(ArithmeticError::Underflow)?,
				)?;

				log::debug!(target: LOG_TARGET, "pool {} initialized with {} shares", pool_id, shares);
				Self::deposit_event(Event::PoolInitialized {
					pool_id,
					who: who.clone(),
					shares,
					amounts_in,
				});
				return Ok(());
			}

			let balances = Self::total_balances(pool_id, &pool_info)?;
			let protocol_swap_fee = U256::from(ProtocolSwapFeePercentage::<T>::get());
			let result = pool
				.on_join_pool(&balances, U256::from(total_supply), protocol_swap_fee, user_data)
				.map_err(Self::pool_error)?;
			let shares = Self::to_balance(result.shares)?;
			let amounts_in = Self::to_balances(result.amounts)?;
			let protocol_fees = Self::to_balances(result.protocol_fees)?;
			for (amount, max) in amounts_in.iter().zip(&max_amounts_in) {
				ensure!(amount <= max, Error::<T>::JoinAboveMax);
			}

			Self::record_invariant(&mut pool_info, pool.last_invariant())?;
			Pools::<T>::insert(pool_id, &pool_info);

			for (asset, amount) in pool_info.assets.iter().zip(&amounts_in) {
				if *amount > 0 {
					T::Assets::transfer(*asset, who, &pool_info.account_id, *amount)?;
				}
			}
			Self::collect_protocol_fees(&pool_info, &protocol_fees)?;
			T::Assets::mint(pool_info.pool_asset, who, shares)?;

			log::debug!(
				target: LOG_TARGET,
				"pool {} joined for {} shares, protocol fees {:?}",
				pool_id,
				shares,
				protocol_fees
			);
			Self::deposit_event(Event::Joined {
				pool_id,
				who: who.clone(),
				shares,
				amounts_in,
				protocol_fees,
			});
			Ok(())
		}

		fn do_exit(
			who: &T::AccountId,
			pool_id: PoolId,
			user_data: &[u8],
			min_amounts_out: Vec<Balance>,
		) -> DispatchResult {
			let mut pool_info = Self::pool(pool_id)?;
			ensure!(
				min_amounts_out.len() == pool_info.assets.len(),
				Error::<T>::ArgumentsMismatch
			);
			let total_supply = T::Assets::total_issuance(pool_info.pool_asset);
			ensure!(total_supply > 0, Error::<T>::Uninitialized);

			let balances = Self::total_balances(pool_id, &pool_info)?;
			let protocol_swap_fee = U256::from(ProtocolSwapFeePercentage::<T>::get());
			let mut pool = Self::build_pool(&pool_info)?;
			let result = pool
				.on_exit_pool(&balances, U256::from(total_supply), protocol_swap_fee, user_data)
				.map_err(Self::pool_error)?;
			let shares = Self::to_balance(result.shares)?;
			let amounts_out = Self::to_balances(result.amounts)?;
			let protocol_fees = Self::to_balances(result.protocol_fees)?;
			for (amount, min) in amounts_out.iter().zip(&min_amounts_out) {
				ensure!(amount >= min, Error::<T>::ExitBelowMin);
			}

			Self::record_invariant(&mut pool_info, pool.last_invariant())?;
			Pools::<T>::insert(pool_id, &pool_info);

			T::Assets::burn(pool_info.pool_asset, who, shares)?;
			for (asset, amount) in pool_info.assets.iter().zip(&amounts_out) {
				if *amount > 0 {
					T::Assets::transfer(*asset, &pool_info.account_id, who, *amount)?;
				}
			}
			Self::collect_protocol_fees(&pool_info, &protocol_fees)?;

			log::debug!(target: LOG_TARGET, "pool {} exited for {} shares", pool_id, shares);
			Self::deposit_event(Event::Exited {
				pool_id,
				who: who.clone(),
				shares,
				amounts_out,
				protocol_fees,
			});
			Ok(())
		}

		fn do_capital_in(pool_id: PoolId, asset_index: PoolTokenIndex, amount: Balance) -> DispatchResult {
			ensure!(amount > 0, Error::<T>::ArgumentsError);
			let pool_info = Self::pool(pool_id)?;
			let asset = Self::asset_at(&pool_info, asset_index)?;
			let cash = T::Assets::balance(asset, &pool_info.account_id);

			let mut manager = AssetManagers::<T>::get(asset);
			let shares = manager
				.capital_in(pool_id, amount, cash)
				.map_err(Self::pool_error)?;
			AssetManagers::<T>::insert(asset, &manager);

			T::Assets::transfer(asset, &pool_info.account_id, &Self::manager_account(asset), amount)?;
			let total_aum = T::InvestmentStrategy::invest(asset, amount)?;
			manager.realize_gains(total_aum);
			AssetManagers::<T>::insert(asset, &manager);

			log::debug!(
				target: LOG_TARGET,
				"pool {} invested {} of {:?}, aum {}",
				pool_id,
				amount,
				asset,
				total_aum
			);
			Self::deposit_event(Event::CapitalIn {
				pool_id,
				asset,
				amount,
				shares,
			});
			Ok(())
		}

		fn do_capital_out(pool_id: PoolId, asset_index: PoolTokenIndex, shares: u128) -> DispatchResult {
			ensure!(shares > 0, Error::<T>::ArgumentsError);
			let pool_info = Self::pool(pool_id)?;
			let asset = Self::asset_at(&pool_info, asset_index)?;
			let cash = T::Assets::balance(asset, &pool_info.account_id);

			let mut manager = AssetManagers::<T>::get(asset);
			let amount = manager
				.capital_out(pool_id, shares, cash)
				.map_err(Self::pool_error)?;
			AssetManagers::<T>::insert(asset, &manager);

			let withdrawn = T::InvestmentStrategy::divest(asset, amount)?;
			T::Assets::transfer(asset, &Self::manager_account(asset), &pool_info.account_id, withdrawn)?;

			log::debug!(
				target: LOG_TARGET,
				"pool {} divested {} of {:?}",
				pool_id,
				withdrawn,
				asset
			);
			Self::deposit_event(Event::CapitalOut {
				pool_id,
				asset,
				amount: withdrawn,
				shares,
			});
			Ok(())
		}
	}
}
