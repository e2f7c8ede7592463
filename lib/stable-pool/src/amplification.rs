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


use crate::fixed_point::MathError;
use crate::pool::PoolError;
use crate::stable_math::{AMP_PRECISION, MAX_AMP, MIN_AMP};
use frame_support::pallet_prelude::*;
#[cfg(feature = "std")]
use serde::{Deserialize, Serialize};

/// A ramp can't be shorter than a day.
pub const MIN_UPDATE_TIME: u64 = 86_400;
/// Largest factor the amplification may grow or shrink by in a single ramp.
pub const MAX_AMP_CHANGE: u128 = 10;

/// Linear amplification ramp between two checkpoints.
///
/// Values include `AMP_PRECISION`, times are unix seconds. The four fields are only ever
/// written together.
#[derive(Encode, Decode, Clone, Copy, Default, PartialEq, Eq, Debug, TypeInfo, MaxEncodedLen)]
#[cfg_attr(feature = "std", derive(Serialize, Deserialize))]
pub struct AmplificationData {
	pub initial_value: u128,
	pub target_value: u128,
	pub initial_time: u64,
	pub target_time: u64,
}

impl AmplificationData {
	pub fn new(raw_value: u128, now: u64) -> Result<Self, PoolError> {
		ensure!(
			(MIN_AMP..=MAX_AMP).contains(&raw_value),
			PoolError::AmpOutOfBounds
		);
		let value = raw_value * AMP_PRECISION;
		Ok(Self {
			initial_value: value,
			target_value: value,
			initial_time: now,
			target_time: now,
		})
	}

	/// Current amplification and whether a ramp is in progress.
	pub fn value_at(&self, now: u64) -> Result<(u128, bool), MathError> {
		if now >= self.target_time {
			return Ok((self.target_value, false));
		}

		let elapsed = u128::from(now.checked_sub(self.initial_time).ok_or(MathError::Underflow)?);
		let duration = u128::from(self.target_time - self.initial_time);
		let value = if self.target_value > self.initial_value {
			let step = (self.target_value - self.initial_value)
				.checked_mul(elapsed)
				.ok_or(MathError::Overflow)?
				/ duration;
			self.initial_value + step
		} else {
			let step = (self.initial_value - self.target_value)
				.checked_mul(elapsed)
				.ok_or(MathError::Overflow)?
				/ duration;
			self.initial_value - step
		};
		Ok((value, true))
	}

	pub fn start_update(&mut self, raw_target: u128, target_time: u64, now: u64) -> Result<(), PoolError> {
		ensure!(
			(MIN_AMP..=MAX_AMP).contains(&raw_target),
			PoolError::AmpOutOfBounds
		);
		ensure!(
			target_time >= now.saturating_add(MIN_UPDATE_TIME),
			PoolError::AmpEndTimeTooClose
		);

		let (current, updating) = self.value_at(now)?;
		ensure!(!updating, PoolError::AmpOngoingUpdate);

		let target = raw_target * AMP_PRECISION;
		let within_bounds = if target > current {
			target <= current.saturating_mul(MAX_AMP_CHANGE)
		} else {
			target.saturating_mul(MAX_AMP_CHANGE) >= current
		};
		ensure!(within_bounds, PoolError::AmpChangeTooLarge);

		*self = Self {
			initial_value: current,
			target_value: target,
			initial_time: now,
			target_time,
		};
		Ok(())
	}

	/// Freezes the ramp at its current value.
	pub fn stop_update(&mut self, now: u64) -> Result<u128, PoolError> {
		let (current, updating) = self.value_at(now)?;
		ensure!(updating, PoolError::AmpNoOngoingUpdate);

		*self = Self {
			initial_value: current,
			target_value: current,
			initial_time: now,
			target_time: now,
		};
		Ok(current)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const T0: u64 = 1_000_000;

	#[test]
	fn ramp_is_linear() {
		let mut amp = AmplificationData::new(100, T0).unwrap();
		amp.start_update(200, T0 + 2 * MIN_UPDATE_TIME, T0).unwrap();

		assert_eq!(amp.value_at(T0).unwrap(), (100 * AMP_PRECISION, true));
		assert_eq!(amp.value_at(T0 + MIN_UPDATE_TIME).unwrap(), (150 * AMP_PRECISION, true));
		assert_eq!(amp.value_at(T0 + 2 * MIN_UPDATE_TIME).unwrap(), (200 * AMP_PRECISION, false));
		assert_eq!(amp.value_at(T0 + 30 * MIN_UPDATE_TIME).unwrap(), (200 * AMP_PRECISION, false));
	}

	#[test]
	fn ramp_down_is_linear() {
		let mut amp = AmplificationData::new(1000, T0).unwrap();
		amp.start_update(100, T0 + 4 * MIN_UPDATE_TIME, T0).unwrap();
		assert_eq!(amp.value_at(T0 + MIN_UPDATE_TIME).unwrap(), (775 * AMP_PRECISION, true));
	}

	#[test]
	fn ramp_guards() {
		let mut amp = AmplificationData::new(100, T0).unwrap();
		assert_eq!(
			amp.start_update(200, T0 + MIN_UPDATE_TIME - 1, T0),
			Err(PoolError::AmpEndTimeTooClose)
		);
		assert_eq!(
			amp.start_update(1001, T0 + MIN_UPDATE_TIME, T0),
			Err(PoolError::AmpChangeTooLarge)
		);
		assert_eq!(
			amp.start_update(9, T0 + MIN_UPDATE_TIME, T0),
			Err(PoolError::AmpChangeTooLarge)
		);
		assert_eq!(
			amp.start_update(MAX_AMP + 1, T0 + MIN_UPDATE_TIME, T0),
			Err(PoolError::AmpOutOfBounds)
		);
		assert_eq!(
			amp.start_update(0, T0 + MIN_UPDATE_TIME, T0),
			Err(PoolError::AmpOutOfBounds)
		);

		amp.start_update(1000, T0 + MIN_UPDATE_TIME, T0).unwrap();
		assert_eq!(
			amp.start_update(500, T0 + 3 * MIN_UPDATE_TIME, T0 + 10),
			Err(PoolError::AmpOngoingUpdate)
		);
	}

	#[test]
	fn stop_freezes_current_value() {
		let mut amp = AmplificationData::new(100, T0).unwrap();
		assert_eq!(amp.stop_update(T0), Err(PoolError::AmpNoOngoingUpdate));

		amp.start_update(200, T0 + 2 * MIN_UPDATE_TIME, T0).unwrap();
		assert_eq!(amp.stop_update(T0 + MIN_UPDATE_TIME), Ok(150 * AMP_PRECISION));
		assert_eq!(amp.value_at(T0 + 5 * MIN_UPDATE_TIME).unwrap(), (150 * AMP_PRECISION, false));

		// a new ramp starts from the frozen value
		amp.start_update(1500, T0 + 3 * MIN_UPDATE_TIME, T0 + MIN_UPDATE_TIME).unwrap();
		assert_eq!(amp.value_at(T0 + MIN_UPDATE_TIME).unwrap().0, 150 * AMP_PRECISION);
	}

	#[test]
	fn initial_value_is_bounded() {
		assert_eq!(AmplificationData::new(0, T0), Err(PoolError::AmpOutOfBounds));
		assert_eq!(AmplificationData::new(MAX_AMP + 1, T0), Err(PoolError::AmpOutOfBounds));
	}
}
