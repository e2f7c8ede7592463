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


//! Join and exit payloads.
//!
//! Amounts are in token units before scaling, share amounts in pool-share units.

use crate::pool::PoolError;
use frame_support::pallet_prelude::*;
use parity_scale_codec::DecodeAll;
use sp_std::prelude::*;

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, TypeInfo)]
pub enum JoinKind {
	#[codec(index = 0)]
	Init { amounts_in: Vec<u128> },
	#[codec(index = 1)]
	ExactTokensInForSharesOut { amounts_in: Vec<u128>, min_shares_out: u128 },
	#[codec(index = 2)]
	TokenInForExactSharesOut { shares_out: u128, token_index: u32 },
}

#[derive(Encode, Decode, Clone, PartialEq, Eq, Debug, TypeInfo)]
pub enum ExitKind {
	#[codec(index = 0)]
	ExactSharesInForOneTokenOut { shares_in: u128, token_index: u32 },
	#[codec(index = 1)]
	ExactSharesInForAllTokensOut { shares_in: u128 },
	#[codec(index = 2)]
	SharesInForExactTokensOut { amounts_out: Vec<u128>, max_shares_in: u128 },
}

impl JoinKind {
	/// Decodes the whole payload. Unknown kinds and trailing bytes are rejected.
	pub fn from_user_data(mut data: &[u8]) -> Result<Self, PoolError> {
		Self::decode_all(&mut data).map_err(|_| PoolError::InvalidUserData)
	}
}

impl ExitKind {
	pub fn from_user_data(mut data: &[u8]) -> Result<Self, PoolError> {
		Self::decode_all(&mut data).map_err(|_| PoolError::InvalidUserData)
	}
}
