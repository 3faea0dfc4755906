// Copyright (c) The rbxjest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end runs against on-disk fixture projects, with the runtime replaced by a fake
//! execution backend.

mod basic;
mod fixtures;
mod reporting;
