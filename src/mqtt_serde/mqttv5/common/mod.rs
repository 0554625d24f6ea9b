// SPDX-License-Identifier: MPL-2.0

pub mod properties;
pub mod reason_code;
