// SPDX-License-Identifier: MPL-2.0

pub mod client_session;

pub use client_session::SessionState;
