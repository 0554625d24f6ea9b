// SPDX-License-Identifier: MPL-2.0

//! Keep-alive monitor
//!
//! `Idle -> WaitingInterval -> PingReqInflight -> WaitingInterval ...`
//!
//! The monitor owns no timer. The session loop sleeps until
//! [`PingMonitor::next_deadline`] and then calls [`PingMonitor::poll`].

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingState {
    Idle,
    WaitingInterval { deadline: Instant },
    PingReqInflight { timeout_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingAction {
    Nothing,
    SendPingReq,
    ResponseTimeout,
}

#[derive(Debug)]
pub struct PingMonitor {
    state: PingState,
    keep_alive: Duration,
    timeout_multiplier: u32,
}

impl PingMonitor {
    pub fn new(timeout_multiplier: u32) -> Self {
        Self {
            state: PingState::Idle,
            keep_alive: Duration::ZERO,
            timeout_multiplier: timeout_multiplier.max(1),
        }
    }

    pub fn state(&self) -> PingState {
        self.state
    }

    /// Arms the interval for a new connection with the keep-alive its CONNACK
    /// settled on, dropping any PINGREQ still outstanding. A zero keep-alive
    /// disables pinging.
    pub fn start(&mut self, keep_alive: Duration, now: Instant) {
        self.keep_alive = keep_alive;
        self.arm(now);
    }

    pub fn stop(&mut self) {
        self.state = PingState::Idle;
    }

    /// Any control packet sent resets the interval.
    pub fn on_outbound(&mut self, now: Instant) {
        if matches!(self.state, PingState::WaitingInterval { .. }) {
            self.arm(now);
        }
    }

    pub fn on_pingresp(&mut self, now: Instant) {
        if matches!(self.state, PingState::PingReqInflight { .. }) {
            self.arm(now);
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            PingState::Idle => None,
            PingState::WaitingInterval { deadline } => Some(deadline),
            PingState::PingReqInflight { timeout_at } => Some(timeout_at),
        }
    }

    pub fn poll(&mut self, now: Instant) -> PingAction {
        match self.state {
            PingState::WaitingInterval { deadline } if now >= deadline => {
                self.state = PingState::PingReqInflight {
                    timeout_at: now + self.keep_alive * self.timeout_multiplier,
                };
                PingAction::SendPingReq
            }
            PingState::PingReqInflight { timeout_at } if now >= timeout_at => {
                self.state = PingState::Idle;
                PingAction::ResponseTimeout
            }
            _ => PingAction::Nothing,
        }
    }

    fn arm(&mut self, now: Instant) {
        self.state = if self.keep_alive.is_zero() {
            PingState::Idle
        } else {
            PingState::WaitingInterval {
                deadline: now + self.keep_alive,
            }
        };
    }
}
