// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! The Fawkes job scheduler: persistent store, allocation strategies, and
//! the controller's three control loops (allocator, health monitor,
//! deadline enforcer).

mod allocator;
mod deadline;
mod dispatch;
mod error;
mod health;
mod store;
mod strategy;

pub use allocator::{run_allocator, Allocator, AllocatorConfig};
pub use deadline::{run_deadline_cycle, run_deadline_enforcer, DeadlineConfig};
pub use dispatch::{AcceptOutcome, DispatchError, JobDispatcher};
pub use error::SchedulerError;
pub use health::{run_health_cycle, run_health_monitor, HealthConfig};
pub use store::{CrashOutcome, HeartbeatAck, SchedulerStore, DEFAULT_HEARTBEAT_TIMEOUT_MS};
pub use strategy::{AllocationStrategy, Candidate};

#[cfg(any(test, feature = "test-support"))]
pub use dispatch::FakeDispatcher;
