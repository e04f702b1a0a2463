//! State-machine orchestration of a cart-side picking task on a mobile manipulator.
//!
//! The [`task::TaskGraph`] drives navigation, the cart approach, marker
//! detection, a lateral correction and arm placement through the generic
//! [`state_machine::StateMachine`]. Hardware is reached only through the
//! traits in [`hardware`]; [`sim::SimRobot`] implements all of them in process.

#![allow(async_fn_in_trait)]

pub mod config;
pub mod detection;
pub mod error;
pub mod geometry;
pub mod hardware;
pub mod sim;
pub mod state_machine;
pub mod task;
pub mod ui;
