//! ElaboraCRM: lifecycle service for academic drafting work orders.
//!
//! A work order is created by a responsible, accepted with a signature by a
//! drafter, delivered, optionally sent back for corrections, and completed or
//! cancelled. [`lifecycle::LifecycleEngine`] owns those transitions and
//! persists each one as a single atomic change set through a
//! [`db::Gateway`].

pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod routes;
pub mod state;
