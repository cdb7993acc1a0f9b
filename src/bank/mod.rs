//! Event Bank Module
//!
//! A bank owns a disjoint share of the events. Client sessions place each
//! new message on exactly one bank; from then on that bank groups it with
//! similar messages and folds similar events together in the background.
//!
//! ## Core Mechanisms
//! - **Insertion**: a new message joins the existing event it overlaps best, provided the overlap clears the adaptive merge level; otherwise it founds a new event.
//! - **Merge Pass**: periodically every mergeable event is folded into its best partner, strained events shed their dissenting messages first.
//! - **Session**: the bank answers client RPCs only while it holds a valid ring position from the manager.

pub mod handlers;
pub mod manager;
pub mod protocol;
pub mod service;
