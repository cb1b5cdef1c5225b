//! Signal distribution: fan-out of admin signals, broadcasts and channel
//! posts to ACTIVE users with per-recipient delivery records.

pub mod distributor;

pub use distributor::{render, DistributionReport, SignalDistributor};
