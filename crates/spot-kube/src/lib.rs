//! Kubernetes backends for the spot rescheduler.
//!
//! This crate connects the control loop in `spot-core` to a real cluster:
//!
//! | Type | Role |
//! |------|------|
//! | [`KubeClusterReader`] | lists ready nodes, active pods, disruption budgets and unschedulable pods |
//! | [`KubeDrainExecutor`] | evicts pods through the eviction API and waits for them to terminate |
//! | [`EventRecorder`] | publishes `rescheduler` events on drained nodes and evicted pods |
//!
//! API objects are converted into the domain model by [`convert`]; resource
//! quantities are parsed exactly by [`quantity`].
//!
//! ```rust,no_run
//! use spot_core::fake::NoOpMetricsSink;
//! use spot_core::{Rescheduler, ReschedulerConfig};
//! use spot_kube::{ClientOptions, KubeClusterReader, KubeDrainExecutor, connect};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = connect(&ClientOptions::in_cluster()).await?;
//! let mut rescheduler = Rescheduler::new(
//!     ReschedulerConfig::default(),
//!     KubeClusterReader::new(client.clone()),
//!     KubeDrainExecutor::new(client),
//!     NoOpMetricsSink,
//! );
//! let outcome = rescheduler.run_once().await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod client;
pub mod convert;
pub mod drain;
pub mod error;
pub mod events;
pub mod quantity;
pub mod reader;

#[cfg(test)]
mod testing;

pub use client::{ClientOptions, ContentType, connect, load_config};
pub use drain::KubeDrainExecutor;
pub use error::{KubeError, Result};
pub use events::{EventRecorder, EventType};
pub use reader::KubeClusterReader;
