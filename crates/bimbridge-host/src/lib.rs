//! Host document abstraction for bimbridge
//!
//! This crate defines the capability surface through which the execution
//! engine touches a live design document:
//! - `HostDocument`: the async trait every host adapter implements
//!   (queries, parameter writes, instance creation, transactions)
//! - element/parameter model types, including the tagged `ParamValue`
//!   with checked JSON conversion
//! - `MemoryDocument`: an in-memory fake satisfying the full trait
//!   contract, used by tests and the development daemon
//!
//! All mutation goes through transactions; the fake enforces this the same
//! way a real host adapter would, so transactional bugs surface in tests.

pub mod capability;
pub mod error;
pub mod fakes;
pub mod model;

pub use capability::HostDocument;
pub use error::{HostError, HostResult};
pub use fakes::MemoryDocument;
pub use model::{
    ElementId, ElementRef, InstanceSpec, ParamValue, Parameter, StateDigest,
};
