//! gRPC protocol definitions for nfd
//!
//! Defines:
//! - `Labeler` - service the worker reports node labels to
//! - `SetLabelsRequest` / `SetLabelsReply` messages
//!
//! Generated from `proto/labeler.proto`.

pub mod v1alpha1 {
    tonic::include_proto!("v1alpha1");
}

pub use v1alpha1::labeler_client::LabelerClient;
pub use v1alpha1::labeler_server::{Labeler, LabelerServer};
pub use v1alpha1::*;
