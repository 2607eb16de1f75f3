//! Common types for the Android SDK operator: CRDs, errors, and utilities

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod events;
pub mod fingerprint;

pub use error::Error;
pub use events::{EventPublisher, KubeEventPublisher, NoopEventPublisher};
pub use fingerprint::Fingerprint;

/// Field manager / reporting component name used for all writes
pub const FIELD_MANAGER: &str = "android-sdk-operator";

/// Label identifying resources created by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
