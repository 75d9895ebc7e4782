//! Product registry lookups.
//!
//! # Responsibilities
//! - Normalize and validate registration numbers before any network call
//! - Query the paid accelerator first, the public registry on a clean negative
//! - Reconcile both schemas into one canonical [`ProviderResult`]
//! - Cache answers by outcome and run batched lookups
//!
//! # Design Decisions
//! - Providers are a closed set behind the [`RegistryProvider`] trait
//! - A provider reports "no data" as a value, never as an error

pub mod orchestrator;
pub mod providers;
pub mod types;

pub use orchestrator::RegistryLookup;
pub use providers::{AcceleratorProvider, PublicRegistryProvider, RegistryProvider};
pub use types::{
    ProviderAnswer, ProviderKind, ProviderResult, RegistryNumber, RegistryNumberError, RegistryRecord,
    Situation,
};
