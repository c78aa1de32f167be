//! Bundled implementations of the [`MediaProvider`](crate::provider::MediaProvider) trait.

pub mod ncm;
