pub mod batch;
pub mod convert;
pub mod downloader;
pub mod hub;
pub mod registry;
pub mod spec;
pub mod verify;

pub use batch::run_batch;
pub use downloader::{ArtifactFetcher, FetchFailure, FetchOptions, FetchedBundle};
pub use hub::{HfHubClient, RegistryClient};
pub use registry::{BundleLedger, BundleRecord};
pub use spec::{ArtifactSpec, Manifest};
