//! Contracts of the host collaborators.
//!
//! The build core never talks to the host directly. It goes through these
//! traits so that tests, the CLI, and embedders can each supply their own
//! storage, network, and settings implementations.

mod network;
mod settings;
mod storage;

pub use network::{HttpMethod, HttpRequest, HttpResponse, NetworkClient};
pub use settings::SettingsStore;
pub use storage::{HostStorage, StorageEntry};
