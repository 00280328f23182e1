//! Startup coordinator for the POI registry application container.
//!
//! Sequences the container's start: wait until the database accepts TCP
//! connections, apply schema migrations to head, then run the web server in
//! the foreground.

pub mod command;
pub mod coordinator;
pub mod endpoint;
pub mod error;
pub mod launch;
pub mod migrate;
pub mod phase;
pub mod settings;
pub mod wait;

pub use coordinator::Coordinator;
pub use endpoint::DbEndpoint;
pub use error::BootstrapError;
pub use phase::Phase;
pub use settings::{BootstrapSettings, Settings, SettingsError};
