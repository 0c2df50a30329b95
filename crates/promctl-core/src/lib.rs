pub mod config;
pub mod options;
pub mod peer_data;
pub mod registry;
pub mod timespec;
pub mod types;

pub use config::DaemonConfig;
pub use options::{LogLevel, OperatorOptions, OptionsError, RawOptions};
pub use registry::{PeerRegistry, RegistrySnapshot};
pub use timespec::{TimeSpec, TimeSpecError, TimeUnit};
pub use types::*;
