pub mod env_state;
pub mod file;
pub mod state_manager;

pub use env_state::{AadState, AuthConfig, EnvConfig, EnvScope};
pub use file::FileStateStore;
pub use state_manager::{StateManager, StatePath, StateStore, StorageError};
