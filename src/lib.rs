// Core modules for the cinder key-value server
pub mod error; // SnapshotError + CommandError
pub mod config; // Config built once at startup
pub mod storage; // Store + Entry with passive expiry
pub mod rdb; // snapshot decoder
pub mod protocol; // RESP line framing + encoders + Cmd enum
pub mod dispatch; // Dispatcher::handle / exec (command routing)
pub mod net; // bind_listener + serve (accept loop and reactors)
pub mod replica; // REPLCONF ACK client

// Re-export the commonly used items for easier access
pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::{CommandError, SnapshotError};
pub use protocol::{Cmd, Frame};
pub use storage::{Entry, Store, ValueType};
