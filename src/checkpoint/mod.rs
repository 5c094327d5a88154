mod io;
mod manager;
mod metadata;

pub use io::{read_json, write_json_atomic};
pub use manager::{CheckpointManager, CheckpointManagerConfig};
pub use metadata::{AgentMetadata, AgentSnapshot, SNAPSHOT_VERSION};
