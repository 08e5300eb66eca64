pub mod partition;
pub mod persistence;
pub mod registry;
pub mod worker;

pub use partition::EntityPartition;
pub use persistence::PartitionData;
pub use registry::PartitionRegistry;
pub use worker::{AutosaveStats, FlushReport};
