pub mod archive;
pub mod transfer;
pub mod workload;
