pub mod archive_store;
pub mod engine;
pub mod lifecycle;
pub mod progress;
pub mod zipper;
