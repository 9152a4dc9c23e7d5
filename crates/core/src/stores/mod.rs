pub mod blob;
pub mod status;

pub use blob::FsBlobStore;
pub use status::FileStatusStore;
