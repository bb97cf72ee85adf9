//! Transport implementations

pub mod console;
#[cfg(feature = "file")]
pub mod file;
#[cfg(feature = "http")]
pub mod http;
pub mod memory;
pub mod multi;
pub mod null;
pub mod queued;
pub mod stream;

pub use console::ConsoleTransport;
#[cfg(feature = "file")]
pub use file::{FileTransport, RotationPolicy};
#[cfg(feature = "http")]
pub use http::{HttpTransport, HttpTransportBuilder};
pub use memory::MemoryTransport;
pub use multi::MultiTransport;
pub use null::NullTransport;
pub use queued::QueuedTransport;
pub use stream::{SharedBuffer, StreamTransport};
