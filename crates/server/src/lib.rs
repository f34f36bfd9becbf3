//! Server-side Routine Binding and Session Coordinator for dllbridge
//! (spec.md §2, §4.6-§4.7): resolve native libraries and symbols, marshal
//! arguments down to raw C-ABI bytes, invoke through `libffi`, and marshal
//! the result back.

mod abi;
mod binding;
mod config;
mod coordinator;
mod error;
mod invoke;
mod marshal;
mod native;

pub use config::{BridgeConfig, ConfigError};
pub use coordinator::Coordinator;
pub use error::ServerError;
pub use native::{LoadedLibrary, NativeLibrary};

/// A `FakeLibrary` test double for driving the marshalling pipeline against
/// plain `extern "C" fn`s, without needing a real `dlopen`. Gated behind the
/// `test-support` feature so `dllbridge-server`'s own integration tests
/// (`tests/scenarios.rs`) can use it without shipping it in release builds.
#[cfg(feature = "test-support")]
pub use native::test_support;
