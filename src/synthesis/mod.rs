//! Speech synthesis: providers and the fallback gateway.
//!
//! * [`SpeechProvider`] — async trait implemented by every backend.
//! * [`CloudSpeechProvider`] — hosted voice-cloning HTTP service.
//! * [`CommandSpeechProvider`] — local TTS engine run as a subprocess.
//! * [`SynthesisGateway`] — ordered fallback, per-kind concurrency limits,
//!   release after every local call.

pub mod cloud;
pub mod gateway;
pub mod local;
#[cfg(test)]
pub mod mock;
pub mod provider;

pub use cloud::CloudSpeechProvider;
pub use gateway::{ProviderFailure, SynthesisError, SynthesisGateway};
pub use local::CommandSpeechProvider;
pub use provider::{ProviderError, ProviderKind, SpeechProvider, SynthesisRequest};
