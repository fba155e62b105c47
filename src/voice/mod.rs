//! Voice assignment: splitting text into speakable segments and tagging each
//! with a voice identity.
//!
//! Pure and infallible.  The only inputs are the text, the segmentation
//! settings, the reference-voice table and the user override table.

pub mod assigner;
pub mod attribution;
pub mod gender;
pub mod overrides;
pub mod registry;
pub mod segment;
pub mod sentence;

pub use assigner::VoiceAssigner;
pub use overrides::VoiceOverrides;
pub use segment::{SegmentManifest, TextSegment, Tone, VoiceCategory, VoiceIdentity};
