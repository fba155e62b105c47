//! Narrator: turns a text document into a multi-voice audiobook.
//!
//! | Module | Role |
//! |--------|------|
//! | [`text`] | document extraction and cleaning |
//! | [`voice`] | dialogue attribution and voice assignment |
//! | [`advisor`] | optional language-model paragraph refinement |
//! | [`synthesis`] | speech providers and the fallback gateway |
//! | [`audio`] | WAV I/O, quality checks, merging and export |
//! | [`pipeline`] | the five-stage job state machine |
//! | [`config`] | settings and platform paths |

pub mod advisor;
pub mod audio;
pub mod config;
pub mod pipeline;
pub mod synthesis;
pub mod text;
pub mod voice;
