//! 제공자 구현 모음 (KIS 외).

pub mod mock;

pub use mock::{FeedScript, MockEodProvider, ScriptedProgramFeed};
