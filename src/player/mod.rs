//! Player module: timed key synthesis for stratagem sequences

mod config;
mod playback;

pub use config::{DirectionKeys, MacroConfig, SlotHotkeys};
pub use playback::{spawn_worker, MacroPlayer, PlaybackRequest};
