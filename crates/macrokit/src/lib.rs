//! macrokit - input macro recording and playback
//!
//! Records global keyboard and mouse events into timestamped logs,
//! replays them with speed scaling and repeat control, and persists
//! them as JSON. A global kill switch cancels any running session.
//!
//! ## Platform Support
//!
//! - **macOS**: Full support via CGEventTap capture and CGEvent injection
//! - **Other platforms**: Logs, playback validation, storage and the
//!   engine all work; capture and injection report errors

pub mod backend;
pub mod detect;
pub mod engine;
pub mod error;
pub mod events;
pub mod killswitch;
pub mod platform;
pub mod player;
pub mod recorder;
pub mod storage;
pub mod window;

pub use backend::InputBackend;
pub use detect::{Detector, TemplateRegistry, MATCH_THRESHOLD};
pub use engine::MacroEngine;
pub use error::{Error, ErrorCode, Result};
pub use events::{Button, EventKind, Key, MacroEvent, NamedKey, RecordedMacro};
pub use killswitch::{AbortHook, CancelToken, KillSwitch};
pub use player::{
    Outcome, PlaybackHandle, PlaybackOptions, PlaybackStats, PlaybackSummary, Player, Repeat,
};
pub use recorder::{MacroRecorder, PermissionStatus, RecorderConfig, RecordingHandle};
pub use storage::{MacroLibrary, MacroStorage};
pub use window::{Region, WindowInfo, WindowProvider};

pub mod prelude {
    pub use crate::backend::InputBackend;
    pub use crate::detect::{Detector, TemplateRegistry};
    pub use crate::engine::MacroEngine;
    pub use crate::error::{Error, ErrorCode, Result};
    pub use crate::events::{Button, EventKind, Key, MacroEvent, NamedKey, RecordedMacro};
    pub use crate::killswitch::{CancelToken, KillSwitch};
    pub use crate::player::{PlaybackOptions, Player, Repeat};
    pub use crate::recorder::{MacroRecorder, RecorderConfig};
    pub use crate::storage::MacroStorage;
    pub use crate::window::{Region, WindowInfo, WindowProvider};
}
