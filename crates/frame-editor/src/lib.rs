pub mod commands;
pub mod drag;
pub mod input;
pub mod selection;
pub mod session;
pub mod shortcuts;
pub mod snap;

pub use commands::{
    Command, CommandKind, GeometryChange, History, HistoryConfig, HistoryEntry, HistoryError,
    HistorySummary,
};
pub use drag::{
    DragConfig, DragFrame, DragManager, DragMode, DragOutcome, DragPhase, NodeSnapshot,
    NodeTransform,
};
pub use input::{InputEvent, Modifiers};
pub use selection::{Handle, HandlePosition, SelectOptions, Selection, SelectionBounds};
pub use session::{
    FrameScheduler, Session, SessionConfig, SessionSnapshot, SnapshotError, Viewport,
};
pub use shortcuts::{ShortcutAction, ShortcutMap};
pub use snap::{GuideKind, GuideOrientation, SnapConfig, SnapEngine, SnapGuide, SnapResult};
