pub mod cursor;
pub mod hydrator;
pub mod session;

pub use cursor::{CursorState, NavigationCursor, Position};
pub use hydrator::{ApplicationHydrator, HydrationOutcome};
pub use session::{IntakeSession, SessionDeps, SessionStart};
