pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::auth::SessionManager;
pub use application::commands::AppState;
pub use application::focus_flow::{FlowEvent, FocusFlow};
pub use application::timer::{CountdownTimer, NowProvider};
pub use domain::models::{TimerConfig, TimerState};
pub use infrastructure::error::InfraError;
