pub mod commands;
pub mod controller;
pub mod events;
pub mod persistence;
pub mod state;


pub use controller::{ScanController, SubmitOutcome};
pub use events::ScanEvent;
pub use state::{AutoScanStatus, InputMode, ScanSnapshot, ScanState, ANALYSIS_STEPS};
