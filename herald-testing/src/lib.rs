pub mod callback;
pub mod faults;
pub mod harness;

pub use callback::{RecordingCallback, RoleEvent};
pub use faults::{VanishAt, VanishingEntryClient, VanishingPredecessorClient};
pub use harness::{eventually, ElectionHarness, Participant};
