/// Dongle bring-up and session lifetime: configuration, the session state
/// machine, the outbound writer queue and the async driver task.
pub mod config;
pub mod fsm;
pub mod session;
pub mod writer;

pub use config::{DongleConfig, DriveHand, IconFile, PhoneTypeConfig, WifiBand};
pub use fsm::{SessionFsm, SessionState};
pub use session::{DongleSession, SessionOutcome};
pub use writer::{WriterOverflow, WriterQueue};
