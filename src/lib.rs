//! Device-to-application pairing.
//!
//! A device registers an application instance (identified by its token card
//! id), the application proves it received the issued verification code, and
//! either side may later unregister. [`PairingHandler`] implements that
//! protocol over a [`DocumentStore`]; [`IntakeLoop`] feeds it one message at a
//! time and acknowledges each reply.

pub mod action_log;
pub mod catalog;
pub mod config;
pub mod directory;
pub mod error;
pub mod intake;
pub mod model;
pub mod protocol;
pub mod schema;
pub mod store;

pub use action_log::ActionLog;
pub use catalog::{ApplicationCatalog, load_catalog_file};
pub use config::{ActionPolicy, Config, IntakeConfig};
pub use directory::DeviceDirectory;
pub use error::{PairingError, StoreError, StoreOp};
pub use intake::{Checkpoint, Delivery, IntakeLoop, IntakeStats, LineIntake};
pub use model::{
    Action, AppRegistration, AppStatus, CatalogEntry, Device, Encryption, Envelope, Header,
    MessageType, Progress, RegisterBody, Resends, Session, VerifyBody, Version,
};
pub use protocol::{
    ChallengeSource, Clock, PairingHandler, RandomChallenges, SystemClock,
    VERIFICATION_CODE_LIMIT,
};
pub use schema::{SchemaSet, SchemaViolation, Shape, Validation};
pub use store::{Collection, DocumentStore, MemoryStore, Snapshot};
