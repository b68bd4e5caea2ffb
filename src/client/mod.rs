//! Conversation client: holds the message list, sends the whole history on
//! every turn and grows the assistant reply as the relay streams it.

pub mod credentials;
pub mod repl;
pub mod session;
pub mod transport;

pub use credentials::{ CredentialStore, FileCredentialStore, MemoryCredentialStore };
pub use session::{ ChatSession, SessionSnapshot, SubmitOutcome, TurnPhase };
pub use transport::{ HttpRelayTransport, RelayTransport, TransportError };
