//! PayFlow Core
//!
//! Application core for the PayFlow demo: the contactless reader event
//! bridge, the NFC transaction state machine, the charge store contract,
//! and the charge/share flow that turns tokens into shareable payloads
//! and back.
//!
//! The native contactless reader is a black box behind the
//! [`reader::ContactlessPort`] trait; everything here reacts to its
//! event stream and never blocks a thread waiting on hardware.

pub mod controller;
pub mod reader;
pub mod share;
pub mod store;
pub mod testing;

pub use controller::{ControllerError, ControllerSnapshot, NfcController, NfcStatus};
pub use reader::{
    ContactlessPort, EventSink, ReaderBridge, ReaderError, ReaderEvent, ReaderEventKind,
    Subscription,
};
pub use share::{ChargeDetails, FlowError, ShareFlow, SharedSource};
pub use store::{Charge, ChargeStatus, ChargeStore, MemoryChargeStore, NewCharge, StoreError};
