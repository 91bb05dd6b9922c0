//! # patchsync protocol
//!
//! Messages exchanged between a patchsync client and the server.
//!
//! ## Messages
//!
//! - `ChangeRequest`: a consolidated local patch for one file
//! - `ChangeResponse`: the server's verdict, the new document version, and any
//!   patches from other clients committed ahead of the request
//! - `ChangeNotification`: a remote change pushed outside any request
//!
//! Patches travel in their text wire form; messages themselves are CBOR.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod messages;

pub use messages::{
    ChangeNotification, ChangeRequest, ChangeResponse, MessageError, ResponseStatus,
};
