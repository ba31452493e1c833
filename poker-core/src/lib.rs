//! poker-core: real-time collaboration engine for planning poker rooms
//!
//! This crate holds everything that has shared state or protocol concerns,
//! independent of any HTTP framework:
//!
//! - **Sessions** - [`SessionStore`] maps opaque tokens to identities with a
//!   sliding expiry window
//! - **Connections** - [`ConnectionRegistry`] groups live connections by room
//!   and broadcasts to them with a bounded per-delivery timeout
//! - **Protocol** - [`ChangeCommand`] parses `<command>==<value>` frames and
//!   [`Action`] is the closed set of supported mutations
//! - **Dispatch** - [`Dispatcher`] applies commands through a [`RoomStore`]
//!   and broadcasts the result, one command per room at a time
//!
//! # Architecture
//!
//! ```text
//!  frame ──► ChangeCommand::parse ──► Dispatcher::apply
//!                                        │  (per-room turn)
//!                                        ├─► RoomStore::execute_mutation
//!                                        └─► ConnectionRegistry::broadcast_to_room
//!                                               │
//!                                   ┌───────────┼───────────┐
//!                                   ▼           ▼           ▼
//!                               conn queue  conn queue  conn queue
//! ```

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod room;
pub mod session;
pub mod store;

pub use connection::{ConnectionContext, ConnectionId, ConnectionLifecycle, ConnectionState};
pub use dispatch::{DispatchOutcome, Dispatcher, RoomSequencer};
pub use error::{
    ConnectionError, PokerError, PokerResult, ProtocolError, RoomIdError, StoreError,
};
pub use protocol::{Action, ChangeCommand, DELIMITER, FrameKind};
pub use registry::{
    BroadcastReport, ConnectionHandle, ConnectionRegistry, DEFAULT_OUTBOUND_BUFFER,
    DEFAULT_WRITE_TIMEOUT, DeliveryFailure, Outbound,
};
pub use room::{ROOM_ID_LEN, RoomId};
pub use session::{DEFAULT_SESSION_TTL_MINUTES, Session, SessionStore};
pub use store::{MemoryRoomStore, MockRoomStore, RoomRole, RoomSnapshot, RoomStore};
