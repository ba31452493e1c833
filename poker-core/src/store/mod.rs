//! External room store interface and implementations

mod memory;
mod mock;
mod traits;

pub use memory::{MemoryRoomStore, RoomSnapshot, VoteView};
pub use mock::{MockRoomStore, MutationCall};
pub use traits::{RoomRole, RoomStore};
