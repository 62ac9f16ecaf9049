pub mod id;
pub mod identity;
pub mod queue_entry;
pub mod snapshot;
pub mod track;

pub use id::{GuildId, UserId};
pub use identity::{identity_key, TrackIdentityKey};
pub use queue_entry::QueueEntry;
pub use snapshot::{EntryRecord, GuildSnapshot, SCHEMA_VERSION};
pub use track::{SourceTag, TrackDescriptor};
