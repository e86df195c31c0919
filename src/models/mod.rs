pub mod channel;
pub mod occupancy;
pub mod portal;
pub mod stream;
pub mod vod;

pub use channel::{Channel, EpgEntry, FallbackGroup, Genre, GroupMember};
pub use occupancy::OccupancyRecord;
pub use portal::{AccountProfile, MacAuthContext, MacEntry, Portal, PortalDraft};
pub use stream::ResolvedStream;
pub use vod::{Season, VodCategory, VodItem};
