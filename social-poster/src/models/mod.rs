pub mod media;
pub mod post;
pub mod session;

pub use media::StagedImage;
pub use post::{NewScheduledPost, PendingPost, PostResult, PostStatus};
pub use session::{PendingAuthorization, SessionKey, SessionRecord, TokenRecord};
