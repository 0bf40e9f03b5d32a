pub mod aggregates;
pub mod client;
pub mod config;
pub mod error;
pub mod loaders;
pub mod logging;
pub mod media;
pub mod mentions;
pub mod models;
pub mod mutations;
pub mod notify;
pub mod realtime;
pub mod rpc;
pub mod threads;

pub use client::SocialClient;
pub use config::Config;
pub use error::{ClientError, ClientResult, ValidationError};
pub use loaders::{ChatSource, CommentsSource, FeedSource, NotificationsSource, PageSource, UserPostsSource};
pub use media::MediaUpload;
pub use mutations::NewComment;
pub use threads::{build_thread, flatten_thread, CommentNode, ThreadEntry};
