pub mod change_feed;
pub mod config_service;
pub mod image_encoder;
pub mod json_chat_store;
pub mod paths;
pub mod secret_service;
pub mod sqlite_chat_store;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::image_encoder::FileImageEncoder;
pub use crate::json_chat_store::JsonChatStore;
pub use crate::paths::KaiwaPaths;
pub use crate::secret_service::SecretServiceImpl;
pub use crate::sqlite_chat_store::SqliteChatStore;
