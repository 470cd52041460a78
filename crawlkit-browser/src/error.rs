pub use crawlkit_intelligence::BrowseError;

pub type Result<T> = std::result::Result<T, BrowseError>;

