pub mod json_file;
pub mod rss;

pub use json_file::JsonArticleSource;
pub use rss::RssArticleSource;
