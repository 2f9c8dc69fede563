pub mod await_download;
pub mod fetch;

pub use await_download::AwaitDownloadArgs;
pub use fetch::FetchArgs;
