pub mod thumbnail;
pub mod ytdlp;

pub use thumbnail::ThumbnailDownloader;
pub use ytdlp::{YtDlpConfig, YtDlpFetcher};
