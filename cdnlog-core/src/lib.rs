pub mod config;
pub mod error;
pub mod record;
pub mod zone;

pub use config::CdnLogConfig;
pub use error::CdnLogError;
pub use record::CanonicalLogRecord;
pub use zone::LogZone;
