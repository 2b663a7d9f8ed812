mod poller;
mod source;


pub use poller::TerminationPoller;
pub use source::{HttpMetadataSource, MetadataSource};
