mod http_transport;
pub mod upstream;

pub use http_transport::HttpTransport;
pub use upstream::{build_upstream_headers, UpstreamByteStream, UpstreamInvoker};
