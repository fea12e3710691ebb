pub mod pipeline;
pub mod reassembler;
pub mod relay_stream;

pub use pipeline::RelayPipeline;
pub use reassembler::{EventFrame, FrameReassembler};
pub use relay_stream::{RelayContext, RelayStream};
