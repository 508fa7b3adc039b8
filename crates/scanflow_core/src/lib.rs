pub mod align;
pub mod boundary;
pub mod buffer;
mod error;
pub mod lookahead;
pub mod reassembly;
pub mod skew;
pub mod staging;
mod traits;
mod types;

pub use align::ChannelAligner;
pub use boundary::{BoundaryOptions, LineDisposition, PageBoundary};
pub use error::{Result, ScanError, Status};
pub use lookahead::LookaheadBuffer;
pub use reassembly::LineAssembler;
pub use skew::SkewCorrector;
pub use staging::LineStaging;
pub use traits::Transport;
pub use types::{
    CHANNELS, ChannelDelays, ChannelLayout, ColorMode, Extent, FillMode, FrameFormat, LineFormat,
    MM_PER_INCH, Parameters, ScanArea, ScanSource, SkewShift, WarmupPolicy,
};
