pub mod buffer;
pub mod clock_wait;
pub mod decode;
pub mod mux;
pub mod pad;
pub mod probe;
pub mod queue;
pub mod seam;
pub mod session;
pub mod sink;
pub mod tick;
mod helpers; // internal — not pub, not re-exported

pub use session::PipelineSession;
pub use sink::{FileSink, NullSink, Sink};
