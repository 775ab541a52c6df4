//! Control-plane contract. A real RPC server is out of scope; this trait is
//! the boundary a future wire protocol would sit behind.

use uuid::Uuid;

use crate::metrics::MetricsSnapshot;
use crate::model::Block;

pub trait ControlPlane {
    fn start_channel(&self) -> anyhow::Result<()>;
    fn stop_channel(&self) -> anyhow::Result<()>;
    fn submit_block(&self, block: Block) -> anyhow::Result<()>;
    fn attach_sink(&self, sink_id: Uuid) -> anyhow::Result<()>;
    fn detach_sink(&self, sink_id: Uuid) -> anyhow::Result<()>;
    fn get_metrics(&self) -> MetricsSnapshot;
}
