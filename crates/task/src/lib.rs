use async_trait::async_trait;

use tokio_util::sync::CancellationToken;

/// A long-running unit of work. Tasks are spawned onto the runtime by the
/// binaries and are expected to return promptly once `cancel` fires.
#[async_trait]
pub trait Task {
    fn name(&self) -> &'static str;

    async fn run(self: Box<Self>, cancel: CancellationToken) -> anyhow::Result<()>;
}
