//! QueueCTL - Entry Point
//!
//! CLI-based background job queue with worker pools, automatic retries
//! and a Dead Letter Queue for failed jobs.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    queuectl::run().await
}
