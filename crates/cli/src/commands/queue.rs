//! Offline request queue.
//!
//! # Usage
//!
//! ```bash
//! bazaar queue list
//! bazaar queue flush
//! bazaar queue clear
//! ```
//!
//! Cart deletions that could not reach the server land here.

use super::{CommandError, Context};

/// Print queued requests, oldest first.
#[allow(clippy::print_stdout)]
pub async fn list(ctx: &Context) -> Result<(), CommandError> {
    let pending = ctx.queue.pending().await?;
    if pending.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }

    for request in &pending {
        println!(
            "{}  {:<6} {}  (queued {}, {} failed attempt(s))",
            request.id,
            request.method.to_string(),
            request.path,
            request.queued_at.format("%Y-%m-%d %H:%M:%S"),
            request.attempts
        );
    }
    Ok(())
}

/// Replay every queued request.
#[allow(clippy::print_stdout)]
pub async fn flush(ctx: &Context) -> Result<(), CommandError> {
    let report = ctx.queue.flush(&ctx.client).await?;
    println!(
        "Delivered {}, dropped {} refused by the server, {} still queued",
        report.delivered, report.dropped, report.remaining
    );
    Ok(())
}

/// Drop every queued request.
pub async fn clear(ctx: &Context) -> Result<(), CommandError> {
    ctx.queue.clear().await?;
    tracing::info!("Offline queue cleared");
    Ok(())
}
