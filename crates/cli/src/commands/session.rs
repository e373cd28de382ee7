//! Sign-in state.
//!
//! # Usage
//!
//! ```bash
//! bazaar session login u-42 --token "$TOKEN"
//! bazaar session show
//! bazaar session logout
//! ```
//!
//! Signing in captures the guest cart as a snapshot, stores the user ID, and
//! merges the snapshot into the user's cart. A failed merge leaves the
//! snapshot for `bazaar cart merge` to retry.

use bazaar_client::error::{clear_sentry_user, set_sentry_user};
use bazaar_client::storage::{keys, set_json};
use bazaar_client::{ClientConfig, LocalStore, MergeOutcome};
use bazaar_core::{CartPhase, UserId};

use super::{CommandError, Context};

/// Sign in as `user_id`, optionally storing a bearer token.
pub async fn login(
    ctx: &Context,
    config: &ClientConfig,
    user_id: String,
    token: Option<String>,
) -> Result<(), CommandError> {
    if ctx.store.get(keys::USER_ID).await?.is_some() {
        return Err(CommandError::Precondition(
            "Already signed in; run `bazaar session logout` first",
        ));
    }

    capture_guest_snapshot(ctx).await?;

    let user_id = UserId::new(user_id);
    ctx.store.set(keys::USER_ID, user_id.as_str()).await?;
    if let Some(token) = token {
        ctx.store.set(keys::AUTH_TOKEN, &token).await?;
    }
    set_sentry_user(&user_id);
    tracing::info!(user_id = %user_id, "Signed in");

    // Rebuild so requests carry the new token
    let ctx = Context::new(config).await?;
    let outcome = ctx.session.merge_guest_cart(&user_id).await;
    print_merge_outcome(outcome);

    Ok(())
}

/// Forget the signed-in user, the token, and the guest cart ID.
///
/// The guest cart was merged at sign-in, so the next add starts a new one.
pub async fn logout(ctx: &Context) -> Result<(), CommandError> {
    ctx.store.remove(keys::USER_ID).await?;
    ctx.store.remove(keys::AUTH_TOKEN).await?;
    ctx.session.forget_guest_cart().await?;
    clear_sentry_user();
    tracing::info!("Signed out");
    Ok(())
}

/// Print the stored identities. The token itself is never printed.
#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context) -> Result<(), CommandError> {
    let user_id = ctx.store.get(keys::USER_ID).await?;
    let guest_id = ctx.store.get(keys::GUEST_CART_ID).await?;
    let has_token = ctx.store.get(keys::AUTH_TOKEN).await?.is_some();
    let has_snapshot = ctx.store.get(keys::GUEST_CART_SNAPSHOT).await?.is_some();

    println!("User:          {}", user_id.as_deref().unwrap_or("(guest)"));
    println!("Guest cart:    {}", guest_id.as_deref().unwrap_or("(none)"));
    println!("Token stored:  {}", if has_token { "yes" } else { "no" });
    println!("Pending merge: {}", if has_snapshot { "yes" } else { "no" });
    Ok(())
}

/// Store the current guest cart as the snapshot merged after sign-in.
async fn capture_guest_snapshot(ctx: &Context) -> Result<(), CommandError> {
    ctx.session.load(None).await;
    let snapshot = ctx.session.snapshot();
    if snapshot.phase != CartPhase::Anonymous || snapshot.items.is_empty() {
        return Ok(());
    }

    set_json(&ctx.store, keys::GUEST_CART_SNAPSHOT, &snapshot.items).await?;
    if let Some(first) = snapshot.items.first() {
        ctx.store
            .set(keys::GUEST_CART_STORE_ID, first.store_id.as_str())
            .await?;
    }
    tracing::debug!(items = snapshot.items.len(), "Guest cart captured for merge");
    Ok(())
}

#[allow(clippy::print_stdout)]
pub(super) fn print_merge_outcome(outcome: MergeOutcome) {
    match outcome {
        MergeOutcome::NoSnapshot => println!("No guest cart to merge"),
        MergeOutcome::Merged => println!("Guest cart merged"),
        MergeOutcome::Failed => {
            println!("Guest cart merge failed; it will be retried by `bazaar cart merge`");
        }
    }
}
