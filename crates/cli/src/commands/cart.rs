//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! bazaar cart show
//! bazaar cart add p1 --name "Shawarma" --price 10 --store-id s1 --quantity 2
//! bazaar cart update p1 1
//! bazaar cart remove p1
//! bazaar cart clear
//! bazaar cart merge
//! ```

use bazaar_client::storage::keys;
use bazaar_client::{CartSnapshot, LocalStore};
use bazaar_core::{CartItem, CartPhase, ProductId, StoreId, UserId};
use rust_decimal::Decimal;

use super::session::print_merge_outcome;
use super::{CommandError, Context};

/// Item fields given on the command line.
pub struct NewItem {
    pub product_id: String,
    pub name: String,
    pub price: Decimal,
    pub store_id: String,
    pub store_type: String,
    pub image: Option<String>,
}

impl NewItem {
    fn into_cart_item(self) -> CartItem {
        CartItem {
            id: ProductId::new(self.product_id),
            name: self.name,
            price: self.price,
            // Ignored by add; the delta is sent separately
            quantity: 1,
            image: self.image,
            original_price: None,
            store_id: StoreId::new(self.store_id),
            store_type: self.store_type,
        }
    }
}

/// Load and print the cart.
pub async fn show(ctx: &Context) {
    ctx.session.load(None).await;
    print_cart(&ctx.session.snapshot());
}

/// Add `quantity` of an item.
pub async fn add(ctx: &Context, item: NewItem, quantity: i64) -> Result<(), CommandError> {
    let item = item.into_cart_item();
    if !ctx.session.add_to_cart(&item, quantity).await {
        return Err(CommandError::Rejected(format!(
            "could not add {}; the cart may hold items from another store",
            item.id
        )));
    }
    print_cart(&ctx.session.snapshot());
    Ok(())
}

/// Set an item's quantity. Zero or less removes it.
pub async fn update(ctx: &Context, product_id: String, quantity: i64) -> Result<(), CommandError> {
    ctx.session.load(None).await;

    let id = ProductId::new(product_id);
    if !ctx.session.items().iter().any(|item| item.id == id) {
        return Err(CommandError::Precondition("Item is not in the cart"));
    }
    if !ctx.session.update_quantity(&id, quantity).await {
        return Err(CommandError::Rejected(format!(
            "server refused quantity {quantity} for {id}"
        )));
    }
    print_cart(&ctx.session.snapshot());
    Ok(())
}

/// Remove an item and print the reloaded cart.
pub async fn remove(ctx: &Context, product_id: String) {
    ctx.session.remove_from_cart(&ProductId::new(product_id)).await;
    print_cart(&ctx.session.snapshot());
}

/// Delete the whole cart.
#[allow(clippy::print_stdout)]
pub async fn clear(ctx: &Context) {
    ctx.session.load(None).await;
    ctx.session.clear_cart().await;
    if ctx.session.items().is_empty() {
        println!("Cart cleared");
    } else {
        println!("Server unreachable; cart left unchanged, delete queued for `bazaar queue flush`");
    }
}

/// Retry merging the stored guest cart into the signed-in user's cart.
pub async fn merge(ctx: &Context) -> Result<(), CommandError> {
    let Some(user_id) = ctx.store.get(keys::USER_ID).await? else {
        return Err(CommandError::Precondition(
            "Not signed in; run `bazaar session login` first",
        ));
    };
    let outcome = ctx.session.merge_guest_cart(&UserId::new(user_id)).await;
    print_merge_outcome(outcome);
    Ok(())
}

#[allow(clippy::print_stdout)]
fn print_cart(snapshot: &CartSnapshot) {
    let owner = match snapshot.phase {
        CartPhase::NoCart => "no cart",
        CartPhase::Anonymous => "guest cart",
        CartPhase::User => "user cart",
        CartPhase::Merging => "merging",
    };

    if snapshot.items.is_empty() {
        println!("Cart is empty ({owner})");
        return;
    }

    println!("Cart ({owner}):");
    for item in &snapshot.items {
        println!(
            "  {:<12} {:<28} {:>3} x {:>8} = {:>9}",
            item.id.as_str(),
            item.name,
            item.quantity,
            item.price,
            item.line_total()
        );
    }
    let totals = snapshot.totals();
    println!(
        "  {} item(s), total {}",
        totals.total_quantity, totals.total_price
    );
}
