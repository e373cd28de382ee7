//! Selected delivery address.

use bazaar_client::storage::{get_json, keys, set_json};
use bazaar_core::{GeoPoint, SelectedAddress};

use super::{CommandError, Context};

/// Select the delivery address.
pub async fn set(ctx: &Context, label: String, lat: f64, lon: f64) -> Result<(), CommandError> {
    let address = SelectedAddress {
        label,
        location: GeoPoint::new(lat, lon)?,
    };
    set_json(&ctx.store, keys::SELECTED_ADDRESS, &address).await?;
    tracing::info!(label = %address.label, "Delivery address selected");
    Ok(())
}

/// Print the selected address.
#[allow(clippy::print_stdout)]
pub async fn show(ctx: &Context) -> Result<(), CommandError> {
    match selected(ctx).await? {
        Some(address) => println!(
            "{} ({:.5}, {:.5})",
            address.label, address.location.latitude, address.location.longitude
        ),
        None => println!("No address selected"),
    }
    Ok(())
}

/// The stored address, if any.
pub async fn selected(ctx: &Context) -> Result<Option<SelectedAddress>, CommandError> {
    Ok(get_json(&ctx.store, keys::SELECTED_ADDRESS).await?)
}
