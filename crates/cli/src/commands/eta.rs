//! Delivery estimate from a store to the selected address.

use bazaar_core::{GeoPoint, estimate_eta};

use super::{CommandError, Context, address};

/// Print distance and estimated delivery time from the store at
/// (`store_lat`, `store_lon`).
#[allow(clippy::print_stdout)]
pub async fn estimate(ctx: &Context, store_lat: f64, store_lon: f64) -> Result<(), CommandError> {
    let store = GeoPoint::new(store_lat, store_lon)?;
    let Some(destination) = address::selected(ctx).await? else {
        return Err(CommandError::Precondition(
            "No address selected; run `bazaar address set` first",
        ));
    };

    let eta = estimate_eta(store, destination.location, &ctx.eta);
    println!(
        "{:.1} km to {}, about {} min",
        eta.distance_km, destination.label, eta.minutes
    );
    Ok(())
}
