use super::ExecutionContext;
use crate::core::{MeleeWeapon, Result};
use crate::protocol::Reply;
use crate::storage::render_json;

pub const COLLECTION_KIND: &str = "PriorityQueue<SpaceMarine>";

/// Same layout as the historical `hh:mm:ss dd-MM-yyyy`.
const CREATE_TIME_FORMAT: &str = "%I:%M:%S %d-%m-%Y";

/// Every record as pretty JSON, ascending by height.
pub async fn show(ctx: &ExecutionContext<'_>) -> Result<Reply> {
    let records = ctx.store.snapshot().await;
    Ok(Reply::Text(render_json(&records)?))
}

pub async fn info(ctx: &ExecutionContext<'_>) -> Result<Reply> {
    let length = ctx.store.len().await;
    Ok(Reply::Text(format!(
        "collectionType: {}, createTime: {}, length: {}.",
        COLLECTION_KIND,
        ctx.store.created_at().format(CREATE_TIME_FORMAT),
        length
    )))
}

pub async fn average_of_height(ctx: &ExecutionContext<'_>) -> Result<Reply> {
    let table = ctx.store.read().await;
    Ok(Reply::Text(format_average(
        table.iter().map(|r| r.marine.height),
    )))
}

pub async fn count_greater_than(ctx: &ExecutionContext<'_>, weapon: MeleeWeapon) -> Result<Reply> {
    let count = ctx
        .store
        .read()
        .await
        .iter()
        .filter(|r| r.marine.melee_weapon > weapon)
        .count();
    Ok(Reply::Text(format!(
        "{} queue's elements have the value \"Melee Weapon\", greater than the given value.",
        count
    )))
}

/// `0.` for no heights, otherwise the mean printed as a float (`15.0.`).
pub fn format_average<I>(heights: I) -> String
where
    I: IntoIterator<Item = i64>,
{
    let (sum, count) = heights
        .into_iter()
        .fold((0i128, 0u64), |(sum, count), h| (sum + h as i128, count + 1));
    if count == 0 {
        return "The average value of the height: 0.".to_string();
    }
    let mean = sum as f64 / count as f64;
    format!("The average value of the height: {}.", format_double(mean))
}

/// Shortest round-trip form, switching to `d.dddE<n>` outside `[1e-3, 1e7)`.
fn format_double(value: f64) -> String {
    let magnitude = value.abs();
    if value == 0.0 || (1e-3..1e7).contains(&magnitude) || !value.is_finite() {
        return format!("{:?}", value);
    }
    let scientific = format!("{:e}", value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    if mantissa.contains('.') {
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}.0E{}", mantissa, exponent)
    }
}
