use super::ExecutionContext;
use crate::core::{MarineId, OwnedMarine, Result, SpaceMarine};
use crate::protocol::Reply;
use crate::storage::StoreTable;
use tracing::{debug, warn};

/// Deletes the given ids from the gateway and then from the store, one by one.
///
/// Stops at the first gateway failure; records already deleted stay deleted.
async fn delete_all(
    ctx: &ExecutionContext<'_>,
    table: &mut StoreTable,
    ids: Vec<MarineId>,
) -> Result<Vec<OwnedMarine>> {
    let mut removed = Vec::with_capacity(ids.len());
    for id in ids {
        if let Err(e) = ctx.gateway.delete_record_by_id(id).await {
            warn!(id, removed = removed.len(), error = %e, "bulk delete interrupted");
            return Err(e);
        }
        if let Some(record) = table.remove(id) {
            removed.push(record);
        }
    }
    Ok(removed)
}

pub async fn remove_by_id(ctx: &ExecutionContext<'_>, id: MarineId) -> Result<Reply> {
    let mut table = ctx.store.write().await;
    let Some(record) = table.get(id) else {
        debug!(id, "remove_by_id: no such record");
        return Ok(Reply::Nothing);
    };
    if !ctx.may_modify(record) {
        debug!(id, login = ctx.login, "remove_by_id: not the owner");
        return Ok(Reply::Nothing);
    }

    delete_all(ctx, &mut table, vec![id]).await?;
    Ok(Reply::Nothing)
}

/// Removes and returns the minimum element if the requester owns it.
pub async fn remove_head(ctx: &ExecutionContext<'_>) -> Result<Reply> {
    let mut table = ctx.store.write().await;
    let head = match table.first() {
        Some(head) if ctx.may_modify(head) => head.id(),
        Some(_) => {
            debug!(login = ctx.login, "remove_head: head belongs to someone else");
            return Ok(Reply::Nothing);
        }
        None => return Ok(Reply::Nothing),
    };

    let removed = delete_all(ctx, &mut table, vec![head]).await?;
    Ok(removed.into_iter().next().into())
}

/// Removes every record of the requester that is taller than `marine`.
pub async fn remove_greater(ctx: &ExecutionContext<'_>, marine: SpaceMarine) -> Result<Reply> {
    let mut table = ctx.store.write().await;
    let ids = table.select_ids(|r| ctx.may_modify(r) && r.marine.cmp_height(&marine).is_gt());
    let removed = delete_all(ctx, &mut table, ids).await?;
    debug!(count = removed.len(), login = ctx.login, "remove_greater");
    Ok(Reply::Nothing)
}

/// Removes the first record of the requester whose height equals `height`.
pub async fn remove_any_by_height(ctx: &ExecutionContext<'_>, height: i64) -> Result<Reply> {
    let mut table = ctx.store.write().await;
    let Some(id) = table
        .find(|r| ctx.may_modify(r) && r.marine.height == height)
        .map(OwnedMarine::id)
    else {
        return Ok(Reply::Nothing);
    };

    delete_all(ctx, &mut table, vec![id]).await?;
    Ok(Reply::Nothing)
}

/// Removes every record the requester owns.
pub async fn clear(ctx: &ExecutionContext<'_>) -> Result<Reply> {
    let mut table = ctx.store.write().await;
    let ids = table.select_ids(|r| ctx.may_modify(r));
    let removed = delete_all(ctx, &mut table, ids).await?;
    debug!(count = removed.len(), login = ctx.login, "clear");
    Ok(Reply::Nothing)
}
