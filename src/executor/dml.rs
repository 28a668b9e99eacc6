use super::ExecutionContext;
use crate::core::{MarineId, OwnedMarine, Result, SpaceMarine};
use crate::protocol::Reply;
use tracing::debug;

/// Persists the marine, then places it in the store owned by the requester.
pub async fn add(ctx: &ExecutionContext<'_>, marine: SpaceMarine) -> Result<Reply> {
    marine.validate()?;
    let id = ctx.gateway.add_record_with_owner(&marine, ctx.login).await?;
    ctx.store
        .insert(OwnedMarine::new(marine.with_id(id), ctx.login))
        .await?;
    debug!(id, login = ctx.login, "marine added");
    Ok(Reply::Nothing)
}

/// Adds the marine only if the store is empty or its height is below the
/// current minimum. The store stays locked across the check and the insert.
pub async fn add_if_min(ctx: &ExecutionContext<'_>, marine: SpaceMarine) -> Result<Reply> {
    marine.validate()?;
    let mut table = ctx.store.write().await;

    let is_min = table
        .first()
        .is_none_or(|min| marine.cmp_height(&min.marine).is_lt());
    if !is_min {
        debug!(height = marine.height, "add_if_min: not below the minimum");
        return Ok(Reply::Nothing);
    }

    let id = ctx.gateway.add_record_with_owner(&marine, ctx.login).await?;
    table.insert(OwnedMarine::new(marine.with_id(id), ctx.login))?;
    debug!(id, login = ctx.login, "marine added as new minimum");
    Ok(Reply::Nothing)
}

/// Replaces the record with `id` by `marine` under a new id, owned by the
/// requester. Missing or foreign records are left alone.
pub async fn update(ctx: &ExecutionContext<'_>, id: MarineId, marine: SpaceMarine) -> Result<Reply> {
    marine.validate()?;
    let mut table = ctx.store.write().await;

    let Some(current) = table.get(id) else {
        debug!(id, "update: no such record");
        return Ok(Reply::Nothing);
    };
    if !ctx.may_modify(current) {
        debug!(id, login = ctx.login, owner = %current.owner, "update: not the owner");
        return Ok(Reply::Nothing);
    }

    let new_id = ctx
        .gateway
        .replace_record_with_owner(id, &marine, ctx.login)
        .await?;
    table.remove(id);
    table.insert(OwnedMarine::new(marine.with_id(new_id), ctx.login))?;
    debug!(old_id = id, new_id, login = ctx.login, "marine replaced");
    Ok(Reply::Nothing)
}
