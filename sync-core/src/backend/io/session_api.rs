//! # Session API
//!
//! DTO-level entry points the parent and child apps call. Each handler logs
//! the request, calls into the kid session and maps the result to the shared
//! DTOs. Failures come back as the human-readable message from
//! [`SyncError::user_message`](crate::backend::domain::SyncError::user_message).

use log::{error, info};

use crate::backend::domain::models::RewardId;
use crate::backend::domain::{ActorContext, SyncError};
use crate::backend::io::mappers::{ActivityMapper, KidMapper, RewardMapper, ShareMapper};
use crate::backend::{KidSession, SyncBackend};
use shared::{
    ApplyDeltaRequest, ApplyDeltaResponse, BalanceSnapshot, KidListResponse, PurchaseRequest,
    PurchaseResponse, ReconcileResponse, RegisterListSnapshot, RewardListSnapshot, ShareResponse,
};

fn report(operation: &str, e: SyncError) -> String {
    error!("{} failed: {}", operation, e);
    e.user_message()
}

pub async fn list_kids(backend: &SyncBackend, ctx: &ActorContext) -> Result<KidListResponse, String> {
    info!("list_kids - account {}", ctx.account);
    let kids = backend
        .kids()
        .list_kids(ctx)
        .await
        .map_err(|e| report("list_kids", e))?;
    Ok(KidListResponse {
        kids: KidMapper::to_kid_list_dto(kids),
    })
}

pub async fn apply_delta(
    session: &KidSession,
    ctx: &ActorContext,
    request: ApplyDeltaRequest,
) -> Result<ApplyDeltaResponse, String> {
    info!("apply_delta - request: {:?}", request);
    let balance = session
        .ledger
        .apply_delta(ctx, request.amount, &request.reason)
        .await
        .map_err(|e| report("apply_delta", e))?;

    Ok(ApplyDeltaResponse {
        balance,
        success_message: format!("Balance is now {} coins.", balance),
    })
}

pub async fn purchase(
    session: &KidSession,
    ctx: &ActorContext,
    request: PurchaseRequest,
) -> Result<PurchaseResponse, String> {
    info!("purchase - request: {:?}", request);
    let reward_id = RewardId(request.reward_id);
    let result = session
        .rewards
        .purchase(ctx, reward_id)
        .await
        .map_err(|e| report("purchase", e))?;

    let name = session
        .rewards
        .reward_name(reward_id)
        .unwrap_or_else(|| format!("reward {}", reward_id));
    Ok(RewardMapper::to_purchase_response(result, &name))
}

pub async fn reconcile(session: &KidSession, ctx: &ActorContext) -> Result<ReconcileResponse, String> {
    info!("reconcile - kid {}", session.kid_id);
    let outcome = session
        .activities
        .reconcile(ctx)
        .await
        .map_err(|e| report("reconcile", e))?;
    Ok(ActivityMapper::to_reconcile_response(outcome))
}

pub async fn ensure_share(session: &KidSession, ctx: &ActorContext) -> Result<ShareResponse, String> {
    info!("ensure_share - kid {}", session.kid_id);
    let grant = session
        .shares
        .ensure_share(ctx)
        .await
        .map_err(|e| report("ensure_share", e))?;
    Ok(ShareMapper::to_share_response(grant, "Profile is shared."))
}

pub async fn revoke_share(session: &KidSession, ctx: &ActorContext) -> Result<bool, String> {
    info!("revoke_share - kid {}", session.kid_id);
    session
        .shares
        .revoke_share(ctx)
        .await
        .map_err(|e| report("revoke_share", e))
}

pub fn balance_snapshot(session: &KidSession) -> BalanceSnapshot {
    KidMapper::to_balance_snapshot(&session.kid_id, session.ledger.snapshot())
}

pub fn register_snapshot(session: &KidSession) -> RegisterListSnapshot {
    ActivityMapper::to_snapshot(session.activities.snapshot())
}

pub fn reward_snapshot(session: &KidSession) -> RewardListSnapshot {
    RewardMapper::to_snapshot(session.rewards.snapshot())
}
