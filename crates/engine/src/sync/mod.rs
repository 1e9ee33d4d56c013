//! Sync bundle assembly and delta sync.
//!
//! Each requested bucket is filled by its own task on a [`JoinSet`]. Tasks hand
//! their bucket back to the join loop, which is the only writer of the bundle.
//! Every task races its work against a child of the caller's cancellation
//! token; returning early drops the set and aborts whatever is still running.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use iamsync_auth::{Permission, UserContext};
use iamsync_core::UserId;

use crate::contexts::ContextManager;
use crate::error::{ServiceError, ServiceResult};
use crate::hashing::{hash_json, hash_permissions, hash_screen};
use crate::menu::{MenuNode, MenuService};
use crate::screens::ScreenConfigService;

pub mod bucket;

pub use bucket::{
    Bucket, BucketData, BucketSelection, DeltaSync, SCREEN_KEY_PREFIX, ScreenBundle, SyncBundle,
};

/// Output of one bucket task.
enum Filled {
    Menu(Vec<MenuNode>, String),
    Permissions(Vec<String>, String),
    Contexts(Vec<UserContext>, String),
    /// `None` when screen enumeration failed; the bucket is then left out.
    Screens(Option<BTreeMap<String, (ScreenBundle, String)>>),
}

pub struct SyncService {
    menu: Arc<MenuService>,
    contexts: Arc<ContextManager>,
    screens: Arc<ScreenConfigService>,
    screen_limit: u32,
}

impl SyncService {
    pub fn new(
        menu: Arc<MenuService>,
        contexts: Arc<ContextManager>,
        screens: Arc<ScreenConfigService>,
        screen_limit: u32,
    ) -> Self {
        Self {
            menu,
            contexts,
            screens,
            screen_limit,
        }
    }

    /// Fill the selected buckets for `context` and hash each of them.
    pub async fn full_bundle(
        &self,
        user_id: UserId,
        context: &UserContext,
        buckets: &BucketSelection,
        cancel: &CancellationToken,
    ) -> ServiceResult<SyncBundle> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let started = Instant::now();

        let mut tasks: JoinSet<ServiceResult<Filled>> = JoinSet::new();
        for bucket in buckets.iter() {
            let token = cancel.child_token();
            match bucket {
                Bucket::Menu => {
                    let menu = Arc::clone(&self.menu);
                    let permissions = context.permissions().clone();
                    tasks.spawn(guarded(token, async move {
                        fill_menu(&menu, user_id, &permissions).await
                    }));
                }
                Bucket::Permissions => {
                    let permissions = context.permissions().clone();
                    tasks.spawn(guarded(token, async move { fill_permissions(&permissions) }));
                }
                Bucket::AvailableContexts => {
                    let contexts = Arc::clone(&self.contexts);
                    tasks.spawn(guarded(token, async move {
                        fill_contexts(&contexts, user_id).await
                    }));
                }
                Bucket::Screens => {
                    let screens = Arc::clone(&self.screens);
                    let limit = self.screen_limit;
                    tasks.spawn(guarded(token, async move { fill_screens(&screens, limit).await }));
                }
            }
        }

        let mut bundle = SyncBundle::default();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ServiceError::Cancelled),
                joined = tasks.join_next() => joined,
            };
            let Some(joined) = joined else { break };
            let filled = match joined {
                Ok(result) => result?,
                Err(err) if err.is_panic() => {
                    return Err(ServiceError::Internal(format!("sync bucket task panicked: {err}")));
                }
                Err(_) => return Err(ServiceError::Cancelled),
            };
            collect(&mut bundle, filled);
        }

        debug!(
            user_id = %user_id,
            buckets = bundle.hashes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "sync bundle assembled"
        );
        Ok(bundle)
    }

    /// Compare client hashes with a fresh full bundle.
    ///
    /// Keys the client sends that the bundle does not produce are ignored.
    pub async fn delta_sync(
        &self,
        user_id: UserId,
        context: &UserContext,
        client_hashes: &BTreeMap<String, String>,
        cancel: &CancellationToken,
    ) -> ServiceResult<DeltaSync> {
        let bundle = self
            .full_bundle(user_id, context, &BucketSelection::all(), cancel)
            .await?;

        let mut delta = DeltaSync::default();
        for (key, hash) in &bundle.hashes {
            if client_hashes.get(key) == Some(hash) {
                delta.unchanged.push(key.clone());
                continue;
            }
            let data = bundle
                .payload(key)
                .map_err(|e| ServiceError::Internal(format!("encode {key}: {e}")))?
                .unwrap_or(Value::Null);
            delta.changed.insert(
                key.clone(),
                BucketData {
                    data,
                    hash: hash.clone(),
                },
            );
        }

        debug!(
            user_id = %user_id,
            changed = delta.changed.len(),
            unchanged = delta.unchanged.len(),
            "delta sync computed"
        );
        Ok(delta)
    }
}

async fn guarded<F>(token: CancellationToken, work: F) -> ServiceResult<Filled>
where
    F: Future<Output = ServiceResult<Filled>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ServiceError::Cancelled),
        filled = work => filled,
    }
}

fn collect(bundle: &mut SyncBundle, filled: Filled) {
    match filled {
        Filled::Menu(menu, hash) => {
            bundle.menu = Some(menu);
            bundle.hashes.insert(Bucket::Menu.as_str().to_string(), hash);
        }
        Filled::Permissions(permissions, hash) => {
            bundle.permissions = Some(permissions);
            bundle.hashes.insert(Bucket::Permissions.as_str().to_string(), hash);
        }
        Filled::Contexts(contexts, hash) => {
            bundle.available_contexts = Some(contexts);
            bundle
                .hashes
                .insert(Bucket::AvailableContexts.as_str().to_string(), hash);
        }
        Filled::Screens(None) => {}
        Filled::Screens(Some(screens)) => {
            let mut out = BTreeMap::new();
            for (key, (screen, hash)) in screens {
                bundle.hashes.insert(format!("{SCREEN_KEY_PREFIX}{key}"), hash);
                out.insert(key, screen);
            }
            bundle.screens = Some(out);
        }
    }
}

fn hashed<T: serde::Serialize + ?Sized>(bucket: Bucket, payload: &T) -> ServiceResult<String> {
    hash_json(payload).map_err(|e| ServiceError::Internal(format!("hash {bucket}: {e}")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Bucket fillers
// ─────────────────────────────────────────────────────────────────────────────

async fn fill_menu(
    menu: &MenuService,
    user_id: UserId,
    permissions: &BTreeSet<Permission>,
) -> ServiceResult<Filled> {
    let started = Instant::now();
    let nodes = match menu.menu_for_user(permissions).await {
        Ok(nodes) => nodes,
        Err(error) => {
            warn!(user_id = %user_id, bucket = "menu", %error, "menu bucket degraded to empty");
            Vec::new()
        }
    };
    let hash = hashed(Bucket::Menu, &nodes)?;
    debug!(bucket = "menu", elapsed_ms = started.elapsed().as_millis() as u64, "bucket filled");
    Ok(Filled::Menu(nodes, hash))
}

fn fill_permissions(permissions: &BTreeSet<Permission>) -> ServiceResult<Filled> {
    let names = permissions.iter().map(|p| p.as_str().to_string()).collect();
    Ok(Filled::Permissions(names, hash_permissions(permissions)))
}

async fn fill_contexts(contexts: &ContextManager, user_id: UserId) -> ServiceResult<Filled> {
    let started = Instant::now();
    let mut available = match contexts.list_available_contexts(user_id, None).await {
        Ok(listing) => listing.available,
        Err(error) => {
            warn!(
                user_id = %user_id,
                bucket = "available_contexts",
                %error,
                "available contexts bucket degraded to empty"
            );
            Vec::new()
        }
    };
    available.sort_by_key(|c| (c.tenant_id(), c.role_id()));
    let hash = hashed(Bucket::AvailableContexts, &available)?;
    debug!(
        bucket = "available_contexts",
        elapsed_ms = started.elapsed().as_millis() as u64,
        "bucket filled"
    );
    Ok(Filled::Contexts(available, hash))
}

async fn fill_screens(screens: &ScreenConfigService, limit: u32) -> ServiceResult<Filled> {
    let started = Instant::now();
    let instances = match screens.instances_for_sync(limit).await {
        Ok(instances) => instances,
        Err(error) => {
            warn!(bucket = "screens", %error, "screen enumeration failed; bucket omitted");
            return Ok(Filled::Screens(None));
        }
    };

    let mut out = BTreeMap::new();
    for instance in instances {
        let key = instance.screen_key.clone();
        match screens.resolve_instance(instance).await {
            Ok(resolved) => {
                let hash = hash_screen(resolved.version, resolved.updated_at);
                out.insert(key, (ScreenBundle::from(resolved), hash));
            }
            Err(error) => warn!(screen_key = %key, %error, "skipping unresolvable screen"),
        }
    }
    debug!(
        bucket = "screens",
        screens = out.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "bucket filled"
    );
    Ok(Filled::Screens(Some(out)))
}
