//! Expiring locks on an object store.
//!
//! A lock is a blob holding a [`LeaseStamp`]: the owner and the time the
//! lease runs out. The holder renews the stamp while it is alive. A stamp
//! whose lease ran out belongs to a holder that died, and the next taker
//! replaces it with a conditional update, so two takers cannot both win.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload, PutResult, UpdateVersion};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

/// How long a lease stays valid without renewal.
pub(crate) const LEASE_DURATION: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct LeaseStamp {
    pub(crate) owner: String,
    pub(crate) expires_at_ms: u64,
}

impl LeaseStamp {
    pub(crate) fn new(owner: &str, duration: Duration) -> Self {
        Self {
            owner: owner.to_string(),
            expires_at_ms: now_ms().saturating_add(duration.as_millis() as u64),
        }
    }

    pub(crate) fn is_expired(&self) -> bool {
        now_ms() >= self.expires_at_ms
    }

    fn to_payload(&self) -> object_store::Result<PutPayload> {
        let bytes = serde_json::to_vec(self).map_err(|e| object_store::Error::Generic {
            store: "lease",
            source: Box::new(e),
        })?;
        Ok(bytes.into())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn version_of(result: PutResult) -> UpdateVersion {
    UpdateVersion {
        e_tag: result.e_tag,
        version: result.version,
    }
}

/// Try to take the lease at `path` for `owner`.
///
/// Returns the version of the written stamp, or `None` when a live lease is
/// held by someone else.
pub(crate) async fn acquire(
    store: &Arc<dyn ObjectStore>,
    path: &ObjectPath,
    owner: &str,
    duration: Duration,
) -> object_store::Result<Option<UpdateVersion>> {
    let stamp = LeaseStamp::new(owner, duration).to_payload()?;
    match store
        .put_opts(path, stamp.clone(), PutOptions::from(PutMode::Create))
        .await
    {
        Ok(result) => return Ok(Some(version_of(result))),
        Err(object_store::Error::AlreadyExists { .. }) => {}
        Err(e) => return Err(e),
    }

    let current = match store.get(path).await {
        Ok(current) => current,
        // Released between our create and read; the caller may retry.
        Err(object_store::Error::NotFound { .. }) => return Ok(None),
        Err(e) => return Err(e),
    };
    let held_version = UpdateVersion {
        e_tag: current.meta.e_tag.clone(),
        version: current.meta.version.clone(),
    };
    let held: Option<LeaseStamp> = serde_json::from_slice(&current.bytes().await?).ok();
    if let Some(held) = &held {
        if !held.is_expired() {
            return Ok(None);
        }
    }

    log::warn!("taking over expired lock {path}");
    match store
        .put_opts(path, stamp, PutOptions::from(PutMode::Update(held_version)))
        .await
    {
        Ok(result) => Ok(Some(version_of(result))),
        Err(object_store::Error::Precondition { .. })
        | Err(object_store::Error::AlreadyExists { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Keep the lease alive until `stop` fires or the lease is lost.
pub(crate) async fn renew(
    store: Arc<dyn ObjectStore>,
    path: ObjectPath,
    owner: String,
    duration: Duration,
    mut version: UpdateVersion,
    mut stop: oneshot::Receiver<()>,
) {
    let interval = duration / 3;
    loop {
        if tokio::time::timeout(interval, &mut stop).await.is_ok() {
            return;
        }
        let stamp = match LeaseStamp::new(&owner, duration).to_payload() {
            Ok(stamp) => stamp,
            Err(e) => {
                log::warn!("failed to encode lease for {path}: {e}");
                return;
            }
        };
        match store
            .put_opts(&path, stamp, PutOptions::from(PutMode::Update(version.clone())))
            .await
        {
            Ok(result) => version = version_of(result),
            Err(e) => {
                log::warn!("lost lock {path}: {e}");
                return;
            }
        }
    }
}

/// Delete the lease blob if `owner` still holds it.
pub(crate) async fn release(
    store: &Arc<dyn ObjectStore>,
    path: &ObjectPath,
    owner: &str,
) -> object_store::Result<()> {
    let current = match store.get(path).await {
        Ok(current) => current,
        Err(object_store::Error::NotFound { .. }) => return Ok(()),
        Err(e) => return Err(e),
    };
    let held: Option<LeaseStamp> = serde_json::from_slice(&current.bytes().await?).ok();
    if held.is_some_and(|held| held.owner == owner) {
        match store.delete(path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
