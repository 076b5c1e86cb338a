//! Azure Blob Storage binding.
//!
//! Blobs live directly under a single container. The binding presents the
//! blocking [`Storage`] interface over the asynchronous `object_store` client
//! by driving it on a private runtime. Calls block the calling thread, which
//! may belong to another runtime.
//!
//! Locks are leases: blobs stamped with an owner and an expiry that the
//! holder keeps renewing. A lock left by a crashed process expires after
//! [`LEASE_DURATION`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::TryStreamExt;
use object_store::azure::{AzureConfigKey, MicrosoftAzureBuilder};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutMode, PutOptions, PutPayload};
use serde::{Deserialize, Serialize};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;

use crate::error::{Result, SearchError};
use crate::storage::lease::{self, LEASE_DURATION};
use crate::storage::{LOCK_PREFIX, Storage, StorageLock, lock_entry_name};

/// Container used when none is configured.
pub const DEFAULT_CONTAINER_NAME: &str = "lucenesearchindex";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Configuration for [`AzureBlobStorage`].
#[derive(Clone, Serialize, Deserialize)]
pub struct AzureStorageConfig {
    /// Azure storage connection string.
    pub connection_string: String,
    /// Container name; lowercased before use.
    #[serde(default = "default_container")]
    pub container: String,
}

fn default_container() -> String {
    DEFAULT_CONTAINER_NAME.to_string()
}

impl AzureStorageConfig {
    pub fn new<S: Into<String>>(connection_string: S) -> Self {
        Self {
            connection_string: connection_string.into(),
            container: default_container(),
        }
    }

    pub fn with_container<S: Into<String>>(mut self, container: S) -> Self {
        self.container = container.into();
        self
    }
}

impl fmt::Debug for AzureStorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageConfig")
            .field("connection_string", &"<redacted>")
            .field("container", &self.container)
            .finish()
    }
}

/// Parsed form of an Azure storage connection string.
#[derive(Clone, PartialEq, Eq)]
pub enum AzureConnection {
    /// `UseDevelopmentStorage=true`: the local storage emulator.
    DevelopmentStorage,
    /// A storage account addressed by shared key.
    Account {
        account_name: String,
        account_key: String,
        /// Explicit blob endpoint, or one derived from protocol and suffix.
        blob_endpoint: String,
    },
}

impl AzureConnection {
    /// Parse a `Key=Value;Key=Value` connection string.
    ///
    /// Only the syntax is checked. Keys are case-insensitive; unknown keys are
    /// ignored so connection strings copied from the portal (which carry queue
    /// and table endpoints) are accepted.
    pub fn parse(connection_string: &str) -> Result<Self> {
        let mut use_development_storage = false;
        let mut protocol = None;
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = None;
        let mut blob_endpoint = None;

        for segment in connection_string.split(';') {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            let (name, value) = segment.split_once('=').ok_or_else(|| {
                SearchError::invalid_config(
                    "blob storage connection string is invalid: expected Key=Value pairs",
                )
            })?;
            let value = value.trim();
            match name.trim().to_ascii_lowercase().as_str() {
                "usedevelopmentstorage" => {
                    use_development_storage = value.eq_ignore_ascii_case("true")
                }
                "defaultendpointsprotocol" => protocol = Some(value.to_ascii_lowercase()),
                "accountname" => account_name = Some(value.to_string()),
                // Keys are base64 and may end in '=' padding, kept by split_once.
                "accountkey" => account_key = Some(value.to_string()),
                "endpointsuffix" => endpoint_suffix = Some(value.to_string()),
                "blobendpoint" => blob_endpoint = Some(value.trim_end_matches('/').to_string()),
                _ => {}
            }
        }

        if use_development_storage {
            return Ok(AzureConnection::DevelopmentStorage);
        }

        let account_name = account_name
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                SearchError::invalid_config("blob storage connection string has no AccountName")
            })?;
        if !account_name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        {
            return Err(SearchError::invalid_config(format!(
                "blob storage account name '{account_name}' is invalid"
            )));
        }

        let account_key = account_key.filter(|key| !key.is_empty()).ok_or_else(|| {
            SearchError::invalid_config("blob storage connection string has no AccountKey")
        })?;
        BASE64.decode(&account_key).map_err(|e| {
            SearchError::invalid_config(format!("blob storage AccountKey is not base64: {e}"))
        })?;

        let protocol = protocol.unwrap_or_else(|| "https".to_string());
        if protocol != "https" && protocol != "http" {
            return Err(SearchError::invalid_config(format!(
                "unsupported DefaultEndpointsProtocol '{protocol}'"
            )));
        }

        let blob_endpoint = match blob_endpoint {
            Some(endpoint) => {
                if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
                    return Err(SearchError::invalid_config(format!(
                        "BlobEndpoint '{endpoint}' is not an http(s) URL"
                    )));
                }
                endpoint
            }
            None => format!(
                "{protocol}://{account_name}.blob.{}",
                endpoint_suffix.as_deref().unwrap_or(DEFAULT_ENDPOINT_SUFFIX)
            ),
        };

        Ok(AzureConnection::Account {
            account_name,
            account_key,
            blob_endpoint,
        })
    }
}

impl fmt::Debug for AzureConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AzureConnection::DevelopmentStorage => write!(f, "DevelopmentStorage"),
            AzureConnection::Account {
                account_name,
                blob_endpoint,
                ..
            } => f
                .debug_struct("Account")
                .field("account_name", account_name)
                .field("blob_endpoint", blob_endpoint)
                .finish_non_exhaustive(),
        }
    }
}

/// Normalize a container name the way the blob service requires.
pub fn normalize_container_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Private runtime that drives the object store client.
///
/// Futures are spawned onto this runtime and waited on from the calling
/// thread, so callers may themselves be running inside another runtime.
struct BlockingRuntime {
    runtime: Option<Runtime>,
}

impl BlockingRuntime {
    fn new() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scoped-search-azure")
            .enable_all()
            .build()
            .map_err(|e| SearchError::storage("start blob storage runtime", e))?;
        Ok(Self {
            runtime: Some(runtime),
        })
    }

    fn handle(&self) -> Result<&Handle> {
        self.runtime
            .as_ref()
            .map(Runtime::handle)
            .ok_or_else(|| SearchError::internal("blob storage runtime is shut down"))
    }

    /// Run `future` to completion on the private runtime.
    fn run<F>(&self, future: F) -> Result<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let task = self.handle()?.spawn(future);
        futures::executor::block_on(task)
            .map_err(|e| SearchError::internal(format!("blob storage task failed: {e}")))
    }
}

impl Drop for BlockingRuntime {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics; shutting down in the
        // background does not.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Blob store backed by an Azure Blob Storage container.
pub struct AzureBlobStorage {
    store: Arc<dyn ObjectStore>,
    container: String,
    runtime: Arc<BlockingRuntime>,
}

impl AzureBlobStorage {
    /// Build the client for the configured container.
    ///
    /// Fails with a configuration error when the connection string cannot be
    /// parsed. The container is not contacted.
    pub fn new(config: AzureStorageConfig) -> Result<Self> {
        let connection = AzureConnection::parse(&config.connection_string)?;
        let container = normalize_container_name(&config.container);
        if container.is_empty() {
            return Err(SearchError::invalid_config("blob container name is empty"));
        }

        let builder = MicrosoftAzureBuilder::new().with_container_name(&container);
        let builder = match &connection {
            AzureConnection::DevelopmentStorage => builder.with_use_emulator(true),
            AzureConnection::Account {
                account_name,
                account_key,
                blob_endpoint,
            } => builder
                .with_account(account_name)
                .with_access_key(account_key)
                .with_config(AzureConfigKey::Endpoint, blob_endpoint)
                .with_allow_http(blob_endpoint.starts_with("http://")),
        };
        let store = builder.build().map_err(|e| {
            SearchError::invalid_config(format!("blob storage connection string is invalid: {e}"))
        })?;

        log::debug!("azure blob storage bound to container '{container}' ({connection:?})");
        Self::with_store(Arc::new(store), container)
    }

    fn with_store(store: Arc<dyn ObjectStore>, container: String) -> Result<Self> {
        Ok(Self {
            store,
            container,
            runtime: Arc::new(BlockingRuntime::new()?),
        })
    }

    /// The normalized container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    fn object_path(name: &str) -> Result<ObjectPath> {
        ObjectPath::parse(name)
            .map_err(|e| SearchError::invalid_argument(format!("invalid blob name '{name}': {e}")))
    }

    fn blob_path(name: &str) -> Result<ObjectPath> {
        if name.starts_with(LOCK_PREFIX) {
            return Err(SearchError::invalid_argument(format!(
                "invalid blob name '{name}'"
            )));
        }
        Self::object_path(name)
    }
}

fn map_object_error(context: String, err: object_store::Error) -> SearchError {
    let kind = match &err {
        object_store::Error::NotFound { .. } => std::io::ErrorKind::NotFound,
        object_store::Error::AlreadyExists { .. } => std::io::ErrorKind::AlreadyExists,
        _ => std::io::ErrorKind::Other,
    };
    SearchError::storage(context, std::io::Error::new(kind, err))
}

/// Held lease; stops renewal and deletes the lease blob on drop.
struct LeaseGuard {
    store: Arc<dyn ObjectStore>,
    runtime: Arc<BlockingRuntime>,
    path: ObjectPath,
    owner: String,
    stop: Option<oneshot::Sender<()>>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let store = Arc::clone(&self.store);
        let path = self.path.clone();
        let owner = std::mem::take(&mut self.owner);
        let released = self
            .runtime
            .run(async move { lease::release(&store, &path, &owner).await });
        match released {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("failed to release lock {}: {e}", self.path),
            Err(e) => log::warn!("failed to release lock {}: {e}", self.path),
        }
    }
}

impl Storage for AzureBlobStorage {
    fn list_files(&self) -> Result<Vec<String>> {
        let store = Arc::clone(&self.store);
        let metas = self
            .runtime
            .run(async move { store.list(None).try_collect::<Vec<_>>().await })?
            .map_err(|e| map_object_error(format!("list container '{}'", self.container), e))?;
        Ok(metas
            .into_iter()
            .map(|meta| meta.location.to_string())
            .filter(|name| !name.starts_with(LOCK_PREFIX))
            .collect())
    }

    fn file_exists(&self, name: &str) -> Result<bool> {
        let path = Self::blob_path(name)?;
        let store = Arc::clone(&self.store);
        match self.runtime.run(async move { store.head(&path).await })? {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(map_object_error(format!("head '{name}'"), e)),
        }
    }

    fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let path = Self::blob_path(name)?;
        let store = Arc::clone(&self.store);
        let bytes = self
            .runtime
            .run(async move { store.get(&path).await?.bytes().await })?
            .map_err(|e| map_object_error(format!("read '{name}'"), e))?;
        Ok(bytes.to_vec())
    }

    fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        let path = Self::blob_path(name)?;
        let store = Arc::clone(&self.store);
        let payload = PutPayload::from(data.to_vec());
        self.runtime
            .run(async move { store.put(&path, payload).await })?
            .map_err(|e| map_object_error(format!("write '{name}'"), e))?;
        Ok(())
    }

    fn create_file(&self, name: &str, data: &[u8]) -> Result<bool> {
        let path = Self::blob_path(name)?;
        let store = Arc::clone(&self.store);
        let payload = PutPayload::from(data.to_vec());
        let created = self
            .runtime
            .run(async move {
                store
                    .put_opts(&path, payload, PutOptions::from(PutMode::Create))
                    .await
            })?;
        match created {
            Ok(_) => Ok(true),
            Err(object_store::Error::AlreadyExists { .. }) => Ok(false),
            Err(e) => Err(map_object_error(format!("create '{name}'"), e)),
        }
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        if !self.file_exists(name)? {
            return Err(SearchError::file_not_found("delete", name));
        }
        let path = Self::blob_path(name)?;
        let store = Arc::clone(&self.store);
        self.runtime
            .run(async move { store.delete(&path).await })?
            .map_err(|e| map_object_error(format!("delete '{name}'"), e))
    }

    fn try_lock(&self, name: &str) -> Result<Option<StorageLock>> {
        let path = Self::object_path(&lock_entry_name(name))?;
        let owner = uuid::Uuid::new_v4().to_string();

        let store = Arc::clone(&self.store);
        let (acquire_path, acquire_owner) = (path.clone(), owner.clone());
        let acquired = self
            .runtime
            .run(async move {
                lease::acquire(&store, &acquire_path, &acquire_owner, LEASE_DURATION).await
            })?
            .map_err(|e| map_object_error(format!("lock '{name}'"), e))?;
        let Some(version) = acquired else {
            return Ok(None);
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        self.runtime.handle()?.spawn(lease::renew(
            Arc::clone(&self.store),
            path.clone(),
            owner.clone(),
            LEASE_DURATION,
            version,
            stop_rx,
        ));

        let guard = LeaseGuard {
            store: Arc::clone(&self.store),
            runtime: Arc::clone(&self.runtime),
            path,
            owner,
            stop: Some(stop_tx),
        };
        Ok(Some(StorageLock::new(name, guard)))
    }
}

impl fmt::Debug for AzureBlobStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureBlobStorage")
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}
