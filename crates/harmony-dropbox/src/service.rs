//! Dropbox implementation of [`ISyncService`]
//!
//! [`DropboxService`] owns the configuration, the cached property template
//! and the current [`Session`]. Each port operation snapshots what it needs
//! into an [`OperationContext`] and runs as its own Tokio task, so callers
//! can issue operations concurrently. Only schema negotiation is serialized.
//!
//! ## Session lifecycle
//!
//! 1. [`authenticate_with_token`](DropboxService::authenticate_with_token)
//!    or [`authenticate_in_background`](DropboxService::authenticate_in_background)
//!    verifies the account, creates the sync directory if needed and
//!    negotiates the property template with every known key.
//! 2. Only then is the session installed and the account id persisted.
//! 3. [`deauthenticate`](DropboxService::deauthenticate) drops the session
//!    and forgets the stored credentials.
//!
//! Operations started without a session fail with
//! [`ServiceError::NotAuthenticated`] before any request is made.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use futures_util::future::{self, Either};
use harmony_core::config::{Config, SyncConfig};
use harmony_core::domain::{
    Account, AuthenticationError, ChangeToken, LocalFile, MetadataKey, MetadataMap,
    MetadataUpdate, ObjectError, ObjectKind, PendingOperation, Progress, RemoteChanges,
    RemoteFile, RemoteRecord, ServiceError, SyncRecord, ValidationError, Version,
};
use harmony_core::ports::ISyncService;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::changes::{self, ListingScope};
use crate::client::DropboxClient;
use crate::credentials::CredentialStore;
use crate::paths::PathResolver;
use crate::schema::{PropertyTemplate, SchemaManager};
use crate::translate::{process, process_unit, translate};
use crate::wire::PathArg;
use crate::{files, records, versions};

/// Reverse-DNS identifier of the Dropbox service
pub const SERVICE_IDENTIFIER: &str = "com.rileytestut.Harmony.Dropbox";

/// Display name of the Dropbox service
pub const SERVICE_NAME: &str = "Dropbox";

#[derive(Debug, Deserialize)]
struct FullAccount {
    account_id: String,
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
struct CreateFolderArg<'a> {
    path: &'a str,
    autorename: bool,
}

// ============================================================================
// Session
// ============================================================================

/// An authenticated Dropbox connection
pub struct Session {
    client: Arc<DropboxClient>,
    account: Account,
}

impl Session {
    pub fn client(&self) -> &DropboxClient {
        &self.client
    }

    pub fn account(&self) -> &Account {
        &self.account
    }
}

/// Everything one operation needs, detached from the service
#[derive(Clone)]
pub(crate) struct OperationContext {
    pub client: Arc<DropboxClient>,
    pub schema: Arc<SchemaManager>,
    pub paths: PathResolver,
    pub sync: SyncConfig,
}

// ============================================================================
// DropboxService
// ============================================================================

/// Dropbox-backed sync service
pub struct DropboxService {
    config: Config,
    paths: PathResolver,
    schema: Arc<SchemaManager>,
    credentials: Arc<dyn CredentialStore>,
    session: RwLock<Option<Arc<Session>>>,
}

impl DropboxService {
    /// Creates an unauthenticated service
    pub fn new(config: Config, credentials: Arc<dyn CredentialStore>) -> Self {
        let paths = PathResolver::new(config.dropbox.directory_name.clone());
        let schema = Arc::new(SchemaManager::new(
            config.dropbox.template_name.clone(),
            config.dropbox.template_description.clone(),
        ));
        Self {
            config,
            paths,
            schema,
            credentials,
            session: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    /// The current session, if signed in
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session().is_some()
    }

    /// The signed-in account, if any
    pub fn account(&self) -> Option<Account> {
        self.session().map(|session| session.account.clone())
    }

    fn client_for(&self, access_token: &str) -> DropboxClient {
        DropboxClient::with_base_urls(
            access_token,
            &self.config.dropbox.api_base_url,
            &self.config.dropbox.content_base_url,
        )
    }

    fn install_session(&self, session: Option<Arc<Session>>) -> Option<Arc<Session>> {
        let mut slot = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *slot, session)
    }

    // ------------------------------------------------------------------------
    // Authentication
    // ------------------------------------------------------------------------

    /// Signs in with an access token obtained elsewhere
    ///
    /// On success the token is stored for later
    /// [`authenticate_in_background`](Self::authenticate_in_background) calls.
    pub async fn authenticate_with_token(
        &self,
        access_token: &str,
    ) -> Result<Account, AuthenticationError> {
        info!("Authenticating with access token");
        let client = self.client_for(access_token);
        self.finish_authentication(client, Some(access_token)).await
    }

    /// Restores the session of the last signed-in account
    ///
    /// Fails with [`AuthenticationError::NoSavedCredentials`] when no account
    /// id or no token for it is stored.
    pub async fn authenticate_in_background(&self) -> Result<Account, AuthenticationError> {
        let account_id = self
            .credentials
            .account_id()
            .await
            .map_err(credential_error)?
            .ok_or(AuthenticationError::NoSavedCredentials)?;

        let token = self
            .credentials
            .access_token(&account_id)
            .await
            .map_err(credential_error)?
            .ok_or(AuthenticationError::NoSavedCredentials)?;

        debug!(account_id = %account_id, "Restoring saved session");
        let client = self.client_for(&token);
        self.finish_authentication(client, None).await
    }

    /// Signs out and forgets the stored credentials
    pub async fn deauthenticate(&self) -> Result<(), AuthenticationError> {
        let previous = self.install_session(None);
        self.schema.invalidate().await;

        let account_id = match previous {
            Some(session) => Some(session.account.account_id.clone()),
            None => self.credentials.account_id().await.map_err(credential_error)?,
        };

        if let Some(account_id) = &account_id {
            self.credentials
                .clear_access_token(account_id)
                .await
                .map_err(credential_error)?;
        }
        self.credentials
            .set_account_id(None)
            .await
            .map_err(credential_error)?;

        info!(account_id = ?account_id, "Signed out of Dropbox");
        Ok(())
    }

    async fn finish_authentication(
        &self,
        client: DropboxClient,
        new_token: Option<&str>,
    ) -> Result<Account, AuthenticationError> {
        // A template belongs to one account; renegotiate for whoever signs in.
        self.schema.invalidate().await;

        let full_account: FullAccount =
            process(client.rpc("users/get_current_account", &()).await)?;

        self.create_sync_directory_if_needed(&client).await?;
        self.schema.ensure(&client, MetadataKey::ALL).await?;

        let account = Account {
            account_id: full_account.account_id,
            name: full_account.email,
        };

        if let Some(token) = new_token {
            self.credentials
                .store_access_token(&account.account_id, token)
                .await
                .map_err(credential_error)?;
        }
        self.credentials
            .set_account_id(Some(&account.account_id))
            .await
            .map_err(credential_error)?;

        self.install_session(Some(Arc::new(Session {
            client: Arc::new(client),
            account: account.clone(),
        })));

        info!(account_id = %account.account_id, name = %account.name, "Authenticated with Dropbox");
        Ok(account)
    }

    async fn create_sync_directory_if_needed(
        &self,
        client: &DropboxClient,
    ) -> Result<(), ServiceError> {
        let root = self.paths.root()?;

        match client
            .rpc_unit("files/get_metadata", &PathArg { path: &root })
            .await
        {
            Ok(()) => {
                debug!(path = %root, "Sync directory exists");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                info!(path = %root, "Creating sync directory");
                let arg = CreateFolderArg {
                    path: &root,
                    autorename: false,
                };
                process_unit(client.rpc_unit("files/create_folder_v2", &arg).await, None)
            }
            Err(e) => Err(translate(e, None)),
        }
    }

    // ------------------------------------------------------------------------
    // Operation plumbing
    // ------------------------------------------------------------------------

    fn context(&self) -> Result<OperationContext, ServiceError> {
        let session = self.session().ok_or(ServiceError::NotAuthenticated)?;
        Ok(OperationContext {
            client: Arc::clone(&session.client),
            schema: Arc::clone(&self.schema),
            paths: self.paths.clone(),
            sync: self.config.sync.clone(),
        })
    }

    /// Runs service-level `work`, failing fast when signed out
    fn spawn_service<T, F, Fut>(&self, work: F) -> PendingOperation<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(OperationContext, Progress) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let progress = Progress::discrete(1);
        let work = match self.context() {
            Ok(ctx) => Either::Left(work(ctx, progress.clone())),
            Err(e) => Either::Right(future::ready(Err(e))),
        };
        PendingOperation::spawn(progress, || ServiceError::Cancelled, work)
    }

    /// Runs `work` for one record or file, tagging failures with its identifier
    fn spawn_object<T, F, Fut>(
        &self,
        kind: ObjectKind,
        identifier: String,
        work: F,
    ) -> PendingOperation<T, ObjectError>
    where
        T: Send + 'static,
        F: FnOnce(OperationContext, Progress) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>> + Send + 'static,
    {
        let progress = Progress::discrete(1);
        let work = match self.context() {
            Ok(ctx) => Either::Left(work(ctx, progress.clone())),
            Err(e) => Either::Right(future::ready(Err(e))),
        };

        let abort_identifier = identifier.clone();
        PendingOperation::spawn(
            progress,
            move || ObjectError {
                kind,
                identifier: abort_identifier.clone(),
                source: ServiceError::Cancelled,
            },
            async move {
                work.await.map_err(|source| {
                    if !source.is_cancelled() {
                        warn!(kind = %kind, identifier = %identifier, error = %source, "Operation failed");
                    }
                    ObjectError {
                        kind,
                        identifier,
                        source,
                    }
                })
            },
        )
    }

    // ------------------------------------------------------------------------
    // Service-level extras
    // ------------------------------------------------------------------------

    /// Enumerates the sync directory, fully or from `resume_from`
    pub fn fetch_changes(
        &self,
        resume_from: Option<ChangeToken>,
    ) -> PendingOperation<RemoteChanges, ServiceError> {
        self.spawn_service(move |ctx, _| async move {
            enumerate_changes(&ctx, resume_from.as_ref()).await
        })
    }

    /// Lists prior revisions of the file at an arbitrary remote `path`
    pub fn list_versions(&self, path: &str) -> PendingOperation<Vec<Version>, ServiceError> {
        let path = path.to_string();
        self.spawn_service(move |ctx, _| async move {
            versions::list(&ctx.client, &path, &path, ctx.sync.version_limit).await
        })
    }

    /// Deletes the object at an arbitrary remote `path`
    pub fn delete_path(&self, path: &str) -> PendingOperation<(), ServiceError> {
        let path = path.to_string();
        self.spawn_service(move |ctx, _| async move {
            let outcome = ctx
                .client
                .rpc_unit("files/delete_v2", &PathArg { path: &path })
                .await;
            process_unit(outcome, Some(&path))?;
            info!(path = %path, "Deleted remote object");
            Ok(())
        })
    }

    /// Negotiates the property template for `keys` and returns it
    pub fn ensure_schema(
        &self,
        keys: Vec<MetadataKey>,
    ) -> PendingOperation<PropertyTemplate, ServiceError> {
        self.spawn_service(move |ctx, _| async move {
            ctx.schema.ensure(&ctx.client, keys).await?;
            ctx.schema.cached().await.ok_or(ServiceError::InvalidResponse)
        })
    }
}

async fn enumerate_changes(
    ctx: &OperationContext,
    resume_from: Option<&ChangeToken>,
) -> Result<RemoteChanges, ServiceError> {
    let cursor = resume_from.map(changes::decode_change_token).transpose()?;
    let root = ctx.paths.root()?;
    let template_id = ctx.schema.template_id(&ctx.client).await?;

    let scope = ListingScope {
        root: &root,
        template_id: &template_id,
        max_pages: ctx.sync.max_pages,
    };
    changes::enumerate(&ctx.client, &scope, cursor.as_deref()).await
}

fn credential_error(error: anyhow::Error) -> AuthenticationError {
    AuthenticationError::Other(ServiceError::connection_failed(error))
}

// ============================================================================
// ISyncService
// ============================================================================

impl ISyncService for DropboxService {
    fn identifier(&self) -> &str {
        SERVICE_IDENTIFIER
    }

    fn localized_name(&self) -> &str {
        SERVICE_NAME
    }

    fn fetch_all_remote_records(
        &self,
    ) -> PendingOperation<(HashSet<RemoteRecord>, ChangeToken), ServiceError> {
        self.spawn_service(|ctx, _| async move {
            let changes = enumerate_changes(&ctx, None).await?;
            Ok((changes.updated, changes.change_token))
        })
    }

    fn fetch_changed_remote_records(
        &self,
        change_token: &ChangeToken,
    ) -> PendingOperation<RemoteChanges, ServiceError> {
        self.fetch_changes(Some(change_token.clone()))
    }

    fn upload_record(
        &self,
        record: &SyncRecord,
        metadata: MetadataMap,
    ) -> PendingOperation<RemoteRecord, ObjectError> {
        let record = record.clone();
        self.spawn_object(
            ObjectKind::Record,
            record.record_id.to_string(),
            move |ctx, progress| async move {
                records::upload(&ctx, &record, &metadata, &progress).await
            },
        )
    }

    fn download_record(
        &self,
        record: &SyncRecord,
        version: &Version,
    ) -> PendingOperation<serde_json::Value, ObjectError> {
        let record = record.clone();
        let version = version.clone();
        self.spawn_object(
            ObjectKind::Record,
            record.record_id.to_string(),
            move |ctx, progress| async move {
                records::download(&ctx, &record, &version, &progress).await
            },
        )
    }

    fn delete_record(&self, record: &SyncRecord) -> PendingOperation<(), ObjectError> {
        let record = record.clone();
        self.spawn_object(
            ObjectKind::Record,
            record.record_id.to_string(),
            move |ctx, _| async move { records::delete(&ctx, &record).await },
        )
    }

    fn update_metadata(
        &self,
        record: &SyncRecord,
        metadata: MetadataUpdate,
    ) -> PendingOperation<(), ObjectError> {
        let record = record.clone();
        self.spawn_object(
            ObjectKind::Record,
            record.record_id.to_string(),
            move |ctx, _| async move { records::update_metadata(&ctx, &record, &metadata).await },
        )
    }

    fn fetch_versions(&self, record: &SyncRecord) -> PendingOperation<Vec<Version>, ObjectError> {
        let record_id = record.record_id.to_string();
        let remote = record.remote.clone();
        self.spawn_object(
            ObjectKind::Record,
            record_id.clone(),
            move |ctx, _| async move {
                let remote = remote.ok_or(ValidationError::NilRemoteRecord)?;
                versions::list(
                    &ctx.client,
                    remote.identifier(),
                    &record_id,
                    ctx.sync.version_limit,
                )
                .await
            },
        )
    }

    fn upload_file(
        &self,
        file: &LocalFile,
        record: &SyncRecord,
        metadata: MetadataMap,
    ) -> PendingOperation<RemoteFile, ObjectError> {
        let file = file.clone();
        let record_id = record.record_id.clone();
        self.spawn_object(
            ObjectKind::File,
            file.identifier.clone(),
            move |ctx, progress| async move {
                files::upload(&ctx, &file, &record_id, &metadata, &progress).await
            },
        )
    }

    fn download_file(&self, remote_file: &RemoteFile) -> PendingOperation<LocalFile, ObjectError> {
        let remote_file = remote_file.clone();
        self.spawn_object(
            ObjectKind::File,
            remote_file.identifier().to_string(),
            move |ctx, progress| async move { files::download(&ctx, &remote_file, &progress).await },
        )
    }

    fn delete_file(&self, remote_file: &RemoteFile) -> PendingOperation<(), ObjectError> {
        let remote_file = remote_file.clone();
        self.spawn_object(
            ObjectKind::File,
            remote_file.identifier().to_string(),
            move |ctx, _| async move { files::delete(&ctx, &remote_file).await },
        )
    }

    fn fetch_file_versions(
        &self,
        remote_file: &RemoteFile,
    ) -> PendingOperation<Vec<Version>, ObjectError> {
        let remote_file = remote_file.clone();
        self.spawn_object(
            ObjectKind::File,
            remote_file.identifier().to_string(),
            move |ctx, _| async move {
                versions::list(
                    &ctx.client,
                    remote_file.remote_identifier(),
                    remote_file.identifier(),
                    ctx.sync.version_limit,
                )
                .await
            },
        )
    }
}
