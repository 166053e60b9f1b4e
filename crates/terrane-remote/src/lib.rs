//! Remote run backend support for terrane.
//!
//! The remote backend hosts organizations and workspaces, accepts uploaded
//! configuration versions, queues runs with their plans, and stores every
//! persisted state as a numbered state version. This crate defines one trait
//! per remote resource collection, an in-memory [`MockClient`] that honours the
//! same contracts for tests, a [`RemoteStatePersister`] that stores state files
//! as state versions, and the [`RemoteConfig`] file describing which remote
//! workspace to use.

pub mod config;
pub mod mock;
pub mod state;
pub mod types;

pub use config::RemoteConfig;
pub use mock::{
    generate_id, MockClient, MockConfigurationVersions, MockOrganizations, MockPlans, MockRuns,
    MockStateVersions, MockWorkspaces, ARCHIVIST_URL,
};
pub use state::RemoteStatePersister;
pub use types::{
    ConfigurationStatus, ConfigurationVersion, ConfigurationVersionCreateOptions, Organization,
    OrganizationCreateOptions, OrganizationUpdateOptions, Plan, PlanStatus, Run,
    RunCreateOptions, RunStatus, StateVersion, StateVersionCreateOptions, Workspace,
    WorkspaceCreateOptions, WorkspaceLockOptions, WorkspaceUpdateOptions,
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("workspace {0} is already locked")]
    Locked(String),
    #[error("workspace {0} is not locked")]
    NotLocked(String),
    #[error("invalid upload: {0}")]
    InvalidUpload(String),
    #[error("failed to decode state payload: {0}")]
    Decode(String),
    #[error("run {id} is {status}; cannot {action}")]
    InvalidRunTransition {
        id: String,
        status: RunStatus,
        action: &'static str,
    },
    #[error("remote config error: {0}")]
    Config(String),
    #[error("remote client error: {0}")]
    Client(String),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::NotFound(_))
    }
}

/// Configuration versions: uploaded snapshots of a workspace's configuration.
pub trait ConfigurationVersions: Send + Sync {
    fn list(&self, workspace_id: &str) -> Result<Vec<ConfigurationVersion>, RemoteError>;

    /// Create a pending configuration version with a fresh upload URL.
    fn create(
        &self,
        workspace_id: &str,
        options: ConfigurationVersionCreateOptions,
    ) -> Result<ConfigurationVersion, RemoteError>;

    fn read(&self, id: &str) -> Result<ConfigurationVersion, RemoteError>;

    /// Upload a configuration archive to the URL returned by `create`.
    fn upload(&self, url: &str, archive: &[u8]) -> Result<(), RemoteError>;
}

pub trait Organizations: Send + Sync {
    fn list(&self) -> Result<Vec<Organization>, RemoteError>;

    fn create(&self, options: OrganizationCreateOptions) -> Result<Organization, RemoteError>;

    fn read(&self, name: &str) -> Result<Organization, RemoteError>;

    fn update(
        &self,
        name: &str,
        options: OrganizationUpdateOptions,
    ) -> Result<Organization, RemoteError>;

    fn delete(&self, name: &str) -> Result<(), RemoteError>;
}

pub trait Plans: Send + Sync {
    fn read(&self, id: &str) -> Result<Plan, RemoteError>;

    /// The plan's rendered log output.
    fn logs(&self, id: &str) -> Result<String, RemoteError>;
}

pub trait Runs: Send + Sync {
    /// Runs of a workspace, oldest first.
    fn list(&self, workspace_id: &str) -> Result<Vec<Run>, RemoteError>;

    fn create(&self, options: RunCreateOptions) -> Result<Run, RemoteError>;

    fn read(&self, id: &str) -> Result<Run, RemoteError>;

    fn apply(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError>;

    fn cancel(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError>;

    fn discard(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError>;
}

pub trait StateVersions: Send + Sync {
    /// State versions of a workspace, oldest first.
    fn list(&self, workspace_id: &str) -> Result<Vec<StateVersion>, RemoteError>;

    /// Store a new state version. The payload in `options.state` is base64.
    fn create(
        &self,
        workspace_id: &str,
        options: StateVersionCreateOptions,
    ) -> Result<StateVersion, RemoteError>;

    fn read(&self, id: &str) -> Result<StateVersion, RemoteError>;

    /// The latest state version of a workspace.
    fn current(&self, workspace_id: &str) -> Result<StateVersion, RemoteError>;

    /// Raw state file bytes behind a state version's download URL.
    fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError>;
}

pub trait Workspaces: Send + Sync {
    fn list(&self, organization: &str) -> Result<Vec<Workspace>, RemoteError>;

    fn create(
        &self,
        organization: &str,
        options: WorkspaceCreateOptions,
    ) -> Result<Workspace, RemoteError>;

    /// Look a workspace up by name.
    fn read(&self, organization: &str, name: &str) -> Result<Workspace, RemoteError>;

    fn update(
        &self,
        organization: &str,
        name: &str,
        options: WorkspaceUpdateOptions,
    ) -> Result<Workspace, RemoteError>;

    fn delete(&self, organization: &str, name: &str) -> Result<(), RemoteError>;

    fn lock(&self, id: &str, options: WorkspaceLockOptions) -> Result<Workspace, RemoteError>;

    fn unlock(&self, id: &str) -> Result<Workspace, RemoteError>;
}
