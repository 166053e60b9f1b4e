//! In-memory remote backend for tests.
//!
//! Every collection keeps its data behind one mutex and hands out clones, so a
//! value read back is equal to the value that was created, never a live view.

use crate::types::{
    ConfigurationStatus, ConfigurationVersion, ConfigurationVersionCreateOptions, Organization,
    OrganizationCreateOptions, OrganizationUpdateOptions, Plan, PlanStatus, Run,
    RunCreateOptions, RunStatus, StateVersion, StateVersionCreateOptions, Workspace,
    WorkspaceCreateOptions, WorkspaceLockOptions, WorkspaceUpdateOptions,
};
use crate::{
    ConfigurationVersions, Organizations, Plans, RemoteError, Runs, StateVersions, Workspaces,
};
use base64::Engine as _;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Base of every upload, download and log URL the mock hands out.
pub const ARCHIVIST_URL: &str = "https://app.terraform.io/_archivist";

const ID_LEN: usize = 16;

const PLAN_LOG: &str = "\
Refreshing state in-memory prior to plan...
The refreshed state will be used to calculate this plan, but will not be
persisted to local or remote state storage.


------------------------------------------------------------------------

An execution plan has been generated and is shown below.
Resource actions are indicated with the following symbols:
  + create

The following actions will be performed:

  + null_resource.hello
      id: <computed>


Plan: 1 to add, 0 to change, 0 to destroy.";

/// `prefix` followed by 16 random alphanumeric characters.
///
/// Collisions are possible in principle; only the mock uses these.
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}")
}

fn archivist_url(id: &str) -> String {
    format!("{ARCHIVIST_URL}/{id}")
}

fn guard<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>, RemoteError> {
    m.lock()
        .map_err(|e| RemoteError::Client(format!("mutex poisoned: {e}")))
}

/// All mocked collections of one remote backend.
#[derive(Debug, Default, Clone)]
pub struct MockClient {
    pub configuration_versions: Arc<MockConfigurationVersions>,
    pub organizations: Arc<MockOrganizations>,
    pub plans: Arc<MockPlans>,
    pub runs: Arc<MockRuns>,
    pub state_versions: Arc<MockStateVersions>,
    pub workspaces: Arc<MockWorkspaces>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default)]
struct ConfigurationVersionsInner {
    versions: HashMap<String, ConfigurationVersion>,
    upload_urls: HashMap<String, String>,
    by_workspace: HashMap<String, Vec<String>>,
    archives: HashMap<String, Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct MockConfigurationVersions {
    inner: Mutex<ConfigurationVersionsInner>,
}

impl MockConfigurationVersions {
    /// The archive uploaded for a configuration version, if any.
    pub fn archive(&self, id: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        Ok(guard(&self.inner)?.archives.get(id).cloned())
    }
}

impl ConfigurationVersions for MockConfigurationVersions {
    fn list(&self, workspace_id: &str) -> Result<Vec<ConfigurationVersion>, RemoteError> {
        let inner = guard(&self.inner)?;
        let ids = inner.by_workspace.get(workspace_id).map_or(&[][..], Vec::as_slice);
        Ok(ids
            .iter()
            .filter_map(|id| inner.versions.get(id).cloned())
            .collect())
    }

    fn create(
        &self,
        workspace_id: &str,
        options: ConfigurationVersionCreateOptions,
    ) -> Result<ConfigurationVersion, RemoteError> {
        let id = generate_id("cv-");
        let cv = ConfigurationVersion {
            id: id.clone(),
            status: ConfigurationStatus::Pending,
            upload_url: archivist_url(&id),
            speculative: options.speculative,
            created_at: Utc::now(),
        };
        let mut inner = guard(&self.inner)?;
        inner.upload_urls.insert(cv.upload_url.clone(), id.clone());
        inner
            .by_workspace
            .entry(workspace_id.to_owned())
            .or_default()
            .push(id.clone());
        inner.versions.insert(id, cv.clone());
        debug!("created configuration version {} for {workspace_id}", cv.id);
        Ok(cv)
    }

    fn read(&self, id: &str) -> Result<ConfigurationVersion, RemoteError> {
        guard(&self.inner)?
            .versions
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("configuration version {id}")))
    }

    fn upload(&self, url: &str, archive: &[u8]) -> Result<(), RemoteError> {
        let mut inner = guard(&self.inner)?;
        let id = inner
            .upload_urls
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("upload URL {url}")))?;
        let cv = inner
            .versions
            .get_mut(&id)
            .ok_or_else(|| RemoteError::NotFound(format!("configuration version {id}")))?;
        if cv.status != ConfigurationStatus::Pending {
            return Err(RemoteError::InvalidUpload(format!(
                "configuration version {id} was already uploaded"
            )));
        }
        cv.status = ConfigurationStatus::Uploaded;
        inner.archives.insert(id, archive.to_vec());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockOrganizations {
    inner: Mutex<HashMap<String, Organization>>,
}

impl Organizations for MockOrganizations {
    fn list(&self) -> Result<Vec<Organization>, RemoteError> {
        let mut orgs: Vec<Organization> = guard(&self.inner)?.values().cloned().collect();
        orgs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(orgs)
    }

    fn create(&self, options: OrganizationCreateOptions) -> Result<Organization, RemoteError> {
        let org = Organization {
            name: options.name,
            email: options.email,
            created_at: Utc::now(),
        };
        guard(&self.inner)?.insert(org.name.clone(), org.clone());
        Ok(org)
    }

    fn read(&self, name: &str) -> Result<Organization, RemoteError> {
        guard(&self.inner)?
            .get(name)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("organization {name}")))
    }

    fn update(
        &self,
        name: &str,
        options: OrganizationUpdateOptions,
    ) -> Result<Organization, RemoteError> {
        let mut inner = guard(&self.inner)?;
        let mut org = inner
            .remove(name)
            .ok_or_else(|| RemoteError::NotFound(format!("organization {name}")))?;
        if let Some(new_name) = options.name {
            org.name = new_name;
        }
        if options.email.is_some() {
            org.email = options.email;
        }
        inner.insert(org.name.clone(), org.clone());
        Ok(org)
    }

    fn delete(&self, name: &str) -> Result<(), RemoteError> {
        guard(&self.inner)?.remove(name);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockPlans {
    inner: Mutex<HashMap<String, Plan>>,
}

impl Plans for MockPlans {
    /// Unknown plans are fabricated as finished, as if a worker had already
    /// completed them.
    fn read(&self, id: &str) -> Result<Plan, RemoteError> {
        let mut inner = guard(&self.inner)?;
        let plan = inner.entry(id.to_owned()).or_insert_with(|| Plan {
            id: id.to_owned(),
            status: PlanStatus::Finished,
            log_read_url: Some(archivist_url(id)),
        });
        Ok(plan.clone())
    }

    fn logs(&self, _id: &str) -> Result<String, RemoteError> {
        Ok(PLAN_LOG.to_owned())
    }
}

#[derive(Debug, Default)]
struct RunsInner {
    runs: HashMap<String, Run>,
    by_workspace: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MockRuns {
    inner: Mutex<RunsInner>,
}

impl MockRuns {
    fn transition(
        &self,
        id: &str,
        action: &'static str,
        apply: impl FnOnce(&mut Run),
    ) -> Result<(), RemoteError> {
        let mut inner = guard(&self.inner)?;
        let run = inner
            .runs
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(format!("run {id}")))?;
        if run.status.is_final() {
            return Err(RemoteError::InvalidRunTransition {
                id: id.to_owned(),
                status: run.status,
                action,
            });
        }
        apply(run);
        debug!("run {id} is now {}", run.status);
        Ok(())
    }
}

impl Runs for MockRuns {
    fn list(&self, workspace_id: &str) -> Result<Vec<Run>, RemoteError> {
        let inner = guard(&self.inner)?;
        let ids = inner.by_workspace.get(workspace_id).map_or(&[][..], Vec::as_slice);
        Ok(ids
            .iter()
            .filter_map(|id| inner.runs.get(id).cloned())
            .collect())
    }

    fn create(&self, options: RunCreateOptions) -> Result<Run, RemoteError> {
        let run = Run {
            id: generate_id("run-"),
            status: RunStatus::Pending,
            plan: Plan {
                id: generate_id("plan-"),
                status: PlanStatus::Pending,
                log_read_url: None,
            },
            workspace_id: options.workspace_id,
            configuration_version_id: options.configuration_version_id,
            message: options.message,
            is_destroy: options.is_destroy,
            created_at: Utc::now(),
        };
        let mut inner = guard(&self.inner)?;
        inner
            .by_workspace
            .entry(run.workspace_id.clone())
            .or_default()
            .push(run.id.clone());
        inner.runs.insert(run.id.clone(), run.clone());
        Ok(run)
    }

    fn read(&self, id: &str) -> Result<Run, RemoteError> {
        guard(&self.inner)?
            .runs
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("run {id}")))
    }

    fn apply(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError> {
        if let Some(comment) = comment {
            debug!("applying run {id}: {comment}");
        }
        self.transition(id, "apply", |run| {
            run.status = RunStatus::Applied;
            run.plan.status = PlanStatus::Finished;
        })
    }

    fn cancel(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError> {
        if let Some(comment) = comment {
            debug!("canceling run {id}: {comment}");
        }
        self.transition(id, "cancel", |run| {
            run.status = RunStatus::Canceled;
            if run.plan.status != PlanStatus::Finished {
                run.plan.status = PlanStatus::Canceled;
            }
        })
    }

    fn discard(&self, id: &str, comment: Option<&str>) -> Result<(), RemoteError> {
        if let Some(comment) = comment {
            debug!("discarding run {id}: {comment}");
        }
        self.transition(id, "discard", |run| run.status = RunStatus::Discarded)
    }
}

#[derive(Debug, Default)]
struct StateVersionsInner {
    payloads: HashMap<String, Vec<u8>>,
    versions: HashMap<String, StateVersion>,
    by_workspace: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default)]
pub struct MockStateVersions {
    inner: Mutex<StateVersionsInner>,
}

impl StateVersions for MockStateVersions {
    fn list(&self, workspace_id: &str) -> Result<Vec<StateVersion>, RemoteError> {
        let inner = guard(&self.inner)?;
        let ids = inner.by_workspace.get(workspace_id).map_or(&[][..], Vec::as_slice);
        Ok(ids
            .iter()
            .filter_map(|id| inner.versions.get(id).cloned())
            .collect())
    }

    fn create(
        &self,
        workspace_id: &str,
        options: StateVersionCreateOptions,
    ) -> Result<StateVersion, RemoteError> {
        let payload = base64::engine::general_purpose::STANDARD
            .decode(options.state.as_bytes())
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let id = generate_id("sv-");
        let sv = StateVersion {
            id: id.clone(),
            serial: options.serial,
            lineage: options.lineage,
            download_url: archivist_url(&id),
            created_at: Utc::now(),
        };
        let mut inner = guard(&self.inner)?;
        inner.payloads.insert(sv.download_url.clone(), payload);
        inner
            .by_workspace
            .entry(workspace_id.to_owned())
            .or_default()
            .push(id.clone());
        inner.versions.insert(id, sv.clone());
        debug!(
            "stored state version {} serial {} for {workspace_id}",
            sv.id, sv.serial
        );
        Ok(sv)
    }

    fn read(&self, id: &str) -> Result<StateVersion, RemoteError> {
        guard(&self.inner)?
            .versions
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("state version {id}")))
    }

    fn current(&self, workspace_id: &str) -> Result<StateVersion, RemoteError> {
        let inner = guard(&self.inner)?;
        inner
            .by_workspace
            .get(workspace_id)
            .and_then(|ids| ids.last())
            .and_then(|id| inner.versions.get(id))
            .cloned()
            .ok_or_else(|| {
                RemoteError::NotFound(format!("current state version of {workspace_id}"))
            })
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        guard(&self.inner)?
            .payloads
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(format!("state download {url}")))
    }
}

#[derive(Debug, Default)]
struct WorkspacesInner {
    by_id: HashMap<String, Workspace>,
    /// (organization, name) to id
    names: HashMap<(String, String), String>,
}

impl WorkspacesInner {
    fn by_name(&mut self, organization: &str, name: &str) -> Result<&mut Workspace, RemoteError> {
        let id = self
            .names
            .get(&(organization.to_owned(), name.to_owned()))
            .ok_or_else(|| RemoteError::NotFound(format!("workspace {organization}/{name}")))?;
        self.by_id
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(format!("workspace {organization}/{name}")))
    }

    fn by_id(&mut self, id: &str) -> Result<&mut Workspace, RemoteError> {
        self.by_id
            .get_mut(id)
            .ok_or_else(|| RemoteError::NotFound(format!("workspace {id}")))
    }
}

#[derive(Debug, Default)]
pub struct MockWorkspaces {
    inner: Mutex<WorkspacesInner>,
}

impl Workspaces for MockWorkspaces {
    fn list(&self, organization: &str) -> Result<Vec<Workspace>, RemoteError> {
        let mut ws: Vec<Workspace> = guard(&self.inner)?
            .by_id
            .values()
            .filter(|w| w.organization == organization)
            .cloned()
            .collect();
        ws.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(ws)
    }

    fn create(
        &self,
        organization: &str,
        options: WorkspaceCreateOptions,
    ) -> Result<Workspace, RemoteError> {
        let ws = Workspace {
            id: generate_id("ws-"),
            name: options.name,
            organization: organization.to_owned(),
            terraform_version: options.terraform_version,
            locked: false,
            lock_reason: None,
            created_at: Utc::now(),
        };
        let mut inner = guard(&self.inner)?;
        inner
            .names
            .insert((organization.to_owned(), ws.name.clone()), ws.id.clone());
        inner.by_id.insert(ws.id.clone(), ws.clone());
        Ok(ws)
    }

    fn read(&self, organization: &str, name: &str) -> Result<Workspace, RemoteError> {
        guard(&self.inner)?
            .by_name(organization, name)
            .cloned()
    }

    fn update(
        &self,
        organization: &str,
        name: &str,
        options: WorkspaceUpdateOptions,
    ) -> Result<Workspace, RemoteError> {
        let mut inner = guard(&self.inner)?;
        let ws = inner.by_name(organization, name)?;
        if let Some(version) = options.terraform_version {
            ws.terraform_version = Some(version);
        }
        let Some(new_name) = options.name else {
            return Ok(ws.clone());
        };
        ws.name.clone_from(&new_name);
        let updated = ws.clone();
        inner
            .names
            .remove(&(organization.to_owned(), name.to_owned()));
        inner
            .names
            .insert((organization.to_owned(), new_name), updated.id.clone());
        Ok(updated)
    }

    fn delete(&self, organization: &str, name: &str) -> Result<(), RemoteError> {
        let mut inner = guard(&self.inner)?;
        if let Some(id) = inner
            .names
            .remove(&(organization.to_owned(), name.to_owned()))
        {
            inner.by_id.remove(&id);
        }
        Ok(())
    }

    fn lock(&self, id: &str, options: WorkspaceLockOptions) -> Result<Workspace, RemoteError> {
        let mut inner = guard(&self.inner)?;
        let ws = inner.by_id(id)?;
        if ws.locked {
            return Err(RemoteError::Locked(id.to_owned()));
        }
        ws.locked = true;
        ws.lock_reason = options.reason;
        Ok(ws.clone())
    }

    fn unlock(&self, id: &str) -> Result<Workspace, RemoteError> {
        let mut inner = guard(&self.inner)?;
        let ws = inner.by_id(id)?;
        if !ws.locked {
            return Err(RemoteError::NotLocked(id.to_owned()));
        }
        ws.locked = false;
        ws.lock_reason = None;
        Ok(ws.clone())
    }
}
