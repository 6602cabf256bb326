//! Sub-admin management, reserved for full admins
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

use crate::api::{Page, Pagination, SubAdminApi};
use crate::error::LifecycleError;
use crate::journal::{Journal, SubjectKind, note_committed};
use crate::permission::{Actor, NewSubAdmin, Permission, PermissionSet, SubAdmin, validate_permission_ids};
use crate::policy::{Action, authorize};
use crate::utils::is_blank;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A sub-admin removal that has been checked but not yet sent.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAdminRemoval {
    sub_admin: SubAdmin,
    actor: Actor,
}

impl SubAdminRemoval {
    pub fn sub_admin(&self) -> &SubAdmin {
        &self.sub_admin
    }

    pub fn prompt(&self) -> String {
        format!(
            "Remove sub-admin {} ({})? They will lose dashboard access.",
            self.sub_admin.name, self.sub_admin.email
        )
    }
}

pub struct SubAdminDirectory<A> {
    api: A,
    pagination: Pagination,
    catalogue: Mutex<Vec<Permission>>,
    list: Mutex<Page<SubAdmin>>,
    journal: Option<Journal>,
}

impl<A: SubAdminApi> SubAdminDirectory<A> {
    pub fn new(api: A, pagination: Pagination) -> Self {
        Self {
            api,
            pagination,
            catalogue: Mutex::new(Vec::new()),
            list: Mutex::new(Page::default()),
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn catalogue(&self) -> Vec<Permission> {
        lock(&self.catalogue).clone()
    }

    pub fn sub_admins(&self) -> Vec<SubAdmin> {
        lock(&self.list).data.clone()
    }

    pub fn sub_admin(&self, id: &str) -> Option<SubAdmin> {
        lock(&self.list).data.iter().find(|s| s.id == id).cloned()
    }

    /// Resolved grants of a listed sub-admin against the loaded catalogue.
    pub fn grants_of(&self, id: &str) -> Option<PermissionSet> {
        let sub_admin = self.sub_admin(id)?;
        Some(PermissionSet::resolve(&sub_admin.permission_ids, &self.catalogue()))
    }

    pub async fn load_permissions(&self, actor: &Actor) -> Result<usize, LifecycleError> {
        authorize(actor, Action::ManageSubAdmins)?;
        let permissions = self.api.list_permissions().await?;
        let count = permissions.len();
        *lock(&self.catalogue) = permissions;
        Ok(count)
    }

    pub async fn refresh(&self, actor: &Actor) -> Result<usize, LifecycleError> {
        authorize(actor, Action::ManageSubAdmins)?;
        let page = self.api.list_sub_admins(self.pagination).await?;
        let count = page.data.len();
        *lock(&self.list) = page;
        Ok(count)
    }

    /// Ids must be present in the catalogue, once it has been loaded.
    fn check_known(&self, permission_ids: &[String]) -> Result<(), LifecycleError> {
        validate_permission_ids(permission_ids)?;
        let catalogue = lock(&self.catalogue);
        if catalogue.is_empty() {
            return Ok(());
        }
        if let Some(unknown) = permission_ids
            .iter()
            .find(|id| !catalogue.iter().any(|p| p.id == **id))
        {
            return Err(LifecycleError::malformed(
                "permissions",
                format!("unknown permission id {unknown}"),
            ));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, actor, new), fields(email = %new.email))]
    pub async fn create(&self, actor: &Actor, new: &NewSubAdmin) -> Result<SubAdmin, LifecycleError> {
        authorize(actor, Action::ManageSubAdmins)?;
        new.validate()?;
        self.check_known(&new.permission_ids)?;

        let created = self.api.create_sub_admin(new).await.map_err(|e| {
            warn!(error = %e, "sub-admin creation rejected by server");
            LifecycleError::from(e)
        })?;
        {
            let mut list = lock(&self.list);
            list.data.push(created.clone());
            list.total += 1;
        }

        note_committed(
            self.journal.as_ref(),
            SubjectKind::SubAdmin,
            &created.id,
            actor,
            "absent",
            "active",
            "Sub-admin created",
        );
        info!(id = %created.id, "sub-admin created");
        Ok(created)
    }

    #[tracing::instrument(skip(self, actor, permission_ids))]
    pub async fn update_permissions(
        &self,
        actor: &Actor,
        id: &str,
        permission_ids: Vec<String>,
    ) -> Result<SubAdmin, LifecycleError> {
        authorize(actor, Action::ManageSubAdmins)?;
        let mut current = self
            .sub_admin(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        current.set_permissions(permission_ids)?;
        self.check_known(&current.permission_ids)?;

        let updated = self
            .api
            .update_sub_admin_permissions(id, &current.permission_ids)
            .await?;
        if let Some(slot) = lock(&self.list).data.iter_mut().find(|s| s.id == id) {
            *slot = updated.clone();
        }

        note_committed(
            self.journal.as_ref(),
            SubjectKind::SubAdmin,
            id,
            actor,
            "active",
            "active",
            &format!("Permissions set to {}", updated.permission_ids.join(",")),
        );
        Ok(updated)
    }

    pub fn prepare_delete(&self, actor: &Actor, id: &str) -> Result<SubAdminRemoval, LifecycleError> {
        authorize(actor, Action::ManageSubAdmins)?;
        let sub_admin = self
            .sub_admin(id)
            .ok_or_else(|| LifecycleError::NotFound(id.to_string()))?;
        Ok(SubAdminRemoval {
            sub_admin,
            actor: actor.clone(),
        })
    }

    #[tracing::instrument(skip(self, removal), fields(id = %removal.sub_admin.id))]
    pub async fn confirm_delete(&self, removal: SubAdminRemoval) -> Result<String, LifecycleError> {
        let SubAdminRemoval { sub_admin, actor } = removal;
        authorize(&actor, Action::ManageSubAdmins)?;

        let ack = self.api.delete_sub_admin(&sub_admin.id).await?;
        {
            let mut list = lock(&self.list);
            let before = list.data.len();
            list.data.retain(|s| s.id != sub_admin.id);
            if list.data.len() < before {
                list.total = list.total.saturating_sub(1);
            }
        }

        let message = ack
            .message
            .filter(|m| !is_blank(m))
            .unwrap_or_else(|| "Sub-admin deleted successfully".to_string());
        note_committed(
            self.journal.as_ref(),
            SubjectKind::SubAdmin,
            &sub_admin.id,
            &actor,
            "active",
            "deleted",
            &message,
        );
        Ok(message)
    }
}
