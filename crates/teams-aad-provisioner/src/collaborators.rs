//! Owner management for the app registration, always through Graph.

use std::sync::Arc;

use teams_aad_core::{ProvisionResult, RemoteStep};
use tracing::info;

use crate::{
    backend::{ApiError, DirectoryUser, OwnerDirectory},
    models::{AccessLevel, Collaborator, PermissionStatus},
    retry::RetryPolicy,
    telemetry::{self, EventAttributes},
};

const OP_LIST_OWNERS: &str = "listAadAppOwners";
const OP_ADD_OWNER: &str = "addAadAppOwner";
const OP_SIGNED_IN_USER: &str = "getSignedInUser";

pub struct CollaboratorService {
    directory: Arc<dyn OwnerDirectory>,
    retry: RetryPolicy,
    env: String,
    tenant: String,
}

impl CollaboratorService {
    pub fn new(
        directory: Arc<dyn OwnerDirectory>,
        retry: RetryPolicy,
        env: impl Into<String>,
        tenant: impl Into<String>,
    ) -> Self {
        Self {
            directory,
            retry,
            env: env.into(),
            tenant: tenant.into(),
        }
    }

    pub fn list_collaborators(&self, object_id: &str) -> ProvisionResult<Vec<Collaborator>> {
        let result = self.owners(object_id).map(|owners| {
            owners
                .into_iter()
                .map(|owner| Collaborator {
                    user_object_id: owner.id,
                    display_name: owner.display_name,
                    user_principal_name: owner.user_principal_name,
                })
                .collect()
        });
        self.report(telemetry::EVENT_LIST_COLLABORATOR, object_id, result)
    }

    pub fn check_permission(
        &self,
        object_id: &str,
        user_object_id: &str,
    ) -> ProvisionResult<PermissionStatus> {
        let result = self
            .is_owner(object_id, user_object_id)
            .map(|owner| status(object_id, user_object_id, owner));
        self.report(telemetry::EVENT_CHECK_PERMISSION, object_id, result)
    }

    /// Make `user_object_id` an owner; a user who already owns the app is left as is.
    pub fn grant_permission(
        &self,
        object_id: &str,
        user_object_id: &str,
    ) -> ProvisionResult<PermissionStatus> {
        let result = self.is_owner(object_id, user_object_id).and_then(|owner| {
            if owner {
                info!(target: "aad.provision", object_id, user_object_id, "user already owns AAD app");
            } else {
                self.call(OP_ADD_OWNER, RemoteStep::AddOwner, || {
                    self.directory.add_owner(object_id, user_object_id)
                })?;
                info!(target: "aad.audit", object_id, user_object_id, "added AAD app owner");
            }
            Ok(status(object_id, user_object_id, true))
        });
        self.report(telemetry::EVENT_GRANT_PERMISSION, object_id, result)
    }

    pub fn signed_in_user(&self) -> ProvisionResult<DirectoryUser> {
        self.call(OP_SIGNED_IN_USER, RemoteStep::GetSignedInUser, || {
            self.directory.signed_in_user()
        })
    }

    fn owners(&self, object_id: &str) -> ProvisionResult<Vec<DirectoryUser>> {
        self.call(OP_LIST_OWNERS, RemoteStep::ListOwners, || {
            self.directory.list_owners(object_id)
        })
    }

    fn is_owner(&self, object_id: &str, user_object_id: &str) -> ProvisionResult<bool> {
        Ok(self
            .owners(object_id)?
            .iter()
            .any(|owner| owner.id == user_object_id))
    }

    fn call<T, F>(&self, operation: &str, step: RemoteStep, call: F) -> ProvisionResult<T>
    where
        F: FnMut() -> Result<T, ApiError>,
    {
        self.retry
            .run(operation, call)
            .map_err(|err| err.into_provision(step))
    }

    fn report<T>(&self, event: &str, object_id: &str, result: ProvisionResult<T>) -> ProvisionResult<T> {
        let attrs = EventAttributes {
            env: &self.env,
            tenant: &self.tenant,
            app_id: Some(object_id),
            skip: false,
        };
        match &result {
            Ok(_) => telemetry::emit_success(event, &attrs),
            Err(err) => telemetry::emit_error(event, &attrs, err),
        }
        result
    }
}

fn status(object_id: &str, user_object_id: &str, owner: bool) -> PermissionStatus {
    PermissionStatus {
        object_id: object_id.to_string(),
        user_object_id: user_object_id.to_string(),
        access: if owner {
            AccessLevel::Owner
        } else {
            AccessLevel::NoPermission
        },
    }
}
