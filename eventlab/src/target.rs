//! The placeholder object events are attached to
use k8s_openapi::{
    api::core::v1::{ConfigMap, ObjectReference},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client, Resource, ResourceExt,
};
use tracing::info;

use crate::{Error, LabConfig, Result};

/// A `ConfigMap` created by the producer for the lifetime of a run
#[derive(Clone, Debug)]
pub struct TargetObject {
    /// Namespace of the object
    pub namespace: String,
    /// Name of the object
    pub name: String,
    /// Uid assigned by the apiserver
    pub uid: String,
    object: ConfigMap,
}

impl TargetObject {
    /// Create the target described by `config`
    ///
    /// An object left behind by an earlier run is not adopted: a conflict is
    /// returned as [`Error::TargetExists`].
    pub async fn create(client: Client, config: &LabConfig) -> Result<Self> {
        let api: Api<ConfigMap> = Api::namespaced(client, &config.target_namespace);
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some(config.target_name.clone()),
                namespace: Some(config.target_namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = match api.create(&PostParams::default(), &cm).await {
            Ok(o) => o,
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                return Err(Error::TargetExists {
                    namespace: config.target_namespace.clone(),
                    name: config.target_name.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };
        let name = object.name_any();
        let uid = object.uid().ok_or_else(|| Error::MissingUid(name.clone()))?;
        info!(namespace = %config.target_namespace, %name, %uid, "created target");
        Ok(Self {
            namespace: config.target_namespace.clone(),
            name,
            uid,
            object,
        })
    }

    /// The reference events about this object point at
    pub fn reference(&self) -> ObjectReference {
        self.object.object_ref(&())
    }

    /// Delete the object
    pub async fn delete(&self, client: Client) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(client, &self.namespace);
        api.delete(&self.name, &DeleteParams::default()).await?;
        Ok(())
    }
}
