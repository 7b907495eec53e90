//! kube-rs backed provisioner

use crate::error::{ProvisionError, ProvisionResult};
use crate::manifests::{self, requested_storage, storage_request, BundleTemplate, ResourceKind};
use crate::{ProvisionRequest, ResourceProvisioner};
use async_trait::async_trait;
use fleet_common::config::KubeSettings;
use fleet_common::{Quota, RetryPolicy, TenantId};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, PersistentVolumeClaim, Secret, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, DeleteParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Provisioner talking to the Kubernetes API server
pub struct KubeProvisioner {
    client: Client,
    template: BundleTemplate,
    call_timeout: Duration,
    retry: RetryPolicy,
}

impl KubeProvisioner {
    /// Connect using an explicit kubeconfig, or the in-cluster / default one.
    pub async fn connect(settings: &KubeSettings, base_domain: &str) -> ProvisionResult<Self> {
        let client = match &settings.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| ProvisionError::Client(format!("{}: {}", path.display(), e)))?;
                let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await
                    .map_err(|e| ProvisionError::Client(e.to_string()))?;
                Client::try_from(config).map_err(|e| ProvisionError::Client(e.to_string()))?
            }
            None => Client::try_default()
                .await
                .map_err(|e| ProvisionError::Client(e.to_string()))?,
        };

        Self::from_client(client, settings, base_domain).await
    }

    /// Wrap `client` and make sure the tenant namespace exists, so the first
    /// bundle never lands in a missing namespace.
    pub async fn from_client(client: Client, settings: &KubeSettings, base_domain: &str) -> ProvisionResult<Self> {
        let provisioner = Self::new(client, settings, base_domain);
        provisioner.ensure_namespace().await?;
        info!(namespace = %settings.namespace, "kubernetes client ready");
        Ok(provisioner)
    }

    pub fn new(client: Client, settings: &KubeSettings, base_domain: &str) -> Self {
        Self {
            client,
            template: BundleTemplate::new(settings, base_domain),
            call_timeout: settings.call_timeout(),
            retry: settings.retry.clone(),
        }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), &self.template.namespace)
    }

    async fn ensure_namespace(&self) -> ProvisionResult<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        self.ensure(&namespaces, &self.template.namespace(), "namespace").await
    }

    /// One API call with a deadline, retried while the failure is transient.
    async fn call<T, F, Fut>(&self, operation: &str, mut f: F) -> ProvisionResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProvisionResult<T>>,
    {
        let after = self.call_timeout;
        self.retry
            .run(operation, ProvisionError::is_transient, || {
                let attempt = f();
                async move {
                    match tokio::time::timeout(after, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(ProvisionError::Timeout {
                            operation: operation.to_string(),
                            after,
                        }),
                    }
                }
            })
            .await
    }

    /// Create `obj`; an existing object of the same name counts as created.
    async fn ensure<K>(&self, api: &Api<K>, obj: &K, kind: &str) -> ProvisionResult<()>
    where
        K: kube::Resource + Clone + Debug + Serialize + DeserializeOwned,
    {
        let name = obj.meta().name.as_deref().unwrap_or_default();
        let operation = format!("create {} {}", kind, name);
        let op = operation.as_str();

        self.call(op, move || async move {
            match api.create(&PostParams::default(), obj).await {
                Ok(_) => {
                    debug!(kind, name, "created");
                    Ok(())
                }
                Err(kube::Error::Api(ae)) if ae.code == 409 => {
                    debug!(kind, name, "already exists");
                    Ok(())
                }
                Err(e) => Err(ProvisionError::from_kube(op, e)),
            }
        })
        .await
    }

    /// Delete `name`; an object that is already gone counts as deleted.
    async fn remove<K>(&self, api: &Api<K>, name: &str, kind: ResourceKind) -> ProvisionResult<()>
    where
        K: kube::Resource + Clone + Debug + DeserializeOwned,
    {
        let operation = format!("delete {} {}", kind, name);
        let op = operation.as_str();

        self.call(op, move || async move {
            match api.delete(name, &DeleteParams::default()).await {
                Ok(_) => Ok(()),
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    debug!(%kind, name, "already gone");
                    Ok(())
                }
                Err(e) => Err(ProvisionError::from_kube(op, e)),
            }
        })
        .await
    }

    async fn remove_kind(&self, id: &TenantId, kind: ResourceKind) -> ProvisionResult<()> {
        let name = self.template.object_name(kind, id);
        match kind {
            ResourceKind::Ingress => self.remove(&self.api::<Ingress>(), &name, kind).await,
            ResourceKind::Service => self.remove(&self.api::<Service>(), &name, kind).await,
            ResourceKind::Deployment => self.remove(&self.api::<Deployment>(), &name, kind).await,
            ResourceKind::Secret | ResourceKind::TlsSecret => {
                self.remove(&self.api::<Secret>(), &name, kind).await
            }
            ResourceKind::Volume => self.remove(&self.api::<PersistentVolumeClaim>(), &name, kind).await,
        }
    }
}

#[async_trait]
impl ResourceProvisioner for KubeProvisioner {
    async fn create(&self, request: &ProvisionRequest) -> ProvisionResult<()> {
        let id = &request.id;
        let t = &self.template;

        self.ensure(&self.api::<Secret>(), &t.secret(id, &request.root), "secret")
            .await?;

        self.ensure_namespace().await?;

        self.ensure(&self.api::<Deployment>(), &t.deployment(id, &request.root), "deployment")
            .await?;
        self.ensure(&self.api::<Service>(), &t.service(id), "service").await?;
        self.ensure(&self.api::<Ingress>(), &t.ingress(id), "ingress").await?;
        self.ensure(&self.api::<PersistentVolumeClaim>(), &t.volume(id, &request.quota), "pvc")
            .await?;

        info!(tenant = %id, quota = %request.quota, "resource bundle created");
        Ok(())
    }

    async fn resize(&self, id: &TenantId, quota: &Quota) -> ProvisionResult<()> {
        let api = self.api::<PersistentVolumeClaim>();
        let api = &api;
        let name = manifests::volume_name(id);
        let name = name.as_str();
        let operation = format!("resize pvc {}", name);
        let op = operation.as_str();

        self.call(op, move || async move {
            let mut pvc = match api.get(name).await {
                Ok(pvc) => pvc,
                Err(kube::Error::Api(ae)) if ae.code == 404 => {
                    return Err(ProvisionError::Missing {
                        kind: "pvc",
                        name: name.to_string(),
                    })
                }
                Err(e) => return Err(ProvisionError::from_kube(op, e)),
            };

            match requested_storage(&pvc).map(Quota::parse) {
                Some(Ok(current)) if *quota < current => {
                    return Err(ProvisionError::Shrink {
                        id: id.clone(),
                        current: current.to_string(),
                        requested: quota.to_string(),
                    })
                }
                Some(Ok(current)) if *quota == current => {
                    debug!(tenant = %id, quota = %quota, "volume already at requested size");
                    return Ok(());
                }
                Some(Err(_)) => {
                    warn!(tenant = %id, "unrecognised storage request on claim, overwriting");
                }
                _ => {}
            }

            let spec = pvc.spec.get_or_insert_with(Default::default);
            let resources = spec.resources.get_or_insert_with(Default::default);
            resources.requests = Some(storage_request(quota));

            // 409 here means the claim moved underneath us; the retry re-reads it
            api.replace(name, &PostParams::default(), &pvc)
                .await
                .map(|_| ())
                .map_err(|e| ProvisionError::from_kube(op, e))
        })
        .await?;

        info!(tenant = %id, quota = %quota, "volume resized");
        Ok(())
    }

    async fn delete(&self, id: &TenantId) -> ProvisionResult<()> {
        let mut failures = Vec::new();
        for kind in ResourceKind::DELETE_ORDER {
            if let Err(e) = self.remove_kind(id, kind).await {
                warn!(tenant = %id, %kind, error = %e, "teardown step failed");
                failures.push(e);
            }
        }

        if failures.is_empty() {
            info!(tenant = %id, "resource bundle deleted");
            Ok(())
        } else {
            Err(ProvisionError::Teardown(failures))
        }
    }
}
