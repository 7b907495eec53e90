//! Bundle manifests
//!
//! Pure builders: no I/O, so the object shapes can be checked in tests.

use fleet_common::config::KubeSettings;
use fleet_common::{public_host, Quota, RootCredentials, TenantId};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction, Namespace, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, Secret, SecretKeySelector, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule, IngressServiceBackend,
    IngressSpec, IngressTLS, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use std::fmt;

pub const MINIO_PORT: i32 = 9000;
pub const ROOT_PASSWORD_KEY: &str = "rootPassword";
const DATA_VOLUME: &str = "data";
const MANAGED_BY: (&str, &str) = ("app.kubernetes.io/managed-by", "miniofleet");

/// One object of a tenant bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Secret,
    Deployment,
    Service,
    Ingress,
    Volume,
    /// Issued by cert-manager; only ever deleted by us
    TlsSecret,
}

impl ResourceKind {
    /// Objects created for a tenant, in creation order
    pub const CREATE_ORDER: [ResourceKind; 5] =
        [Self::Secret, Self::Deployment, Self::Service, Self::Ingress, Self::Volume];

    /// Objects removed on teardown, in deletion order
    pub const DELETE_ORDER: [ResourceKind; 6] = [
        Self::Ingress,
        Self::Service,
        Self::Deployment,
        Self::Secret,
        Self::TlsSecret,
        Self::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "secret",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::Ingress => "ingress",
            Self::Volume => "pvc",
            Self::TlsSecret => "tls secret",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn secret_name(id: &TenantId) -> String {
    format!("{}-minio-secrets", id)
}

pub fn deployment_name(id: &TenantId) -> String {
    format!("{}-minio-deployment", id)
}

pub fn service_name(id: &TenantId) -> String {
    format!("s-{}-minio-service", id)
}

pub fn ingress_name(id: &TenantId) -> String {
    format!("{}-minio-ingress", id)
}

pub fn volume_name(id: &TenantId) -> String {
    format!("{}-minio-pvc", id)
}

pub fn app_label(id: &TenantId) -> String {
    format!("{}minio", id)
}

/// Fleet-wide parameters shared by every tenant bundle
#[derive(Debug, Clone)]
pub struct BundleTemplate {
    pub namespace: String,
    pub base_domain: String,
    pub image: String,
    pub cluster_issuer: String,
    pub storage_class: String,
    pub ingress_class: String,
}

impl BundleTemplate {
    pub fn new(settings: &KubeSettings, base_domain: &str) -> Self {
        Self {
            namespace: settings.namespace.clone(),
            base_domain: base_domain.to_string(),
            image: settings.minio_image.clone(),
            cluster_issuer: settings.cluster_issuer.clone(),
            storage_class: settings.storage_class.clone(),
            ingress_class: settings.ingress_class.clone(),
        }
    }

    pub fn host(&self, id: &TenantId) -> String {
        public_host(id, &self.base_domain)
    }

    pub fn tls_secret_name(&self, id: &TenantId) -> String {
        format!("{}-tls", self.host(id))
    }

    /// Object name of `kind` for tenant `id`
    pub fn object_name(&self, kind: ResourceKind, id: &TenantId) -> String {
        match kind {
            ResourceKind::Secret => secret_name(id),
            ResourceKind::Deployment => deployment_name(id),
            ResourceKind::Service => service_name(id),
            ResourceKind::Ingress => ingress_name(id),
            ResourceKind::Volume => volume_name(id),
            ResourceKind::TlsSecret => self.tls_secret_name(id),
        }
    }

    fn metadata(&self, name: String, id: &TenantId) -> ObjectMeta {
        ObjectMeta {
            name: Some(name),
            namespace: Some(self.namespace.clone()),
            labels: Some(BTreeMap::from([
                ("app".to_string(), app_label(id)),
                (MANAGED_BY.0.to_string(), MANAGED_BY.1.to_string()),
            ])),
            ..Default::default()
        }
    }

    pub fn namespace(&self) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(self.namespace.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Opaque secret carrying the root password
    pub fn secret(&self, id: &TenantId, root: &RootCredentials) -> Secret {
        Secret {
            metadata: self.metadata(secret_name(id), id),
            type_: Some("Opaque".to_string()),
            string_data: Some(BTreeMap::from([(ROOT_PASSWORD_KEY.to_string(), root.password.clone())])),
            ..Default::default()
        }
    }

    pub fn deployment(&self, id: &TenantId, root: &RootCredentials) -> Deployment {
        let labels = BTreeMap::from([("app".to_string(), app_label(id))]);

        let container = Container {
            name: format!("{}-minio", id),
            image: Some(self.image.clone()),
            args: Some(vec!["server".to_string(), "/data".to_string()]),
            env: Some(vec![
                EnvVar {
                    name: "MINIO_ROOT_USER".to_string(),
                    value: Some(root.user.clone()),
                    ..Default::default()
                },
                EnvVar {
                    name: "MINIO_ROOT_PASSWORD".to_string(),
                    value_from: Some(EnvVarSource {
                        secret_key_ref: Some(SecretKeySelector {
                            name: Some(secret_name(id)),
                            key: ROOT_PASSWORD_KEY.to_string(),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
            ]),
            ports: Some(vec![ContainerPort {
                container_port: MINIO_PORT,
                ..Default::default()
            }]),
            resources: Some(ResourceRequirements {
                requests: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("100m".to_string())),
                    ("memory".to_string(), Quantity("256Mi".to_string())),
                ])),
                limits: Some(BTreeMap::from([
                    ("cpu".to_string(), Quantity("1".to_string())),
                    ("memory".to_string(), Quantity("1Gi".to_string())),
                ])),
                ..Default::default()
            }),
            liveness_probe: Some(http_probe("/minio/health/live", 10, 10)),
            readiness_probe: Some(http_probe("/minio/health/ready", 5, 5)),
            volume_mounts: Some(vec![VolumeMount {
                name: DATA_VOLUME.to_string(),
                mount_path: "/data".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        Deployment {
            metadata: self.metadata(deployment_name(id), id),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(labels.clone()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        automount_service_account_token: Some(false),
                        containers: vec![container],
                        volumes: Some(vec![Volume {
                            name: DATA_VOLUME.to_string(),
                            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                                claim_name: volume_name(id),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn service(&self, id: &TenantId) -> Service {
        Service {
            metadata: self.metadata(service_name(id), id),
            spec: Some(ServiceSpec {
                selector: Some(BTreeMap::from([("app".to_string(), app_label(id))])),
                ports: Some(vec![ServicePort {
                    protocol: Some("TCP".to_string()),
                    port: MINIO_PORT,
                    target_port: Some(IntOrString::Int(MINIO_PORT)),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn ingress(&self, id: &TenantId) -> Ingress {
        let host = self.host(id);

        let mut metadata = self.metadata(ingress_name(id), id);
        metadata.annotations = Some(BTreeMap::from([
            ("cert-manager.io/cluster-issuer".to_string(), self.cluster_issuer.clone()),
            ("nginx.ingress.kubernetes.io/proxy-body-size".to_string(), "0".to_string()),
            ("nginx.ingress.kubernetes.io/proxy-buffering".to_string(), "off".to_string()),
            ("nginx.ingress.kubernetes.io/ignore-invalid-headers".to_string(), "off".to_string()),
        ]));

        Ingress {
            metadata,
            spec: Some(IngressSpec {
                ingress_class_name: Some(self.ingress_class.clone()),
                rules: Some(vec![IngressRule {
                    host: Some(host.clone()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: service_name(id),
                                    port: Some(ServiceBackendPort {
                                        number: Some(MINIO_PORT),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                tls: Some(vec![IngressTLS {
                    hosts: Some(vec![host]),
                    secret_name: Some(self.tls_secret_name(id)),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    pub fn volume(&self, id: &TenantId, quota: &Quota) -> PersistentVolumeClaim {
        PersistentVolumeClaim {
            metadata: self.metadata(volume_name(id), id),
            spec: Some(PersistentVolumeClaimSpec {
                access_modes: Some(vec!["ReadWriteOnce".to_string()]),
                storage_class_name: Some(self.storage_class.clone()),
                resources: Some(ResourceRequirements {
                    requests: Some(storage_request(quota)),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

pub(crate) fn storage_request(quota: &Quota) -> BTreeMap<String, Quantity> {
    BTreeMap::from([("storage".to_string(), Quantity(quota.to_string()))])
}

/// Storage request currently recorded on a claim
pub(crate) fn requested_storage(pvc: &PersistentVolumeClaim) -> Option<&str> {
    pvc.spec
        .as_ref()?
        .resources
        .as_ref()?
        .requests
        .as_ref()?
        .get("storage")
        .map(|q| q.0.as_str())
}

fn http_probe(path: &str, initial_delay: i32, period: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(MINIO_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..Default::default()
    }
}
