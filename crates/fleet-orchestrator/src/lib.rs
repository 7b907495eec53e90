//! Tenant lifecycle orchestrator
//!
//! Composes the record store, the cluster provisioner and the tenant
//! configurator into Create / Resize / Delete and owns the status machine.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                     LIFECYCLE ORCHESTRATOR                          │
//! │                                                                     │
//! │   create ──► Provisioning ──► (provision, configure) ──► Ready      │
//! │                   │                                       │  ▲      │
//! │                   └──────────────► Error ◄── Resizing ◄───┘  │      │
//! │                                                  └───────────┘      │
//! │                                                                     │
//! │  ┌─────────────┐   ┌──────────────┐   ┌──────────────────────────┐  │
//! │  │ TenantLocks │   │  Supervisor  │   │ RecordStore (truth)      │  │
//! │  │ per-id gate │   │ bg workflows │   │ Provisioner/Configurator │  │
//! │  └─────────────┘   └──────────────┘   └──────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Record existence is the truth: a Delete removes the record at once and
//! the cluster catches up in the background.

pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod supervisor;

pub use error::{LifecycleError, LifecycleResult};
pub use lifecycle::{CreateRequest, CreatedInstance, LifecycleDeps, LifecycleOrchestrator, ResizeRequest};
pub use locks::{TenantGuard, TenantLocks};
pub use supervisor::WorkflowSupervisor;
