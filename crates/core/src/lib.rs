//! Domain core for the Greenlight approval backend.
//!
//! Everything transport- and storage-agnostic lives here: the chain policy
//! tables, the decision engine, the status projector, the workflow service,
//! and the ports that the `greenlight-db` and `greenlight-server` crates
//! implement or consume.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod policy;
pub mod workflow;

pub use audit::{AuditCategory, AuditEvent, AuditOutcome, AuditSink, TracingAuditSink};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use domain::actor::{ActorProfile, ChainRole};
pub use domain::entity::{
    ApprovalFlag, ApprovalState, Department, EntityId, EntityKind, FlagMap, OverallStatus,
};
pub use errors::{ActionError, WorkflowError};
pub use policy::{project, PolicyAction, PolicyDecision, PolicyEngine, PolicyTable};
pub use workflow::{
    ActionOutcome, ApprovalStore, CreateEntity, DirectoryError, IdentityDirectory, StoreError,
    WorkflowService,
};
