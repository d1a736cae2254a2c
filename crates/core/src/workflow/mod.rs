pub mod ports;
pub mod service;

pub use ports::{
    ApprovalStore, DirectoryError, IdentityDirectory, InMemoryApprovalStore,
    InMemoryIdentityDirectory, StoreError,
};
pub use service::{ActionOutcome, CreateEntity, WorkflowService};
