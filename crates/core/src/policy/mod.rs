pub mod engine;
pub mod projector;
pub mod table;

pub use engine::{PolicyAction, PolicyDecision, PolicyEngine};
pub use projector::project;
pub use table::{Applicability, ChainStep, Dependency, EntityChain, PolicyTable};
