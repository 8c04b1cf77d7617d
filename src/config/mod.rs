//! Config Pipeline component: configuration templates,
//! numbered versions, and deployment tracking.

pub mod model;
pub mod pipeline;
pub mod store;

pub use model::{
    ConfigTemplate, Deployment, DeploymentListOptions, DeploymentStatus, TemplateListOptions,
    Version, VersionStatus,
};
pub use pipeline::ConfigPipeline;
pub use store::{
    DeploymentStore, DeploymentStoreError, InMemoryDeploymentStore, InMemoryTemplateStore,
    TemplateStore, TemplateStoreError,
};
