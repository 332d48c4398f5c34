//! Nebula Plan
//!
//! This crate contains the declarative plan model for nebula: variables,
//! actions and workflows, parsed from a YAML document.
//!
//! A plan is immutable after parse. Loading performs structural decoding
//! only; references from a workflow to its actions are checked when a
//! workflow is resolved for execution (see `nebula-engine`), or on demand
//! through [`Plan::validate`].
//!
//! ```yaml
//! version: v1
//! name: my-plan
//! variables:
//!   - name: region
//!     value: us-central1
//! actions:
//!   - name: provision
//!     image: projectnebula/gke-provisioner:latest
//!     resourceID: cluster-a
//!     spec:
//!       zone: us-central1-a
//! workflows:
//!   - name: deploy
//!     default: true
//!     actions: [provision]
//! ```

mod action;
mod error;
mod plan;
mod validate;
mod workflow;

pub use action::{Action, ActionSpec};
pub use error::PlanError;
pub use plan::{Plan, Variable};
pub use validate::PlanIssue;
pub use workflow::{Trigger, Workflow};
