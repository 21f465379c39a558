//! Run configuration
//!
//! The CLI layer builds an [`UnmountConfig`] and hands it to [`crate::run`].
//! Nothing in the library reads flags or environment variables directly.

use std::fmt;

use crate::error::{Error, Result};

/// Where to look for Pods.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// A single namespace.
    Namespace(String),
    /// Every namespace in the cluster. Only used when explicitly requested.
    AllNamespaces,
}

impl Scope {
    /// Namespace for a scoped `Api`, `None` for cluster-wide.
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Namespace(ns) => Some(ns),
            Scope::AllNamespaces => None,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Namespace(ns) => write!(f, "namespace {}", ns),
            Scope::AllNamespaces => f.write_str("all namespaces"),
        }
    }
}

/// Which Pods count as bound to the claim being unmounted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodFilter {
    /// Only claims with this name. `None` matches every claim.
    pub pvc_name: Option<String>,
    /// Only claims provisioned from this StorageClass.
    pub storage_class: Option<String>,
}

impl PodFilter {
    pub fn matches_claim_name(&self, claim: &str) -> bool {
        self.pvc_name.as_deref().is_none_or(|want| want == claim)
    }
}

/// Configuration for one unmount run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnmountConfig {
    pub scope: Scope,
    pub filter: PodFilter,
    /// Report targets without touching the cluster. Defaults to `true`.
    pub dry_run: bool,
    /// The operator explicitly agreed to modify the cluster.
    pub confirmed: bool,
}

impl UnmountConfig {
    /// Create a dry-run configuration scoped to one namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            scope: Scope::Namespace(namespace.into()),
            filter: PodFilter::default(),
            dry_run: true,
            confirmed: false,
        }
    }

    /// Create a dry-run configuration covering every namespace
    pub fn all_namespaces() -> Self {
        Self {
            scope: Scope::AllNamespaces,
            ..Self::new("")
        }
    }

    pub fn with_pvc_name(mut self, name: impl Into<String>) -> Self {
        self.filter.pvc_name = Some(name.into());
        self
    }

    pub fn with_storage_class(mut self, class: impl Into<String>) -> Self {
        self.filter.storage_class = Some(class.into());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_confirmed(mut self, confirmed: bool) -> Self {
        self.confirmed = confirmed;
        self
    }

    /// Reject configurations that cannot describe a meaningful run.
    pub fn validate(&self) -> Result<()> {
        if let Scope::Namespace(ns) = &self.scope
            && ns.trim().is_empty()
        {
            return Err(Error::InvalidConfig(
                "namespace must not be empty (use --all-namespaces for a cluster-wide run)"
                    .to_string(),
            ));
        }
        if self.filter.pvc_name.as_deref().is_some_and(str::is_empty) {
            return Err(Error::InvalidConfig(
                "PVC name filter must not be empty".to_string(),
            ));
        }
        if self
            .filter
            .storage_class
            .as_deref()
            .is_some_and(str::is_empty)
        {
            return Err(Error::InvalidConfig(
                "StorageClass filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
