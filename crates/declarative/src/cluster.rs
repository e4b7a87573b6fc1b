//! Cluster state store
//!
//! A [`Cluster`] is an immutable value. Every change goes through a method
//! that returns a new cluster; server pools are held behind `Arc` so a new
//! value shares every pool it did not touch with the value it came from.
//! Each effective change bumps the revision, which lets a caller tell two
//! snapshots apart without comparing them field by field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Role a server pool plays in the cluster
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolKind {
    Master,
    #[default]
    Node,
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolKind::Master => write!(f, "master"),
            PoolKind::Node => write!(f, "node"),
        }
    }
}

/// Inline policy as recorded on a server pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamPolicy {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    pub document: String,
}

/// Role as recorded on a server pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamRole {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub policies: Vec<IamPolicy>,
}

/// Instance profile as recorded on a server pool
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamInstanceProfile {
    pub name: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub role: Option<IamRole>,
}

/// A named group of machines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPool {
    pub name: String,
    #[serde(default)]
    pub kind: PoolKind,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub min_count: u32,
    #[serde(default)]
    pub max_count: u32,
    #[serde(default)]
    pub spot_price: Option<String>,
    /// Set once the pool's instance profile has been reconciled
    #[serde(default)]
    pub instance_profile: Option<IamInstanceProfile>,
}

impl ServerPool {
    /// Create a pool with only a name and kind set
    pub fn new(name: impl Into<String>, kind: PoolKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ..Default::default()
        }
    }
}

/// The cluster aggregate: a name and an ordered list of server pools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    revision: u64,
    #[serde(default)]
    server_pools: Vec<Arc<ServerPool>>,
}

impl Cluster {
    /// Create an empty cluster
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            location: String::new(),
            revision: 0,
            server_pools: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    /// Append a server pool while building the cluster
    pub fn with_server_pool(mut self, pool: ServerPool) -> Self {
        self.server_pools.push(Arc::new(pool));
        self
    }

    /// Number of effective changes since the cluster was built
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Server pools in declaration order
    pub fn server_pools(&self) -> impl Iterator<Item = &ServerPool> {
        self.server_pools.iter().map(AsRef::as_ref)
    }

    /// Look up a server pool by name
    pub fn server_pool(&self, name: &str) -> Option<&ServerPool> {
        self.server_pools().find(|p| p.name == name)
    }

    /// Return a cluster with the named pool replaced by `f`'s edit.
    ///
    /// Returns `None` when no pool has that name. When the edit leaves the
    /// pool as it was, the returned cluster is a plain copy of `self` with
    /// the same revision.
    pub fn update_server_pool<F>(&self, name: &str, f: F) -> Option<Cluster>
    where
        F: FnOnce(&mut ServerPool),
    {
        let index = self.server_pools.iter().position(|p| p.name == name)?;
        let mut pool = ServerPool::clone(&self.server_pools[index]);
        f(&mut pool);
        if pool == *self.server_pools[index] {
            return Some(self.clone());
        }

        let mut next = self.clone();
        next.server_pools[index] = Arc::new(pool);
        next.revision += 1;
        Some(next)
    }

    /// Return a cluster whose pool `name` is taken from `other`.
    ///
    /// This is how results of reconciling different pools against separate
    /// snapshots are folded back into one cluster. Returns `None` when
    /// either side lacks the pool.
    pub fn merge_server_pool(&self, other: &Cluster, name: &str) -> Option<Cluster> {
        let index = self.server_pools.iter().position(|p| p.name == name)?;
        let theirs = other.server_pools.iter().find(|p| p.name == name)?;
        if Arc::ptr_eq(&self.server_pools[index], theirs) || self.server_pools[index] == *theirs {
            return Some(self.clone());
        }

        let mut next = self.clone();
        next.server_pools[index] = Arc::clone(theirs);
        next.revision += 1;
        Some(next)
    }

    /// Whether both clusters hold the very same allocation for pool `name`
    pub fn shares_server_pool(&self, other: &Cluster, name: &str) -> bool {
        let mine = self.server_pools.iter().find(|p| p.name == name);
        let theirs = other.server_pools.iter().find(|p| p.name == name);
        matches!((mine, theirs), (Some(a), Some(b)) if Arc::ptr_eq(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        Cluster::new("demo")
            .with_server_pool(ServerPool::new("demo-master", PoolKind::Master))
            .with_server_pool(ServerPool::new("demo-node", PoolKind::Node))
    }

    fn profile(name: &str) -> IamInstanceProfile {
        IamInstanceProfile {
            name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_update_returns_new_value_and_keeps_original() {
        let before = cluster();
        let after = before
            .update_server_pool("demo-node", |p| {
                p.instance_profile = Some(profile("demo-profile"))
            })
            .unwrap();

        assert!(before.server_pool("demo-node").unwrap().instance_profile.is_none());
        assert_eq!(
            after
                .server_pool("demo-node")
                .unwrap()
                .instance_profile
                .as_ref()
                .unwrap()
                .name,
            "demo-profile"
        );
        assert_eq!(after.revision(), before.revision() + 1);
    }

    #[test]
    fn test_update_shares_untouched_pools() {
        let before = cluster();
        let after = before
            .update_server_pool("demo-node", |p| p.min_count = 3)
            .unwrap();
        assert!(after.shares_server_pool(&before, "demo-master"));
        assert!(!after.shares_server_pool(&before, "demo-node"));
    }

    #[test]
    fn test_update_unknown_pool_is_none() {
        assert!(cluster().update_server_pool("missing", |_| {}).is_none());
    }

    #[test]
    fn test_noop_update_keeps_revision() {
        let before = cluster();
        let after = before.update_server_pool("demo-node", |_| {}).unwrap();
        assert_eq!(after, before);
        assert!(after.shares_server_pool(&before, "demo-node"));
    }

    #[test]
    fn test_merge_server_pool() {
        let base = cluster();
        let left = base
            .update_server_pool("demo-master", |p| {
                p.instance_profile = Some(profile("master-profile"))
            })
            .unwrap();
        let right = base
            .update_server_pool("demo-node", |p| {
                p.instance_profile = Some(profile("node-profile"))
            })
            .unwrap();

        let merged = left.merge_server_pool(&right, "demo-node").unwrap();
        assert!(merged.server_pool("demo-master").unwrap().instance_profile.is_some());
        assert!(merged.server_pool("demo-node").unwrap().instance_profile.is_some());
        assert!(merged.shares_server_pool(&right, "demo-node"));
    }

    #[test]
    fn test_serde_round_trip_keeps_pool_order() {
        let c = cluster();
        let json = serde_json::to_string(&c).unwrap();
        let back: Cluster = serde_json::from_str(&json).unwrap();
        let names: Vec<_> = back.server_pools().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["demo-master", "demo-node"]);
    }
}
