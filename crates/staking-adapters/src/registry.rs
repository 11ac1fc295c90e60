use async_trait::async_trait;
use dashmap::DashSet;
use staking_core::{MachineId, ProjectRegistry};

/// In-memory project registry.
///
/// `open()` admits every machine; `allow_list()` admits only listed ones.
#[derive(Debug)]
pub struct InMemoryProjectRegistry {
    open: bool,
    allowed: DashSet<MachineId>,
}

impl InMemoryProjectRegistry {
    pub fn open() -> Self {
        Self {
            open: true,
            allowed: DashSet::new(),
        }
    }

    pub fn allow_list(machines: impl IntoIterator<Item = MachineId>) -> Self {
        Self {
            open: false,
            allowed: machines.into_iter().collect(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Returns `false` if the machine was already listed.
    pub fn allow(&self, machine_id: MachineId) -> bool {
        self.allowed.insert(machine_id)
    }

    pub fn disallow(&self, machine_id: &MachineId) -> bool {
        self.allowed.remove(machine_id).is_some()
    }
}

#[async_trait]
impl ProjectRegistry for InMemoryProjectRegistry {
    async fn is_eligible(&self, machine_id: &MachineId) -> bool {
        self.open || self.allowed.contains(machine_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mid(s: &str) -> MachineId {
        MachineId::new(s).unwrap()
    }

    #[tokio::test]
    async fn open_registry_admits_everything() {
        let registry = InMemoryProjectRegistry::open();
        assert!(registry.is_eligible(&mid("anything")).await);
    }

    #[tokio::test]
    async fn allow_list_admits_listed_machines() {
        let registry = InMemoryProjectRegistry::allow_list([mid("m1")]);
        assert!(registry.is_eligible(&mid("m1")).await);
        assert!(!registry.is_eligible(&mid("m2")).await);

        assert!(registry.allow(mid("m2")));
        assert!(registry.is_eligible(&mid("m2")).await);
        assert!(registry.disallow(&mid("m1")));
        assert!(!registry.is_eligible(&mid("m1")).await);
    }
}
