/// When a conditionally replicated property is sent to a connection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RepCondition {
    #[default]
    None,
    InitialOnly,
    OwnerOnly,
    SkipOwner,
    SimulatedOnly,
    AutonomousOnly,
    SimulatedOrPhysics,
    InitialOrOwner,
    /// Gated per object by `SharedChangeCache::set_custom_active`
    Custom,
}

/// Per-connection facts the conditions are evaluated against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ReplicationFlags {
    /// First replication pass of the object on this connection
    pub initial: bool,
    /// The connection owns the object
    pub owner: bool,
    /// The connection simulates the object rather than driving it
    pub simulated: bool,
    pub physics: bool,
}

impl ReplicationFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner: bool) -> Self {
        self.owner = owner;
        self
    }

    pub fn with_simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    pub fn with_physics(mut self, physics: bool) -> Self {
        self.physics = physics;
        self
    }
}

impl RepCondition {
    pub fn is_active(&self, flags: &ReplicationFlags) -> bool {
        match self {
            RepCondition::None | RepCondition::Custom => true,
            RepCondition::InitialOnly => flags.initial,
            RepCondition::OwnerOnly => flags.owner,
            RepCondition::SkipOwner => !flags.owner,
            RepCondition::SimulatedOnly => flags.simulated,
            RepCondition::AutonomousOnly => !flags.simulated,
            RepCondition::SimulatedOrPhysics => flags.simulated || flags.physics,
            RepCondition::InitialOrOwner => flags.initial || flags.owner,
        }
    }
}
