use std::fmt;

/// Highest resource id which still addresses an RPC method
const MAX_METHOD_RESOURCE_ID: u16 = 0x7FFF;

/// Address of an entity or one of its resources on the bus
///
/// A resource id of `0` addresses the entity itself (used as the source of requests),
/// ids in `1..=0x7FFF` address RPC methods and everything above are topics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    authority: String,
    ue_id: u32,
    ue_version_major: u8,
    resource_id: u16,
}

impl Uri {
    /// Creates an address from its raw parts
    pub fn new(
        authority: impl Into<String>,
        ue_id: u32,
        ue_version_major: u8,
        resource_id: u16,
    ) -> Self {
        Self {
            authority: authority.into(),
            ue_id,
            ue_version_major,
            resource_id,
        }
    }

    /// Name of the device or domain hosting the entity
    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Identifier of the entity
    pub fn ue_id(&self) -> u32 {
        self.ue_id
    }

    /// Major version of the entity
    pub fn ue_version_major(&self) -> u8 {
        self.ue_version_major
    }

    /// Addressed resource within the entity
    pub fn resource_id(&self) -> u16 {
        self.resource_id
    }

    /// Whether this address points at an RPC method
    pub fn is_rpc_method(&self) -> bool {
        (1..=MAX_METHOD_RESOURCE_ID).contains(&self.resource_id)
    }

    /// Same entity, but addressing a different resource
    pub fn with_resource(&self, resource_id: u16) -> Self {
        Self {
            resource_id,
            ..self.clone()
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "//{}/{:X}/{:X}/{:X}",
            self.authority, self.ue_id, self.ue_version_major, self.resource_id
        )
    }
}
