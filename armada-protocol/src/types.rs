//! Identity types shared by client and server

use serde::{Deserialize, Serialize};

/// Sentinel for "no player", used before the server assigns an id
pub const INVALID_PLAYER_ID: i32 = -1;

/// Authorization roles a server may grant a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum RoleType {
    /// May issue host-only commands (kick, save, shutdown)
    Host = 0,
    /// Plays a regular empire
    Player = 1,
    /// Watches the game without an empire
    Observer = 2,
    /// May moderate chat and pause the game
    Moderator = 3,
    /// May alter galaxy setup before the game starts
    GameSetup = 4,
}

impl RoleType {
    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

/// Set of granted [`RoleType`]s, stored as a bitmask.
///
/// The client treats these as opaque flags: the server grants them via a
/// control message and the application queries them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRoles(u32);

impl AuthRoles {
    /// No roles granted
    pub fn new() -> Self {
        Self(0)
    }

    /// Check whether `role` is granted
    pub fn has_role(&self, role: RoleType) -> bool {
        self.0 & role.bit() != 0
    }

    /// Grant or revoke `role`
    pub fn set_role(&mut self, role: RoleType, granted: bool) {
        if granted {
            self.0 |= role.bit();
        } else {
            self.0 &= !role.bit();
        }
    }

    /// Revoke all roles
    pub fn clear(&mut self) {
        self.0 = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_roles_are_empty() {
        let roles = AuthRoles::new();
        assert!(!roles.has_role(RoleType::Host));
        assert!(!roles.has_role(RoleType::Player));
    }

    #[test]
    fn test_set_and_clear_role() {
        let mut roles = AuthRoles::new();
        roles.set_role(RoleType::Player, true);
        roles.set_role(RoleType::GameSetup, true);

        assert!(roles.has_role(RoleType::Player));
        assert!(roles.has_role(RoleType::GameSetup));
        assert!(!roles.has_role(RoleType::Host));

        roles.set_role(RoleType::Player, false);
        assert!(!roles.has_role(RoleType::Player));
        assert!(roles.has_role(RoleType::GameSetup));
    }

    #[test]
    fn test_clear_revokes_everything() {
        let mut roles = AuthRoles::new();
        roles.set_role(RoleType::Host, true);
        roles.set_role(RoleType::Moderator, true);
        roles.clear();
        assert_eq!(roles, AuthRoles::new());
    }

    #[test]
    fn test_roles_serialize_roundtrip() {
        let mut roles = AuthRoles::new();
        roles.set_role(RoleType::Observer, true);
        let bytes = bincode::serialize(&roles).unwrap();
        let back: AuthRoles = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back, roles);
    }
}
