use crate::auth::repo_types::Role;

/// System state derived from the number of existing users.
/// Never persisted; stores compute it inside the same atomic unit as the insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    Bootstrapping,
    Normal,
}

/// Role and approval a new account starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Standing {
    pub role: Role,
    pub is_approved: bool,
}

impl BootstrapState {
    pub fn from_user_count(count: i64) -> Self {
        if count <= 0 {
            BootstrapState::Bootstrapping
        } else {
            BootstrapState::Normal
        }
    }

    pub fn initial_standing(self) -> Standing {
        match self {
            BootstrapState::Bootstrapping => Standing {
                role: Role::Admin,
                is_approved: true,
            },
            BootstrapState::Normal => Standing {
                role: Role::User,
                is_approved: false,
            },
        }
    }
}
