//! Accounts, password hashing, bearer tokens and scopes.

pub mod password;
pub mod scopes;
pub mod token;
pub mod users;

pub use scopes::{mask_scopes, parse_scopes};
pub use token::{Claims, TokenManager};
pub use users::{RegisterRequest, User, UserPatch, UserService, UserView, USERS_COLLECTION};
