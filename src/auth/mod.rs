//! Authentication for Agora
//!
//! The authentication flow itself is an external collaborator; Agora only
//! validates the bearer tokens it issues and turns them into a stable
//! `UserId`. Dev mode accepts an `X-Dev-User` header instead.

pub mod jwt;

pub use jwt::{extract_token_from_header, Claims, Identity, TokenValidator};
