//! Cognito user-pool collaborators: OAuth2 token endpoint and ID-token
//! verification.

pub mod client;
pub mod jwt;
