use serde::{Deserialize, Serialize};

use crate::data::User;

/// Request body for user registration.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserEnvelope {
    pub user: User,
}
