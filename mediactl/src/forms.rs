//! Form schemas shared with the front-end.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// # Project form
///
/// Missing fields deserialize as empty strings so they fail their length rule with a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(default)]
pub struct ProjectForm {
    /// Display name of the project
    #[validate(length(min = 2, message = "Name must be at least 2 characters."))]
    pub name: String,

    /// Free-text description
    #[validate(length(min = 100, max = 3000, message = "Description must be between 100 and 3000 characters."))]
    pub description: String,
}
