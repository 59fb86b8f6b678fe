// Current-user domain model
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub personal_folder_id: Option<String>,
    #[serde(default)]
    pub home_folder_id: Option<String>,
}
