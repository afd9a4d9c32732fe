use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Modify => write!(f, "modify"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Declarative modification to one file, produced by solution design and
/// consumed by the coder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

impl FileChange {
    /// `create` and `modify` must carry content or a diff; `delete` needs
    /// neither.
    pub fn validate(&self) -> Result<(), String> {
        if self.file_path.trim().is_empty() {
            return Err("change is missing `file_path`".to_string());
        }
        match self.change_type {
            ChangeType::Create | ChangeType::Modify => {
                if self.content.is_none() && self.diff.is_none() {
                    return Err(format!(
                        "{} change for `{}` carries neither `content` nor `diff`",
                        self.change_type, self.file_path
                    ));
                }
                Ok(())
            }
            ChangeType::Delete => Ok(()),
        }
    }
}
