use serde::{Deserialize, Serialize};

use action_primitives::COMMIT_KEY;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypePolicy {
    pub max_text_len: usize,
    /// Key dispatched after the text to commit it.
    pub commit_key: String,
}

impl Default for TypePolicy {
    fn default() -> Self {
        Self {
            max_text_len: 4000,
            commit_key: COMMIT_KEY.to_string(),
        }
    }
}
